//! Line-oriented plain-text task documents.
//!
//! A document starts with `#` comment lines describing the format, followed by
//! one line per task:
//!
//! ```text
//! [ ] 2025-06-17 09:30  Buy milk  #home  due:2025-06-20  #ref:task_12
//! ```
//!
//! Fields are separated by two or more spaces. The trailing `#ref:task_<id>`
//! token ties a line to a stored task; lines without it describe new tasks.

mod parse;
mod render;

use std::collections::BTreeSet;

use fin_core::TaskStatus;
use fin_core::id::TaskId;
use time::{Date, OffsetDateTime};

pub use parse::{parse_document, parse_line};
pub use render::{HEADER, render, render_line};

/// Prefix of the reference token appended to every rendered task line.
pub const REF_PREFIX: &str = "#ref:task_";

/// Prefix of the due date token.
pub const DUE_PREFIX: &str = "due:";

/// Task fields read from a single document line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLine {
    /// Checkbox state.
    pub status: TaskStatus,
    /// Timestamp written after the checkbox, if any.
    pub timestamp: Option<OffsetDateTime>,
    /// Task text with metadata tokens removed.
    pub content: String,
    /// Labels from `#tag` tokens (lowercased, reserved label removed).
    pub labels: BTreeSet<String>,
    /// Date from the last `due:` token.
    pub due_date: Option<Date>,
}

/// Classification of a document line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A line carrying a well-formed reference to a stored task.
    ExistingTask {
        /// Referenced task.
        ref_id: TaskId,
        /// Fields written on the line.
        line: TaskLine,
    },
    /// A task line without a reference.
    NewTask(TaskLine),
    /// Anything that does not follow the line grammar.
    Unparseable {
        /// Original line text.
        raw_text: String,
    },
}

impl ParsedLine {
    /// Reference carried by the line, if any.
    #[must_use]
    pub const fn ref_id(&self) -> Option<TaskId> {
        match self {
            Self::ExistingTask { ref_id, .. } => Some(*ref_id),
            Self::NewTask(_) | Self::Unparseable { .. } => None,
        }
    }
}

/// Collect the references found in a document.
#[must_use]
pub fn referenced_ids(lines: &[ParsedLine]) -> BTreeSet<TaskId> {
    lines.iter().filter_map(ParsedLine::ref_id).collect()
}
