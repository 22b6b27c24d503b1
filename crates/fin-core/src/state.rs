use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved label marking a completed task as dismissed.
pub const DISMISSED_LABEL: &str = "dismissed";

/// Checkbox state of a task.
///
/// Dismissed is a sub-state of completed: the task carries a `completed_at`
/// timestamp and the [`DISMISSED_LABEL`] label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is still to be done.
    Open,
    /// Task is done.
    Completed,
    /// Task was closed without being done.
    Dismissed,
}

impl TaskStatus {
    /// Checkbox token used in editable documents.
    #[must_use]
    pub const fn checkbox(self) -> &'static str {
        match self {
            Self::Open => "[ ]",
            Self::Completed => "[x]",
            Self::Dismissed => "[d]",
        }
    }

    /// Parse a checkbox token. `[]` is accepted as an open box.
    #[must_use]
    pub fn from_checkbox(token: &str) -> Option<Self> {
        match token {
            "[ ]" | "[]" => Some(Self::Open),
            "[x]" | "[X]" => Some(Self::Completed),
            "[d]" | "[D]" => Some(Self::Dismissed),
            _ => None,
        }
    }

    /// Returns true for both completed and dismissed tasks.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !matches!(self, Self::Open)
    }

    /// String representation used in listings and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
