//! Domain types for fin tasks.

/// Identifier types.
pub mod id;
/// Checkbox states.
pub mod state;
/// Label matching used by filters.
pub mod text_matcher;
/// Document timestamp and date formats.
pub mod timestamp;

use crate::id::TaskId;
use crate::text_matcher::LabelMatcher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::{Date, OffsetDateTime, UtcOffset};

pub use crate::state::{DISMISSED_LABEL, TaskStatus};

/// Label prefix reserved for document reference tokens.
pub const RESERVED_LABEL_PREFIX: &str = "ref:";

/// A task as persisted in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Storage-assigned identifier.
    pub id: TaskId,
    /// Free-form text in [`normalize_content`] form, never empty.
    pub content: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Time of the last modification.
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
    /// Completion time; present for completed and dismissed tasks.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Optional calendar due date.
    #[serde(with = "timestamp::iso_date::option")]
    pub due_date: Option<Date>,
    /// Lowercase, deduplicated labels.
    pub labels: BTreeSet<String>,
}

impl Task {
    /// Derive the checkbox state from completion time and the reserved label.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match self.completed_at {
            None => TaskStatus::Open,
            Some(_) if self.is_dismissed() => TaskStatus::Dismissed,
            Some(_) => TaskStatus::Completed,
        }
    }

    /// Whether the task carries the reserved dismissed label.
    #[must_use]
    pub fn is_dismissed(&self) -> bool {
        self.labels.contains(DISMISSED_LABEL)
    }

    /// Labels shown to users, without the reserved dismissed label.
    pub fn visible_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .map(String::as_str)
            .filter(|label| *label != DISMISSED_LABEL)
    }

    /// Timestamp shown next to the checkbox: completion time for closed tasks,
    /// creation time otherwise.
    #[must_use]
    pub fn display_timestamp(&self) -> OffsetDateTime {
        self.completed_at.unwrap_or(self.created_at)
    }

    /// Calendar day the task was last active on (completed or created).
    #[must_use]
    pub fn activity_date(&self) -> Date {
        self.display_timestamp().to_offset(UtcOffset::UTC).date()
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Task text.
    pub content: String,
    /// Initial labels.
    pub labels: BTreeSet<String>,
    /// Optional due date.
    pub due_date: Option<Date>,
    /// Creation time; storage uses the current time when `None`.
    pub created_at: Option<OffsetDateTime>,
    /// Completion time for tasks created already closed.
    pub completed_at: Option<OffsetDateTime>,
}

impl NewTask {
    /// Construct an open task with the given content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Attach labels (normalized).
    #[must_use]
    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        self.labels = normalize_labels(labels);
        self
    }

    /// Attach a due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: Option<Date>) -> Self {
        self.due_date = due_date;
        self
    }
}

/// Field-level update for an existing task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New content.
    pub content: Option<String>,
    /// Replacement label set.
    pub labels: Option<BTreeSet<String>>,
    /// New due date (`Some(None)` clears it).
    pub due_date: Option<Option<Date>>,
    /// New completion time (`Some(None)` reopens the task).
    pub completed_at: Option<Option<OffsetDateTime>>,
}

impl TaskUpdate {
    /// Returns true when the update would not change anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.labels.is_none()
            && self.due_date.is_none()
            && self.completed_at.is_none()
    }
}

/// Canonical task content: every whitespace run, line breaks included, becomes
/// a single space and the ends are trimmed.
///
/// Two consecutive spaces separate fields in editable documents, so stored
/// content never contains them.
#[must_use]
pub fn normalize_content(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize raw label input: split on commas, whitespace and `#`, lowercase,
/// drop empties and duplicates.
///
/// Labels starting with [`RESERVED_LABEL_PREFIX`] are dropped because that
/// prefix marks reference tokens in editable documents.
#[must_use]
pub fn normalize_labels<I, L>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    raw.into_iter()
        .flat_map(|group| {
            group
                .as_ref()
                .split(|c: char| c == ',' || c == '#' || c.is_whitespace())
                .map(str::to_lowercase)
                .filter(|label| !label.is_empty() && !label.starts_with(RESERVED_LABEL_PREFIX))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Which tasks to include based on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionFilter {
    /// Open and closed tasks alike.
    #[default]
    Any,
    /// Only tasks without a completion time.
    OpenOnly,
    /// Open tasks plus tasks closed on or after the given day.
    OpenOrCompletedSince(Date),
}

/// Query used when listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Case-insensitive label substring.
    pub label: Option<LabelMatcher>,
    /// Match tasks whose activity date equals this day.
    pub date: Option<Date>,
    /// Completion constraint.
    pub completion: CompletionFilter,
}

impl TaskFilter {
    /// Filter that matches every task.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a label (blank input is ignored).
    #[must_use]
    pub fn with_label(mut self, label: Option<&str>) -> Self {
        self.label = label.and_then(LabelMatcher::new);
        self
    }

    /// Restrict to an activity date.
    #[must_use]
    pub const fn with_date(mut self, date: Option<Date>) -> Self {
        self.date = date;
        self
    }

    /// Restrict by completion.
    #[must_use]
    pub const fn with_completion(mut self, completion: CompletionFilter) -> Self {
        self.completion = completion;
        self
    }

    /// Returns true when no predicates are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.date.is_none() && self.completion == CompletionFilter::Any
    }

    /// Evaluate the filter against a task.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(matcher) = &self.label
            && !matcher.matches(task)
        {
            return false;
        }
        if let Some(date) = self.date
            && task.activity_date() != date
        {
            return false;
        }
        match self.completion {
            CompletionFilter::Any => true,
            CompletionFilter::OpenOnly => task.completed_at.is_none(),
            CompletionFilter::OpenOrCompletedSince(since) => task
                .completed_at
                .is_none_or(|done| done.to_offset(UtcOffset::UTC).date() >= since),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn task(id: i64, labels: &[&str], completed_at: Option<OffsetDateTime>) -> Task {
        let created = datetime!(2025-01-10 08:00 UTC);
        Task {
            id: TaskId(id),
            content: format!("task {id}"),
            created_at: created,
            modified_at: created,
            completed_at,
            due_date: None,
            labels: normalize_labels(labels),
        }
    }

    #[test]
    fn status_is_derived_from_completion_and_label() {
        let done = datetime!(2025-01-11 09:00 UTC);
        assert_eq!(task(1, &[], None).status(), TaskStatus::Open);
        assert_eq!(task(1, &["work"], Some(done)).status(), TaskStatus::Completed);
        assert_eq!(
            task(1, &["work", DISMISSED_LABEL], Some(done)).status(),
            TaskStatus::Dismissed
        );
        // The label alone does not close a task.
        assert_eq!(task(1, &[DISMISSED_LABEL], None).status(), TaskStatus::Open);
    }

    #[test]
    fn visible_labels_hide_the_reserved_label() {
        let done = datetime!(2025-01-11 09:00 UTC);
        let dismissed = task(1, &["work", DISMISSED_LABEL], Some(done));
        assert_eq!(dismissed.visible_labels().collect::<Vec<_>>(), vec!["work"]);
    }

    #[test]
    fn normalize_labels_splits_and_lowercases() {
        let labels = normalize_labels(["Work, urgent", "#Home  work", "", "ref:task_1"]);
        assert_eq!(
            labels.into_iter().collect::<Vec<_>>(),
            vec!["home", "urgent", "work"]
        );
    }

    #[test]
    fn labels_never_keep_an_interior_hash() {
        let labels = normalize_labels(["c#", "#a#B", "##"]);
        assert_eq!(labels.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn content_whitespace_collapses_to_single_spaces() {
        assert_eq!(normalize_content("  first\nsecond\r\n third "), "first second third");
        assert_eq!(normalize_content("Call  #5"), "Call #5");
        assert_eq!(normalize_content("Pay\t due:2025-01-01"), "Pay due:2025-01-01");
        assert_eq!(normalize_content(" \n "), "");
    }

    #[test]
    fn filter_by_label_and_date() {
        let open = task(1, &["work"], None);
        let filter = TaskFilter::all().with_label(Some("wor"));
        assert!(filter.matches(&open));
        assert!(!TaskFilter::all().with_label(Some("home")).matches(&open));

        let on_day = TaskFilter::all().with_date(Some(date!(2025-01-10)));
        assert!(on_day.matches(&open));
        let other_day = TaskFilter::all().with_date(Some(date!(2025-01-11)));
        assert!(!other_day.matches(&open));
    }

    #[test]
    fn date_filter_uses_completion_day_for_closed_tasks() {
        let closed = task(1, &[], Some(datetime!(2025-01-12 23:00 UTC)));
        assert!(TaskFilter::all().with_date(Some(date!(2025-01-12))).matches(&closed));
        assert!(!TaskFilter::all().with_date(Some(date!(2025-01-10))).matches(&closed));
    }

    #[test]
    fn completion_window_keeps_open_and_recent_tasks() {
        let filter =
            TaskFilter::all().with_completion(CompletionFilter::OpenOrCompletedSince(date!(2025-01-11)));
        assert!(filter.matches(&task(1, &[], None)));
        assert!(filter.matches(&task(2, &[], Some(datetime!(2025-01-11 00:30 UTC)))));
        assert!(!filter.matches(&task(3, &[], Some(datetime!(2025-01-10 23:59 UTC)))));

        let open_only = TaskFilter::all().with_completion(CompletionFilter::OpenOnly);
        assert!(!open_only.matches(&task(4, &[], Some(datetime!(2025-01-11 00:30 UTC)))));
    }
}
