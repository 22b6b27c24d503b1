use std::collections::BTreeSet;

use fin_core::{DISMISSED_LABEL, Task, TaskStatus, TaskUpdate, normalize_content};
use time::{Date, OffsetDateTime};

/// Difference between two sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetDiff<T> {
    /// Entries present in the desired set but missing from the current set.
    pub added: Vec<T>,
    /// Entries present in the current set but removed from the desired set.
    pub removed: Vec<T>,
}

impl<T> SetDiff<T> {
    /// Returns true when both added/removed are empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute differences between two sets.
#[must_use]
pub fn diff_sets<T: Ord + Clone>(current: &BTreeSet<T>, desired: &BTreeSet<T>) -> SetDiff<T> {
    SetDiff {
        added: desired.difference(current).cloned().collect(),
        removed: current.difference(desired).cloned().collect(),
    }
}

/// Checkbox transition detected between a stored task and an edited line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Open to completed.
    Completed,
    /// Completed to open.
    Reopened,
    /// Open or completed to dismissed.
    Dismissed,
    /// Dismissed to open or completed.
    Undismissed,
}

impl Transition {
    /// Classify a status change. Returns `None` when the status is unchanged.
    #[must_use]
    pub const fn between(from: TaskStatus, to: TaskStatus) -> Option<Self> {
        match (from, to) {
            (TaskStatus::Open, TaskStatus::Completed) => Some(Self::Completed),
            (TaskStatus::Completed, TaskStatus::Open) => Some(Self::Reopened),
            (TaskStatus::Open | TaskStatus::Completed, TaskStatus::Dismissed) => Some(Self::Dismissed),
            (TaskStatus::Dismissed, TaskStatus::Open | TaskStatus::Completed) => Some(Self::Undismissed),
            _ => None,
        }
    }
}

/// Desired task fields read from an edited document line.
#[derive(Debug, Clone)]
pub struct TaskEditData {
    /// Desired checkbox state.
    pub status: TaskStatus,
    /// Desired content.
    pub content: String,
    /// Desired visible labels (the reserved dismissed label is ignored).
    pub labels: BTreeSet<String>,
    /// Desired due date.
    pub due_date: Option<Date>,
}

/// Diff between a stored task and target fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// Status transition (if any).
    pub transition: Option<Transition>,
    /// New completion time (`Some(None)` clears it).
    pub completed_at: Option<Option<OffsetDateTime>>,
    /// Whether the reserved dismissed label must be present afterwards.
    /// `None` keeps whatever the stored task has.
    pub dismissed_label: Option<bool>,
    /// Content change (if any).
    pub content: Option<String>,
    /// Visible label additions/removals.
    pub labels: SetDiff<String>,
    /// Due date change (`Some(None)` clears it).
    pub due_date: Option<Option<Date>>,
}

impl TaskPatch {
    /// Compute a patch by comparing a stored task with the provided edits.
    ///
    /// A status transition also normalizes the reserved dismissed label to
    /// match the new status.
    #[must_use]
    pub fn from_task(task: &Task, data: TaskEditData, now: OffsetDateTime) -> Self {
        let TaskEditData {
            status,
            content,
            labels,
            due_date,
        } = data;

        let mut patch = Self {
            transition: Transition::between(task.status(), status),
            ..Self::default()
        };

        match patch.transition {
            Some(Transition::Completed) => patch.completed_at = Some(Some(now)),
            Some(Transition::Reopened) => patch.completed_at = Some(None),
            Some(Transition::Dismissed) => {
                if task.completed_at.is_none() {
                    patch.completed_at = Some(Some(now));
                }
            }
            Some(Transition::Undismissed) => {
                if status == TaskStatus::Open {
                    patch.completed_at = Some(None);
                }
            }
            None => {}
        }
        if patch.transition.is_some() {
            let want = status == TaskStatus::Dismissed;
            if want != task.is_dismissed() {
                patch.dismissed_label = Some(want);
            }
        }

        if content != normalize_content(&task.content) {
            patch.content = Some(content);
        }

        let current: BTreeSet<String> = task.visible_labels().map(str::to_owned).collect();
        let desired: BTreeSet<String> = labels.into_iter().filter(|label| label != DISMISSED_LABEL).collect();
        patch.labels = diff_sets(&current, &desired);

        if due_date != task.due_date {
            patch.due_date = Some(due_date);
        }

        patch
    }

    /// Returns true when the patch would not change the task.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.transition.is_none()
            && self.completed_at.is_none()
            && self.dismissed_label.is_none()
            && self.content.is_none()
            && self.labels.is_empty()
            && self.due_date.is_none()
    }

    /// Whether the content or the visible labels changed.
    #[must_use]
    pub const fn content_modified(&self) -> bool {
        self.content.is_some() || !self.labels.is_empty()
    }

    /// Whether the due date changed.
    #[must_use]
    pub const fn due_date_changed(&self) -> bool {
        self.due_date.is_some()
    }

    /// Convert the patch into a storage [`TaskUpdate`] for the given task.
    #[must_use]
    pub fn into_task_update(self, task: &Task) -> TaskUpdate {
        let mut labels = task.labels.clone();
        for removed in &self.labels.removed {
            labels.remove(removed);
        }
        labels.extend(self.labels.added);
        match self.dismissed_label {
            Some(true) => {
                labels.insert(DISMISSED_LABEL.to_owned());
            }
            Some(false) => {
                labels.remove(DISMISSED_LABEL);
            }
            None => {}
        }

        TaskUpdate {
            content: self.content,
            labels: (labels != task.labels).then_some(labels),
            due_date: self.due_date,
            completed_at: self.completed_at,
        }
    }
}
