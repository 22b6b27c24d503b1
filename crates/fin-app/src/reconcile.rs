//! Turn an edited document into storage mutations.
//!
//! Reconciliation runs in two phases. [`Reconciler::plan`] reads the store and
//! computes every change without writing anything; [`Reconciler::apply`] then
//! performs the writes in document order, deletions last.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::Error;
use fin_core::id::TaskId;
use fin_core::timestamp;
use fin_core::{DISMISSED_LABEL, NewTask, TaskStatus, TaskUpdate};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::document::{self, ParsedLine, TaskLine};
use crate::task_patch::{TaskEditData, TaskPatch, Transition};
use crate::task_store::TaskStore;

/// Task created from a new document line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    /// Identifier assigned by storage.
    pub id: TaskId,
    /// Task text.
    pub content: String,
    /// Labels, including the reserved label for tasks created dismissed.
    pub labels: BTreeSet<String>,
    /// Due date.
    pub due_date: Option<Date>,
    /// Checkbox state written on the line.
    pub status: TaskStatus,
}

/// Everything a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Open tasks marked completed.
    pub completed: Vec<TaskId>,
    /// Completed tasks marked open.
    pub reopened: Vec<TaskId>,
    /// Tasks marked dismissed.
    pub dismissed: Vec<TaskId>,
    /// Dismissed tasks marked open or completed.
    pub undismissed: Vec<TaskId>,
    /// Tasks whose content or labels changed.
    pub content_modified: Vec<TaskId>,
    /// Tasks whose due date was added, changed or removed.
    pub due_date_changed: Vec<TaskId>,
    /// Tasks created from new lines.
    pub created: Vec<CreatedTask>,
    /// Tasks whose lines were removed.
    pub deleted: Vec<TaskId>,
}

impl ChangeSet {
    /// Returns true when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    /// Number of recorded changes across all lists.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts().total()
    }

    /// Per-category counts.
    #[must_use]
    pub const fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            completed: self.completed.len(),
            reopened: self.reopened.len(),
            dismissed: self.dismissed.len(),
            undismissed: self.undismissed.len(),
            content_modified: self.content_modified.len(),
            due_date_changed: self.due_date_changed.len(),
            created: self.created.len(),
            deleted: self.deleted.len(),
        }
    }

    fn record_update(&mut self, id: TaskId, patch: &TaskPatch) {
        match patch.transition {
            Some(Transition::Completed) => self.completed.push(id),
            Some(Transition::Reopened) => self.reopened.push(id),
            Some(Transition::Dismissed) => self.dismissed.push(id),
            Some(Transition::Undismissed) => self.undismissed.push(id),
            None => {}
        }
        if patch.content_modified() {
            self.content_modified.push(id);
        }
        if patch.due_date_changed() {
            self.due_date_changed.push(id);
        }
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.counts().fmt(f)
    }
}

/// Change counts shared by applied change sets and dry-run plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    /// Completed tasks.
    pub completed: usize,
    /// Reopened tasks.
    pub reopened: usize,
    /// Dismissed tasks.
    pub dismissed: usize,
    /// Undismissed tasks.
    pub undismissed: usize,
    /// Content or label edits.
    pub content_modified: usize,
    /// Due date edits.
    pub due_date_changed: usize,
    /// Created tasks.
    pub created: usize,
    /// Deleted tasks.
    pub deleted: usize,
}

impl ChangeCounts {
    /// Sum of all categories.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.completed
            + self.reopened
            + self.dismissed
            + self.undismissed
            + self.content_modified
            + self.due_date_changed
            + self.created
            + self.deleted
    }
}

impl fmt::Display for ChangeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            (self.completed, "completed"),
            (self.reopened, "reopened"),
            (self.dismissed, "dismissed"),
            (self.undismissed, "undismissed"),
            (self.content_modified, "modified"),
            (self.due_date_changed, "due date changed"),
            (self.created, "created"),
            (self.deleted, "deleted"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();

        if parts.is_empty() {
            f.write_str("no changes")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Update planned for an existing task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    /// Target task.
    pub id: TaskId,
    /// Field-level diff used for reporting.
    pub patch: TaskPatch,
    /// Storage update derived from the patch.
    pub update: TaskUpdate,
}

/// Creation planned for a new line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCreate {
    /// Task to insert.
    pub task: NewTask,
    /// Checkbox state written on the line.
    pub status: TaskStatus,
}

/// A single write, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStep {
    /// Update an existing task.
    Update(PlannedUpdate),
    /// Create a task.
    Create(PlannedCreate),
}

/// Every write a reconciliation would perform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Updates and creations in document order.
    pub steps: Vec<PlannedStep>,
    /// Tasks to delete, applied after all other steps.
    pub deletions: Vec<TaskId>,
    /// Lines that were ignored (unparseable, unresolved, duplicate or empty).
    pub dropped: usize,
}

impl ReconcilePlan {
    /// Returns true when applying the plan would not write anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.deletions.is_empty()
    }

    /// Counts the plan would produce once applied.
    #[must_use]
    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts {
            deleted: self.deletions.len(),
            ..ChangeCounts::default()
        };
        for step in &self.steps {
            match step {
                PlannedStep::Create(_) => counts.created += 1,
                PlannedStep::Update(planned) => {
                    match planned.patch.transition {
                        Some(Transition::Completed) => counts.completed += 1,
                        Some(Transition::Reopened) => counts.reopened += 1,
                        Some(Transition::Dismissed) => counts.dismissed += 1,
                        Some(Transition::Undismissed) => counts.undismissed += 1,
                        None => {}
                    }
                    counts.content_modified += usize::from(planned.patch.content_modified());
                    counts.due_date_changed += usize::from(planned.patch.due_date_changed());
                }
            }
        }
        counts
    }
}

/// Errors raised while reconciling.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Loading a referenced task failed before anything was written.
    #[error("failed to read task {id}: {source}")]
    Read {
        /// Task being loaded.
        id: TaskId,
        /// Store error.
        #[source]
        source: Error,
    },
    /// A write failed part way through; earlier writes stay applied.
    #[error("failed to {action}: {source} (already applied: {applied})")]
    Store {
        /// Operation that failed.
        action: String,
        /// Changes committed before the failure.
        applied: Box<ChangeSet>,
        /// Store error.
        #[source]
        source: Error,
    },
}

impl ReconcileError {
    /// Changes that were committed before the failure.
    #[must_use]
    pub fn applied(&self) -> Option<&ChangeSet> {
        match self {
            Self::Read { .. } => None,
            Self::Store { applied, .. } => Some(applied),
        }
    }
}

/// Applies edited documents to a [`TaskStore`].
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    store: S,
}

impl<S> Reconciler<S> {
    /// Construct a reconciler over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S> Reconciler<S>
where
    S: TaskStore,
{
    /// Compute the writes for a parsed document without touching storage.
    ///
    /// `original_ids` lists the tasks that were shown to the user; any of them
    /// without a surviving line is scheduled for deletion.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Read`] when a referenced task cannot be loaded.
    pub fn plan(
        &self,
        lines: &[ParsedLine],
        original_ids: &BTreeSet<TaskId>,
        now: OffsetDateTime,
    ) -> Result<ReconcilePlan, ReconcileError> {
        let mut plan = ReconcilePlan::default();
        let mut seen = BTreeSet::new();

        for parsed in lines {
            match parsed {
                ParsedLine::ExistingTask { ref_id, line } => {
                    let id = *ref_id;
                    let Some(task) = self
                        .store
                        .get(id)
                        .map_err(|err| ReconcileError::Read { id, source: err.into() })?
                    else {
                        warn!(task = %id, "dropping line that references a missing task");
                        plan.dropped += 1;
                        continue;
                    };
                    if !seen.insert(id) {
                        debug!(task = %id, "dropping duplicate reference");
                        plan.dropped += 1;
                        continue;
                    }
                    if !original_ids.contains(&id) {
                        debug!(task = %id, "line references a task that was not in the session");
                    }

                    let patch = TaskPatch::from_task(&task, edit_data(line), now);
                    if patch.is_empty() {
                        continue;
                    }
                    let update = patch.clone().into_task_update(&task);
                    if update.is_empty() {
                        continue;
                    }
                    plan.steps.push(PlannedStep::Update(PlannedUpdate { id, patch, update }));
                }
                ParsedLine::NewTask(line) => {
                    if line.content.is_empty() {
                        debug!("dropping new line without content");
                        plan.dropped += 1;
                        continue;
                    }
                    plan.steps.push(PlannedStep::Create(planned_create(line, now)));
                }
                ParsedLine::Unparseable { raw_text } => {
                    debug!(line = %raw_text, "dropping unparseable line");
                    plan.dropped += 1;
                }
            }
        }

        plan.deletions = original_ids.difference(&seen).copied().collect();
        Ok(plan)
    }

    /// Perform the writes of a plan: document order, deletions last.
    ///
    /// Updates or deletes that report a vanished task are skipped and not
    /// counted.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Store`] carrying the changes committed before
    /// the failing write.
    pub fn apply(&self, plan: ReconcilePlan) -> Result<ChangeSet, ReconcileError> {
        let mut changes = ChangeSet::default();

        for step in plan.steps {
            match step {
                PlannedStep::Update(PlannedUpdate { id, patch, update }) => {
                    match self.store.update(id, &update) {
                        Ok(true) => changes.record_update(id, &patch),
                        Ok(false) => warn!(task = %id, "task disappeared before it could be updated"),
                        Err(err) => return Err(write_error(format!("update task {id}"), changes, err.into())),
                    }
                }
                PlannedStep::Create(PlannedCreate { task, status }) => match self.store.create(&task) {
                    Ok(id) => changes.created.push(CreatedTask {
                        id,
                        content: task.content,
                        labels: task.labels,
                        due_date: task.due_date,
                        status,
                    }),
                    Err(err) => return Err(write_error("create task".to_owned(), changes, err.into())),
                },
            }
        }

        for id in plan.deletions {
            match self.store.delete(id) {
                Ok(true) => changes.deleted.push(id),
                Ok(false) => debug!(task = %id, "task already deleted"),
                Err(err) => return Err(write_error(format!("delete task {id}"), changes, err.into())),
            }
        }

        info!(%changes, "reconciled document");
        Ok(changes)
    }

    /// Plan and apply in one step.
    ///
    /// # Errors
    /// See [`plan`](Self::plan) and [`apply`](Self::apply).
    pub fn reconcile(
        &self,
        lines: &[ParsedLine],
        original_ids: &BTreeSet<TaskId>,
    ) -> Result<ChangeSet, ReconcileError> {
        let plan = self.plan(lines, original_ids, timestamp::now())?;
        debug!(steps = plan.steps.len(), deletions = plan.deletions.len(), dropped = plan.dropped, "planned reconciliation");
        self.apply(plan)
    }

    /// Plan the changes between two document texts without writing.
    ///
    /// The original text's references become the session's task ids.
    ///
    /// # Errors
    /// See [`plan`](Self::plan).
    pub fn plan_document(&self, original_text: &str, edited_text: &str) -> Result<ReconcilePlan, ReconcileError> {
        let original_ids = document::referenced_ids(&document::parse_document(original_text));
        let lines = document::parse_document(edited_text);
        self.plan(&lines, &original_ids, timestamp::now())
    }

    /// Reconcile an edited document against the document it was edited from.
    ///
    /// # Errors
    /// See [`plan`](Self::plan) and [`apply`](Self::apply).
    pub fn reconcile_document(&self, original_text: &str, edited_text: &str) -> Result<ChangeSet, ReconcileError> {
        let plan = self.plan_document(original_text, edited_text)?;
        self.apply(plan)
    }
}

/// Reconcile parsed lines against a store.
///
/// # Errors
/// See [`Reconciler::reconcile`].
pub fn reconcile<S: TaskStore>(
    store: S,
    lines: &[ParsedLine],
    original_ids: &BTreeSet<TaskId>,
) -> Result<ChangeSet, ReconcileError> {
    Reconciler::new(store).reconcile(lines, original_ids)
}

/// Reconcile an edited document text against its original text.
///
/// # Errors
/// See [`Reconciler::reconcile_document`].
pub fn reconcile_document<S: TaskStore>(
    store: S,
    original_text: &str,
    edited_text: &str,
) -> Result<ChangeSet, ReconcileError> {
    Reconciler::new(store).reconcile_document(original_text, edited_text)
}

fn edit_data(line: &TaskLine) -> TaskEditData {
    TaskEditData {
        status: line.status,
        content: line.content.clone(),
        labels: line.labels.clone(),
        due_date: line.due_date,
    }
}

fn planned_create(line: &TaskLine, now: OffsetDateTime) -> PlannedCreate {
    let mut labels = line.labels.clone();
    if line.status == TaskStatus::Dismissed {
        labels.insert(DISMISSED_LABEL.to_owned());
    }
    PlannedCreate {
        task: NewTask {
            content: line.content.clone(),
            labels,
            due_date: line.due_date,
            created_at: line.timestamp,
            completed_at: line.status.is_closed().then_some(now),
        },
        status: line.status,
    }
}

fn write_error(action: String, applied: ChangeSet, source: Error) -> ReconcileError {
    ReconcileError::Store {
        action,
        applied: Box::new(applied),
        source,
    }
}
