//! Interactive editing sessions.
//!
//! A session selects tasks, snapshots the database, renders the tasks into a
//! temporary document, waits for the user's editor and reconciles the result.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Error;
use fin_core::id::TaskId;
use fin_core::timestamp;
use fin_core::{CompletionFilter, Task, TaskFilter};
use tempfile::NamedTempFile;
use thiserror::Error;
use time::{Date, Duration};
use tracing::{debug, info, warn};

use crate::backup::{Backup, BackupError, BackupHandle};
use crate::document;
use crate::editor::{EditorError, EditorLauncher};
use crate::reconcile::{ChangeSet, ReconcileError, Reconciler};
use crate::task_store::TaskStore;

const TEMP_PREFIX: &str = "fin-";
const TEMP_SUFFIX: &str = ".txt";

/// Selection used to build a session document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    /// Case-insensitive label substring.
    pub label: Option<String>,
    /// Activity date.
    pub date: Option<Date>,
    /// Include every task regardless of other criteria.
    pub all: bool,
}

impl SessionFilter {
    /// Build the storage query.
    ///
    /// `all` selects everything. A label or date selects matching tasks in any
    /// state. Otherwise open tasks plus tasks closed within the last
    /// `default_days` days (counting today) are selected.
    #[must_use]
    pub fn to_task_filter(&self, default_days: u32, today: Date) -> TaskFilter {
        if self.all {
            return TaskFilter::all();
        }
        if self.label.is_some() || self.date.is_some() {
            return TaskFilter::all()
                .with_label(self.label.as_deref())
                .with_date(self.date);
        }
        let since = today
            .checked_sub(Duration::days(i64::from(default_days.saturating_sub(1))))
            .unwrap_or(Date::MIN);
        TaskFilter::all().with_completion(CompletionFilter::OpenOrCompletedSince(since))
    }
}

/// Bookkeeping for one editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    /// Tasks shown in the document.
    pub original_ids: BTreeSet<TaskId>,
    /// Snapshot taken before the editor was opened.
    pub backup: BackupHandle,
    /// Temporary document handed to the editor; removed when the session ends.
    pub document_path: PathBuf,
}

/// Result of [`SessionController::run_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing matched the filter; no editor was opened.
    NoTasks,
    /// The editor exited unsuccessfully; nothing was written.
    EditorAborted {
        /// Exit code, if any.
        code: Option<i32>,
        /// Snapshot taken before the editor opened.
        backup: BackupHandle,
    },
    /// The edited document was applied.
    Reconciled {
        /// What changed.
        changes: ChangeSet,
        /// Snapshot taken before the editor opened.
        backup: BackupHandle,
    },
}

impl SessionOutcome {
    /// Changes applied by the session (empty unless reconciled).
    #[must_use]
    pub fn into_changes(self) -> ChangeSet {
        match self {
            Self::Reconciled { changes, .. } => changes,
            Self::NoTasks | Self::EditorAborted { .. } => ChangeSet::default(),
        }
    }
}

/// Errors raised by an editing session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The controller already opened an editor.
    #[error("an editor session was already started by this controller")]
    Reentrant,
    /// Selecting tasks failed.
    #[error("failed to query tasks: {0}")]
    Query(#[source] Error),
    /// The pre-edit snapshot failed; the editor was not opened.
    #[error("failed to back up the database: {0}")]
    Backup(#[from] BackupError),
    /// Writing or reading the temporary document failed.
    #[error("edit document I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The editor could not be started.
    #[error(transparent)]
    Editor(#[from] EditorError),
    /// Applying the edited document failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Runs a single editing session against a store.
///
/// A controller opens the external editor at most once.
#[derive(Debug)]
pub struct SessionController<S, B, E> {
    store: S,
    backup: B,
    editor: E,
    default_days: u32,
    editor_opened: bool,
}

impl<S, B, E> SessionController<S, B, E> {
    /// Construct a controller. Unfiltered sessions show one day of closed tasks
    /// unless [`with_default_days`](Self::with_default_days) says otherwise.
    pub const fn new(store: S, backup: B, editor: E) -> Self {
        Self {
            store,
            backup,
            editor,
            default_days: 1,
            editor_opened: false,
        }
    }

    /// Override how many days of closed tasks an unfiltered session shows.
    #[must_use]
    pub const fn with_default_days(mut self, days: u32) -> Self {
        self.default_days = days;
        self
    }

    /// Borrow the store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Whether this controller has already opened the editor.
    pub const fn editor_opened(&self) -> bool {
        self.editor_opened
    }

    fn mark_editor_opened(&mut self) -> Result<(), SessionError> {
        if self.editor_opened {
            return Err(SessionError::Reentrant);
        }
        self.editor_opened = true;
        Ok(())
    }
}

impl<S, B, E> SessionController<S, B, E>
where
    S: TaskStore,
    B: Backup,
    E: EditorLauncher,
{
    /// Select tasks, let the user edit them and apply the result.
    ///
    /// The temporary document is removed on every exit path.
    ///
    /// # Errors
    /// Returns [`SessionError`] when querying, the snapshot, the document file,
    /// the editor launch or reconciliation fails, or when the controller has
    /// already opened an editor.
    pub fn run_session(&mut self, filter: &SessionFilter) -> Result<SessionOutcome, SessionError> {
        if self.editor_opened {
            return Err(SessionError::Reentrant);
        }

        let query = filter.to_task_filter(self.default_days, timestamp::now().date());
        let tasks = self
            .store
            .list(&query)
            .map_err(|err| SessionError::Query(err.into()))?;
        if tasks.is_empty() {
            info!("no tasks match the session filter");
            return Ok(SessionOutcome::NoTasks);
        }

        let backup = self
            .backup
            .snapshot(&format!("before editing {} task(s)", tasks.len()))?;
        let (session, file) = write_document(&tasks, backup)?;
        debug!(path = %session.document_path.display(), tasks = tasks.len(), "wrote edit document");

        self.mark_editor_opened()?;
        let exit = self.editor.launch(&session.document_path)?;
        if !exit.success() {
            warn!(code = ?exit.code, "editor exited unsuccessfully; discarding edits");
            return Ok(SessionOutcome::EditorAborted {
                code: exit.code,
                backup: session.backup,
            });
        }

        let edited = fs::read_to_string(&session.document_path)?;
        let lines = document::parse_document(&edited);
        let changes = Reconciler::new(&self.store).reconcile(&lines, &session.original_ids)?;
        close_document(file);

        Ok(SessionOutcome::Reconciled {
            changes,
            backup: session.backup,
        })
    }

    /// Reconcile two document texts without opening an editor.
    ///
    /// # Errors
    /// Returns [`SessionError::Reconcile`] when applying fails.
    pub fn reconcile_document(&self, original_text: &str, edited_text: &str) -> Result<ChangeSet, SessionError> {
        Ok(Reconciler::new(&self.store).reconcile_document(original_text, edited_text)?)
    }
}

/// Renders `tasks` into a fresh temporary document. The file is removed when
/// the returned handle drops.
fn write_document(tasks: &[Task], backup: BackupHandle) -> std::io::Result<(EditSession, NamedTempFile)> {
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile()?;
    file.write_all(document::render(tasks).as_bytes())?;
    file.flush()?;
    let session = EditSession {
        original_ids: tasks.iter().map(|task| task.id).collect(),
        backup,
        document_path: file.path().to_path_buf(),
    };
    Ok((session, file))
}

fn close_document(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(err) = file.close() {
        warn!(path = %path.display(), "failed to remove edit document: {err}");
    }
}
