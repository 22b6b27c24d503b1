//! SQLite-backed storage implementation for fin.

mod error;

pub use error::StoreError;

use fin_core::id::TaskId;
use fin_core::{
    CompletionFilter, NewTask, Task, TaskFilter, TaskUpdate, normalize_content, normalize_labels, timestamp,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

/// `CURRENT_TIMESTAMP` layout written by older databases.
const SQLITE_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT,
    completed_at TEXT,
    labels TEXT,
    due_date TEXT
);
CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date);
";

const SELECT_COLUMNS: &str = "SELECT id, content, created_at, modified_at, completed_at, labels, due_date FROM tasks";

/// Task storage in a single SQLite database file.
///
/// Every call runs in its own implicit transaction. Identifiers come from an
/// `AUTOINCREMENT` column and are never handed out twice.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the schema cannot be installed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened task database");
        Ok(Self { conn, path: Some(path) })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    /// Location of the database file (`None` for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fetch a single task.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let raw = self
            .conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id.get()], RawTask::from_row)
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    /// List tasks matching `filter`, ordered by id.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let sql = if filter.completion == CompletionFilter::OpenOnly {
            format!("{SELECT_COLUMNS} WHERE completed_at IS NULL ORDER BY id")
        } else {
            format!("{SELECT_COLUMNS} ORDER BY id")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawTask::from_row)?;
        let mut tasks = Vec::new();
        for raw in rows {
            let task = raw?.into_task()?;
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Insert a task and return its identifier. Content and labels are
    /// stored in normalized form.
    ///
    /// # Errors
    /// Returns [`StoreError::EmptyContent`] for blank content, or an SQL error.
    pub fn create(&self, task: &NewTask) -> Result<TaskId, StoreError> {
        let content = normalize_content(&task.content);
        if content.is_empty() {
            return Err(StoreError::EmptyContent);
        }
        let now = timestamp::now();
        let created_at = task.created_at.unwrap_or(now);
        self.conn.execute(
            "INSERT INTO tasks (content, created_at, modified_at, completed_at, labels, due_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                content,
                format_ts(created_at),
                format_ts(now),
                task.completed_at.map(format_ts),
                encode_labels(&normalize_labels(&task.labels)),
                task.due_date.map(timestamp::format_date),
            ],
        )?;
        let id = TaskId(self.conn.last_insert_rowid());
        debug!(task = %id, "created task");
        Ok(id)
    }

    /// Apply a field update. Returns `false` when the task does not exist.
    ///
    /// # Errors
    /// Returns [`StoreError::EmptyContent`] for blank content, or an SQL error.
    pub fn update(&self, id: TaskId, update: &TaskUpdate) -> Result<bool, StoreError> {
        let mut assignments = vec!["modified_at = ?"];
        let mut values = vec![Value::Text(format_ts(timestamp::now()))];

        if let Some(content) = &update.content {
            let content = normalize_content(content);
            if content.is_empty() {
                return Err(StoreError::EmptyContent);
            }
            assignments.push("content = ?");
            values.push(Value::Text(content));
        }
        if let Some(labels) = &update.labels {
            assignments.push("labels = ?");
            values.push(optional_text(encode_labels(&normalize_labels(labels))));
        }
        if let Some(due_date) = update.due_date {
            assignments.push("due_date = ?");
            values.push(optional_text(due_date.map(timestamp::format_date)));
        }
        if let Some(completed_at) = update.completed_at {
            assignments.push("completed_at = ?");
            values.push(optional_text(completed_at.map(format_ts)));
        }
        values.push(Value::Integer(id.get()));

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", assignments.join(", "));
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        debug!(task = %id, changed, "updated task");
        Ok(changed > 0)
    }

    /// Delete a task. Returns `false` when the task does not exist.
    ///
    /// # Errors
    /// Returns an SQL error when the statement fails.
    pub fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.get()])?;
        debug!(task = %id, changed, "deleted task");
        Ok(changed > 0)
    }

    /// Number of stored tasks.
    ///
    /// # Errors
    /// Returns an SQL error when the query fails.
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

struct RawTask {
    id: i64,
    content: String,
    created_at: String,
    modified_at: Option<String>,
    completed_at: Option<String>,
    labels: Option<String>,
    due_date: Option<String>,
}

impl RawTask {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            created_at: row.get(2)?,
            modified_at: row.get(3)?,
            completed_at: row.get(4)?,
            labels: row.get(5)?,
            due_date: row.get(6)?,
        })
    }

    fn into_task(self) -> Result<Task, StoreError> {
        let id = TaskId(self.id);
        let created_at = parse_ts(id, "created_at", &self.created_at)?;
        let modified_at = match self.modified_at.as_deref() {
            Some(raw) => parse_ts(id, "modified_at", raw)?,
            None => created_at,
        };
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|raw| parse_ts(id, "completed_at", raw))
            .transpose()?;
        let due_date = self
            .due_date
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_due(id, raw))
            .transpose()?;
        Ok(Task {
            id,
            content: self.content,
            created_at,
            modified_at,
            completed_at,
            due_date,
            labels: decode_labels(self.labels.as_deref()),
        })
    }
}

fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

fn parse_ts(id: TaskId, field: &'static str, raw: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| PrimitiveDateTime::parse(raw, SQLITE_TIMESTAMP).map(PrimitiveDateTime::assume_utc))
        .map_err(|_| StoreError::Corrupt {
            id,
            field,
            value: raw.to_owned(),
        })
}

fn parse_due(id: TaskId, raw: &str) -> Result<Date, StoreError> {
    timestamp::parse_date(raw).map_err(|_| StoreError::Corrupt {
        id,
        field: "due_date",
        value: raw.to_owned(),
    })
}

fn encode_labels(labels: &BTreeSet<String>) -> Option<String> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.iter().map(String::as_str).collect::<Vec<_>>().join(","))
    }
}

fn decode_labels(raw: Option<&str>) -> BTreeSet<String> {
    raw.map(|raw| normalize_labels(raw.split(','))).unwrap_or_default()
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}
