//! Whole-database snapshots taken before every editing session.
//!
//! [`FileBackup`] keeps copies next to the database in `<stem>_backups/`:
//!
//! ```text
//! tasks_backups/
//!   backup_001.db
//!   backup_001.meta
//! ```
//!
//! Each `.meta` file is a small JSON document describing the snapshot. Only
//! the newest `max_backups` snapshots are kept.

use std::fmt;
use std::fs;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const DATA_EXTENSION: &str = "db";
const META_EXTENSION: &str = "meta";
const FILE_PREFIX: &str = "backup_";

/// Identifier of a stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupHandle(pub u32);

impl fmt::Display for BackupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackupHandle {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Description stored alongside each snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Snapshot identifier.
    pub backup_id: BackupHandle,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Why the snapshot was taken.
    #[serde(default)]
    pub description: String,
    /// Database the snapshot was copied from.
    pub original_path: PathBuf,
    /// Size of the copied file in bytes.
    #[serde(default)]
    pub size_bytes: u64,
}

/// Errors raised by backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// There is no database file to copy.
    #[error("database {0} does not exist")]
    MissingDatabase(PathBuf),
    /// Filesystem operation failed.
    #[error("backup I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Metadata could not be written.
    #[error("backup metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Snapshot and restore facility for the task database.
pub trait Backup {
    /// Copy the current database and return the new snapshot's handle.
    ///
    /// # Errors
    /// Returns [`BackupError`] when the snapshot cannot be written.
    fn snapshot(&self, description: &str) -> Result<BackupHandle, BackupError>;

    /// Replace the database with a snapshot. Returns `false` when the handle
    /// is unknown.
    ///
    /// # Errors
    /// Returns [`BackupError`] when the restore fails.
    fn restore(&self, handle: BackupHandle) -> Result<bool, BackupError>;
}

impl<B> Backup for &B
where
    B: Backup + ?Sized,
{
    fn snapshot(&self, description: &str) -> Result<BackupHandle, BackupError> {
        (*self).snapshot(description)
    }

    fn restore(&self, handle: BackupHandle) -> Result<bool, BackupError> {
        (*self).restore(handle)
    }
}

/// Backup implementation that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackup;

impl Backup for NoBackup {
    fn snapshot(&self, _description: &str) -> Result<BackupHandle, BackupError> {
        Ok(BackupHandle(0))
    }

    fn restore(&self, _handle: BackupHandle) -> Result<bool, BackupError> {
        Ok(false)
    }
}

/// File-copy snapshots stored next to the database.
#[derive(Debug, Clone)]
pub struct FileBackup {
    db_path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl FileBackup {
    /// Manage snapshots for `db_path`, keeping at most `max_backups` (minimum 1).
    pub fn new(db_path: impl Into<PathBuf>, max_backups: usize) -> Self {
        let db_path = db_path.into();
        let backup_dir = backup_dir_for(&db_path);
        Self {
            db_path,
            backup_dir,
            max_backups: max_backups.max(1),
        }
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Describe every stored snapshot, newest first.
    ///
    /// # Errors
    /// Returns [`BackupError::Io`] when the backup directory cannot be read.
    pub fn list(&self) -> Result<Vec<BackupMetadata>, BackupError> {
        let mut entries = Vec::new();
        for id in self.ids()?.into_iter().rev() {
            entries.push(self.metadata(id)?);
        }
        Ok(entries)
    }

    fn ids(&self) -> Result<Vec<u32>, BackupError> {
        let dir = match fs::read_dir(&self.backup_dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        for entry in dir {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DATA_EXTENSION) {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.strip_prefix(FILE_PREFIX))
                .and_then(|digits| digits.parse::<u32>().ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn data_path(&self, id: u32) -> PathBuf {
        self.backup_dir.join(format!("{FILE_PREFIX}{id:03}.{DATA_EXTENSION}"))
    }

    fn meta_path(&self, id: u32) -> PathBuf {
        self.backup_dir.join(format!("{FILE_PREFIX}{id:03}.{META_EXTENSION}"))
    }

    /// Load metadata, rebuilding it from the data file when the `.meta`
    /// file is missing or unreadable.
    fn metadata(&self, id: u32) -> Result<BackupMetadata, BackupError> {
        let meta_path = self.meta_path(id);
        match fs::read_to_string(&meta_path).map(|raw| serde_json::from_str::<BackupMetadata>(&raw)) {
            Ok(Ok(meta)) => return Ok(meta),
            Ok(Err(err)) => warn!(path = %meta_path.display(), "ignoring corrupt backup metadata: {err}"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let info = fs::metadata(self.data_path(id))?;
        Ok(BackupMetadata {
            backup_id: BackupHandle(id),
            timestamp: info.modified().map_or(OffsetDateTime::UNIX_EPOCH, OffsetDateTime::from),
            description: String::new(),
            original_path: self.db_path.clone(),
            size_bytes: info.len(),
        })
    }

    fn prune(&self) -> Result<(), BackupError> {
        let ids = self.ids()?;
        let excess = ids.len().saturating_sub(self.max_backups);
        for id in ids.into_iter().take(excess) {
            debug!(backup = id, "pruning old backup");
            fs::remove_file(self.data_path(id))?;
            match fs::remove_file(self.meta_path(id)) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Backup for FileBackup {
    fn snapshot(&self, description: &str) -> Result<BackupHandle, BackupError> {
        if !self.db_path.exists() {
            return Err(BackupError::MissingDatabase(self.db_path.clone()));
        }
        fs::create_dir_all(&self.backup_dir)?;

        let id = self.ids()?.last().map_or(1, |last| last + 1);
        let size_bytes = fs::copy(&self.db_path, self.data_path(id))?;
        let metadata = BackupMetadata {
            backup_id: BackupHandle(id),
            timestamp: fin_core::timestamp::now(),
            description: description.to_owned(),
            original_path: self.db_path.clone(),
            size_bytes,
        };
        fs::write(self.meta_path(id), serde_json::to_string_pretty(&metadata)?)?;
        info!(backup = id, %description, "database snapshot created");

        self.prune()?;
        Ok(BackupHandle(id))
    }

    fn restore(&self, handle: BackupHandle) -> Result<bool, BackupError> {
        let source = self.data_path(handle.0);
        if !source.is_file() {
            return Ok(false);
        }

        // Stage the copy first so pruning by the safety snapshot cannot remove it.
        let staged = self.db_path.with_extension("restore");
        fs::copy(&source, &staged)?;
        if self.db_path.exists()
            && let Err(err) = self.snapshot(&format!("auto-backup before restoring backup {handle}"))
        {
            discard_staged(&staged);
            return Err(err);
        }
        if let Err(err) = fs::rename(&staged, &self.db_path) {
            discard_staged(&staged);
            return Err(err.into());
        }
        info!(backup = handle.0, "database restored");
        Ok(true)
    }
}

fn discard_staged(staged: &Path) {
    if let Err(err) = fs::remove_file(staged) {
        warn!(path = %staged.display(), "failed to remove staged restore copy: {err}");
    }
}

fn backup_dir_for(db_path: &Path) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map_or_else(|| "tasks".into(), |stem| stem.to_string_lossy());
    let parent = db_path.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{stem}_backups"))
}
