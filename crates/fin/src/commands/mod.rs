//! Command dispatch for the `fin` binary.

use std::path::Path;

use anyhow::{Context, Result};
use fin_app::FinConfig;
use fin_store_sqlite::SqliteStore;

use crate::Command;

mod handlers;
mod output;

use handlers::StatusAction;

/// Execute a parsed command against the database at `db_path`.
pub fn run(command: Command, config: &FinConfig, db_path: &Path) -> Result<()> {
    match command {
        Command::Add { content, labels, due } => {
            let store = open_store(db_path)?;
            handlers::handle_add(&store, &content, &labels, due)
        }
        Command::Ls { select, format } => {
            let store = open_store(db_path)?;
            handlers::handle_ls(&store, config, &select.into(), format)
        }
        Command::Edit { select } => {
            let store = open_store(db_path)?;
            handlers::handle_edit(&store, config, db_path, &select.into())
        }
        Command::Export { select } => {
            let store = open_store(db_path)?;
            handlers::handle_export(&store, config, &select.into())
        }
        Command::Apply {
            original,
            edited,
            dry_run,
        } => {
            let store = open_store(db_path)?;
            handlers::handle_apply(&store, &original, &edited, dry_run)
        }
        Command::Complete { tasks } => {
            let store = open_store(db_path)?;
            handlers::handle_status(&store, &tasks, StatusAction::Complete)
        }
        Command::Reopen { tasks } => {
            let store = open_store(db_path)?;
            handlers::handle_status(&store, &tasks, StatusAction::Reopen)
        }
        Command::Toggle { tasks } => {
            let store = open_store(db_path)?;
            handlers::handle_status(&store, &tasks, StatusAction::Toggle)
        }
        Command::ListLabels => {
            let store = open_store(db_path)?;
            handlers::handle_list_labels(&store)
        }
        Command::Backup { description } => handlers::handle_backup(config, db_path, description.as_deref()),
        Command::Backups => handlers::handle_backups(config, db_path),
        Command::Restore { id } => handlers::handle_restore(config, db_path, id),
        Command::RestoreLatest => handlers::handle_restore_latest(config, db_path),
    }
}

fn open_store(db_path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(db_path).with_context(|| format!("failed to open database {}", db_path.display()))
}
