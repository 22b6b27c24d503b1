//! CLI entry point for fin.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use fin_app::{BackupHandle, FinConfig, SessionFilter};
use fin_core::timestamp;
use time::Date;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;

/// Personal tasks you edit as plain text.
#[derive(Parser, Debug)]
#[command(
    name = "fin",
    version,
    about = "fin: personal tasks stored in SQLite and edited as plain text"
)]
struct Cli {
    /// Database file (defaults to $FIN_DB_PATH, the config file, then ~/fin/tasks.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

/// Task selection shared by listing, exporting and editing.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct SelectArgs {
    /// Only tasks with a label containing this text (includes closed tasks).
    #[arg(short = 'l', long)]
    label: Option<String>,
    /// Only tasks created (or closed) on this day, YYYY-MM-DD.
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<Date>,
    /// Every task, open or closed.
    #[arg(long)]
    all: bool,
}

impl From<SelectArgs> for SessionFilter {
    fn from(args: SelectArgs) -> Self {
        Self {
            label: args.label,
            date: args.date,
            all: args.all,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a task.
    Add {
        /// Task text.
        content: String,
        #[arg(short = 'l', long = "label")]
        labels: Vec<String>,
        /// Due date, YYYY-MM-DD.
        #[arg(long, value_parser = parse_date_arg)]
        due: Option<Date>,
    },

    /// List tasks.
    Ls {
        #[command(flatten)]
        select: SelectArgs,
        #[arg(long, value_enum, default_value_t = LsFormat::Table)]
        format: LsFormat,
    },

    /// Edit tasks in your editor and apply the changes.
    Edit {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// Print the editable document for the selected tasks.
    Export {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// Apply the differences between two document files.
    Apply {
        /// Document as exported.
        original: PathBuf,
        /// Document after editing.
        edited: PathBuf,
        /// Show what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Mark tasks completed, by id or by text found in an open task.
    #[command(visible_alias = "done")]
    Complete {
        /// Task ids or text to search for.
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Reopen tasks, by id or by text found in a closed task.
    Reopen {
        /// Task ids or text to search for.
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Flip tasks between open and completed, by id or by text.
    Toggle {
        /// Task ids or text to search for.
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// List every label in use.
    ListLabels,

    /// Take a database snapshot now.
    Backup {
        /// Note stored with the snapshot.
        #[arg(short = 'd', long)]
        description: Option<String>,
    },

    /// List database snapshots.
    #[command(visible_alias = "list-backups")]
    Backups,

    /// Roll the database back to a snapshot.
    Restore {
        /// Snapshot id as shown by `fin backups`.
        id: BackupHandle,
    },

    /// Roll the database back to the newest snapshot.
    RestoreLatest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LsFormat {
    #[default]
    Table,
    Json,
}

fn parse_date_arg(raw: &str) -> Result<Date, String> {
    timestamp::parse_date(raw.trim()).map_err(|err| format!("expected YYYY-MM-DD ({err})"))
}

fn main() -> Result<()> {
    let Cli { db, cmd } = Cli::parse();
    install_tracing();

    let config = FinConfig::load()?;
    let db_path = match db {
        Some(path) => path,
        None => config.database_path()?,
    };
    commands::run(cmd, &config, &db_path)
}

fn install_tracing() {
    // RUST_LOG is honoured; the default level is INFO.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parse_add_command() {
        let cli = Cli::parse_from([
            "fin", "add", "Buy milk", "--label", "home", "-l", "errand", "--due", "2025-06-20",
        ]);

        match cli.cmd {
            Command::Add { content, labels, due } => {
                assert_eq!(content, "Buy milk");
                assert_eq!(labels, vec!["home", "errand"]);
                assert_eq!(due, Some(date!(2025-06-20)));
            }
            _ => panic!("expected add command"),
        }
    }

    #[test]
    fn parse_edit_with_filters_and_global_db() {
        let cli = Cli::parse_from([
            "fin", "edit", "--label", "work", "--date", "2025-06-17", "--db", "/tmp/t.db",
        ]);

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/t.db")));
        match cli.cmd {
            Command::Edit { select } => {
                let filter = SessionFilter::from(select);
                assert_eq!(filter.label.as_deref(), Some("work"));
                assert_eq!(filter.date, Some(date!(2025-06-17)));
                assert!(!filter.all);
            }
            _ => panic!("expected edit command"),
        }
    }

    #[test]
    fn parse_ls_json_all() {
        let cli = Cli::parse_from(["fin", "ls", "--all", "--format", "json"]);
        match cli.cmd {
            Command::Ls { select, format } => {
                assert!(select.all);
                assert_eq!(format, LsFormat::Json);
            }
            _ => panic!("expected ls command"),
        }
    }

    #[test]
    fn parse_apply_dry_run() {
        let cli = Cli::parse_from(["fin", "apply", "a.txt", "b.txt", "--dry-run"]);
        match cli.cmd {
            Command::Apply {
                original,
                edited,
                dry_run,
            } => {
                assert_eq!(original, PathBuf::from("a.txt"));
                assert_eq!(edited, PathBuf::from("b.txt"));
                assert!(dry_run);
            }
            _ => panic!("expected apply command"),
        }
    }

    #[test]
    fn parse_restore_id() {
        let cli = Cli::parse_from(["fin", "restore", "3"]);
        match cli.cmd {
            Command::Restore { id } => assert_eq!(id, BackupHandle(3)),
            _ => panic!("expected restore command"),
        }
    }

    #[test]
    fn parse_status_commands() {
        let cli = Cli::parse_from(["fin", "done", "3", "flight"]);
        match cli.cmd {
            Command::Complete { tasks } => assert_eq!(tasks, vec!["3", "flight"]),
            _ => panic!("expected complete command"),
        }

        let cli = Cli::parse_from(["fin", "reopen", "4"]);
        assert!(matches!(cli.cmd, Command::Reopen { tasks } if tasks == ["4"]));

        let cli = Cli::parse_from(["fin", "toggle", "milk"]);
        assert!(matches!(cli.cmd, Command::Toggle { tasks } if tasks == ["milk"]));

        assert!(Cli::try_parse_from(["fin", "complete"]).is_err());
    }

    #[test]
    fn parse_backup_commands() {
        let cli = Cli::parse_from(["fin", "backup", "-d", "before cleanup"]);
        match cli.cmd {
            Command::Backup { description } => assert_eq!(description.as_deref(), Some("before cleanup")),
            _ => panic!("expected backup command"),
        }

        let cli = Cli::parse_from(["fin", "backup"]);
        assert!(matches!(cli.cmd, Command::Backup { description: None }));
        assert!(matches!(Cli::parse_from(["fin", "list-backups"]).cmd, Command::Backups));
        assert!(matches!(Cli::parse_from(["fin", "restore-latest"]).cmd, Command::RestoreLatest));
        assert!(matches!(Cli::parse_from(["fin", "list-labels"]).cmd, Command::ListLabels));
    }

    #[test]
    fn invalid_dates_are_rejected() {
        assert!(Cli::try_parse_from(["fin", "add", "x", "--due", "tomorrow"]).is_err());
        assert!(parse_date_arg(" 2025-01-31 ").is_ok());
    }
}
