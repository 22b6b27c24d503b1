use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use fin_app::document::REF_PREFIX;
use fin_app::{
    Backup, BackupHandle, CommandEditor, FileBackup, FinConfig, Reconciler, SessionController,
    SessionFilter, SessionOutcome, TaskEditData, TaskPatch, render,
};
use fin_core::id::TaskId;
use fin_core::{NewTask, Task, TaskFilter, TaskStatus, normalize_content, timestamp};
use fin_store_sqlite::SqliteStore;
use time::Date;
use tracing::info;

use crate::LsFormat;

use super::output;

pub fn handle_add(store: &SqliteStore, content: &str, labels: &[String], due: Option<Date>) -> Result<()> {
    let content = normalize_content(content);
    if content.is_empty() {
        bail!("task content must not be empty");
    }
    if content.contains(REF_PREFIX) {
        bail!("task content must not contain '{REF_PREFIX}'");
    }

    let task = NewTask::new(content.as_str()).with_labels(labels).with_due_date(due);
    let id = store.create(&task)?;
    info!(task = %id, "created task");
    println!("Added task {id}: {content}");
    Ok(())
}

pub fn handle_ls(
    store: &SqliteStore,
    config: &FinConfig,
    filter: &SessionFilter,
    format: LsFormat,
) -> Result<()> {
    let tasks = select_tasks(store, config, filter)?;
    match format {
        LsFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
        LsFormat::Table if tasks.is_empty() => println!("No tasks found"),
        LsFormat::Table => print!("{}", output::task_table(&tasks)),
    }
    Ok(())
}

pub fn handle_export(store: &SqliteStore, config: &FinConfig, filter: &SessionFilter) -> Result<()> {
    let tasks = select_tasks(store, config, filter)?;
    print!("{}", render(&tasks));
    Ok(())
}

pub fn handle_edit(
    store: &SqliteStore,
    config: &FinConfig,
    db_path: &Path,
    filter: &SessionFilter,
) -> Result<()> {
    let backup = FileBackup::new(db_path, config.backup.max_backups);
    let editor = CommandEditor::from_env(config.editor.command.as_deref());
    let mut controller =
        SessionController::new(store, backup, editor).with_default_days(config.session.default_days);

    match controller.run_session(filter)? {
        SessionOutcome::NoTasks => println!("No tasks to edit"),
        SessionOutcome::EditorAborted { code, backup } => {
            let code = code.map_or_else(|| "a signal".to_owned(), |code| format!("code {code}"));
            println!("Editor exited with {code}; no changes applied (backup {backup})");
        }
        SessionOutcome::Reconciled { changes, backup } => {
            print!("{}", output::change_summary(&changes));
            if !changes.is_empty() {
                println!("Backup {backup} saved; undo with `fin restore {backup}`");
            }
        }
    }
    Ok(())
}

pub fn handle_apply(store: &SqliteStore, original: &Path, edited: &Path, dry_run: bool) -> Result<()> {
    let original_text = fs::read_to_string(original)
        .with_context(|| format!("failed to read {}", original.display()))?;
    let edited_text =
        fs::read_to_string(edited).with_context(|| format!("failed to read {}", edited.display()))?;

    let reconciler = Reconciler::new(store);
    if dry_run {
        let plan = reconciler.plan_document(&original_text, &edited_text)?;
        print!("{}", output::plan_summary(&plan));
    } else {
        let changes = reconciler.reconcile_document(&original_text, &edited_text)?;
        print!("{}", output::change_summary(&changes));
    }
    Ok(())
}

/// Checkbox change requested from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Complete,
    Reopen,
    Toggle,
}

impl StatusAction {
    /// Whether a text search may pick this task.
    fn accepts(self, task: &Task) -> bool {
        match self {
            Self::Complete => !task.status().is_closed(),
            Self::Reopen => task.status().is_closed(),
            Self::Toggle => true,
        }
    }

    /// Status to move to, or `None` when the task is already there.
    fn target(self, task: &Task) -> Option<TaskStatus> {
        let closed = task.status().is_closed();
        match self {
            Self::Complete => (!closed).then_some(TaskStatus::Completed),
            Self::Reopen => closed.then_some(TaskStatus::Open),
            Self::Toggle if closed => Some(TaskStatus::Open),
            Self::Toggle => Some(TaskStatus::Completed),
        }
    }
}

pub fn handle_status(store: &SqliteStore, identifiers: &[String], action: StatusAction) -> Result<()> {
    for message in change_status(store, identifiers, action)? {
        println!("{message}");
    }
    Ok(())
}

fn change_status(store: &SqliteStore, identifiers: &[String], action: StatusAction) -> Result<Vec<String>> {
    let mut messages = Vec::new();
    for identifier in identifiers {
        // Reload so a text search never picks a task changed earlier in this run.
        let tasks = store.list(&TaskFilter::all())?;
        let Some(task) = find_task(&tasks, identifier, action) else {
            messages.push(format!("No matching task for '{identifier}'"));
            continue;
        };
        let Some(status) = action.target(task) else {
            messages.push(format!("Task {} is already {}", task.id, task.status()));
            continue;
        };

        set_status(store, task, status)?;
        info!(task = %task.id, status = status.as_str(), "changed task status");
        let verb = if status == TaskStatus::Open { "Reopened" } else { "Completed" };
        messages.push(format!("{verb} task {}: {}", task.id, task.content));
    }
    Ok(messages)
}

/// An identifier that parses as a number is a task id; anything else is
/// matched case-insensitively against the content of eligible tasks.
fn find_task<'a>(tasks: &'a [Task], identifier: &str, action: StatusAction) -> Option<&'a Task> {
    if let Ok(id) = identifier.parse::<TaskId>() {
        return tasks.iter().find(|task| task.id == id);
    }
    let needle = identifier.trim().to_lowercase();
    tasks
        .iter()
        .find(|task| action.accepts(task) && task.content.to_lowercase().contains(&needle))
}

fn set_status(store: &SqliteStore, task: &Task, status: TaskStatus) -> Result<()> {
    let data = TaskEditData {
        status,
        content: normalize_content(&task.content),
        labels: task.visible_labels().map(str::to_owned).collect(),
        due_date: task.due_date,
    };
    let update = TaskPatch::from_task(task, data, timestamp::now()).into_task_update(task);
    store.update(task.id, &update)?;
    Ok(())
}

pub fn handle_list_labels(store: &SqliteStore) -> Result<()> {
    let tasks = store.list(&TaskFilter::all())?;
    let labels = collect_labels(&tasks);
    if labels.is_empty() {
        println!("No labels found");
    }
    for label in labels {
        println!("{label}");
    }
    Ok(())
}

fn collect_labels(tasks: &[Task]) -> BTreeSet<&str> {
    tasks.iter().flat_map(Task::visible_labels).collect()
}

pub fn handle_backup(config: &FinConfig, db_path: &Path, description: Option<&str>) -> Result<()> {
    let backup = FileBackup::new(db_path, config.backup.max_backups);
    let handle = backup.snapshot(description.unwrap_or("Manual backup"))?;
    println!("Backup {handle} created");
    Ok(())
}

pub fn handle_backups(config: &FinConfig, db_path: &Path) -> Result<()> {
    let backups = FileBackup::new(db_path, config.backup.max_backups).list()?;
    if backups.is_empty() {
        println!("No backups found");
    } else {
        print!("{}", output::backup_table(&backups));
    }
    Ok(())
}

pub fn handle_restore(config: &FinConfig, db_path: &Path, id: BackupHandle) -> Result<()> {
    let backup = FileBackup::new(db_path, config.backup.max_backups);
    if !backup.restore(id)? {
        bail!("backup {id} not found");
    }
    println!("Restored backup {id} to {}", db_path.display());
    Ok(())
}

pub fn handle_restore_latest(config: &FinConfig, db_path: &Path) -> Result<()> {
    let backups = FileBackup::new(db_path, config.backup.max_backups).list()?;
    let Some(latest) = backups.first() else {
        bail!("no backups found");
    };
    handle_restore(config, db_path, latest.backup_id)
}

fn select_tasks(store: &SqliteStore, config: &FinConfig, filter: &SessionFilter) -> Result<Vec<Task>> {
    let query = filter.to_task_filter(config.session.default_days, timestamp::now().date());
    Ok(store.list(&query)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_core::{DISMISSED_LABEL, TaskUpdate};
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let store = SqliteStore::open(dir.path().join("tasks.db"))
            .unwrap_or_else(|err| panic!("open store: {err}"));
        (dir, store)
    }

    #[test]
    fn add_normalizes_labels() -> Result<()> {
        let (_dir, store) = temp_store();
        handle_add(&store, "  Buy milk ", &["Home".into(), "home".into()], None)?;

        let tasks = store.list(&TaskFilter::all())?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].content, "Buy milk");
        assert_eq!(tasks[0].labels.iter().collect::<Vec<_>>(), vec!["home"]);
        Ok(())
    }

    #[test]
    fn add_rejects_reference_markers() {
        let (_dir, store) = temp_store();
        let err = handle_add(&store, "see #ref:task_4", &[], None)
            .err()
            .unwrap_or_else(|| panic!("expected rejection"));
        assert!(err.to_string().contains(REF_PREFIX));
        assert!(handle_add(&store, "   ", &[], None).is_err());
    }

    #[test]
    fn apply_writes_unless_dry_run() -> Result<()> {
        let (dir, store) = temp_store();
        let id = store.create(&NewTask::new("Call mom"))?;
        let original_text = render(&store.list(&TaskFilter::all())?);
        let edited_text = original_text.replacen("\n[ ] ", "\n[x] ", 1);

        let original = dir.path().join("original.txt");
        let edited = dir.path().join("edited.txt");
        fs::write(&original, &original_text)?;
        fs::write(&edited, &edited_text)?;

        handle_apply(&store, &original, &edited, true)?;
        let task = store.get(id)?.unwrap_or_else(|| panic!("task missing"));
        assert!(task.completed_at.is_none());

        handle_apply(&store, &original, &edited, false)?;
        let task = store.get(id)?.unwrap_or_else(|| panic!("task missing"));
        assert!(task.completed_at.is_some());
        Ok(())
    }

    #[test]
    fn apply_reports_missing_files() {
        let (dir, store) = temp_store();
        let missing = dir.path().join("missing.txt");
        let err = handle_apply(&store, &missing, &missing, false)
            .err()
            .unwrap_or_else(|| panic!("expected error"));
        assert!(err.to_string().contains("missing.txt"));
    }

    #[test]
    fn restore_unknown_backup_fails() {
        let (dir, _store) = temp_store();
        let err = handle_restore(&FinConfig::default(), &dir.path().join("tasks.db"), BackupHandle(9))
            .err()
            .unwrap_or_else(|| panic!("expected error"));
        assert_eq!(err.to_string(), "backup 9 not found");
    }

    #[test]
    fn restore_rolls_back_to_snapshot() -> Result<()> {
        let (dir, store) = temp_store();
        let db_path = dir.path().join("tasks.db");
        store.create(&NewTask::new("keep me"))?;
        let config = FinConfig::default();
        let handle = FileBackup::new(&db_path, config.backup.max_backups).snapshot("manual")?;
        store.create(&NewTask::new("added later"))?;
        drop(store);

        handle_restore(&config, &db_path, handle)?;

        let reopened = SqliteStore::open(&db_path)?;
        let contents: Vec<_> = reopened
            .list(&TaskFilter::all())?
            .into_iter()
            .map(|task| task.content)
            .collect();
        assert_eq!(contents, vec!["keep me"]);
        Ok(())
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|item| (*item).to_owned()).collect()
    }

    fn load(store: &SqliteStore, id: TaskId) -> Task {
        store
            .get(id)
            .unwrap_or_else(|err| panic!("get: {err}"))
            .unwrap_or_else(|| panic!("task {id} missing"))
    }

    #[test]
    fn added_tasks_round_trip_through_export_and_apply() -> Result<()> {
        let (dir, store) = temp_store();
        handle_add(&store, "Call  #5\nback", &["c#".into()], None)?;
        handle_add(&store, "Pay  due:2025-01-01", &[], None)?;
        let before = store.list(&TaskFilter::all())?;

        let document = dir.path().join("doc.txt");
        fs::write(&document, render(&before))?;
        handle_apply(&store, &document, &document, false)?;

        assert_eq!(store.list(&TaskFilter::all())?, before);
        assert_eq!(before[0].content, "Call #5 back");
        assert_eq!(before[0].labels.iter().collect::<Vec<_>>(), vec!["c"]);
        Ok(())
    }

    #[test]
    fn complete_by_id_and_by_text() -> Result<()> {
        let (_dir, store) = temp_store();
        let milk = store.create(&NewTask::new("Buy milk"))?;
        let flight = store.create(&NewTask::new("Book Flight to Oslo"))?;

        let milk_id = milk.to_string();
        let messages = change_status(&store, &ids(&[milk_id.as_str(), "flight", "nothing"]), StatusAction::Complete)?;

        assert!(load(&store, milk).completed_at.is_some());
        assert!(load(&store, flight).completed_at.is_some());
        assert_eq!(messages[2], "No matching task for 'nothing'");

        let again = change_status(&store, &ids(&[milk_id.as_str()]), StatusAction::Complete)?;
        assert_eq!(again, vec![format!("Task {milk} is already completed")]);
        Ok(())
    }

    #[test]
    fn text_search_skips_ineligible_tasks() -> Result<()> {
        let (_dir, store) = temp_store();
        let first = store.create(&NewTask::new("water plants"))?;
        let second = store.create(&NewTask::new("water garden"))?;
        change_status(&store, &ids(&["water", "water"]), StatusAction::Complete)?;
        assert!(load(&store, first).completed_at.is_some());
        assert!(load(&store, second).completed_at.is_some());

        change_status(&store, &ids(&["garden"]), StatusAction::Reopen)?;
        assert!(load(&store, second).completed_at.is_none());
        assert!(load(&store, first).completed_at.is_some());
        Ok(())
    }

    #[test]
    fn toggle_reopens_dismissed_tasks() -> Result<()> {
        let (_dir, store) = temp_store();
        let id = store.create(&NewTask::new("Old idea").with_labels(["someday"]))?;
        store.update(
            id,
            &TaskUpdate {
                completed_at: Some(Some(timestamp::now())),
                labels: Some(BTreeSet::from([DISMISSED_LABEL.to_owned(), "someday".to_owned()])),
                ..TaskUpdate::default()
            },
        )?;

        let target = ids(&[id.to_string().as_str()]);
        change_status(&store, &target, StatusAction::Toggle)?;
        let task = load(&store, id);
        assert_eq!(task.status(), TaskStatus::Open);
        assert_eq!(task.labels.iter().collect::<Vec<_>>(), vec!["someday"]);

        change_status(&store, &target, StatusAction::Toggle)?;
        assert_eq!(load(&store, id).status(), TaskStatus::Completed);
        Ok(())
    }

    #[test]
    fn labels_are_listed_once_without_the_reserved_label() -> Result<()> {
        let (_dir, store) = temp_store();
        store.create(&NewTask::new("a").with_labels(["work", "home"]))?;
        store.create(&NewTask::new("b").with_labels(["work", DISMISSED_LABEL]))?;
        let tasks = store.list(&TaskFilter::all())?;
        assert_eq!(collect_labels(&tasks).into_iter().collect::<Vec<_>>(), vec!["home", "work"]);
        Ok(())
    }

    #[test]
    fn manual_backup_then_restore_latest() -> Result<()> {
        let (dir, store) = temp_store();
        let db_path = dir.path().join("tasks.db");
        let config = FinConfig::default();
        assert!(handle_restore_latest(&config, &db_path).is_err());

        store.create(&NewTask::new("keep me"))?;
        handle_backup(&config, &db_path, Some("before cleanup"))?;
        store.create(&NewTask::new("added later"))?;
        drop(store);

        let backups = FileBackup::new(&db_path, config.backup.max_backups).list()?;
        assert_eq!(backups[0].description, "before cleanup");

        handle_restore_latest(&config, &db_path)?;
        let reopened = SqliteStore::open(&db_path)?;
        assert_eq!(reopened.count()?, 1);
        Ok(())
    }
}
