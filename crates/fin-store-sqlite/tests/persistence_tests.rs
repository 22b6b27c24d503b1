#![allow(missing_docs)]

use anyhow::{Result, anyhow};
use fin_core::id::TaskId;
use fin_core::{NewTask, TaskFilter, TaskUpdate};
use fin_store_sqlite::SqliteStore;
use tempfile::TempDir;

#[test]
fn tasks_survive_reopening_the_database() -> Result<()> {
    let dir = TempDir::with_prefix("fin-store-test-")?;
    let db_path = dir.path().join("nested").join("tasks.db");

    let id = {
        let store = SqliteStore::open(&db_path)?;
        assert_eq!(store.path(), Some(db_path.as_path()));
        store.create(&NewTask::new("Persist me").with_labels(["keep"]))?
    };

    let store = SqliteStore::open(&db_path)?;
    let task = store.get(id)?.ok_or_else(|| anyhow!("task {id} missing after reopen"))?;
    assert_eq!(task.content, "Persist me");
    assert!(task.labels.contains("keep"));
    Ok(())
}

#[test]
fn writes_from_one_handle_are_visible_to_another() -> Result<()> {
    let dir = TempDir::with_prefix("fin-store-test-")?;
    let db_path = dir.path().join("tasks.db");

    let writer = SqliteStore::open(&db_path)?;
    let reader = SqliteStore::open(&db_path)?;

    let id = writer.create(&NewTask::new("Shared"))?;
    writer.update(
        id,
        &TaskUpdate {
            content: Some("Shared and edited".into()),
            ..TaskUpdate::default()
        },
    )?;

    let tasks = reader.list(&TaskFilter::all())?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].content, "Shared and edited");
    assert!(tasks[0].modified_at >= tasks[0].created_at);
    Ok(())
}

#[test]
fn missing_task_reads_as_none() -> Result<()> {
    let store = SqliteStore::open_in_memory()?;
    assert!(store.get(TaskId(12345))?.is_none());
    Ok(())
}
