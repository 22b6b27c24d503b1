//! Plain-text rendering of command results.

use fin_app::BackupMetadata;
use fin_app::reconcile::{ChangeSet, PlannedStep, ReconcilePlan};
use fin_core::id::TaskId;
use fin_core::{Task, timestamp};

/// Render tasks as a pipe-separated table.
pub fn task_table(tasks: &[Task]) -> String {
    let mut lines = vec![
        "ID | Status | Time | Content | Labels | Due".to_owned(),
        "-- | ------ | ---- | ------- | ------ | ---".to_owned(),
    ];
    for task in tasks {
        let labels: Vec<&str> = task.visible_labels().collect();
        let labels = if labels.is_empty() {
            "-".to_owned()
        } else {
            labels.join(", ")
        };
        let due = task.due_date.map_or_else(|| "-".to_owned(), timestamp::format_date);
        lines.push(format!(
            "{} | {} | {} | {} | {} | {}",
            task.id,
            task.status().as_str(),
            timestamp::format_minute(task.display_timestamp()),
            task.content,
            labels,
            due
        ));
    }
    finish(lines)
}

/// Summarize applied changes, one category per line.
pub fn change_summary(changes: &ChangeSet) -> String {
    if changes.is_empty() {
        return finish(vec!["No changes".to_owned()]);
    }

    let mut lines = vec![format!("Applied: {changes}")];
    for (label, ids) in [
        ("completed", &changes.completed),
        ("reopened", &changes.reopened),
        ("dismissed", &changes.dismissed),
        ("undismissed", &changes.undismissed),
        ("modified", &changes.content_modified),
        ("due date changed", &changes.due_date_changed),
        ("deleted", &changes.deleted),
    ] {
        if !ids.is_empty() {
            lines.push(format!("  {label}: {}", join_ids(ids)));
        }
    }
    for created in &changes.created {
        lines.push(format!(
            "  created {} ({}): {}",
            created.id,
            created.status.as_str(),
            created.content
        ));
    }
    finish(lines)
}

/// Describe a plan without applying it.
pub fn plan_summary(plan: &ReconcilePlan) -> String {
    let mut lines = Vec::new();
    for step in &plan.steps {
        match step {
            PlannedStep::Update(update) => {
                let mut parts = Vec::new();
                if let Some(transition) = update.patch.transition {
                    parts.push(format!("{transition:?}").to_lowercase());
                }
                if update.patch.content_modified() {
                    parts.push("modified".to_owned());
                }
                if update.patch.due_date_changed() {
                    parts.push("due date changed".to_owned());
                }
                lines.push(format!("  update {}: {}", update.id, parts.join(", ")));
            }
            PlannedStep::Create(create) => {
                lines.push(format!(
                    "  create ({}): {}",
                    create.status.as_str(),
                    create.task.content
                ));
            }
        }
    }
    for id in &plan.deletions {
        lines.push(format!("  delete {id}"));
    }
    if plan.dropped > 0 {
        lines.push(format!("  ignored {} unparseable line(s)", plan.dropped));
    }
    lines.insert(0, format!("Dry run: {}", plan.counts()));
    finish(lines)
}

/// Render snapshots newest first.
pub fn backup_table(backups: &[BackupMetadata]) -> String {
    let mut lines = vec![
        "ID | Taken | Size | Description".to_owned(),
        "-- | ----- | ---- | -----------".to_owned(),
    ];
    for meta in backups {
        lines.push(format!(
            "{} | {} | {} B | {}",
            meta.backup_id,
            timestamp::format_minute(meta.timestamp),
            meta.size_bytes,
            meta.description
        ));
    }
    finish(lines)
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_app::reconcile::CreatedTask;
    use fin_core::TaskStatus;
    use std::collections::BTreeSet;
    use time::macros::{date, datetime};

    fn task(id: i64, content: &str, labels: &[&str]) -> Task {
        Task {
            id: TaskId(id),
            content: content.to_owned(),
            created_at: datetime!(2025-06-17 09:30 UTC),
            modified_at: datetime!(2025-06-17 09:30 UTC),
            completed_at: None,
            due_date: None,
            labels: labels.iter().map(|label| (*label).to_owned()).collect(),
        }
    }

    #[test]
    fn table_hides_dismissed_label() {
        let mut dismissed = task(2, "Old idea", &["dismissed", "work"]);
        dismissed.completed_at = Some(datetime!(2025-06-18 10:00 UTC));
        let mut open = task(1, "Buy milk", &[]);
        open.due_date = Some(date!(2025-06-20));

        let table = task_table(&[open, dismissed]);
        let rows: Vec<&str> = table.lines().collect();

        assert_eq!(rows.len(), 4);
        assert!(rows[2].starts_with("1 | open | "));
        assert!(rows[2].ends_with("| Buy milk | - | 2025-06-20"));
        assert!(rows[3].starts_with("2 | dismissed | "));
        assert!(rows[3].ends_with("| Old idea | work | -"));
    }

    #[test]
    fn empty_change_summary() {
        assert_eq!(change_summary(&ChangeSet::default()), "No changes\n");
    }

    #[test]
    fn change_summary_lists_ids_per_category() {
        let changes = ChangeSet {
            completed: vec![TaskId(1), TaskId(4)],
            deleted: vec![TaskId(7)],
            created: vec![CreatedTask {
                id: TaskId(9),
                content: "New one".to_owned(),
                labels: BTreeSet::new(),
                due_date: None,
                status: TaskStatus::Open,
            }],
            ..ChangeSet::default()
        };

        let summary = change_summary(&changes);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Applied: 2 completed, 1 created, 1 deleted");
        assert!(lines.contains(&"  completed: 1, 4"));
        assert!(lines.contains(&"  deleted: 7"));
        assert!(lines.contains(&"  created 9 (open): New one"));
    }
}
