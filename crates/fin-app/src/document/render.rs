use fin_core::{Task, normalize_content};
use fin_core::timestamp::{format_date, format_minute};

use super::{DUE_PREFIX, REF_PREFIX};

/// Comment block written at the top of every document.
pub const HEADER: &[&str] = &[
    "# fin tasks - edit and save to apply changes",
    "# Changes tracked:",
    "#   [ ] open   [x] completed   [d] dismissed",
    "#   edit the text, #labels or due:YYYY-MM-DD of any line",
    "#   add a line without #ref:task_N to create a task",
    "#   remove a line to delete its task",
    "# Lines starting with # are ignored.",
    "# Do not modify the #ref:task_N token; it links a line to its task.",
];

/// Render tasks into an editable document, in the order given.
#[must_use]
pub fn render(tasks: &[Task]) -> String {
    let mut out = String::new();
    for line in HEADER {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    for task in tasks {
        out.push_str(&render_line(task));
        out.push('\n');
    }
    out
}

/// Render a single task line.
///
/// Content is written in [`normalize_content`] form, so it occupies exactly
/// one line and never contains a field separator.
#[must_use]
pub fn render_line(task: &Task) -> String {
    let content = normalize_content(&task.content);
    let mut line = format!(
        "{} {}  {content}",
        task.status().checkbox(),
        format_minute(task.display_timestamp())
    );

    let tags: Vec<String> = task.visible_labels().map(|label| format!("#{label}")).collect();
    if !tags.is_empty() {
        line.push_str("  ");
        line.push_str(&tags.join(" "));
    }
    if let Some(due) = task.due_date {
        line.push_str("  ");
        line.push_str(DUE_PREFIX);
        line.push_str(&format_date(due));
    }
    line.push_str("  ");
    line.push_str(REF_PREFIX);
    line.push_str(&task.id.to_string());
    line
}
