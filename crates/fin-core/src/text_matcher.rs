use crate::Task;

/// Case-insensitive substring matcher for task labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    needle: String,
}

impl LabelMatcher {
    /// Normalize a query string into a matcher. Returns `None` for blank inputs.
    #[must_use]
    pub fn new(query: &str) -> Option<Self> {
        let trimmed = query.trim().trim_start_matches('#');
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            needle: trimmed.to_lowercase(),
        })
    }

    /// Determine whether any label on the task contains the query.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        task.labels.iter().any(|label| label.to_lowercase().contains(&self.needle))
    }

    /// The normalized query.
    #[must_use]
    pub fn needle(&self) -> &str {
        &self.needle
    }
}
