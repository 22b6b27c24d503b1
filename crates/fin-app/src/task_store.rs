//! Storage abstraction consumed by the reconciliation engine.

use anyhow::Error;
use fin_core::id::TaskId;
use fin_core::{NewTask, Task, TaskFilter, TaskUpdate};
use fin_store_sqlite::{SqliteStore, StoreError};

/// Minimal storage abstraction required by the engine.
///
/// Each call is expected to be transactional on its own; the engine never
/// wraps several calls in one transaction.
pub trait TaskStore {
    /// Error type bubbled up from the backing store.
    type Error: Into<Error>;

    /// Load a task by id.
    ///
    /// # Errors
    /// Returns a store-specific error when the lookup fails.
    fn get(&self, id: TaskId) -> Result<Option<Task>, Self::Error>;

    /// List tasks matching the filter in a stable (id) order.
    ///
    /// # Errors
    /// Returns a store-specific error when listing fails.
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, Self::Error>;

    /// Persist a new task and return its identifier.
    ///
    /// # Errors
    /// Returns a store-specific error when the insert fails.
    fn create(&self, task: &NewTask) -> Result<TaskId, Self::Error>;

    /// Apply a field update. Returns `false` when the task no longer exists.
    ///
    /// # Errors
    /// Returns a store-specific error when the write fails.
    fn update(&self, id: TaskId, update: &TaskUpdate) -> Result<bool, Self::Error>;

    /// Delete a task. Returns `false` when the task no longer exists.
    ///
    /// # Errors
    /// Returns a store-specific error when the delete fails.
    fn delete(&self, id: TaskId) -> Result<bool, Self::Error>;

    /// Check whether a reference resolves to a stored task.
    ///
    /// The default implementation loads the task via [`get`](Self::get).
    ///
    /// # Errors
    /// Returns a store-specific error when the lookup fails.
    fn exists(&self, id: TaskId) -> Result<bool, Self::Error> {
        self.get(id).map(|task| task.is_some())
    }
}

impl TaskStore for SqliteStore {
    type Error = StoreError;

    fn get(&self, id: TaskId) -> Result<Option<Task>, Self::Error> {
        Self::get(self, id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, Self::Error> {
        Self::list(self, filter)
    }

    fn create(&self, task: &NewTask) -> Result<TaskId, Self::Error> {
        Self::create(self, task)
    }

    fn update(&self, id: TaskId, update: &TaskUpdate) -> Result<bool, Self::Error> {
        Self::update(self, id, update)
    }

    fn delete(&self, id: TaskId) -> Result<bool, Self::Error> {
        Self::delete(self, id)
    }
}

impl<S> TaskStore for &S
where
    S: TaskStore + ?Sized,
{
    type Error = S::Error;

    fn get(&self, id: TaskId) -> Result<Option<Task>, Self::Error> {
        (*self).get(id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, Self::Error> {
        (*self).list(filter)
    }

    fn create(&self, task: &NewTask) -> Result<TaskId, Self::Error> {
        (*self).create(task)
    }

    fn update(&self, id: TaskId, update: &TaskUpdate) -> Result<bool, Self::Error> {
        (*self).update(id, update)
    }

    fn delete(&self, id: TaskId) -> Result<bool, Self::Error> {
        (*self).delete(id)
    }

    fn exists(&self, id: TaskId) -> Result<bool, Self::Error> {
        (*self).exists(id)
    }
}

impl<S> TaskStore for std::sync::Arc<S>
where
    S: TaskStore,
{
    type Error = S::Error;

    fn get(&self, id: TaskId) -> Result<Option<Task>, Self::Error> {
        (**self).get(id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, Self::Error> {
        (**self).list(filter)
    }

    fn create(&self, task: &NewTask) -> Result<TaskId, Self::Error> {
        (**self).create(task)
    }

    fn update(&self, id: TaskId, update: &TaskUpdate) -> Result<bool, Self::Error> {
        (**self).update(id, update)
    }

    fn delete(&self, id: TaskId) -> Result<bool, Self::Error> {
        (**self).delete(id)
    }

    fn exists(&self, id: TaskId) -> Result<bool, Self::Error> {
        (**self).exists(id)
    }
}
