//! Ledger-side task records.

use super::{TaskHash, TaskName};
use serde::{Deserialize, Serialize};

/// Ledger record of a synced task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    name: TaskName,
    hash: TaskHash,
    active: bool,
}

impl TaskRecord {
    /// Creates an active task record.
    #[must_use]
    pub const fn new(name: TaskName, hash: TaskHash) -> Self {
        Self {
            name,
            hash,
            active: true,
        }
    }

    /// Reconstructs a task record from persisted storage.
    #[must_use]
    pub const fn from_persisted(name: TaskName, hash: TaskHash, active: bool) -> Self {
        Self { name, hash, active }
    }

    /// Returns the task name.
    #[must_use]
    pub const fn name(&self) -> &TaskName {
        &self.name
    }

    /// Returns the hash of the most recently synced definition.
    #[must_use]
    pub const fn hash(&self) -> &TaskHash {
        &self.hash
    }

    /// Returns whether the task is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Sets whether the task is active.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}
