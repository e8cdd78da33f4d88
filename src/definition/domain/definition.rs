//! Task definitions and the catalog of loaded definitions.

use super::{
    DefinitionError, InputValidationError, TaskInput, TaskTrigger, input::validate_inputs,
};
use crate::run::domain::{RunData, TaskHash, TaskName};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;

/// A loaded task definition.
///
/// Only the parts scheduling cares about are modelled; actions and
/// repository filters stay in the task file for the processor to read.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    name: TaskName,
    hash: TaskHash,
    active: bool,
    auto_merge: bool,
    inputs: Vec<TaskInput>,
    trigger: TaskTrigger,
    source: Option<Utf8PathBuf>,
}

impl TaskDefinition {
    /// Creates an active definition with no inputs or triggers.
    #[must_use]
    pub fn new(name: TaskName, hash: TaskHash) -> Self {
        Self {
            name,
            hash,
            active: true,
            auto_merge: false,
            inputs: Vec::new(),
            trigger: TaskTrigger::default(),
            source: None,
        }
    }

    /// Sets whether the task is active.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Sets whether pull requests created by the task merge automatically.
    #[must_use]
    pub const fn with_auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }

    /// Adds a declared input.
    #[must_use]
    pub fn with_input(mut self, input: TaskInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Sets the trigger block.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TaskTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Records the file the definition was loaded from.
    #[must_use]
    pub fn with_source(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Returns the task name.
    #[must_use]
    pub const fn name(&self) -> &TaskName {
        &self.name
    }

    /// Returns the content hash.
    #[must_use]
    pub const fn hash(&self) -> &TaskHash {
        &self.hash
    }

    /// Returns whether the task is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns whether pull requests merge automatically.
    #[must_use]
    pub const fn auto_merge(&self) -> bool {
        self.auto_merge
    }

    /// Returns the declared inputs.
    #[must_use]
    pub fn inputs(&self) -> &[TaskInput] {
        &self.inputs
    }

    /// Returns the trigger block.
    #[must_use]
    pub const fn trigger(&self) -> &TaskTrigger {
        &self.trigger
    }

    /// Returns the source file path, if known.
    #[must_use]
    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    /// Validates run data against the declared inputs.
    ///
    /// # Errors
    ///
    /// Returns [`InputValidationError`] listing every missing or invalid
    /// input.
    pub fn validate_inputs(&self, run_data: &RunData) -> Result<(), InputValidationError> {
        validate_inputs(&self.name, &self.inputs, run_data)
    }
}

/// Loaded task definitions, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    definitions: BTreeMap<TaskName, TaskDefinition>,
}

impl TaskCatalog {
    /// Builds a catalog from definitions.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::DuplicateTask`] when two definitions share
    /// a name.
    pub fn new(definitions: impl IntoIterator<Item = TaskDefinition>) -> Result<Self, DefinitionError> {
        let mut catalog = Self::default();
        for definition in definitions {
            let name = definition.name().clone();
            if catalog.definitions.insert(name.clone(), definition).is_some() {
                return Err(DefinitionError::DuplicateTask(name));
            }
        }
        Ok(catalog)
    }

    /// Finds a definition by name.
    #[must_use]
    pub fn get(&self, name: &TaskName) -> Option<&TaskDefinition> {
        self.definitions.get(name)
    }

    /// Iterates definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.definitions.values()
    }

    /// Returns the number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` when the catalog holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
