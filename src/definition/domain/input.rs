//! Declared task inputs and run-data validation.

use super::DefinitionError;
use crate::run::domain::{RunData, TaskName};
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Input a task declares for its runs.
#[derive(Debug, Clone)]
pub struct TaskInput {
    name: String,
    description: Option<String>,
    default: Option<String>,
    options: Vec<String>,
    validation: Option<Regex>,
}

impl TaskInput {
    /// Creates a required input with no default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            default: None,
            options: Vec::new(),
            validation: None,
        }
    }

    /// Sets a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets a default value, making the input optional.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Restricts accepted values to `options`.
    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = String>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    /// Requires values to match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidInputPattern`] when the pattern does
    /// not compile.
    pub fn with_validation(mut self, pattern: &str) -> Result<Self, DefinitionError> {
        let regex = Regex::new(pattern).map_err(|err| DefinitionError::InvalidInputPattern {
            input: self.name.clone(),
            pattern: pattern.to_owned(),
            reason: err.to_string(),
        })?;
        self.validation = Some(regex);
        Ok(self)
    }

    /// Returns the input name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the default value.
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Returns `true` when a run must supply a value.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }

    fn check(&self, run_data: &RunData) -> Option<InputProblem> {
        let supplied = run_data.get(&self.name).filter(|value| !value.is_empty());
        let Some(value) = supplied else {
            return self.is_required().then(|| InputProblem::Missing {
                input: self.name.clone(),
            });
        };

        if let Some(regex) = &self.validation {
            if !regex.is_match(value) {
                return Some(InputProblem::PatternMismatch {
                    input: self.name.clone(),
                    pattern: regex.as_str().to_owned(),
                });
            }
        }

        if !self.options.is_empty() && !self.options.contains(value) {
            return Some(InputProblem::NotAnOption {
                input: self.name.clone(),
                options: self.options.clone(),
            });
        }
        None
    }
}

/// One reason a run's data does not satisfy a declared input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputProblem {
    /// A required input has no value.
    Missing {
        /// Input name.
        input: String,
    },
    /// The value does not match the input's validation pattern.
    PatternMismatch {
        /// Input name.
        input: String,
        /// Expected pattern.
        pattern: String,
    },
    /// The value is not one of the input's options.
    NotAnOption {
        /// Input name.
        input: String,
        /// Accepted values.
        options: Vec<String>,
    },
}

impl InputProblem {
    /// Returns the name of the offending input.
    #[must_use]
    pub fn input(&self) -> &str {
        match self {
            Self::Missing { input }
            | Self::PatternMismatch { input, .. }
            | Self::NotAnOption { input, .. } => input,
        }
    }
}

impl fmt::Display for InputProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { input } => write!(f, "input '{input}' is required"),
            Self::PatternMismatch { input, pattern } => {
                write!(f, "input '{input}' must match '{pattern}'")
            }
            Self::NotAnOption { input, options } => {
                write!(f, "input '{input}' must be one of: {}", options.join(", "))
            }
        }
    }
}

/// Every problem found while validating run data against a task's inputs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid inputs for task {task}: {}", render_problems(.problems))]
pub struct InputValidationError {
    /// Task whose inputs were checked.
    pub task: TaskName,
    /// Problems, in declaration order.
    pub problems: Vec<InputProblem>,
}

fn render_problems(problems: &[InputProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates `run_data` against `inputs`, collecting every problem.
pub(super) fn validate_inputs(
    task: &TaskName,
    inputs: &[TaskInput],
    run_data: &RunData,
) -> Result<(), InputValidationError> {
    let problems: Vec<InputProblem> = inputs
        .iter()
        .filter_map(|input| input.check(run_data))
        .collect();
    if problems.is_empty() {
        return Ok(());
    }
    Err(InputValidationError {
        task: task.clone(),
        problems,
    })
}
