//! Domain model for task definitions.

mod definition;
mod error;
mod input;
mod trigger;

pub use definition::{TaskCatalog, TaskDefinition};
pub use error::DefinitionError;
pub use input::{InputProblem, InputValidationError, TaskInput};
pub use trigger::{CronSchedule, TaskTrigger, WebhookProvider, WebhookTrigger, WebhookTriggerEntry};
