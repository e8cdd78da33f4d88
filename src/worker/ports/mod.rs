//! Port definitions for the worker.

pub mod processor;
pub mod work_source;

pub use processor::{Processor, ProcessorError};
pub use work_source::{WorkSource, WorkSourceError, WorkSourceResult};

#[cfg(test)]
pub use work_source::MockWorkSource;
