//! Worker adapters: the HTTP work source and the command processor.

pub mod command;
pub mod http;

pub use command::CommandProcessor;
pub use http::HttpWorkSource;
