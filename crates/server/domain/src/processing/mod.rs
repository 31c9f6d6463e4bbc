//! Processing
//!
//! Turns captured change records into processed-log entries and routes
//! recoverable failures to the error sink.

pub mod model;
pub mod ports;
pub mod processor;

pub use model::{ErrorLogEntry, ProcessedLogEntry};
pub use ports::{ErrorSink, ProcessedLog, ProcessedLogError};
pub use processor::{MessageProcessor, ProcessOutcome, ProcessingError};
