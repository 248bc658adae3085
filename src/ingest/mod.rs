pub mod common;
pub mod processor;

// Re-export commonly used items
pub use common::{CycleReport, MessageOutcome};
pub use processor::Ingestor;
