// Library exports for the fastq-mail-ingest crate
// This allows tests and the binary to use the modules

pub mod config;
pub mod error;
pub mod ingest;
pub mod mailbox;
pub mod message;
pub mod notifier;
pub mod routing;
pub mod scheduler;
pub mod server;
