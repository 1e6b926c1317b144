//! Picpack Worker Library
//!
//! The worker binary's moving parts: the SQS job source, the per-job
//! processing pipeline, the poll loop, the idle-shutdown supervisor and the
//! health endpoint. `main.rs` wires these together from configuration.

pub mod health;
pub mod processor;
pub mod queue;
pub mod runner;
pub mod supervisor;
pub mod telemetry;

pub use processor::{JobProcessor, ProcessorConfig};
pub use queue::{JobSource, ReceivedMessage, SqsJobSource};
pub use runner::Runner;
pub use supervisor::IdleShutdown;
