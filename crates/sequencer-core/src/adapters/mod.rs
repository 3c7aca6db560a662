//! # Adapters Layer
//!
//! - `memory_store` - In-memory implementation of every storage port
//! - `clock` - System and manual clocks
//! - `failure` - Log-based failure reporter
//! - `handlers` - Name-keyed handler registry

pub mod clock;
pub mod failure;
pub mod handlers;
pub mod memory_store;

pub use clock::{ManualClock, SystemClock};
pub use failure::LoggingFailureReporter;
pub use handlers::HandlerTable;
pub use memory_store::{InMemorySequenceStore, RowCounts};
