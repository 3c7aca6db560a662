//! # Sequencer Runtime
//!
//! Process wiring around `sequencer-core`.
//!
//! ## Modules
//!
//! - `container/` - Runtime configuration and service construction
//! - `scheduler/` - Periodic housekeeping and override jobs with job locks
//! - `message.rs` - JSON message envelope, decoder and JSON-pointer capabilities
//! - `handlers.rs` - Release sink writing released messages as JSON lines
//! - `feeder.rs` - NDJSON record input
//! - `logging.rs` - Tracing subscriber setup
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `SEQ_CONFIG` file, `SEQ_*` env)
//! 2. Initialize logging
//! 3. Load and validate the sequence document
//! 4. Spawn the scheduled jobs
//! 5. Feed stdin until EOF or Ctrl+C
//! 6. Signal shutdown and wait for the jobs

pub mod container;
pub mod feeder;
pub mod handlers;
pub mod logging;
pub mod message;
pub mod scheduler;

pub use container::{RuntimeConfig, SequencerContainer};
pub use feeder::{feed, FeedSummary};
pub use handlers::ReleaseSink;
pub use message::{JsonDecoder, JsonMessage};
pub use scheduler::{Job, JobLock, JobScheduler, LocalJobLock};
