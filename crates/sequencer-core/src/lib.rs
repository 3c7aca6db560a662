//! # Context Sequencer
//!
//! Ordered, exactly-once release of out-of-order broker messages grouped by
//! an application-supplied context id.
//!
//! ## Model
//!
//! A *sequence definition* declares message types and, per type, a release
//! condition over its predecessors (`predecessor`, `and`, `or`). Messages
//! sharing a context id belong to one *sequence instance*. A message whose
//! condition holds is handled immediately; otherwise its raw payload is
//! buffered until a later arrival completes the predecessors, at which point
//! a *cascade* releases everything that became eligible. When every type of
//! the definition has been processed the instance closes.
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | Idempotence | Unique (qualified type, idempotence id), claimed before any handler call; WAITING/IN_FLIGHT/PROCESSED redeliveries are dropped |
//! | Order | Release conditions evaluated against the PROCESSED set |
//! | Completeness | Cascade runs to a fixed point under the instance lock |
//! | Liveness | One lock per task; idle leases are reclaimable |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Definitions, release conditions, entities, errors, load-time invariants
//! - `catalog/` - Configuration document parsing and validation
//! - `ports/` - Inbound API and outbound SPI traits
//! - `application/` - Inbox, release engine, overrides, housekeeping, admin
//! - `adapters/` - In-memory store, clocks, handler registry, failure reporter
//! - `service.rs` - Wiring of all services around one store
//!
//! ## Usage
//!
//! ```ignore
//! use sequencer_core::{SequenceCatalog, SequencerParts, SequencerService, SequencerConfig};
//!
//! let catalog = Arc::new(SequenceCatalog::from_path(path, &capabilities)?);
//! let service = SequencerService::new(
//!     SequencerParts::in_memory(catalog, handlers, decoder),
//!     SequencerConfig::default(),
//! )?;
//!
//! let outcome = service.inbox().handle(&record, &message, &handler, &ack).await?;
//! ```

pub mod adapters;
pub mod application;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod duration_serde;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{
    HandlerTable, InMemorySequenceStore, LoggingFailureReporter, ManualClock, SystemClock,
};
pub use application::{
    AdminService, CascadeReport, Housekeeper, OverrideReport, PendingActionProcessor,
    ReleaseEngine, SequencingInbox,
};
pub use catalog::{CapabilityRegistry, SequenceCatalog, SequencingDocument};
pub use config::SequencerConfig;
pub use domain::*;
pub use duration_serde::parse_duration;
pub use ports::*;
pub use service::{SequencerParts, SequencerService};
