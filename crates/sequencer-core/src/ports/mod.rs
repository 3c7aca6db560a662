//! # Ports Layer
//!
//! - `inbound.rs` - Driving ports (API exposed to the broker consumer and operators)
//! - `outbound.rs` - Driven ports (storage, handlers, decoding, time)

pub mod inbound;
pub mod outbound;

pub use inbound::{HandleOutcome, SequencingAdminApi, SequencingApi};
pub use outbound::{
    Acknowledgment, Clock, FailureReporter, HandlerRegistry, InstanceLease, InstanceStore,
    MessageDecoder, MessageHandler, MessageStore, NoopAcknowledgment, PurgeReport,
    RetentionStore, SequenceStore,
};
