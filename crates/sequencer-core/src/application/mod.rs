//! # Application Layer
//!
//! Services implementing the inbound ports on top of the outbound ports.

pub mod admin;
pub mod housekeeping;
pub mod inbox;
pub mod instances;
pub mod overrides;
pub mod release;

pub use admin::AdminService;
pub use housekeeping::Housekeeper;
pub use inbox::SequencingInbox;
pub use instances::get_or_create_instance;
pub use overrides::{OverrideReport, PendingActionProcessor};
pub use release::{CascadeReport, ReleaseEngine, ReleaseOutcome};
