//! Domain module for the sequencer.
//!
//! Contains release conditions, definitions, persisted entities, errors,
//! and load-time invariants.

pub mod definitions;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod release;
pub mod value_objects;

pub use definitions::*;
pub use entities::*;
pub use errors::*;
pub use release::*;
pub use value_objects::*;
