//! End-to-end sequencing scenarios.

pub mod fixtures;

mod concurrency;
mod failures;
mod idempotence;
mod operations;
mod ordering;
mod runtime;
