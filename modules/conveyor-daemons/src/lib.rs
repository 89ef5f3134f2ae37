//! Reconciliation daemons for the work queue: audit (retry, expire, and
//! fail stale work) and transfer (promote terminal work into Results).

pub mod audit;
pub mod transfer;

pub use transfer::{TransferOutcome, DEFAULT_CUTOFF};
