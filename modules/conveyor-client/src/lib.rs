//! HTTP clients for the conveyor backends: Buckets (the work queue),
//! Results (long-term retention), and Pipelines (descriptors).

pub mod buckets;
pub mod client;
pub mod context;
pub mod error;
pub mod pipelines;
pub mod results;
pub mod retry;

pub use buckets::{AuditCounts, Buckets, WithdrawFilter};
pub use client::{token_from_env, ClientConfig};
pub use context::HttpContext;
pub use error::{ClientError, Result};
pub use pipelines::Pipelines;
pub use results::Results;
pub use retry::retry;
