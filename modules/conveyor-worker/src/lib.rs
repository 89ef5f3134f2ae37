//! Worker process internals: the handler registry, execution of functions
//! and commands, validation, and the withdraw-execute-archive-report loop.

pub mod error;
pub mod execute;
pub mod lifecycle;
pub mod notify;
pub mod registry;
pub mod shutdown;
pub mod validate;

pub use error::WorkerError;
pub use lifecycle::{Lifecycle, LifecycleConfig};
pub use registry::{CliHandler, Handler, Registered, Registry};
pub use shutdown::Shutdown;
