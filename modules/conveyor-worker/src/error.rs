use thiserror::Error;

/// Failures that can end one execution attempt. Everything here is coerced
/// into `status=failure` at the attempt boundary; retry decisions belong to
/// the audit daemon.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no handler registered for function {0}")]
    Resolution(String),

    #[error("command {0} not found on PATH")]
    MissingCommand(String),

    #[error("work timed out")]
    Timeout,

    #[error("execution interrupted by shutdown")]
    Interrupted,

    #[error("execution failed: {0}")]
    UserFailure(String),

    #[error("neither function nor command provided")]
    NoExecutable,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
