use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConveyorError>;

#[derive(Error, Debug)]
pub enum ConveyorError {
    #[error("pipeline name can only contain letters, numbers and dashes: {0}")]
    InvalidPipeline(String),

    #[error("command and function cannot be set together")]
    AmbiguousExecutable,

    #[error("timeout must be within [1, 86400] seconds, got {0}")]
    InvalidTimeout(i64),

    #[error("retries must be less than 6, got {0}")]
    InvalidRetries(u32),

    #[error("priority must be within [1, 5], got {0}")]
    InvalidPriority(u32),

    #[error("timestamps must satisfy creation <= start <= stop")]
    InvalidTimestamps,

    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("user must be a non-empty string")]
    MissingUser,

    #[error("workspace config error: {0}")]
    Workspace(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<serde_yaml::Error> for ConveyorError {
    fn from(err: serde_yaml::Error) -> Self {
        ConveyorError::Workspace(err.to_string())
    }
}
