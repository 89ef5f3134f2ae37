use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{operation} is not implemented for {storage} storage")]
    Unimplemented {
        operation: String,
        storage: &'static str,
    },

    #[error("storage driver error: {0}")]
    Driver(String),

    #[error("archive not configured: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
