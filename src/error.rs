use thiserror::Error;

/// Errors raised by measurement runs and the aggregation service client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected before any run starts
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The isolated run itself failed (allocation, panic, lost worker)
    #[error("worker execution failed: {0}")]
    WorkerExecution(String),

    /// Transport failure or non-success status from the aggregation service
    #[error("network error: {0}")]
    Network(String),

    /// Malformed or unexpected result message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A run is already in progress on this host
    #[error("a measurement run is already in progress")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
