use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown lot: {0}")]
    UnknownLot(String),
    #[error("data unavailable: {0}")]
    DataUnavailable(String),
    #[error("remote inference failed: {0}")]
    RemoteInferenceFailed(String),
    #[error("no valid lots for permit {0}")]
    NoValidLotsForPermit(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cache lock poisoned")]
    CacheLock,
}
