use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Invalid download status: {0}")]
    InvalidStatus(String),

    #[error("Invalid queue status: {0}")]
    InvalidQueueStatus(String),

    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid job kind: {0}")]
    InvalidJobKind(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, OfflineError>;
