use crate::item::ItemId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object already exists: {0}")]
    AlreadyExists(ItemId),

    #[error("Not found: {0}")]
    NotFound(ItemId),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Store is read-only")]
    ReadOnly,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidObject(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
