use checktree_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Property '{0}' is read-only")]
    ReadOnly(String),

    #[error("Store is not write enabled")]
    StoreNotWritable,

    #[error("Root query returned {returned} items, expected exactly one")]
    RootQuery { returned: usize },

    #[error("Item has no identity")]
    MissingIdentity,
}

impl ModelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
