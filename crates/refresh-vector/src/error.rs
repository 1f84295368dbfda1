use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector index: {0}")]
    Index(String),

    /// An embedding or collection of the wrong width
    #[error("dimension mismatch: collection holds {expected}-d vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Serialization(String),

    #[error("chunk metadata store: {0}")]
    Database(#[from] rocksdb::Error),
}

impl From<serde_json::Error> for VectorError {
    fn from(err: serde_json::Error) -> Self {
        VectorError::Serialization(err.to_string())
    }
}
