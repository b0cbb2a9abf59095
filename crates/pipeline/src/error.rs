use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] embedsync_store::StoreError),

    #[error("Chunk source is empty but the store still holds {store_len} record(s); pass --allow-empty-source to confirm the wipe")]
    EmptySource { store_len: usize },

    #[error("{0}")]
    Other(String),
}
