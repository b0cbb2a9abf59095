use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A persisted embedding with the provenance the incremental merge needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Chunk identifier this vector belongs to
    pub id: String,

    /// Hex SHA-256 of the normalized chunk text at embedding time
    pub content_hash: String,

    /// The embedding vector
    pub vector: Vec<f32>,

    /// Opaque pointer back to the source document
    pub source_ref: String,

    /// When this record was last written (unix milliseconds)
    pub updated_at_unix_ms: u64,
}

impl EmbeddingRecord {
    #[must_use]
    pub fn new(id: String, content_hash: String, vector: Vec<f32>, source_ref: String) -> Self {
        Self {
            id,
            content_hash,
            vector,
            source_ref,
            updated_at_unix_ms: unix_now_ms(),
        }
    }
}

#[must_use]
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
