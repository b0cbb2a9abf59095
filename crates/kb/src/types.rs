use crate::hash::content_hash;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A unit of knowledge-base text prepared for embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identifier, derived from the source document and position
    pub id: String,

    /// Opaque pointer back to the source document (URL, file path, ...)
    pub source_ref: String,

    /// The text to embed
    pub text: String,

    /// Hex SHA-256 of the normalized text; changes iff the text meaningfully changes
    pub content_hash: String,
}

impl Chunk {
    #[must_use]
    pub fn new(id: String, source_ref: String, text: String) -> Self {
        let content_hash = content_hash(&text);
        Self {
            id,
            source_ref,
            text,
            content_hash,
        }
    }
}

/// Ordered snapshot of every chunk the knowledge base currently contains.
///
/// The merge pipeline treats this as the source of truth for one run: ids
/// absent from the snapshot are candidates for deletion downstream.
#[derive(Debug, Clone, Default)]
pub struct ChunkSource {
    chunks: Vec<Chunk>,
}

impl ChunkSource {
    #[must_use]
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Identifier set used for deletion detection.
    #[must_use]
    pub fn ids(&self) -> HashSet<String> {
        self.chunks.iter().map(|chunk| chunk.id.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }
}

impl<'a> IntoIterator for &'a ChunkSource {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}
