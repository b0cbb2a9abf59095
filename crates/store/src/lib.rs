//! # Embedsync Store
//!
//! Persisted embedding records and the backends that produce them.
//!
//! ## Architecture
//!
//! ```text
//! chunk text
//!     │
//!     ├──> Embedder (stub | OpenAI-compatible HTTP)
//!     │      └─> Vec<f32>, fixed dimension
//!     │
//!     └──> EmbeddingStore (sorted records, schema-versioned JSON)
//!            └─> atomic save: stage tmp file, rename into place
//! ```

mod embedder;
mod error;
mod openai;
mod store;
mod types;

pub use embedder::{stub_embed, Embedder, StubEmbedder};
pub use error::{Result, StoreError};
pub use openai::{OpenAiEmbedder, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
pub use store::{EmbeddingStore, EMBEDDING_STORE_SCHEMA_VERSION};
pub use types::{unix_now_ms, EmbeddingRecord};
