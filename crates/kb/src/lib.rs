//! # Embedsync KB
//!
//! Knowledge-base ingestion for the embedding merge pipeline.
//!
//! ## Pipeline
//!
//! ```text
//! KB files (JSON)
//!     │
//!     ├──> Loader (layout sniffing: chunk records | docs map)
//!     │      └─> weighted composition, byte-budget segmentation
//!     │
//!     └──> ChunkSource (per-run snapshot)
//!            └─> Chunk { id, source_ref, text, content_hash }
//! ```
//!
//! Content hashes are SHA-256 over whitespace-normalized text, so reflowing
//! a paragraph does not force a re-embed.

mod document;
mod error;
mod hash;
mod loader;
mod types;

pub use document::{SourceDocument, DEFAULT_MAX_CHUNK_BYTES};
pub use error::{KbError, Result};
pub use hash::{content_hash, normalize_text};
pub use loader::{load_chunk_source, LoadOptions};
pub use types::{Chunk, ChunkSource};
