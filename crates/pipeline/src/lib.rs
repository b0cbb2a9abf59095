//! # Embedsync Pipeline
//!
//! Incremental reconciliation between a knowledge-base snapshot and a
//! persisted embedding store.
//!
//! ## Pipeline
//!
//! ```text
//! ChunkSource (per-run snapshot)
//!     │
//!     ├──> Batch Generator (hash selection, bounded-parallel embedder calls)
//!     │      └─> EmbedBatch { records, failures, seen_ids }
//!     │
//!     ├──> Merger (insert / update / retain / delete / skip-and-warn)
//!     │      └─> successor EmbeddingStore + MergeReport
//!     │
//!     └──> Commit (stage tmp file, rename into place)
//!            └─> store file + last-run snapshot
//! ```
//!
//! A run that fails part-way never touches the previous store file, and an
//! identical re-run embeds nothing.
//!
//! ## Example
//! ```no_run
//! use embedsync_pipeline::{EmbedPipeline, PipelineOptions};
//! use embedsync_store::StubEmbedder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = embedsync_kb::load_chunk_source(
//!         &["kb.json".into()],
//!         embedsync_kb::LoadOptions::default(),
//!     )
//!     .await?;
//!
//!     let pipeline = EmbedPipeline::new("embeddings/store.json", PipelineOptions::default());
//!     let report = pipeline.run(&source, Arc::new(StubEmbedder::new(384))).await?;
//!     println!("{} inserted, {} updated", report.inserted, report.updated);
//!     Ok(())
//! }
//! ```

mod error;
mod generator;
mod merger;
mod pipeline;
mod report;
mod store_lock;

pub use error::{PipelineError, Result};
pub use generator::{
    clamp_embed_concurrency, default_embed_concurrency, generate_batch, EmbedBatch,
    GeneratorOptions, DEFAULT_EMBED_TIMEOUT,
};
pub use merger::{reconcile, MergeOptions};
pub use pipeline::{EmbedPipeline, PipelineOptions, RunMode};
pub use report::{
    read_run_snapshot, snapshot_path_for_store, write_run_snapshot, ChunkFailure, MergeReport,
    RunOutcome, RunSnapshot,
};
