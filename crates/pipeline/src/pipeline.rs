use crate::error::{PipelineError, Result};
use crate::generator::{generate_batch, GeneratorOptions};
use crate::merger::{reconcile, MergeOptions};
use crate::report::{write_run_snapshot, MergeReport};
use crate::store_lock::acquire_store_write_lock;
use embedsync_kb::ChunkSource;
use embedsync_store::{Embedder, EmbeddingStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// How a run treats the existing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Embed only new and changed chunks, reconciling against the loaded store
    #[default]
    Incremental,
    /// Re-embed everything and rebuild the store wholesale; also the escape
    /// hatch when the existing store file cannot be loaded
    Full,
}

/// Options for one pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub mode: RunMode,
    pub merge: MergeOptions,
    pub generator: GeneratorOptions,
    /// Confirm that an empty chunk source may wipe a non-empty store
    pub allow_empty_source: bool,
}

/// Drives one merge run end to end: lock, load, generate, reconcile, commit.
pub struct EmbedPipeline {
    store_path: PathBuf,
    options: PipelineOptions,
}

impl EmbedPipeline {
    #[must_use]
    pub fn new(store_path: impl Into<PathBuf>, options: PipelineOptions) -> Self {
        Self {
            store_path: store_path.into(),
            options,
        }
    }

    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Runs the pipeline against one source snapshot.
    ///
    /// The store file on disk stays byte-identical unless the final rename
    /// succeeds; a failure anywhere before the commit loses no data. Returns
    /// the merge report; callers decide how to surface a partial outcome.
    pub async fn run(
        &self,
        source: &ChunkSource,
        embedder: Arc<dyn Embedder>,
    ) -> Result<MergeReport> {
        let started = Instant::now();

        // Serialize store writes across processes for this store path.
        let _write_lock = acquire_store_write_lock(&self.store_path).await?;

        // An empty snapshot usually means the upstream scrape failed, not
        // that every document disappeared; deleting everything needs an
        // explicit confirmation.
        if source.is_empty() && !self.options.allow_empty_source {
            let existing = match EmbeddingStore::load_or_default(&self.store_path).await {
                Ok(store) => store.len(),
                // Unreadable but present still counts as data worth keeping.
                Err(_) => 1,
            };
            if existing > 0 {
                return Err(PipelineError::EmptySource { store_len: existing });
            }
        }

        let current = if self.options.mode == RunMode::Full {
            log::info!("Full rebuild: ignoring any existing store contents");
            EmbeddingStore::new()
        } else {
            EmbeddingStore::load_or_default(&self.store_path).await?
        };

        let batch = generate_batch(source, &current, embedder, &self.options.generator).await;
        let embedded = batch.records.len() + batch.failures.len();
        let skipped = batch.skipped;

        let (next, mut report) = reconcile(&current, &batch, &self.options.merge)?;
        report.embedded = embedded;
        report.skipped = skipped;

        next.save(&self.store_path).await?;

        #[allow(clippy::cast_possible_truncation)]
        {
            report.time_ms = started.elapsed().as_millis() as u64;
            if report.time_ms == 0 {
                report.time_ms = 1;
            }
        }

        log::info!(
            "Merge committed to {}: {} inserted, {} updated, {} retained, {} deleted, {} failed in {}ms",
            self.store_path.display(),
            report.inserted,
            report.updated,
            report.retained,
            report.deleted,
            report.failed(),
            report.time_ms
        );

        // Operator convenience only; a snapshot write failure must not fail
        // a run whose store commit already happened.
        if let Err(err) = write_run_snapshot(&self.store_path, &report).await {
            log::warn!("Failed to write run snapshot: {err}");
        }

        Ok(report)
    }
}
