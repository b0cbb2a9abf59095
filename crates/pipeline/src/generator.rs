use crate::report::ChunkFailure;
use embedsync_kb::{Chunk, ChunkSource};
use embedsync_store::{Embedder, EmbeddingRecord, EmbeddingStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_EMBED_CONCURRENCY: usize = 32;

/// Everything the merger needs from one generation pass.
#[derive(Debug, Default)]
pub struct EmbedBatch {
    /// Freshly embedded records, in source order
    pub records: Vec<EmbeddingRecord>,
    /// Chunks whose embedder call failed or produced an invalid vector
    pub failures: Vec<ChunkFailure>,
    /// Every chunk id present in the source snapshot this run
    pub seen_ids: HashSet<String>,
    /// Chunks not handed to the embedder (stored hash still current)
    pub skipped: usize,
}

/// Knobs for one generation pass.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorOptions {
    /// Upper bound on concurrent embedder calls
    pub max_concurrent: usize,
    /// Per-call timeout; an elapsed timeout is a per-chunk failure, not an abort
    pub embed_timeout: Duration,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            max_concurrent: default_embed_concurrency(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }
}

/// Embedding is network bound and provider rate limits bite long before CPU
/// does, so the default fan-out stays small.
#[must_use]
pub fn default_embed_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(2, 8)
}

#[must_use]
pub fn clamp_embed_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_EMBED_CONCURRENCY)
}

/// A chunk needs embedding iff the store has no record for it or the stored
/// content hash no longer matches.
fn needs_embedding(store: &EmbeddingStore, chunk: &Chunk) -> bool {
    store
        .get(&chunk.id)
        .is_none_or(|record| record.content_hash != chunk.content_hash)
}

/// Embeds every selected chunk in bounded-concurrency waves.
///
/// Failures never abort the pass: a chunk whose embedder call errors, times
/// out, or returns a vector of the wrong width lands in `failures` and the
/// remaining chunks keep going.
pub async fn generate_batch(
    source: &ChunkSource,
    store: &EmbeddingStore,
    embedder: Arc<dyn Embedder>,
    options: &GeneratorOptions,
) -> EmbedBatch {
    let mut batch = EmbedBatch {
        seen_ids: source.ids(),
        ..EmbedBatch::default()
    };

    let selected: Vec<Chunk> = source
        .iter()
        .filter(|chunk| needs_embedding(store, chunk))
        .cloned()
        .collect();
    batch.skipped = source.len() - selected.len();

    if selected.is_empty() {
        log::info!("All {} chunks are up to date", source.len());
        return batch;
    }

    log::info!(
        "Embedding {} of {} chunks ({} unchanged)",
        selected.len(),
        source.len(),
        batch.skipped
    );

    let expected_dimension = embedder.dimension();
    let max_concurrent = options.max_concurrent.max(1);
    for wave in selected.chunks(max_concurrent) {
        let mut tasks = Vec::with_capacity(wave.len());
        for chunk in wave {
            let text = chunk.text.clone();
            let embedder = Arc::clone(&embedder);
            let embed_timeout = options.embed_timeout;
            tasks.push(tokio::spawn(async move {
                timeout(embed_timeout, embedder.embed(&text)).await
            }));
        }

        for (chunk, task) in wave.iter().zip(tasks) {
            match task.await {
                Ok(Ok(Ok(vector))) => match check_embedding(&vector, expected_dimension) {
                    Ok(()) => batch.records.push(EmbeddingRecord::new(
                        chunk.id.clone(),
                        chunk.content_hash.clone(),
                        vector,
                        chunk.source_ref.clone(),
                    )),
                    Err(reason) => {
                        log::warn!("Rejected embedding for chunk '{}': {reason}", chunk.id);
                        batch.failures.push(ChunkFailure::new(chunk.id.clone(), reason));
                    }
                },
                Ok(Ok(Err(err))) => {
                    log::warn!("Failed to embed chunk '{}': {err}", chunk.id);
                    batch
                        .failures
                        .push(ChunkFailure::new(chunk.id.clone(), err.to_string()));
                }
                Ok(Err(_elapsed)) => {
                    let reason = format!(
                        "embedder timed out after {}ms",
                        options.embed_timeout.as_millis()
                    );
                    log::warn!("Failed to embed chunk '{}': {reason}", chunk.id);
                    batch.failures.push(ChunkFailure::new(chunk.id.clone(), reason));
                }
                Err(err) => {
                    batch.failures.push(ChunkFailure::new(
                        chunk.id.clone(),
                        format!("embed task panicked: {err}"),
                    ));
                }
            }
        }
    }

    batch
}

fn check_embedding(vector: &[f32], expected: usize) -> std::result::Result<(), String> {
    if vector.is_empty() {
        return Err("embedder returned an empty vector".to_string());
    }
    if vector.len() != expected {
        return Err(format!(
            "embedder returned dimension {} (expected {expected})",
            vector.len()
        ));
    }
    Ok(())
}
