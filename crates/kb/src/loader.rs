use crate::document::{SourceDocument, DEFAULT_MAX_CHUNK_BYTES};
use crate::error::{KbError, Result};
use crate::hash::normalize_text;
use crate::types::{Chunk, ChunkSource};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// One entry of the flat chunk-records input layout.
#[derive(Debug, Deserialize)]
struct ChunkRecord {
    id: String,
    #[serde(default)]
    source_ref: String,
    text: String,
}

/// Knobs for knowledge-base loading.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Byte budget per composed chunk for docs-map inputs
    pub max_chunk_bytes: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

/// Collects chunks across input files, rejecting conflicting duplicate ids.
#[derive(Default)]
struct ChunkAccumulator {
    chunks: Vec<Chunk>,
    index_by_id: HashMap<String, usize>,
    origin_by_id: HashMap<String, String>,
    skipped_empty: usize,
}

impl ChunkAccumulator {
    fn push(&mut self, chunk: Chunk, origin: &Path) -> Result<()> {
        if normalize_text(&chunk.text).is_empty() {
            log::debug!("Skipping chunk '{}': no embeddable text", chunk.id);
            self.skipped_empty += 1;
            return Ok(());
        }
        if let Some(&index) = self.index_by_id.get(&chunk.id) {
            if self.chunks[index].content_hash == chunk.content_hash {
                log::debug!(
                    "Duplicate chunk id '{}' with identical content; keeping the first",
                    chunk.id
                );
                return Ok(());
            }
            return Err(KbError::DuplicateId {
                first: self
                    .origin_by_id
                    .get(&chunk.id)
                    .cloned()
                    .unwrap_or_default(),
                second: origin.display().to_string(),
                id: chunk.id,
            });
        }
        self.index_by_id.insert(chunk.id.clone(), self.chunks.len());
        self.origin_by_id
            .insert(chunk.id.clone(), origin.display().to_string());
        self.chunks.push(chunk);
        Ok(())
    }

    fn finish(self, file_count: usize) -> ChunkSource {
        log::info!(
            "Loaded {} chunks from {} file(s) ({} skipped: empty)",
            self.chunks.len(),
            file_count,
            self.skipped_empty
        );
        ChunkSource::new(self.chunks)
    }
}

/// Loads one or more knowledge-base files into a single chunk snapshot.
///
/// Each file is either a JSON array of chunk records or a JSON object
/// mapping document URLs to scraped pages. Files are merged in argument
/// order; pages within a docs map are processed in URL order so chunk ids
/// and positions stay stable across runs.
pub async fn load_chunk_source(paths: &[PathBuf], options: LoadOptions) -> Result<ChunkSource> {
    let mut accumulator = ChunkAccumulator::default();

    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| KbError::ReadFailed {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|err| KbError::InvalidFormat {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;

        match value {
            serde_json::Value::Array(_) => {
                load_chunk_records(value, path, &mut accumulator)?;
            }
            serde_json::Value::Object(_) => {
                load_docs_map(value, path, options.max_chunk_bytes, &mut accumulator)?;
            }
            _ => {
                return Err(KbError::InvalidFormat {
                    path: path.display().to_string(),
                    reason: "top-level JSON must be an array of chunk records or a docs map"
                        .to_string(),
                });
            }
        }
    }

    Ok(accumulator.finish(paths.len()))
}

fn load_chunk_records(
    value: serde_json::Value,
    path: &Path,
    accumulator: &mut ChunkAccumulator,
) -> Result<()> {
    let records: Vec<ChunkRecord> =
        serde_json::from_value(value).map_err(|err| KbError::InvalidFormat {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

    for (index, record) in records.into_iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(KbError::InvalidFormat {
                path: path.display().to_string(),
                reason: format!("chunk record {index} has an empty id"),
            });
        }
        accumulator.push(Chunk::new(record.id, record.source_ref, record.text), path)?;
    }
    Ok(())
}

fn load_docs_map(
    value: serde_json::Value,
    path: &Path,
    max_chunk_bytes: usize,
    accumulator: &mut ChunkAccumulator,
) -> Result<()> {
    // BTreeMap keys the pages by URL, which fixes the processing order.
    let pages: BTreeMap<String, SourceDocument> =
        serde_json::from_value(value).map_err(|err| KbError::InvalidFormat {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

    for (url, page) in pages {
        let texts = page.compose_texts(max_chunk_bytes);
        if texts.is_empty() {
            log::debug!("Skipping page '{url}': no content to embed");
            accumulator.skipped_empty += 1;
            continue;
        }
        for (position, text) in texts.into_iter().enumerate() {
            accumulator.push(Chunk::new(format!("{url}#{position}"), url.clone(), text), path)?;
        }
    }
    Ok(())
}
