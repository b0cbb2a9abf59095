use crate::error::{Result, StoreError};
use crate::types::EmbeddingRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const EMBEDDING_STORE_SCHEMA_VERSION: u32 = 1;

/// Persisted map of chunk id to embedding record.
///
/// Records live in a sorted map so the serialized form is deterministic and
/// two stores with equal records serialize byte-identically. All records
/// share one vector dimensionality; the first inserted record fixes it.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    records: BTreeMap<String, EmbeddingRecord>,
    dimension: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEmbeddingStore {
    schema_version: u32,
    dimension: Option<usize>,
    records: BTreeMap<String, EmbeddingRecord>,
}

impl EmbeddingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store that already enforces a dimensionality. Used when
    /// building the successor of an existing store.
    #[must_use]
    pub const fn new_with_dimension(dimension: Option<usize>) -> Self {
        Self {
            records: BTreeMap::new(),
            dimension,
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let persisted: PersistedEmbeddingStore = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != EMBEDDING_STORE_SCHEMA_VERSION {
            return Err(StoreError::CorruptStore(format!(
                "unsupported schema_version {} (expected {EMBEDDING_STORE_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }
        let store = Self {
            records: persisted.records,
            dimension: persisted.dimension,
        };
        store.validate()?;
        Ok(store)
    }

    /// Loads the store, treating a missing file as an empty store. Any other
    /// load failure stays an error; a corrupt store is never silently reset.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::load(path).await
    }

    /// Writes the store as pretty JSON, staging to a sibling tmp file and
    /// renaming it into place. Readers see either the old file or the new
    /// one, never a partial write.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let persisted = PersistedEmbeddingStore {
            schema_version: EMBEDDING_STORE_SCHEMA_VERSION,
            dimension: self.dimension,
            records: self.records.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Validates a candidate vector against the established dimensionality.
    pub const fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(StoreError::EmptyVector);
        }
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(StoreError::InvalidDimension {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        Ok(())
    }

    /// Inserts a new record. The id must not already be present and the
    /// vector must match the store's dimensionality (the first insert into a
    /// dimensionless store fixes it).
    pub fn insert(&mut self, record: EmbeddingRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        self.check_vector(&record.vector)?;
        self.dimension.get_or_insert(record.vector.len());
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EmbeddingRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub const fn records(&self) -> &BTreeMap<String, EmbeddingRecord> {
        &self.records
    }

    #[must_use]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.dimension.is_none() && !self.records.is_empty() {
            return Err(StoreError::CorruptStore(
                "store has records but no recorded dimension".to_string(),
            ));
        }
        for (id, record) in &self.records {
            if *id != record.id {
                return Err(StoreError::CorruptStore(format!(
                    "record key '{id}' does not match record id '{}'",
                    record.id
                )));
            }
            self.check_vector(&record.vector)?;
        }
        Ok(())
    }
}
