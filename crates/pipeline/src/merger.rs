use crate::error::Result;
use crate::generator::EmbedBatch;
use crate::report::{ChunkFailure, MergeReport};
use embedsync_store::{EmbeddingRecord, EmbeddingStore, StoreError};
use std::collections::{HashMap, HashSet};

/// Knobs for reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Drop stored records whose chunks left the source. When false, orphans
    /// are kept and counted as retained.
    pub prune_removed: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { prune_removed: true }
    }
}

/// Builds the successor store from the current store and one embed batch.
///
/// Decision order per chunk id:
/// 1. a fresh record for an id the store lacks is inserted
/// 2. a fresh record for a stored id replaces that record wholesale
/// 3. a stored id still in the source but not re-embedded is retained
/// 4. a stored id absent from the source is deleted (unless pruning is off)
/// 5. a failed chunk keeps whatever record the store already had
///
/// An id that shows up in both the batch records and the failure list counts
/// as failed. A fresh vector that no longer matches the store's established
/// dimensionality is demoted to a failure at this point, keeping the old
/// record; failure-preserved records are reported through `failures` only and
/// never double-counted as retained.
pub fn reconcile(
    current: &EmbeddingStore,
    batch: &EmbedBatch,
    options: &MergeOptions,
) -> Result<(EmbeddingStore, MergeReport)> {
    let mut report = MergeReport::new();
    let mut next = EmbeddingStore::new_with_dimension(current.dimension());

    let failed_ids: HashSet<&str> = batch.failures.iter().map(|f| f.id.as_str()).collect();
    let mut fresh: HashMap<&str, &EmbeddingRecord> = HashMap::new();
    for record in &batch.records {
        if failed_ids.contains(record.id.as_str()) {
            continue;
        }
        fresh.insert(record.id.as_str(), record);
    }

    let mut kept_orphans = 0usize;
    for (id, record) in current.records() {
        if failed_ids.contains(id.as_str()) {
            next.insert(record.clone())?;
            continue;
        }

        if let Some(fresh_record) = fresh.get(id.as_str()) {
            match next.insert((*fresh_record).clone()) {
                Ok(()) => report.updated += 1,
                Err(err)
                    if matches!(
                        err,
                        StoreError::InvalidDimension { .. } | StoreError::EmptyVector
                    ) =>
                {
                    next.insert(record.clone())?;
                    report.add_failure(ChunkFailure::new(id.clone(), err.to_string()));
                }
                Err(err) => return Err(err.into()),
            }
            continue;
        }

        if batch.seen_ids.contains(id.as_str()) {
            next.insert(record.clone())?;
            report.retained += 1;
            continue;
        }

        if options.prune_removed {
            log::debug!("Deleting record '{id}': chunk left the source");
            report.deleted += 1;
        } else {
            next.insert(record.clone())?;
            report.retained += 1;
            kept_orphans += 1;
        }
    }

    // Whatever is left of the batch after updates are the inserts; iterate
    // the batch itself so inserts land in source order.
    for record in &batch.records {
        if failed_ids.contains(record.id.as_str()) || current.get(&record.id).is_some() {
            continue;
        }
        match next.insert(record.clone()) {
            Ok(()) => report.inserted += 1,
            Err(err)
                if matches!(
                    err,
                    StoreError::InvalidDimension { .. } | StoreError::EmptyVector
                ) =>
            {
                report.add_failure(ChunkFailure::new(record.id.clone(), err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }

    for failure in &batch.failures {
        report.add_failure(failure.clone());
    }

    if kept_orphans > 0 {
        log::warn!("Kept {kept_orphans} orphaned record(s); pruning is disabled");
    }

    Ok((next, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedsync_store::stub_embed;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    const DIM: usize = 8;

    fn record(id: &str, hash: &str) -> EmbeddingRecord {
        EmbeddingRecord::new(
            id.to_string(),
            hash.to_string(),
            stub_embed(hash, DIM),
            format!("https://docs.test/{id}"),
        )
    }

    fn store_of(records: Vec<EmbeddingRecord>) -> EmbeddingStore {
        let mut store = EmbeddingStore::new();
        for entry in records {
            store.insert(entry).expect("seed store");
        }
        store
    }

    fn seen(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    #[test]
    fn first_run_inserts_everything() {
        let batch = EmbedBatch {
            records: vec![record("a", "h-a"), record("b", "h-b")],
            seen_ids: seen(&["a", "b"]),
            ..EmbedBatch::default()
        };

        let (next, report) =
            reconcile(&EmbeddingStore::new(), &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated + report.retained + report.deleted, 0);
        assert_eq!(next.len(), 2);
        assert_eq!(next.dimension(), Some(DIM));
    }

    #[test]
    fn unchanged_chunks_are_retained_as_is() {
        let current = store_of(vec![record("a", "h-a"), record("b", "h-b")]);
        let batch = EmbedBatch {
            seen_ids: seen(&["a", "b"]),
            skipped: 2,
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.retained, 2);
        assert_eq!(report.inserted + report.updated + report.deleted, 0);
        assert_eq!(next.get("a"), current.get("a"), "retained records are carried unchanged");
    }

    #[test]
    fn fresh_records_replace_stored_ones_wholesale() {
        let current = store_of(vec![record("a", "h-old")]);
        let replacement = record("a", "h-new");
        let batch = EmbedBatch {
            records: vec![replacement.clone()],
            seen_ids: seen(&["a"]),
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.updated, 1);
        let stored = next.get("a").expect("record present");
        assert_eq!(stored.content_hash, "h-new");
        assert_eq!(stored.vector, replacement.vector);
    }

    #[test]
    fn records_missing_from_the_source_are_deleted() {
        let current = store_of(vec![record("a", "h-a"), record("gone", "h-gone")]);
        let batch = EmbedBatch {
            seen_ids: seen(&["a"]),
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.deleted, 1);
        assert_eq!(report.retained, 1);
        assert!(next.get("gone").is_none());
    }

    #[test]
    fn pruning_off_keeps_orphans_as_retained() {
        let current = store_of(vec![record("a", "h-a"), record("gone", "h-gone")]);
        let batch = EmbedBatch {
            seen_ids: seen(&["a"]),
            ..EmbedBatch::default()
        };
        let options = MergeOptions { prune_removed: false };

        let (next, report) = reconcile(&current, &batch, &options).expect("merge");

        assert_eq!(report.deleted, 0);
        assert_eq!(report.retained, 2);
        assert!(next.get("gone").is_some());
    }

    #[test]
    fn failed_chunks_preserve_previous_records() {
        let current = store_of(vec![record("a", "h-a")]);
        let batch = EmbedBatch {
            failures: vec![ChunkFailure::new("a", "embedder offline")],
            seen_ids: seen(&["a"]),
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(next.get("a"), current.get("a"), "old record survives the failure");
        assert_eq!(report.failed(), 1);
        assert_eq!(report.retained, 0, "failure-preserved records are not double-counted");
        assert!(report.is_partial());
    }

    #[test]
    fn failed_new_chunks_insert_nothing() {
        let batch = EmbedBatch {
            failures: vec![ChunkFailure::new("new", "embedder offline")],
            seen_ids: seen(&["new"]),
            ..EmbedBatch::default()
        };

        let (next, report) =
            reconcile(&EmbeddingStore::new(), &batch, &MergeOptions::default()).expect("merge");

        assert!(next.is_empty());
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn id_in_both_records_and_failures_counts_as_failed() {
        let current = store_of(vec![record("a", "h-old")]);
        let batch = EmbedBatch {
            records: vec![record("a", "h-new")],
            failures: vec![ChunkFailure::new("a", "late failure")],
            seen_ids: seen(&["a"]),
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.updated, 0);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            next.get("a").expect("record present").content_hash,
            "h-old",
            "the stored record wins over the suspect fresh one"
        );
    }

    #[test]
    fn dimension_drift_is_demoted_to_a_failure() {
        let current = store_of(vec![record("a", "h-a"), record("b", "h-b")]);
        let mut narrow = record("a", "h-new");
        narrow.vector = stub_embed("h-new", DIM / 2);
        let batch = EmbedBatch {
            records: vec![narrow],
            seen_ids: seen(&["a", "b"]),
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.updated, 0);
        assert_eq!(report.failed(), 1);
        assert!(report.failures[0].reason.contains("dimension"));
        assert_eq!(
            next.get("a").expect("record present").content_hash,
            "h-a",
            "old record survives the drifting update"
        );
        assert_eq!(next.dimension(), Some(DIM));
    }

    #[test]
    fn dimension_drift_on_insert_is_also_demoted() {
        let current = store_of(vec![record("a", "h-a")]);
        let mut narrow = record("new", "h-new");
        narrow.vector = stub_embed("h-new", DIM / 2);
        let batch = EmbedBatch {
            records: vec![narrow],
            seen_ids: seen(&["a", "new"]),
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.inserted, 0);
        assert_eq!(report.failed(), 1);
        assert!(next.get("new").is_none());
    }

    #[test]
    fn empty_store_and_empty_batch_merge_to_nothing() {
        let batch = EmbedBatch::default();
        let (next, report) =
            reconcile(&EmbeddingStore::new(), &batch, &MergeOptions::default()).expect("merge");

        assert!(next.is_empty());
        assert_eq!(report.inserted + report.updated + report.retained + report.deleted, 0);
        assert!(!report.is_partial());
    }

    #[test]
    fn mixed_run_counts_every_case_once() {
        let current = store_of(vec![
            record("changed", "h-old"),
            record("failed", "h-kept"),
            record("gone", "h-gone"),
            record("same", "h-same"),
        ]);
        let batch = EmbedBatch {
            records: vec![record("changed", "h-new"), record("added", "h-added")],
            failures: vec![ChunkFailure::new("failed", "embedder offline")],
            seen_ids: seen(&["changed", "failed", "same", "added"]),
            skipped: 1,
            ..EmbedBatch::default()
        };

        let (next, report) = reconcile(&current, &batch, &MergeOptions::default()).expect("merge");

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(next.len(), 4, "changed + failed + same + added");
        assert!(next.get("gone").is_none());
    }
}
