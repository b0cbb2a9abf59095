use crate::error::{PipelineError, Result};
use fs2::FileExt;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the duration of a merge run.
///
/// Serializes store writers across processes; readers never take the lock and
/// rely on the atomic rename commit instead.
pub(crate) struct StoreWriteLock {
    #[allow(dead_code)]
    file: std::fs::File,
}

impl Drop for StoreWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path_for_store(store_path: &Path) -> PathBuf {
    store_path.with_extension("lock")
}

pub(crate) async fn acquire_store_write_lock(store_path: &Path) -> Result<StoreWriteLock> {
    let path = lock_path_for_store(store_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // lock_exclusive blocks, so it runs off the async runtime.
    let lock = tokio::task::spawn_blocking(move || -> Result<StoreWriteLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                PipelineError::Other(format!("open store lock {}: {err}", path.display()))
            })?;

        file.lock_exclusive().map_err(|err| {
            PipelineError::Other(format!("acquire store lock {}: {err}", path.display()))
        })?;

        Ok(StoreWriteLock { file })
    })
    .await
    .map_err(|err| PipelineError::Other(format!("join store lock task: {err}")))??;

    Ok(lock)
}
