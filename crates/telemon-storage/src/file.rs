use crate::error::{Result, StorageError};
use crate::memory::MemoryStore;
use crate::MetricsStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telemon_common::shutdown::Shutdown;
use telemon_common::types::{Metric, MetricKind};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// On-disk layout: one object whose single field maps `"<id>:<type>"` keys
/// to metric records.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(rename = "Metrics", default)]
    metrics: BTreeMap<String, Metric>,
}

/// [`MemoryStore`] plus a pretty-printed JSON snapshot file.
///
/// With `sync_on_write` every successful mutation rewrites the snapshot
/// before returning. Otherwise snapshots are taken by [`FileStore::flush`],
/// usually from [`FileStore::run_periodic_flush`].
///
/// A failed snapshot write is returned to the caller but the in-memory
/// mutation is not rolled back: the new value is already visible to readers.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    sync_on_write: bool,
    /// Serializes snapshot writes so a later snapshot never lands before an earlier one.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Starts empty. Nothing is written until the first flush.
    pub fn new(path: impl Into<PathBuf>, sync_on_write: bool) -> Self {
        Self::with_inner(MemoryStore::new(), path.into(), sync_on_write)
    }

    /// Loads the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not hold a valid snapshot.
    pub async fn restore(path: impl Into<PathBuf>, sync_on_write: bool) -> Result<Self> {
        let path = path.into();
        let data = tokio::fs::read(&path).await.map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        let inner = MemoryStore::from_metrics(snapshot.metrics.into_values())?;
        tracing::info!(path = %path.display(), count = inner.len(), "Restored metrics snapshot");
        Ok(Self::with_inner(inner, path, sync_on_write))
    }

    fn with_inner(inner: MemoryStore, path: PathBuf, sync_on_write: bool) -> Self {
        Self {
            inner,
            path,
            sync_on_write,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_on_write(&self) -> bool {
        self.sync_on_write
    }

    /// Writes the current contents to the snapshot file.
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = Snapshot {
            metrics: self.inner.snapshot().into_iter().collect(),
        };
        let data = serde_json::to_vec_pretty(&snapshot)?;
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, data).await.map_err(io_err)
    }

    async fn sync_if_needed(&self) -> Result<()> {
        if !self.sync_on_write {
            return Ok(());
        }
        self.flush().await.inspect_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to write metrics snapshot");
        })
    }

    /// Flushes every `every` until `shutdown` fires, then flushes once more.
    pub async fn run_periodic_flush(self: Arc<Self>, every: Duration, shutdown: Shutdown) {
        let mut tick = interval_at(Instant::now() + every, every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.flush().await {
                        Ok(()) => tracing::debug!(path = %self.path.display(), "Stored metrics snapshot"),
                        Err(e) => tracing::error!(error = %e, "Periodic snapshot failed"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        if let Err(e) = self.flush().await {
            tracing::error!(error = %e, "Final snapshot failed");
        } else {
            tracing::info!(path = %self.path.display(), "Stored final metrics snapshot");
        }
    }
}

#[async_trait]
impl MetricsStore for FileStore {
    async fn save(&self, metric: &Metric) -> Result<Metric> {
        let stored = self.inner.save(metric).await?;
        self.sync_if_needed().await?;
        Ok(stored)
    }

    async fn save_all(&self, metrics: &[Metric]) -> Result<Vec<Metric>> {
        let stored = self.inner.save_all(metrics).await?;
        self.sync_if_needed().await?;
        Ok(stored)
    }

    async fn get_by_type_and_id(&self, id: &str, kind: MetricKind) -> Result<Option<Metric>> {
        self.inner.get_by_type_and_id(id, kind).await
    }

    async fn get_all_by_type(&self, kind: MetricKind) -> Result<Vec<Metric>> {
        self.inner.get_all_by_type(kind).await
    }
}
