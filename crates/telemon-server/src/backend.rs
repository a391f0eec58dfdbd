use crate::config::ServerConfig;
use std::sync::Arc;
use telemon_storage::{FileStore, MemoryStore, MetricsStore, PostgresStore};

/// The store chosen at startup. `file` is set when snapshots need flushing.
pub struct Backend {
    pub store: Arc<dyn MetricsStore>,
    pub file: Option<Arc<FileStore>>,
}

impl Backend {
    fn memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            file: None,
        }
    }
}

/// Picks PostgreSQL when a DSN is set, else the file store when a snapshot
/// path is set, else memory. A database that cannot be reached falls back to
/// memory; a snapshot that cannot be restored starts empty.
pub async fn open(config: &ServerConfig) -> Backend {
    if let Some(dsn) = config.database_dsn.as_deref().filter(|d| !d.is_empty()) {
        return match PostgresStore::connect(dsn).await {
            Ok(store) => Backend {
                store: Arc::new(store),
                file: None,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize PostgreSQL store, using memory");
                Backend::memory()
            }
        };
    }

    if let Some(path) = config.file_storage_path.as_deref().filter(|p| !p.is_empty()) {
        let sync_on_write = config.sync_on_write();
        let file = if config.restore {
            match FileStore::restore(path, sync_on_write).await {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!(path, error = %e, "Cannot restore metrics snapshot, starting empty");
                    FileStore::new(path, sync_on_write)
                }
            }
        } else {
            FileStore::new(path, sync_on_write)
        };
        tracing::info!(path, sync_on_write, "Using file metrics store");
        let file = Arc::new(file);
        return Backend {
            store: file.clone(),
            file: Some(file),
        };
    }

    tracing::info!("Using in-memory metrics store");
    Backend::memory()
}
