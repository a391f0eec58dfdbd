//! Latest-value storage for gauge and counter metrics.
//!
//! Every backend implements [`MetricsStore`] with the same merge rules:
//! a gauge write replaces the stored value, a counter write adds its delta
//! to the stored total. Only the most recent value per identity is kept.
//!
//! - [`memory::MemoryStore`]: one mutex around a map.
//! - [`file::FileStore`]: the memory store plus JSON snapshots on disk.
//! - [`postgres::PostgresStore`]: SQL upserts, transactional batches and
//!   retries on connection-level failures.

pub mod error;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod retry;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use error::Result;
use telemon_common::types::{Metric, MetricKind};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Persistence backend for metrics.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the server's request handlers call into one store concurrently.
/// Every method validates the metric identity before touching state.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Persists one metric and returns it as stored (counters carry the new total).
    ///
    /// Concurrent counter saves on one identity never lose an increment.
    async fn save(&self, metric: &Metric) -> Result<Metric>;

    /// Persists a batch. Either every metric is applied or none is.
    /// Returns the stored results in input order.
    async fn save_all(&self, metrics: &[Metric]) -> Result<Vec<Metric>>;

    /// Looks up one metric. Absence is `Ok(None)`, not an error.
    async fn get_by_type_and_id(&self, id: &str, kind: MetricKind) -> Result<Option<Metric>>;

    /// Returns every stored metric of `kind`, ordered by ID.
    async fn get_all_by_type(&self, kind: MetricKind) -> Result<Vec<Metric>>;

    /// Health check backing the server's ping endpoint.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
