use crate::error::{Result, StorageError};
use crate::MetricsStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use telemon_common::types::{metric_key, Metric, MetricKind, MetricValue};

/// In-process store: a single mutex guards a `"<id>:<type>"` → [`Metric`] map.
///
/// All reads and writes are serialized by that lock, so each store instance
/// has a total order of operations. [`MetricsStore::save_all`] applies the
/// whole batch under one lock scope, which makes it atomic to readers.
#[derive(Default)]
pub struct MemoryStore {
    metrics: Mutex<HashMap<String, Metric>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from an existing keyed map, re-deriving each key from
    /// its metric so a hand-edited snapshot cannot smuggle in a wrong key.
    pub(crate) fn from_metrics(metrics: impl IntoIterator<Item = Metric>) -> Result<Self> {
        let mut map = HashMap::new();
        for metric in metrics {
            map.insert(metric.key()?, metric);
        }
        Ok(Self {
            metrics: Mutex::new(map),
        })
    }

    /// Lock the map, recovering from a poisoned Mutex if necessary.
    fn lock_metrics(&self) -> MutexGuard<'_, HashMap<String, Metric>> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current contents, taken under the lock.
    pub(crate) fn snapshot(&self) -> HashMap<String, Metric> {
        self.lock_metrics().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_metrics().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies the kind-specific merge rule.
fn merge(existing: Option<&Metric>, incoming: &Metric) -> Result<Metric> {
    match (incoming.value, existing.map(|m| m.value)) {
        (MetricValue::Counter(delta), Some(MetricValue::Counter(total))) => {
            let sum = total
                .checked_add(delta)
                .ok_or_else(|| StorageError::CounterOverflow {
                    id: incoming.id.clone(),
                })?;
            Ok(Metric::counter(incoming.id.clone(), sum))
        }
        _ => Ok(incoming.clone()),
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn save(&self, metric: &Metric) -> Result<Metric> {
        let key = metric.checked_key()?;
        let mut map = self.lock_metrics();
        let stored = merge(map.get(&key), metric)?;
        map.insert(key, stored.clone());
        Ok(stored)
    }

    async fn save_all(&self, metrics: &[Metric]) -> Result<Vec<Metric>> {
        let keyed = metrics
            .iter()
            .map(|m| Ok((m.checked_key()?, m)))
            .collect::<Result<Vec<_>>>()?;

        let mut map = self.lock_metrics();
        // Stage against an overlay so a failure midway leaves the map untouched.
        let mut staged: HashMap<String, Metric> = HashMap::with_capacity(keyed.len());
        let mut stored = Vec::with_capacity(keyed.len());
        for (key, metric) in keyed {
            let existing = staged.get(&key).or_else(|| map.get(&key));
            let merged = merge(existing, metric)?;
            stored.push(merged.clone());
            staged.insert(key, merged);
        }
        map.extend(staged);
        Ok(stored)
    }

    async fn get_by_type_and_id(&self, id: &str, kind: MetricKind) -> Result<Option<Metric>> {
        let key = metric_key(id, kind)?;
        Ok(self.lock_metrics().get(&key).cloned())
    }

    async fn get_all_by_type(&self, kind: MetricKind) -> Result<Vec<Metric>> {
        let mut metrics: Vec<Metric> = self
            .lock_metrics()
            .values()
            .filter(|m| m.kind() == kind)
            .cloned()
            .collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(metrics)
    }
}
