//! Metric sources for the telemon agent.
//!
//! Each [`Collector`] gathers one category of readings (the agent process
//! itself, host memory, load, per-core CPU) and returns them as gauge
//! [`Metric`]s. The agent's poll loop calls every registered collector once
//! per tick and merges the results into a single batch.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod runtime;

use anyhow::Result;
use telemon_common::types::Metric;

/// A metric source sampled on the agent host.
///
/// The trait requires `Send + Sync` so collectors can be moved into the
/// agent's poll task.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"runtime"`, `"memory"`), used for logging.
    fn name(&self) -> &str;

    /// Samples current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Metric>>;
}

/// The standard source set: the agent's own runtime statistics, plus host
/// memory, load and CPU when `host_metrics` is enabled.
pub fn default_collectors(host_metrics: bool) -> Vec<Box<dyn Collector>> {
    let mut collectors: Vec<Box<dyn Collector>> = vec![Box::new(runtime::RuntimeCollector::new())];
    if host_metrics {
        collectors.push(Box::new(memory::MemoryCollector::new()));
        collectors.push(Box::new(load::LoadCollector::new()));
        collectors.push(Box::new(cpu::CpuCollector::new()));
    }
    collectors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_collectors_are_optional() {
        let names = |cs: Vec<Box<dyn Collector>>| {
            cs.iter().map(|c| c.name().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(names(default_collectors(false)), vec!["runtime"]);
        assert_eq!(
            names(default_collectors(true)),
            vec!["runtime", "memory", "load", "cpu"]
        );
    }
}
