use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use telemon_common::types::Metric;

/// Per-core CPU usage in percent. The first sample after construction
/// compares against the refresh done in [`CpuCollector::new`].
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_cpu_all();

        let mut points = vec![Metric::gauge(
            "CpuUsage",
            f64::from(self.system.global_cpu_usage()),
        )];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            points.push(Metric::gauge(
                format!("CpuCoreUsage{i}"),
                f64::from(cpu.cpu_usage()),
            ));
        }

        Ok(points)
    }
}
