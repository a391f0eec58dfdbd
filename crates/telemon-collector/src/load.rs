use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use telemon_common::types::Metric;

pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        let load_avg = System::load_average();

        Ok(vec![
            Metric::gauge("CPUutilization1", load_avg.one),
            Metric::gauge("CPUutilization5", load_avg.five),
            Metric::gauge("CPUutilization15", load_avg.fifteen),
            Metric::gauge("Uptime", System::uptime() as f64),
        ])
    }
}
