use crate::Collector;
use anyhow::{anyhow, Result};
use rand::Rng;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use telemon_common::types::Metric;

/// Statistics of the agent process itself plus a uniformly random
/// `RandomValue` in `[0, 1)` for sampling checks on the receiving side.
pub struct RuntimeCollector {
    system: System,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn current_pid() -> Result<Pid> {
        sysinfo::get_current_pid().map_err(|e| anyhow!("cannot resolve agent pid: {e}"))
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        let pid = Self::current_pid()?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("agent process {pid} not found"))?;
        let disk = process.disk_usage();

        Ok(vec![
            Metric::gauge("ProcessResidentMemory", process.memory() as f64),
            Metric::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCpuUsage", f64::from(process.cpu_usage())),
            Metric::gauge("ProcessRunTime", process.run_time() as f64),
            Metric::gauge("ProcessDiskRead", disk.total_read_bytes as f64),
            Metric::gauge("ProcessDiskWritten", disk.total_written_bytes as f64),
            Metric::gauge("RandomValue", rand::thread_rng().gen::<f64>()),
        ])
    }
}
