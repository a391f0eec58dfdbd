//! Collect → report → deliver.
//!
//! Three groups of tasks joined by bounded channels:
//!
//! 1. the poll loop samples every source each `poll_interval` and hands the
//!    batch to the reporter, waiting until the reporter takes it;
//! 2. the reporter keeps only the newest batch and, each `report_interval`,
//!    pushes it onto the delivery queue, waiting for a free worker;
//! 3. `workers` delivery tasks share the queue and send one batch at a time.
//!
//! Every wait also watches the shutdown signal. Closing a channel stops the
//! next stage, so the pipeline drains front to back.

use crate::client::BatchSender;
use crate::error::DeliveryError;
use std::sync::Arc;
use std::time::Duration;
use telemon_collector::Collector;
use telemon_common::shutdown::Shutdown;
use telemon_common::types::{Metric, MetricBatch};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Samples every source once per tick and counts ticks in `PollCount`.
pub struct Sampler {
    sources: Vec<Box<dyn Collector>>,
    poll_count: i64,
}

impl Sampler {
    pub fn new(sources: Vec<Box<dyn Collector>>) -> Self {
        Self {
            sources,
            poll_count: 0,
        }
    }

    /// Produces one batch. A failing source is logged and left out, and so is
    /// any reading that cannot be stored (empty ID, non-finite gauge).
    pub fn sample(&mut self) -> MetricBatch {
        let mut batch = Vec::new();
        for source in &mut self.sources {
            match source.collect() {
                Ok(points) => {
                    for point in points {
                        match point.checked_key() {
                            Ok(_) => batch.push(point),
                            Err(e) => tracing::warn!(
                                collector = source.name(),
                                metric = %point.id,
                                error = %e,
                                "Dropping unusable reading"
                            ),
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(collector = source.name(), error = %e, "Collection failed")
                }
            }
        }
        self.poll_count = self.poll_count.saturating_add(1);
        batch.push(Metric::counter("PollCount", self.poll_count));
        batch
    }
}

/// First tick one full period from now, then every period.
fn ticker(period: Duration) -> Interval {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

/// Poll loop. Returns (closing `out`) on shutdown or when the reporter is gone.
pub async fn run_collector(
    mut sampler: Sampler,
    poll_interval: Duration,
    out: mpsc::Sender<MetricBatch>,
    shutdown: Shutdown,
) {
    let mut tick = ticker(poll_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                let batch = sampler.sample();
                tracing::debug!(count = batch.len(), "Collected metrics");
                tokio::select! {
                    res = out.send(batch) => if res.is_err() { break },
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }
    tracing::debug!("Collector stopped");
}

/// Keeps the latest batch from `inbound` and forwards it every `report_interval`.
///
/// Batches that arrive between two ticks overwrite each other; only the one
/// current at tick time is sent. Nothing is sent before the first batch.
pub async fn run_reporter(
    report_interval: Duration,
    mut inbound: mpsc::Receiver<MetricBatch>,
    out: mpsc::Sender<MetricBatch>,
    shutdown: Shutdown,
) {
    let mut tick = ticker(report_interval);
    let mut current: Option<MetricBatch> = None;
    loop {
        // Drain pending batches before looking at the tick so a tick never
        // forwards a batch that has already been superseded.
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            batch = inbound.recv() => match batch {
                Some(batch) => current = Some(batch),
                None => break,
            },
            _ = tick.tick() => {
                let Some(batch) = current.clone() else {
                    tracing::debug!("No metrics collected yet, skipping report");
                    continue;
                };
                tracing::debug!(count = batch.len(), "Reporting metrics");
                tokio::select! {
                    res = out.send(batch) => if res.is_err() { break },
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }
    tracing::debug!("Reporter stopped");
}

/// One delivery worker. Failed batches are logged and dropped.
pub async fn run_worker(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<MetricBatch>>>,
    sender: Arc<dyn BatchSender>,
    shutdown: Shutdown,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                batch = queue.recv() => batch,
                _ = shutdown.cancelled() => None,
            }
        };
        let Some(batch) = next else { break };

        tracing::info!(worker, count = batch.len(), "Sending metrics");
        match sender.send(&batch, &shutdown).await {
            Ok(()) => tracing::debug!(worker, "Metrics delivered"),
            Err(DeliveryError::Cancelled) => break,
            Err(e) => tracing::error!(worker, error = %e, "Dropping batch"),
        }
    }
    tracing::debug!(worker, "Delivery worker stopped");
}

/// Cadences and worker count for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub workers: usize,
}

/// Runs the whole pipeline until `shutdown` fires and every task has exited.
pub async fn run(
    settings: PipelineSettings,
    sampler: Sampler,
    sender: Arc<dyn BatchSender>,
    shutdown: Shutdown,
) {
    let (collected_tx, collected_rx) = mpsc::channel(1);
    let (report_tx, report_rx) = mpsc::channel(1);
    let queue = Arc::new(Mutex::new(report_rx));

    let mut tasks = JoinSet::new();
    tasks.spawn(run_collector(
        sampler,
        settings.poll_interval,
        collected_tx,
        shutdown.clone(),
    ));
    tasks.spawn(run_reporter(
        settings.report_interval,
        collected_rx,
        report_tx,
        shutdown.clone(),
    ));
    for worker in 0..settings.workers.max(1) {
        tasks.spawn(run_worker(
            worker,
            queue.clone(),
            sender.clone(),
            shutdown.clone(),
        ));
    }

    tracing::info!(
        poll_secs = settings.poll_interval.as_secs_f64(),
        report_secs = settings.report_interval.as_secs_f64(),
        workers = settings.workers,
        "Pipeline started"
    );

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "Pipeline task failed");
        }
    }
    tracing::info!("Pipeline stopped");
}
