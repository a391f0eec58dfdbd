//! telemon agent: samples metrics on one cadence, reports them on another
//! and delivers report batches to the server with a small worker pool.

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;

pub use client::{BatchSender, MetricsClient};
pub use config::AgentConfig;
pub use pipeline::{PipelineSettings, Sampler};
