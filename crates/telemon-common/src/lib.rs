//! Types and helpers shared by the telemon agent, storage layer and server.

pub mod backoff;
pub mod error;
pub mod shutdown;
pub mod sign;
pub mod types;
