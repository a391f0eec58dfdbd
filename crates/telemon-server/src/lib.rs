//! telemon server: accepts metric updates over HTTP and keeps the latest
//! value of each metric in the configured store.

pub mod api;
pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod state;
