pub mod constants;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod storage;

// Layered boundaries: ports and use cases, then adapters
pub mod app;
pub mod infra;
