//! Outbound request routing through a rotating proxy pool.
//!
//! Every outbound HTTP call the gateway makes goes through
//! [`OutboundClient`]. When proxy usage is enabled, calls are routed
//! round-robin over the configured endpoints; endpoints that keep failing
//! are blacklisted for a bounded time window, and the client falls back to
//! a direct connection (or retries the rest of the pool) when a proxy
//! attempt fails.

mod client;
mod pool;

pub use client::OutboundClient;
pub use pool::{PoolSettings, ProxyPool, SelectedProxy};

/// Errors that can occur while configuring or using the outbound router.
#[derive(thiserror::Error, Debug)]
pub enum OutboundError {
    #[error("invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
