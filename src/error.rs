//! Error types for the shard router.

use thiserror::Error;

/// Result type alias for shard router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the shard router.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid shard configuration at construction.
    #[error("config error: {0}")]
    Config(String),

    /// Resolution was attempted while no shards are in rotation.
    ///
    /// This is a per-call error, not fatal to the router: it clears
    /// automatically once the health monitor promotes a shard back.
    #[error("no shards available in the ring")]
    EmptyRing,

    /// A liveness probe (or client handle acquisition) failed.
    ///
    /// Shard implementations return this from [`crate::ShardClient::probe`]
    /// and the client accessors. The health monitor absorbs it into a state
    /// transition; it is never surfaced to `resolve` callers.
    #[error("probe failed: {0}")]
    Probe(String),
}
