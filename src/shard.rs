//! Shard capability traits.
//!
//! A shard is one backend connection target responsible for a subset of
//! keys. This crate never opens connections itself; it consumes shards
//! through two narrow capabilities: obtaining a primary (write) client and
//! a secondary (read) client, each of which can be probed for liveness.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A client handle obtained from a shard, usable for liveness probing.
///
/// `probe` returns `Ok(true)` when the backend answered the liveness check,
/// `Ok(false)` when it answered negatively, and `Err` when the check could
/// not be executed at all. The health monitor treats `Err` like a failed
/// probe and never propagates it to callers.
#[async_trait]
pub trait ShardClient: Send + Sync {
    /// Check whether the backend behind this handle is alive.
    async fn probe(&self) -> Result<bool>;
}

/// One backend connection target on the ring.
///
/// Shards are created by the caller at startup and referenced by identity;
/// this crate only includes or excludes them from routing, it never
/// destroys them.
pub trait Shard: Send + Sync {
    /// Stable identity of this shard. Virtual node positions are derived
    /// from it, so re-adding a shard under the same name and weight lands
    /// on the exact positions it originally occupied.
    fn name(&self) -> &str;

    /// Relative capacity of this shard, expressed as a proportional
    /// virtual-node count on the ring. Must be positive.
    fn weight(&self) -> u32;

    /// Obtain the primary (write) client handle.
    ///
    /// Acquisition may fail; the health monitor treats such a failure
    /// identically to a failed probe.
    fn primary_client(&self) -> Result<Arc<dyn ShardClient>>;

    /// Obtain the secondary (read) client handle.
    fn secondary_client(&self) -> Result<Arc<dyn ShardClient>>;
}
