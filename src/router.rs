//! Key-to-shard routing over the consistent hash ring.
//!
//! The router owns the ring, exposes key resolution to callers, and spawns
//! the background health monitor that keeps ring membership in step with
//! shard liveness.

use crate::config::RouterConfig;
use crate::error::Result;
use crate::monitor::{HealthMonitor, ShardPartition, ShardState};
use crate::ring::ConsistentHashRing;
use crate::shard::Shard;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Routes keyed operations to backend connection shards.
///
/// # Locking
///
/// All ring reads (`resolve`) and all ring mutations (monitor demotions and
/// promotions) go through one `RwLock` scoped to the ring instance, so no
/// caller ever observes partially-updated membership. The active/removed
/// partition has a single writer, the monitor task, and is exposed
/// read-only here.
///
/// # Lifecycle
///
/// Construction validates the shard list, builds the ring with every shard
/// active, and spawns the monitor task; monitoring is live when `new`
/// returns. The task is cancelled by [`shutdown`](Self::shutdown) or when
/// the router is dropped.
pub struct ShardRouter {
    ring: Arc<RwLock<ConsistentHashRing>>,
    partition: Arc<RwLock<ShardPartition>>,
    monitor: Arc<HealthMonitor>,
    cancel: CancellationToken,
}

impl ShardRouter {
    /// Create a router over the configured shards and start monitoring.
    ///
    /// Each shard is paired with its own [`Shard::weight`]. Fails with
    /// [`crate::Error::Config`] if the list is empty, a weight is zero, or two
    /// shards share a name.
    ///
    /// Must be called within a tokio runtime; the monitor task is spawned
    /// immediately.
    pub fn new(shards: Vec<Arc<dyn Shard>>, config: RouterConfig) -> Result<Self> {
        let weighted: Vec<(Arc<dyn Shard>, u32)> = shards
            .iter()
            .map(|shard| (Arc::clone(shard), shard.weight()))
            .collect();

        let ring = Arc::new(RwLock::new(ConsistentHashRing::with_shards(&weighted)?));
        let partition = Arc::new(RwLock::new(ShardPartition::new(&weighted)));
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&ring),
            Arc::clone(&partition),
            config,
        ));

        let cancel = CancellationToken::new();
        tokio::spawn(Arc::clone(&monitor).run(cancel.clone()));
        info!(shards = weighted.len(), "shard router started");

        Ok(Self {
            ring,
            partition,
            monitor,
            cancel,
        })
    }

    /// Resolve a key to the shard currently owning its ring position.
    ///
    /// Affinity is best-effort: the same key maps to the same shard only
    /// while membership is unchanged. Fails with [`crate::Error::EmptyRing`] when
    /// every shard has been demoted; the error clears once one recovers.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn Shard>> {
        self.ring.read().resolve(key)
    }

    /// Names of the shards currently eligible for resolution.
    pub fn active_shards(&self) -> Vec<String> {
        self.partition.read().names_in(ShardState::Active)
    }

    /// Names of the shards currently excluded pending recovery.
    pub fn removed_shards(&self) -> Vec<String> {
        self.partition.read().names_in(ShardState::Removed)
    }

    /// Total number of configured shards.
    pub fn shard_count(&self) -> usize {
        self.partition.read().len()
    }

    /// The health monitor driving membership changes.
    ///
    /// Exposed so tests can trigger single check phases deterministically
    /// instead of waiting on the background cycle.
    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Stop the background monitor task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        info!("shard router shut down");
    }
}

impl Drop for ShardRouter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ShardRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardRouter")
            .field("ring", &*self.ring.read())
            .field("partition", &*self.partition.read())
            .finish()
    }
}
