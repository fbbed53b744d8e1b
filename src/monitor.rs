//! Health monitoring and the active/removed shard partition.
//!
//! The monitor runs one perpetual two-phase cycle: scan the active shards
//! and demote any that are unreachable, sleep, scan the removed shards and
//! promote any that have fully recovered, sleep again. Demotion takes two
//! failing probes (primary, then secondary as a fallback reachability
//! signal); promotion takes two succeeding ones. A shard must prove itself
//! healthy on both clients to re-enter rotation, but a single live client
//! is enough to stay in it.

use crate::config::RouterConfig;
use crate::ring::ConsistentHashRing;
use crate::shard::{Shard, ShardClient};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Rotation state of a configured shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// In the ring, eligible for resolution.
    Active,
    /// Out of the ring, pending recovery.
    Removed,
}

struct PartitionEntry {
    shard: Arc<dyn Shard>,
    /// Weight recorded at construction, reused for re-addition.
    weight: u32,
    state: ShardState,
}

/// The active/removed partition of configured shards.
///
/// Every configured shard is in exactly one state at all times; the ring is
/// mutated to stay consistent with this partition. The monitor task is the
/// single writer; the router exposes it read-only.
pub struct ShardPartition {
    entries: Vec<PartitionEntry>,
}

impl ShardPartition {
    /// Build a partition with every shard active.
    pub fn new(shards: &[(Arc<dyn Shard>, u32)]) -> Self {
        let entries = shards
            .iter()
            .map(|(shard, weight)| PartitionEntry {
                shard: Arc::clone(shard),
                weight: *weight,
                state: ShardState::Active,
            })
            .collect();
        Self { entries }
    }

    /// Shards currently in the given state, with their recorded weights.
    pub fn shards_in(&self, state: ShardState) -> Vec<(Arc<dyn Shard>, u32)> {
        self.entries
            .iter()
            .filter(|e| e.state == state)
            .map(|e| (Arc::clone(&e.shard), e.weight))
            .collect()
    }

    /// Names of the shards currently in the given state, in config order.
    pub fn names_in(&self, state: ShardState) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.state == state)
            .map(|e| e.shard.name().to_string())
            .collect()
    }

    /// Current state of a shard, if it is configured.
    pub fn state_of(&self, name: &str) -> Option<ShardState> {
        self.entries
            .iter()
            .find(|e| e.shard.name() == name)
            .map(|e| e.state)
    }

    /// Total number of configured shards.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no shards are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set_state(&mut self, name: &str, state: ShardState) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.shard.name() == name) {
            entry.state = state;
        }
    }
}

impl std::fmt::Debug for ShardPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardPartition")
            .field("active", &self.names_in(ShardState::Active))
            .field("removed", &self.names_in(ShardState::Removed))
            .finish()
    }
}

/// Which client handle a probe targets.
#[derive(Debug, Clone, Copy)]
enum ClientRole {
    Primary,
    Secondary,
}

impl ClientRole {
    fn as_str(self) -> &'static str {
        match self {
            ClientRole::Primary => "primary",
            ClientRole::Secondary => "secondary",
        }
    }
}

/// Outcome of one bounded liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    /// The backend answered the probe positively.
    Alive,
    /// The backend answered negatively.
    Dead,
    /// Handle acquisition or the probe itself errored or timed out.
    Failed,
}

/// Probes shard liveness and keeps ring membership consistent with it.
///
/// Constructed and spawned by [`crate::ShardRouter`]; exposed so tests can
/// drive single phases deterministically instead of waiting on real sleep
/// intervals.
pub struct HealthMonitor {
    ring: Arc<RwLock<ConsistentHashRing>>,
    partition: Arc<RwLock<ShardPartition>>,
    config: RouterConfig,
}

impl HealthMonitor {
    /// Create a monitor over a shared ring and partition.
    pub fn new(
        ring: Arc<RwLock<ConsistentHashRing>>,
        partition: Arc<RwLock<ShardPartition>>,
        config: RouterConfig,
    ) -> Self {
        Self {
            ring,
            partition,
            config,
        }
    }

    /// Phase 1: scan the active shards and demote unreachable ones.
    ///
    /// A shard stays active if its primary probe succeeds, or if the
    /// primary reports dead but the secondary still answers. It is demoted
    /// when both report dead, or when either probe (or handle acquisition)
    /// errors or times out.
    pub async fn check_active(&self) {
        let active = self.partition.read().shards_in(ShardState::Active);
        debug!(count = active.len(), "checking active shards");

        for (shard, _weight) in active {
            let reachable = match self.probe(shard.as_ref(), ClientRole::Primary).await {
                ProbeOutcome::Alive => true,
                ProbeOutcome::Dead => matches!(
                    self.probe(shard.as_ref(), ClientRole::Secondary).await,
                    ProbeOutcome::Alive
                ),
                ProbeOutcome::Failed => false,
            };

            if reachable {
                continue;
            }

            // Ring first, then partition: the ring never holds a shard the
            // partition does not consider active.
            self.ring.write().remove_shard(shard.name());
            self.partition
                .write()
                .set_state(shard.name(), ShardState::Removed);
            info!(shard = shard.name(), "shard demoted from rotation");
        }
    }

    /// Phase 2: scan the removed shards and promote recovered ones.
    ///
    /// Promotion requires the primary probe to succeed and, only then, the
    /// secondary probe to succeed as well. Any failure leaves the shard
    /// removed until the next cycle.
    pub async fn check_removed(&self) {
        let removed = self.partition.read().shards_in(ShardState::Removed);
        debug!(count = removed.len(), "checking removed shards");

        for (shard, weight) in removed {
            if !matches!(
                self.probe(shard.as_ref(), ClientRole::Primary).await,
                ProbeOutcome::Alive
            ) {
                continue;
            }
            if !matches!(
                self.probe(shard.as_ref(), ClientRole::Secondary).await,
                ProbeOutcome::Alive
            ) {
                continue;
            }

            self.partition
                .write()
                .set_state(shard.name(), ShardState::Active);
            self.ring.write().add_shard(Arc::clone(&shard), weight);
            info!(shard = shard.name(), weight, "shard promoted back into rotation");
        }
    }

    /// Run the perpetual monitoring cycle until cancelled.
    pub(crate) async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.check_active().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.check_interval) => {}
            }

            self.check_removed().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.check_interval) => {}
            }
        }
        debug!("health monitor stopped");
    }

    /// Execute one bounded probe against the given client of a shard.
    async fn probe(&self, shard: &dyn Shard, role: ClientRole) -> ProbeOutcome {
        let attempt = async {
            let client: Arc<dyn ShardClient> = match role {
                ClientRole::Primary => shard.primary_client()?,
                ClientRole::Secondary => shard.secondary_client()?,
            };
            client.probe().await
        };

        match tokio::time::timeout(self.config.probe_timeout, attempt).await {
            Ok(Ok(true)) => ProbeOutcome::Alive,
            Ok(Ok(false)) => {
                debug!(
                    shard = shard.name(),
                    client = role.as_str(),
                    "probe reported backend down"
                );
                ProbeOutcome::Dead
            }
            Ok(Err(e)) => {
                warn!(
                    shard = shard.name(),
                    client = role.as_str(),
                    error = %e,
                    "probe failed"
                );
                ProbeOutcome::Failed
            }
            Err(_) => {
                warn!(
                    shard = shard.name(),
                    client = role.as_str(),
                    timeout_ms = self.config.probe_timeout.as_millis() as u64,
                    "probe timed out"
                );
                ProbeOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("partition", &*self.partition.read())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ProbeBehavior, ScriptedClient, StaticShard};
    use std::time::Duration;

    fn build(
        shards: Vec<Arc<StaticShard>>,
    ) -> (
        Arc<HealthMonitor>,
        Arc<RwLock<ConsistentHashRing>>,
        Arc<RwLock<ShardPartition>>,
    ) {
        let weighted: Vec<(Arc<dyn Shard>, u32)> = shards
            .iter()
            .map(|s| {
                let shard: Arc<dyn Shard> = s.clone();
                (shard, s.weight())
            })
            .collect();

        let ring = Arc::new(RwLock::new(
            ConsistentHashRing::with_shards(&weighted).unwrap(),
        ));
        let partition = Arc::new(RwLock::new(ShardPartition::new(&weighted)));
        let config = RouterConfig::new()
            .with_check_interval(Duration::from_millis(10))
            .with_probe_timeout(Duration::from_millis(50));
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&ring),
            Arc::clone(&partition),
            config,
        ));

        (monitor, ring, partition)
    }

    #[tokio::test]
    async fn test_healthy_shards_stay_active() {
        let shard = StaticShard::healthy("alpha", 1);
        let (monitor, ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(partition.read().state_of("alpha"), Some(ShardState::Active));
        assert!(ring.read().contains("alpha"));
    }

    #[tokio::test]
    async fn test_dead_primary_live_secondary_stays_active() {
        let shard = StaticShard::new(
            "alpha",
            1,
            ScriptedClient::dead(),
            ScriptedClient::alive(),
        );
        let (monitor, ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(partition.read().state_of("alpha"), Some(ShardState::Active));
        assert!(ring.read().contains("alpha"));
        assert_eq!(shard.secondary().probe_count(), 1);
    }

    #[tokio::test]
    async fn test_both_probes_dead_demotes() {
        let shard = StaticShard::new("alpha", 1, ScriptedClient::dead(), ScriptedClient::dead());
        let (monitor, ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
        assert!(!ring.read().contains("alpha"));
    }

    #[tokio::test]
    async fn test_primary_error_demotes_without_consulting_secondary() {
        let shard = StaticShard::new(
            "alpha",
            1,
            ScriptedClient::erroring(),
            ScriptedClient::alive(),
        );
        let (monitor, _ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
        assert_eq!(shard.secondary().probe_count(), 0);
    }

    #[tokio::test]
    async fn test_secondary_error_after_dead_primary_demotes() {
        let shard = StaticShard::new(
            "alpha",
            1,
            ScriptedClient::dead(),
            ScriptedClient::erroring(),
        );
        let (monitor, _ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
    }

    #[tokio::test]
    async fn test_handle_acquisition_failure_demotes() {
        let shard = StaticShard::healthy("alpha", 1);
        shard.deny_handles(true);
        let (monitor, ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
        assert!(!ring.read().contains("alpha"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_is_bounded_and_counts_as_failure() {
        let shard = StaticShard::new(
            "alpha",
            1,
            ScriptedClient::hanging(),
            ScriptedClient::alive(),
        );
        let (monitor, _ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
    }

    #[tokio::test]
    async fn test_one_failing_shard_does_not_stop_the_phase() {
        let bad = StaticShard::new(
            "alpha",
            1,
            ScriptedClient::erroring(),
            ScriptedClient::erroring(),
        );
        let good = StaticShard::healthy("beta", 1);
        let (monitor, _ring, partition) =
            build(vec![Arc::clone(&bad), Arc::clone(&good)]);

        monitor.check_active().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
        assert_eq!(partition.read().state_of("beta"), Some(ShardState::Active));
        // The healthy shard was still probed after the failing one.
        assert_eq!(good.primary().probe_count(), 1);
    }

    #[tokio::test]
    async fn test_promotion_requires_both_probes() {
        let shard = StaticShard::new("alpha", 1, ScriptedClient::dead(), ScriptedClient::dead());
        let (monitor, ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;
        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );

        // Primary recovers alone: not enough.
        shard.set_health(ProbeBehavior::Alive, ProbeBehavior::Dead);
        monitor.check_removed().await;
        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
        assert!(!ring.read().contains("alpha"));

        // Both recover: promoted with the original weight.
        shard.set_health(ProbeBehavior::Alive, ProbeBehavior::Alive);
        monitor.check_removed().await;
        assert_eq!(partition.read().state_of("alpha"), Some(ShardState::Active));
        assert!(ring.read().contains("alpha"));
        assert_eq!(ring.read().member_weight("alpha"), Some(1));
    }

    #[tokio::test]
    async fn test_dead_primary_skips_secondary_during_promotion() {
        let shard = StaticShard::new("alpha", 1, ScriptedClient::dead(), ScriptedClient::dead());
        let (monitor, _ring, partition) = build(vec![Arc::clone(&shard)]);

        monitor.check_active().await;
        let secondary_probes = shard.secondary().probe_count();

        monitor.check_removed().await;

        assert_eq!(
            partition.read().state_of("alpha"),
            Some(ShardState::Removed)
        );
        // Secondary was not consulted while the primary stayed dead.
        assert_eq!(shard.secondary().probe_count(), secondary_probes);
    }

    #[tokio::test]
    async fn test_promoted_shard_restores_weighted_vnodes() {
        let shard = StaticShard::new("alpha", 3, ScriptedClient::dead(), ScriptedClient::dead());
        let other = StaticShard::healthy("beta", 1);
        let (monitor, ring, _partition) = build(vec![Arc::clone(&shard), Arc::clone(&other)]);
        let vnodes_before = ring.read().vnode_count();

        monitor.check_active().await;
        assert!(ring.read().vnode_count() < vnodes_before);

        shard.set_health(ProbeBehavior::Alive, ProbeBehavior::Alive);
        monitor.check_removed().await;

        assert_eq!(ring.read().vnode_count(), vnodes_before);
        assert_eq!(ring.read().member_weight("alpha"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_loop_stops_on_cancellation() {
        let shard = StaticShard::healthy("alpha", 1);
        let (monitor, _ring, _partition) = build(vec![shard]);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&monitor).run(cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor task did not stop after cancellation")
            .expect("monitor task panicked");
    }

    #[tokio::test]
    async fn test_partition_is_always_a_partition() {
        let a = StaticShard::new("alpha", 1, ScriptedClient::dead(), ScriptedClient::dead());
        let b = StaticShard::healthy("beta", 1);
        let (monitor, _ring, partition) = build(vec![Arc::clone(&a), Arc::clone(&b)]);

        monitor.check_active().await;

        let active = partition.read().names_in(ShardState::Active);
        let removed = partition.read().names_in(ShardState::Removed);
        assert_eq!(active.len() + removed.len(), partition.read().len());
        for name in &active {
            assert!(!removed.contains(name));
        }
    }
}
