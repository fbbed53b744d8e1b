//! Consistent-hash routing of keyed operations across backend connection
//! shards, with self-healing membership.
//!
//! This crate provides a shard router that uses:
//! - **Weighted consistent hashing** to map keys to shards with bounded
//!   remapping on membership changes
//! - **A background health monitor** that demotes unresponsive shards out
//!   of rotation and promotes them back once they recover
//!
//! # Features
//!
//! - O(log n) key resolution over a virtual-node ring
//! - Weighted shards: a shard's weight sets its proportional key share
//! - Deterministic virtual-node placement, so a recovered shard reclaims
//!   exactly the keys it owned before
//! - Demotion needs both the primary and secondary client to fail;
//!   promotion needs both to succeed
//! - Timeout-bounded probes and cancellable monitoring
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shardpool::testing::StaticShard;
//! use shardpool::{RouterConfig, Shard, ShardRouter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any type implementing `Shard` works; the test doubles do here.
//!     let shards: Vec<Arc<dyn Shard>> = vec![
//!         StaticShard::healthy("alpha", 1),
//!         StaticShard::healthy("beta", 1),
//!         StaticShard::healthy("gamma", 2),
//!     ];
//!
//!     // Monitoring starts immediately.
//!     let router = ShardRouter::new(shards, RouterConfig::default())?;
//!
//!     let shard = router.resolve("user:1234")?;
//!     println!("user:1234 -> {}", shard.name());
//!
//!     router.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Caller threads/tasks              │
//! └─────────────────────────────────────────────┘
//!                     │ resolve(key)
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │               ShardRouter                    │
//! │  RwLock<ConsistentHashRing> ◄── mutations ──┼──┐
//! └─────────────────────────────────────────────┘  │
//!                     │                            │
//!          ┌──────────┴──────────┐      ┌──────────┴─────────┐
//!          ▼                     ▼      │   HealthMonitor     │
//! ┌─────────────┐       ┌─────────────┐ │ check active shards │
//! │  Shard ...  │       │  Shard ...  │ │ check removed shards│
//! └─────────────┘       └─────────────┘ └─────────────────────┘
//! ```
//!
//! # Consistency Model
//!
//! - **Resolution**: deterministic for a fixed membership; best-effort
//!   affinity across membership changes
//! - **Demotion/promotion latency**: bounded by one full monitor cycle
//!   (two check intervals)
//! - **Probe errors**: absorbed by the monitor, never surfaced to callers

pub mod config;
pub mod error;
pub mod monitor;
pub mod ring;
pub mod router;
pub mod shard;
pub mod testing;

// Re-export main types for convenience
pub use config::RouterConfig;
pub use error::{Error, Result};
pub use monitor::{HealthMonitor, ShardPartition, ShardState};
pub use ring::{ConsistentHashRing, VNODES_PER_WEIGHT};
pub use router::ShardRouter;
pub use shard::{Shard, ShardClient};

// Re-export test doubles
pub use testing::{ProbeBehavior, ScriptedClient, StaticShard};
