//! Consistent hashing ring with weighted virtual nodes.
//!
//! Maps hashed key positions to shard targets. Each shard is represented by
//! multiple virtual nodes (vnodes) proportional to its weight, so weight
//! predicts load share and any single membership change only remaps the
//! keys that hashed onto the affected vnode arcs.

use crate::error::{Error, Result};
use crate::shard::Shard;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use twox_hash::XxHash64;

/// Number of virtual nodes created per unit of shard weight.
/// More vnodes = more even distribution but higher memory usage.
pub const VNODES_PER_WEIGHT: u32 = 64;

/// A consistent hash ring distributing keys across weighted shards.
pub struct ConsistentHashRing {
    /// Virtual nodes mapped to their owning shards.
    /// The key is the hash position on the ring.
    vnodes: BTreeMap<u64, Arc<dyn Shard>>,

    /// Current members, name to weight. Removal uses the recorded weight
    /// so exactly the vnodes inserted at addition are deleted.
    members: HashMap<String, u32>,
}

impl ConsistentHashRing {
    /// Create a new empty ring.
    pub fn new() -> Self {
        Self {
            vnodes: BTreeMap::new(),
            members: HashMap::new(),
        }
    }

    /// Build a ring over an initial shard set.
    ///
    /// Fails with [`Error::Config`] if the set is empty, contains a
    /// zero weight, or contains a duplicate shard name. No partial ring is
    /// constructed on failure.
    pub fn with_shards(shards: &[(Arc<dyn Shard>, u32)]) -> Result<Self> {
        if shards.is_empty() {
            return Err(Error::Config("shard list is empty".to_string()));
        }

        let mut ring = Self::new();
        for (shard, weight) in shards {
            if *weight == 0 {
                return Err(Error::Config(format!(
                    "shard {} has zero weight",
                    shard.name()
                )));
            }
            if ring.members.contains_key(shard.name()) {
                return Err(Error::Config(format!(
                    "duplicate shard name: {}",
                    shard.name()
                )));
            }
            ring.add_shard(Arc::clone(shard), *weight);
        }

        Ok(ring)
    }

    /// Get the number of member shards.
    pub fn shard_count(&self) -> usize {
        self.members.len()
    }

    /// Get the number of virtual nodes on the ring.
    pub fn vnode_count(&self) -> usize {
        self.vnodes.len()
    }

    /// Check if the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a shard is a member of the ring.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Get the recorded weight of a member shard.
    pub fn member_weight(&self, name: &str) -> Option<u32> {
        self.members.get(name).copied()
    }

    /// Add a shard to the ring.
    ///
    /// Creates `weight * VNODES_PER_WEIGHT` virtual nodes at deterministic
    /// positions derived from the shard name and replica index. No-op if
    /// the shard is already a member, so positions are never duplicated.
    pub fn add_shard(&mut self, shard: Arc<dyn Shard>, weight: u32) {
        let name = shard.name().to_string();
        if self.members.contains_key(&name) {
            return;
        }

        for position in Self::vnode_positions(&name, weight) {
            self.vnodes.insert(position, Arc::clone(&shard));
        }
        self.members.insert(name, weight);
    }

    /// Remove a shard from the ring.
    ///
    /// Deletes exactly the virtual nodes inserted when the shard was added.
    /// No-op if the shard is not a member.
    pub fn remove_shard(&mut self, name: &str) {
        if let Some(weight) = self.members.remove(name) {
            for position in Self::vnode_positions(name, weight) {
                self.vnodes.remove(&position);
            }
        }
    }

    /// Resolve a key to the shard owning its ring position.
    ///
    /// Hashes the key and walks to the first vnode at or after that
    /// position, wrapping to the first vnode on the ring if none follows.
    /// Fails with [`Error::EmptyRing`] when no shards are registered.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn Shard>> {
        if self.vnodes.is_empty() {
            return Err(Error::EmptyRing);
        }

        let hash = hash_position(key.as_bytes());
        self.vnodes
            .range(hash..)
            .next()
            .or_else(|| self.vnodes.iter().next())
            .map(|(_, shard)| Arc::clone(shard))
            .ok_or(Error::EmptyRing)
    }

    /// The deterministic vnode positions for a shard name and weight.
    pub fn vnode_positions(name: &str, weight: u32) -> Vec<u64> {
        (0..weight.saturating_mul(VNODES_PER_WEIGHT))
            .map(|i| {
                let label = format!("{}:{}", name, i);
                hash_position(label.as_bytes())
            })
            .collect()
    }

    /// Get the distribution of sample keys across member shards.
    ///
    /// Useful for testing/monitoring key distribution.
    pub fn distribution(&self, sample_size: usize) -> HashMap<String, usize> {
        let mut distribution = HashMap::new();

        for i in 0..sample_size {
            let key = format!("sample-key-{}", i);
            if let Ok(shard) = self.resolve(&key) {
                *distribution.entry(shard.name().to_string()).or_insert(0) += 1;
            }
        }

        distribution
    }
}

impl Default for ConsistentHashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsistentHashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistentHashRing")
            .field("shard_count", &self.members.len())
            .field("vnode_count", &self.vnodes.len())
            .finish()
    }
}

/// Calculate the ring position of a byte string using xxHash64.
fn hash_position(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    data.hash(&mut hasher);
    hasher.finish()
}
