//! Test doubles for exercising the router and health monitor.
//!
//! [`StaticShard`] is a shard with a fixed name and weight whose primary and
//! secondary clients are [`ScriptedClient`]s: probe outcomes can be queued
//! one-shot or set as a standing fallback, so health-check phases run
//! deterministically without a real backend.

use crate::error::{Error, Result};
use crate::shard::{Shard, ShardClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a [`ScriptedClient`] does on its next probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeBehavior {
    /// Probe returns `Ok(true)`.
    Alive,
    /// Probe returns `Ok(false)`.
    Dead,
    /// Probe returns `Err`.
    Error,
    /// Probe never completes (sleeps far past any sane timeout).
    Hang,
}

/// A client handle with scripted probe outcomes.
pub struct ScriptedClient {
    /// One-shot outcomes consumed before the fallback applies.
    script: Mutex<VecDeque<ProbeBehavior>>,
    fallback: Mutex<ProbeBehavior>,
    probes: AtomicUsize,
}

impl ScriptedClient {
    /// Create a client with the given standing behavior.
    pub fn with_fallback(behavior: ProbeBehavior) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(behavior),
            probes: AtomicUsize::new(0),
        })
    }

    /// A client whose probes always succeed.
    pub fn alive() -> Arc<Self> {
        Self::with_fallback(ProbeBehavior::Alive)
    }

    /// A client whose probes always report the backend down.
    pub fn dead() -> Arc<Self> {
        Self::with_fallback(ProbeBehavior::Dead)
    }

    /// A client whose probes always error.
    pub fn erroring() -> Arc<Self> {
        Self::with_fallback(ProbeBehavior::Error)
    }

    /// A client whose probes hang until timed out.
    pub fn hanging() -> Arc<Self> {
        Self::with_fallback(ProbeBehavior::Hang)
    }

    /// Queue a one-shot outcome ahead of the fallback.
    pub fn push(&self, behavior: ProbeBehavior) {
        self.script.lock().push_back(behavior);
    }

    /// Replace the standing behavior.
    pub fn set_fallback(&self, behavior: ProbeBehavior) {
        *self.fallback.lock() = behavior;
    }

    /// Number of probes executed against this client.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardClient for ScriptedClient {
    async fn probe(&self) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.fallback.lock());

        match behavior {
            ProbeBehavior::Alive => Ok(true),
            ProbeBehavior::Dead => Ok(false),
            ProbeBehavior::Error => Err(Error::Probe("scripted probe error".to_string())),
            ProbeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(true)
            }
        }
    }
}

/// A shard stub with scriptable primary and secondary clients.
pub struct StaticShard {
    name: String,
    weight: u32,
    primary: Arc<ScriptedClient>,
    secondary: Arc<ScriptedClient>,
    deny_handles: AtomicBool,
}

impl StaticShard {
    /// Create a shard with explicit clients.
    pub fn new(
        name: &str,
        weight: u32,
        primary: Arc<ScriptedClient>,
        secondary: Arc<ScriptedClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            weight,
            primary,
            secondary,
            deny_handles: AtomicBool::new(false),
        })
    }

    /// Create a shard whose probes always succeed.
    pub fn healthy(name: &str, weight: u32) -> Arc<Self> {
        Self::new(name, weight, ScriptedClient::alive(), ScriptedClient::alive())
    }

    /// The scripted primary client.
    pub fn primary(&self) -> &Arc<ScriptedClient> {
        &self.primary
    }

    /// The scripted secondary client.
    pub fn secondary(&self) -> &Arc<ScriptedClient> {
        &self.secondary
    }

    /// Set the standing behavior of both clients at once.
    pub fn set_health(&self, primary: ProbeBehavior, secondary: ProbeBehavior) {
        self.primary.set_fallback(primary);
        self.secondary.set_fallback(secondary);
    }

    /// Make `primary_client`/`secondary_client` fail until re-enabled.
    pub fn deny_handles(&self, deny: bool) {
        self.deny_handles.store(deny, Ordering::SeqCst);
    }
}

impl Shard for StaticShard {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn primary_client(&self) -> Result<Arc<dyn ShardClient>> {
        if self.deny_handles.load(Ordering::SeqCst) {
            return Err(Error::Probe(format!("no client available for {}", self.name)));
        }
        let client: Arc<dyn ShardClient> = self.primary.clone();
        Ok(client)
    }

    fn secondary_client(&self) -> Result<Arc<dyn ShardClient>> {
        if self.deny_handles.load(Ordering::SeqCst) {
            return Err(Error::Probe(format!("no client available for {}", self.name)));
        }
        let client: Arc<dyn ShardClient> = self.secondary.clone();
        Ok(client)
    }
}

impl std::fmt::Debug for StaticShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticShard")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}
