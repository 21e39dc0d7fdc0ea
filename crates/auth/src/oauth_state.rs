//! Single-use, time-bounded OAuth `state` registry.
//!
//! Entries live in process memory only. Consumption removes the entry before
//! looking at its expiry, so a token is accepted at most once even when two
//! callbacks race, and an expired token is rejected whether or not the
//! background sweep has reached it yet.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use tokio::task::JoinHandle;
use tracing::debug;

pub const STATE_BYTES: usize = 64;
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Default)]
pub struct OAuthStateStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token`, valid for `ttl` from now.
    pub fn store(&self, token: impl Into<String>, ttl: Duration) {
        self.store_at(token, ttl, Utc::now());
    }

    pub fn store_at(&self, token: impl Into<String>, ttl: Duration, now: DateTime<Utc>) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(token.into(), expires_at);
    }

    /// Generate a fresh random state (64 bytes, URL-safe base64) and register it.
    pub fn issue(&self, ttl: Duration) -> String {
        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.store(token.clone(), ttl);
        token
    }

    /// Consume `token`. True only if it was present and not past its expiry.
    pub fn validate_and_delete(&self, token: &str) -> bool {
        self.validate_and_delete_at(token, Utc::now())
    }

    pub fn validate_and_delete_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.entries.remove(token) {
            Some((_, expires_at)) => now <= expires_at,
            None => false,
        }
    }

    /// Drop every entry past its expiry at `now`, returning how many went.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| now <= *expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the tokio runtime until
    /// the returned handle is stopped or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired oauth states");
                }
            }
        });
        SweeperHandle { task }
    }
}

/// Owns the background sweep task; aborts it on [`stop`](Self::stop) or drop.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        // Drop does the work.
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
