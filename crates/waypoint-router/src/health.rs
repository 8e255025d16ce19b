//! Tool-server health tracking
//!
//! A failed server sits out a fixed cooldown before it may be used again.
//! Records live only in memory; each conversation owns its own tracker.

use std::collections::HashMap;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};

/// Last-failure timestamps per server
#[derive(Debug, Clone)]
pub struct HealthTracker {
    failures: HashMap<String, Timestamp>,
    cooldown: SignedDuration,
}

impl HealthTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            cooldown: SignedDuration::try_from(cooldown).unwrap_or(SignedDuration::MAX),
        }
    }

    /// Record a failure at `now`, replacing any earlier one
    pub fn mark_unhealthy(&mut self, id: &str, now: Timestamp) {
        tracing::warn!(server = id, cooldown_secs = self.cooldown.as_secs(), "tool server marked unhealthy");
        self.failures.insert(id.to_owned(), now);
    }

    /// Whether `id` is usable at `now`
    ///
    /// True when no failure is recorded or the cooldown has fully elapsed.
    pub fn is_healthy(&self, id: &str, now: Timestamp) -> bool {
        self.failures
            .get(id)
            .is_none_or(|failed_at| now.duration_since(*failed_at) >= self.cooldown)
    }

    /// Forget a failure so the server is eligible immediately
    pub fn clear(&mut self, id: &str) {
        if self.failures.remove(id).is_some() {
            tracing::debug!(server = id, "tool server health cleared");
        }
    }

    /// Keep only the ids that are healthy at `now`, preserving order
    pub fn filter_healthy<'a, I>(&self, ids: I, now: Timestamp) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter(|id| self.is_healthy(id, now))
            .map(str::to_owned)
            .collect()
    }

    /// Drop records whose cooldown has expired
    pub fn prune(&mut self, now: Timestamp) {
        let cooldown = self.cooldown;
        self.failures
            .retain(|_, failed_at| now.duration_since(*failed_at) < cooldown);
    }

    /// Number of servers currently on record
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
