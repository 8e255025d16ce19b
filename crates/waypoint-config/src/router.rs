use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Tunables for discovery, caching, history, and health tracking
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Model identifier passed to the agent executor (e.g. "openai/gpt-4o-mini")
    #[serde(default = "default_execution_model")]
    pub execution_model: String,
    /// Absolute cosine similarity floor for a registry match
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Fraction of the best score a match must reach for the same query
    #[serde(default = "default_relative_score_cutoff")]
    pub relative_score_cutoff: f64,
    /// Maximum number of tool servers held in the cache
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Number of historically popular servers seeded at startup
    #[serde(default = "default_preload_count")]
    pub preload_count: usize,
    /// Maximum number of conversation turns kept in history
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// Maximum agent steps per execution
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Maximum discovery round-trips within a single turn
    #[serde(default = "default_max_discovery_rounds")]
    pub max_discovery_rounds: u32,
    /// Number of recent turns used to build a fallback discovery query
    #[serde(default = "default_discovery_context_turns")]
    pub discovery_context_turns: usize,
    /// How long a failed server stays excluded
    #[serde(default = "default_health_cooldown_seconds")]
    pub health_cooldown_seconds: u64,
    /// Upper bound on a single agent execution (e.g. "2m")
    #[serde(default = "default_execution_timeout", deserialize_with = "deserialize_duration")]
    pub execution_timeout: Duration,
    /// Upper bound on a single embedding call (e.g. "30s")
    #[serde(default = "default_embedding_timeout", deserialize_with = "deserialize_duration")]
    pub embedding_timeout: Duration,
    /// Append-only usage log
    #[serde(default = "default_metrics_file")]
    pub metrics_file: PathBuf,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            execution_model: default_execution_model(),
            similarity_threshold: default_similarity_threshold(),
            relative_score_cutoff: default_relative_score_cutoff(),
            cache_max_size: default_cache_max_size(),
            preload_count: default_preload_count(),
            max_history_turns: default_max_history_turns(),
            max_steps: default_max_steps(),
            max_discovery_rounds: default_max_discovery_rounds(),
            discovery_context_turns: default_discovery_context_turns(),
            health_cooldown_seconds: default_health_cooldown_seconds(),
            execution_timeout: default_execution_timeout(),
            embedding_timeout: default_embedding_timeout(),
            metrics_file: default_metrics_file(),
        }
    }
}

impl RouterConfig {
    /// Cooldown window as a `Duration`
    pub const fn health_cooldown(&self) -> Duration {
        Duration::from_secs(self.health_cooldown_seconds)
    }

    /// Validate value ranges
    ///
    /// # Errors
    ///
    /// Returns a description of the first out-of-range value
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.relative_score_cutoff) {
            return Err(format!(
                "router.relative_score_cutoff must be within [0, 1], got {}",
                self.relative_score_cutoff
            ));
        }
        if self.cache_max_size == 0 {
            return Err("router.cache_max_size must be at least 1".to_owned());
        }
        if self.max_history_turns < 2 {
            return Err("router.max_history_turns must be at least 2".to_owned());
        }
        if self.max_discovery_rounds == 0 {
            return Err("router.max_discovery_rounds must be at least 1".to_owned());
        }
        if self.max_steps == 0 {
            return Err("router.max_steps must be at least 1".to_owned());
        }
        if self.execution_timeout.is_zero() || self.embedding_timeout.is_zero() {
            return Err("router timeouts must be greater than zero".to_owned());
        }
        Ok(())
    }
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

fn default_execution_model() -> String {
    "openai/gpt-4o-mini".to_owned()
}
#[allow(clippy::missing_const_for_fn)]
fn default_similarity_threshold() -> f64 {
    0.25
}
#[allow(clippy::missing_const_for_fn)]
fn default_relative_score_cutoff() -> f64 {
    0.6
}
#[allow(clippy::missing_const_for_fn)]
fn default_cache_max_size() -> usize {
    10
}
#[allow(clippy::missing_const_for_fn)]
fn default_preload_count() -> usize {
    5
}
#[allow(clippy::missing_const_for_fn)]
fn default_max_history_turns() -> usize {
    20
}
#[allow(clippy::missing_const_for_fn)]
fn default_max_steps() -> u32 {
    10
}
#[allow(clippy::missing_const_for_fn)]
fn default_max_discovery_rounds() -> u32 {
    3
}
#[allow(clippy::missing_const_for_fn)]
fn default_discovery_context_turns() -> usize {
    4
}
#[allow(clippy::missing_const_for_fn)]
fn default_health_cooldown_seconds() -> u64 {
    300
}
#[allow(clippy::missing_const_for_fn)]
fn default_execution_timeout() -> Duration {
    Duration::from_secs(120)
}
#[allow(clippy::missing_const_for_fn)]
fn default_embedding_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_metrics_file() -> PathBuf {
    PathBuf::from("data/usage_metrics.jsonl")
}
