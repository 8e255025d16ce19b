//! Per-conversation turn handling
//!
//! A turn runs the agent against the cached tool servers. When the agent asks
//! for discovery, the registry is searched, matches are admitted to the cache
//! and the agent runs again. All cache, health and usage mutation happens
//! after the last agent run returns; a failed turn leaves them untouched.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use itertools::Itertools;
use jiff::Timestamp;
use waypoint_config::RouterConfig;
use waypoint_core::{AgentExecutor, AgentOutcome, AgentRequest, ConversationTurn, Role, ToolInvocation, UserFacingError};
use waypoint_telemetry::metrics as telemetry;

use crate::error::RouterError;
use crate::health::HealthTracker;
use crate::history::History;
use crate::instructions;
use crate::metrics::{UsageMetrics, UsageRecord};
use crate::registry::{EmbeddingRegistry, SearchHit, SearchThresholds};
use crate::tool_cache::ToolCache;

/// What a turn produced
#[derive(Debug, Clone, Default)]
pub struct TurnReply {
    /// Text shown to the user
    pub text: String,
    /// Every tool call made during the turn, in order
    pub invocations: Vec<ToolInvocation>,
    /// Servers newly admitted to the cache by discovery
    pub discovered: Vec<String>,
    /// Servers pushed out of the cache to make room
    pub evicted: Vec<String>,
    /// Non-fatal problems
    pub diagnostics: Vec<RouterError>,
    /// Set when the turn failed and state was rolled back
    pub failure: Option<RouterError>,
}

impl TurnReply {
    pub const fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of the execution phase, applied during post-processing
struct Execution {
    output: String,
    invocations: Vec<ToolInvocation>,
    cache: ToolCache,
    discovered: Vec<String>,
    evicted: Vec<String>,
    diagnostics: Vec<RouterError>,
}

/// One conversation's private routing state
///
/// Registry and usage metrics are shared with every other conversation of
/// the same runtime; cache, health and history are not.
pub struct Conversation {
    registry: Arc<EmbeddingRegistry>,
    metrics: Arc<UsageMetrics>,
    executor: Arc<dyn AgentExecutor>,
    config: Arc<RouterConfig>,
    cache: ToolCache,
    health: HealthTracker,
    history: History,
}

impl Conversation {
    pub(crate) fn new(
        registry: Arc<EmbeddingRegistry>,
        metrics: Arc<UsageMetrics>,
        executor: Arc<dyn AgentExecutor>,
        config: Arc<RouterConfig>,
        preload: &[String],
    ) -> Self {
        let mut cache = ToolCache::new(config.cache_max_size);
        // least used first so the most used end up most recent
        cache.add(preload.iter().rev().cloned());

        Self {
            health: HealthTracker::new(config.health_cooldown()),
            history: History::new(config.max_history_turns),
            cache,
            registry,
            metrics,
            executor,
            config,
        }
    }

    /// Process one user turn to completion
    ///
    /// Never returns an error: a failed turn is reported through
    /// [`TurnReply::failure`] and recorded in history as an error marker.
    pub async fn handle_turn(&mut self, input: &str) -> TurnReply {
        let started = Instant::now();
        self.health.prune(Timestamp::now());

        let reply = match self.execute(input).await {
            Ok(execution) => {
                let reply = self.commit(input, execution);
                self.persist_usage(&reply.invocations).await;
                reply
            }
            Err(error) => self.roll_back(input, error),
        };

        telemetry::record_turn(started, reply.is_ok());
        reply
    }

    /// Cached server ids, least recently used first
    pub fn cache_contents(&self) -> Vec<String> {
        self.cache.get_all()
    }

    /// Number of retained history entries
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Number of retained user turns
    pub fn turn_count(&self) -> usize {
        self.history.turn_count()
    }

    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history.window()
    }

    /// Whether a server is currently outside its cooldown
    pub fn is_healthy(&self, server: &str) -> bool {
        self.health.is_healthy(server, Timestamp::now())
    }

    async fn execute(&self, input: &str) -> Result<Execution, RouterError> {
        let mut messages = self.history.window();
        messages.push(ConversationTurn::user(input));

        let mut execution = Execution {
            output: String::new(),
            invocations: Vec::new(),
            cache: self.cache.clone(),
            discovered: Vec::new(),
            evicted: Vec::new(),
            diagnostics: Vec::new(),
        };
        let mut feedback: Option<String> = None;
        let mut rounds = 0;

        loop {
            let now = Timestamp::now();
            let servers = self.health.filter_healthy(execution.cache.iter(), now);

            let request = AgentRequest {
                messages: messages.clone(),
                model: self.config.execution_model.clone(),
                instructions: instructions::build(&servers, feedback.as_deref()),
                servers,
                max_steps: self.config.max_steps,
            };

            let outcome = self.run_agent(&request).await?;
            execution.invocations.extend(outcome.invocations);
            execution.output = outcome.final_output;

            let Some(discovery) = outcome.discovery else {
                break;
            };

            if rounds >= self.config.max_discovery_rounds {
                tracing::warn!(rounds, "agent kept requesting discovery, ending turn");
                let limit = RouterError::DiscoveryLimitExceeded { rounds };
                if execution.output.trim().is_empty() {
                    execution.output = limit.client_message();
                }
                execution.diagnostics.push(limit);
                break;
            }
            rounds += 1;

            let hits = self.discover(&discovery.queries, input).await?;
            let admitted = self.admissible(&hits, now, execution.cache.max_size());

            let fresh: Vec<String> = admitted
                .iter()
                .filter(|id| !execution.cache.contains(id) && !execution.discovered.contains(id))
                .cloned()
                .collect();

            // best match last so it is the most recently used
            execution.evicted.extend(execution.cache.add(admitted.iter().rev().cloned()));
            let available: Vec<String> = admitted
                .into_iter()
                .filter(|id| execution.cache.contains(id))
                .collect();

            tracing::info!(
                round = rounds,
                queries = ?discovery.queries,
                matched = hits.len(),
                admitted = ?fresh,
                "discovery round complete"
            );
            telemetry::record_discovery(hits.len());

            execution.discovered.extend(fresh);
            feedback = Some(instructions::discovery_feedback(&hits, &available));
        }

        // a server evicted and then re-admitted in the same turn is still cached
        let cache = &execution.cache;
        execution.evicted.retain(|id| !cache.contains(id));
        execution.discovered.retain(|id| cache.contains(id));

        Ok(execution)
    }

    /// Healthy hits that fit in the cache, best score first
    fn admissible(&self, hits: &[SearchHit], now: Timestamp, capacity: usize) -> Vec<String> {
        let healthy = self.health.filter_healthy(hits.iter().map(|h| h.id.as_str()), now);

        hits.iter()
            .filter(|hit| healthy.contains(&hit.id))
            .sorted_by(|a, b| b.score.total_cmp(&a.score))
            .take(capacity)
            .map(|hit| hit.id.clone())
            .collect()
    }

    async fn run_agent(&self, request: &AgentRequest) -> Result<AgentOutcome, RouterError> {
        let timeout = self.config.execution_timeout;

        match tokio::time::timeout(timeout, self.executor.run(request)).await {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    steps = outcome.steps_used,
                    invocations = outcome.invocations.len(),
                    discovery = outcome.discovery.is_some(),
                    "agent run finished"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => Err(RouterError::ExecutionFailed(e.to_string())),
            Err(_) => Err(RouterError::ExecutionFailed(format!(
                "agent run timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Search the registry, widening to recent context when the agent's
    /// own queries match nothing
    async fn discover(&self, queries: &[String], input: &str) -> Result<Vec<SearchHit>, RouterError> {
        let thresholds = SearchThresholds {
            similarity: self.config.similarity_threshold,
            relative_cutoff: self.config.relative_score_cutoff,
        };

        let hits = self
            .registry
            .search_hits(queries, thresholds)
            .await
            .map_err(|e| RouterError::ExecutionFailed(format!("discovery search failed: {e}")))?;

        if !hits.is_empty() || self.config.discovery_context_turns == 0 {
            return Ok(hits);
        }

        let context = self.discovery_context(input);
        tracing::debug!(context_len = context.len(), "no direct matches, searching with conversation context");

        self.registry
            .search_hits(&[context], thresholds)
            .await
            .map_err(|e| RouterError::ExecutionFailed(format!("discovery search failed: {e}")))
    }

    fn discovery_context(&self, input: &str) -> String {
        self.history
            .window_for_discovery(self.config.discovery_context_turns)
            .into_iter()
            .filter(|turn| turn.role == Role::User)
            .map(|turn| turn.content)
            .chain(std::iter::once(input.to_owned()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn commit(&mut self, input: &str, execution: Execution) -> TurnReply {
        let Execution {
            output,
            invocations,
            cache,
            discovered,
            evicted,
            mut diagnostics,
        } = execution;

        self.cache = cache;
        let now = Timestamp::now();

        // first failing tool per server; a server that failed anywhere in
        // the turn counts as failed even if other calls succeeded
        let mut failed: IndexMap<&str, &str> = IndexMap::new();
        for call in invocations.iter().filter(|c| !c.success) {
            failed.entry(call.server.as_str()).or_insert(call.tool.as_str());
        }

        for (server, tool) in &failed {
            self.health.mark_unhealthy(server, now);
            self.cache.remove(server);
            self.executor.forget_server(server);
            diagnostics.push(RouterError::ToolInvocationFailed {
                server: (*server).to_owned(),
                tool: (*tool).to_owned(),
            });
        }

        for call in invocations.iter().filter(|c| c.success && !failed.contains_key(c.server.as_str())) {
            self.cache.touch(&call.server);
            self.health.clear(&call.server);
        }

        for call in &invocations {
            telemetry::record_tool_call(&call.server, call.success);
        }

        telemetry::record_evictions(evicted.len());

        self.history.append(ConversationTurn::user(input));
        self.history
            .append(ConversationTurn::assistant(output.clone()).with_tool_calls(invocations.clone()));

        tracing::info!(
            invocations = invocations.len(),
            failed = failed.len(),
            discovered = discovered.len(),
            cached = self.cache.len(),
            "turn complete"
        );

        TurnReply {
            text: output,
            invocations,
            discovered,
            evicted,
            diagnostics,
            failure: None,
        }
    }

    /// Append the turn's invocations to the usage log off the async runtime
    async fn persist_usage(&self, invocations: &[ToolInvocation]) {
        if invocations.is_empty() {
            return;
        }

        let now = Timestamp::now();
        let records: Vec<UsageRecord> = invocations
            .iter()
            .map(|call| UsageRecord {
                server: call.server.clone(),
                timestamp: now,
                success: Some(call.success),
            })
            .collect();
        let count = records.len();
        let metrics = Arc::clone(&self.metrics);

        let result = tokio::task::spawn_blocking(move || metrics.record_all(&records))
            .await
            .unwrap_or_else(|e| Err(RouterError::MetricsWriteFailed(e.to_string())));

        if let Err(e) = result {
            tracing::warn!(records = count, error = %e, "usage records lost");
        }
    }

    fn roll_back(&mut self, input: &str, error: RouterError) -> TurnReply {
        tracing::error!(error = %error, "turn failed");

        let message = error.client_message();
        self.history.append(ConversationTurn::user(input));
        self.history.append(ConversationTurn::assistant_error(message.clone()));

        TurnReply {
            text: message,
            failure: Some(error),
            ..TurnReply::default()
        }
    }
}
