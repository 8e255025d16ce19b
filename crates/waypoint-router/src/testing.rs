//! Deterministic collaborators for router tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use waypoint_config::RegistryEntry;
use waypoint_core::{
    AgentError, AgentExecutor, AgentOutcome, AgentRequest, DiscoveryRequest, EmbedError, Embedder, ToolInvocation,
};

const VOCABULARY: &[&str] = &[
    "stock", "price", "data", "market", "web", "fetch", "page", "weather", "forecast", "translate", "text", "news",
];

pub fn entry(id: &str, description: &str) -> RegistryEntry {
    RegistryEntry::new(id, description)
}

/// Bag-of-words over a fixed vocabulary
#[derive(Default)]
pub struct KeywordEmbedder {
    /// Return one vector fewer than asked for
    pub drop_last: bool,
    /// Sleep before answering
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    #[allow(clippy::cast_precision_loss)]
    pub fn vector(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        VOCABULARY
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| Self::vector(t)).collect();
        if self.drop_last {
            vectors.pop();
        }
        Ok(vectors)
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Unavailable("connection refused".to_owned()))
    }
}

/// Agent that replays queued outcomes and records what it was asked
#[derive(Default)]
pub struct ScriptedAgent {
    script: Mutex<VecDeque<Result<AgentOutcome, AgentError>>>,
    requests: Mutex<Vec<AgentRequest>>,
    forgotten: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn answer(self, text: &str, invocations: Vec<ToolInvocation>) -> Self {
        self.push(Ok(AgentOutcome {
            final_output: text.to_owned(),
            invocations,
            steps_used: 1,
            discovery: None,
        }))
    }

    #[must_use]
    pub fn discover(self, queries: &[&str], invocations: Vec<ToolInvocation>) -> Self {
        self.push(Ok(AgentOutcome {
            final_output: String::new(),
            invocations,
            steps_used: 1,
            discovery: Some(DiscoveryRequest {
                queries: queries.iter().map(|q| (*q).to_owned()).collect(),
            }),
        }))
    }

    #[must_use]
    pub fn fail(self) -> Self {
        self.push(Err(AgentError::Transport("connection reset".to_owned())))
    }

    fn push(self, outcome: Result<AgentOutcome, AgentError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentExecutor for ScriptedAgent {
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(AgentOutcome {
                final_output: "done".to_owned(),
                ..AgentOutcome::default()
            })
        })
    }

    fn forget_server(&self, server: &str) {
        self.forgotten.lock().unwrap().push(server.to_owned());
    }
}
