//! Tool-server registry with cached embeddings and semantic search
//!
//! Every entry is embedded once at load time. After that the registry is
//! immutable and can be shared across conversations without locking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use waypoint_config::RegistryEntry;
use waypoint_core::Embedder;

use crate::error::RouterError;

/// Separator between metadata fields in the embedding text
const FIELD_DELIMITER: &str = " | ";

/// Separator between keywords
const KEYWORD_DELIMITER: &str = ", ";

/// A registry entry that matched a discovery query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Server identifier
    pub id: String,
    /// Registry description
    pub description: String,
    /// Best cosine similarity across the queries, rounded to 4 places
    pub score: f64,
}

/// Similarity filters applied per query
#[derive(Debug, Clone, Copy)]
pub struct SearchThresholds {
    /// Absolute floor
    pub similarity: f64,
    /// Fraction of the best score for the same query
    pub relative_cutoff: f64,
}

struct EmbeddedEntry {
    entry: RegistryEntry,
    vector: Vec<f32>,
}

/// Registry entries and their embedding vectors
pub struct EmbeddingRegistry {
    entries: Vec<EmbeddedEntry>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl EmbeddingRegistry {
    /// Embed every entry in one batched call
    ///
    /// Fails as a whole if the embedder fails, times out, or returns the
    /// wrong number of vectors: routing over a partially embedded registry
    /// would silently miss servers.
    pub async fn load(
        entries: Vec<RegistryEntry>,
        embedder: Arc<dyn Embedder>,
        timeout: Duration,
    ) -> Result<Self, RouterError> {
        if entries.is_empty() {
            tracing::warn!("registry is empty, discovery will never find a tool server");
            return Ok(Self {
                entries: Vec::new(),
                embedder,
                timeout,
            });
        }

        let texts: Vec<String> = entries.iter().map(embedding_text).collect();
        let vectors = embed_with_timeout(embedder.as_ref(), &texts, timeout).await?;

        if vectors.len() != entries.len() {
            return Err(RouterError::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} registry entries",
                vectors.len(),
                entries.len()
            )));
        }

        let entries: Vec<EmbeddedEntry> = entries
            .into_iter()
            .zip(vectors)
            .map(|(entry, vector)| EmbeddedEntry { entry, vector })
            .collect();

        tracing::info!(count = entries.len(), "cached registry embeddings");

        Ok(Self {
            entries,
            embedder,
            timeout,
        })
    }

    /// Number of embedded entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is a registered server
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Look up an entry by identifier
    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().map(|e| &e.entry).find(|e| e.id == id)
    }

    /// Identifiers in registry order
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.entry.id.clone()).collect()
    }

    /// Search the registry, returning the matching identifiers
    pub async fn search(
        &self,
        queries: &[String],
        thresholds: SearchThresholds,
    ) -> Result<Vec<String>, RouterError> {
        let hits = self.search_hits(queries, thresholds).await?;
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    /// Search the registry, returning matches with their scores
    ///
    /// An entry matches a query when its similarity reaches both the
    /// absolute threshold and `relative_cutoff` times the best similarity
    /// for that query. Results are the union over all queries, unique by
    /// identifier, in order of first match.
    pub async fn search_hits(
        &self,
        queries: &[String],
        thresholds: SearchThresholds,
    ) -> Result<Vec<SearchHit>, RouterError> {
        let queries: Vec<String> = queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_owned)
            .collect();

        if queries.is_empty() || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let query_vectors = embed_with_timeout(self.embedder.as_ref(), &queries, self.timeout).await?;

        if query_vectors.len() != queries.len() {
            return Err(RouterError::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} queries",
                query_vectors.len(),
                queries.len()
            )));
        }

        let mut matched: IndexMap<&str, SearchHit> = IndexMap::new();

        for (query, query_vector) in queries.iter().zip(&query_vectors) {
            let scored: Vec<(&EmbeddedEntry, f64)> = self
                .entries
                .iter()
                .map(|e| (e, cosine_similarity(query_vector, &e.vector)))
                .filter(|(_, score)| *score >= thresholds.similarity)
                .collect();

            let Some(best) = scored.iter().map(|(_, score)| *score).reduce(f64::max) else {
                tracing::debug!(query, "no registry entry above threshold");
                continue;
            };

            let cutoff = best * thresholds.relative_cutoff;

            for (embedded, score) in scored.into_iter().filter(|(_, score)| *score >= cutoff) {
                let score = round_score(score);
                matched
                    .entry(embedded.entry.id.as_str())
                    .and_modify(|hit| hit.score = hit.score.max(score))
                    .or_insert_with(|| SearchHit {
                        id: embedded.entry.id.clone(),
                        description: embedded.entry.description.clone(),
                        score,
                    });
            }
        }

        waypoint_telemetry::metrics::record_search(started);
        tracing::debug!(queries = queries.len(), matches = matched.len(), "registry search complete");

        Ok(matched.into_values().collect())
    }
}

/// Build the text embedded for a registry entry
///
/// Format: `name | category | description | kw1, kw2`, with absent or
/// empty fields omitted.
pub fn embedding_text(entry: &RegistryEntry) -> String {
    let keywords = entry.keywords.join(KEYWORD_DELIMITER);

    [
        entry.name.as_deref(),
        entry.category.as_deref(),
        Some(entry.description.as_str()),
        Some(keywords.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|field| !field.is_empty())
    .collect::<Vec<_>>()
    .join(FIELD_DELIMITER)
}

/// Cosine similarity of two vectors
///
/// Zero-length or zero-norm vectors score 0. Vectors of different length
/// are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0_f64, 0.0_f64, 0.0_f64), |(dot, na, nb), (x, y)| {
        let (x, y) = (f64::from(*x), f64::from(*y));
        (x.mul_add(y, dot), x.mul_add(x, na), y.mul_add(y, nb))
    });

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot / denominator
}

fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

async fn embed_with_timeout(
    embedder: &dyn Embedder,
    texts: &[String],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, RouterError> {
    match tokio::time::timeout(timeout, embedder.embed(texts)).await {
        Ok(Ok(vectors)) => Ok(vectors),
        Ok(Err(e)) => Err(RouterError::EmbeddingUnavailable(e.to_string())),
        Err(_) => Err(RouterError::EmbeddingUnavailable(format!(
            "embedding call timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEmbedder, KeywordEmbedder, entry};

    const THRESHOLDS: SearchThresholds = SearchThresholds {
        similarity: 0.25,
        relative_cutoff: 0.6,
    };

    async fn two_entry_registry() -> EmbeddingRegistry {
        EmbeddingRegistry::load(
            vec![entry("stocks", "stock data"), entry("fetch", "web fetch")],
            Arc::new(KeywordEmbedder::default()),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[test]
    fn embedding_text_joins_present_fields() {
        let mut finance = entry("tsion/yahoo-finance-mcp", "Stock data");
        finance.name = Some("Yahoo Finance".to_owned());
        finance.category = Some("finance".to_owned());
        finance.keywords = vec!["MSFT".to_owned()];

        let text = embedding_text(&finance);
        assert_eq!(text, "Yahoo Finance | finance | Stock data | MSFT");
        assert_eq!(text, embedding_text(&finance));
    }

    #[test]
    fn embedding_text_omits_absent_and_empty_fields() {
        let mut bare = entry("x", "Fetch pages");
        bare.category = Some(String::new());
        assert_eq!(embedding_text(&bare), "Fetch pages");

        bare.keywords = vec!["http".to_owned(), "html".to_owned()];
        assert_eq!(embedding_text(&bare), "Fetch pages | http, html");
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3_f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stock_query_matches_only_stock_server() {
        let registry = two_entry_registry().await;
        let ids = registry.search(&["stock price".to_owned()], THRESHOLDS).await.unwrap();
        assert_eq!(ids, vec!["stocks".to_owned()]);
    }

    #[tokio::test]
    async fn threshold_above_one_matches_nothing() {
        let registry = two_entry_registry().await;
        let thresholds = SearchThresholds {
            similarity: 1.1,
            relative_cutoff: 0.6,
        };
        let ids = registry.search(&["x".to_owned()], thresholds).await.unwrap();
        assert!(ids.is_empty());

        let ids = registry.search(&["stock data".to_owned()], thresholds).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn results_are_the_union_across_queries() {
        let registry = two_entry_registry().await;
        let queries = vec!["stock price".to_owned(), "fetch a web page".to_owned()];
        let ids = registry.search(&queries, THRESHOLDS).await.unwrap();
        assert_eq!(ids, vec!["stocks".to_owned(), "fetch".to_owned()]);
    }

    #[tokio::test]
    async fn relative_cutoff_drops_weak_matches() {
        let registry = EmbeddingRegistry::load(
            vec![entry("strong", "stock price data market"), entry("weak", "stock web fetch page")],
            Arc::new(KeywordEmbedder::default()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let loose = SearchThresholds {
            similarity: 0.1,
            relative_cutoff: 0.0,
        };
        let all = registry.search(&["stock price market".to_owned()], loose).await.unwrap();
        assert_eq!(all.len(), 2);

        let strict = SearchThresholds {
            similarity: 0.1,
            relative_cutoff: 0.9,
        };
        let best_only = registry.search(&["stock price market".to_owned()], strict).await.unwrap();
        assert_eq!(best_only, vec!["strong".to_owned()]);
    }

    #[tokio::test]
    async fn search_is_deterministic() {
        let registry = two_entry_registry().await;
        let queries = vec!["stock price".to_owned(), "web".to_owned()];
        let first = registry.search_hits(&queries, THRESHOLDS).await.unwrap();
        let second = registry.search_hits(&queries, THRESHOLDS).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn blank_queries_skip_the_embedder() {
        let registry = EmbeddingRegistry {
            entries: Vec::new(),
            embedder: Arc::new(FailingEmbedder),
            timeout: Duration::from_secs(1),
        };
        assert!(registry.search(&["  ".to_owned()], THRESHOLDS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_fails_loudly_when_embedder_is_down() {
        let result = EmbeddingRegistry::load(
            vec![entry("a", "anything")],
            Arc::new(FailingEmbedder),
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(RouterError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn load_rejects_short_batches() {
        let embedder = KeywordEmbedder {
            drop_last: true,
            ..KeywordEmbedder::default()
        };
        let result = EmbeddingRegistry::load(
            vec![entry("a", "stock"), entry("b", "web")],
            Arc::new(embedder),
            Duration::from_secs(1),
        )
        .await;

        let Err(RouterError::EmbeddingUnavailable(msg)) = result else {
            panic!("expected EmbeddingUnavailable");
        };
        assert!(msg.contains("1 vectors for 2"));
    }

    #[tokio::test]
    async fn search_rejects_short_query_batches() {
        let registry = EmbeddingRegistry {
            entries: vec![EmbeddedEntry {
                vector: KeywordEmbedder::vector("stock data"),
                entry: entry("stocks", "stock data"),
            }],
            embedder: Arc::new(KeywordEmbedder {
                drop_last: true,
                ..KeywordEmbedder::default()
            }),
            timeout: Duration::from_secs(1),
        };

        let queries = vec!["stock".to_owned(), "web fetch".to_owned()];
        let result = registry.search(&queries, THRESHOLDS).await;

        let Err(RouterError::EmbeddingUnavailable(msg)) = result else {
            panic!("expected EmbeddingUnavailable");
        };
        assert!(msg.contains("1 vectors for 2 queries"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_embedder_times_out() {
        let embedder = KeywordEmbedder {
            delay: Some(Duration::from_secs(60)),
            ..KeywordEmbedder::default()
        };
        let result = EmbeddingRegistry::load(vec![entry("a", "stock")], Arc::new(embedder), Duration::from_secs(1)).await;

        let Err(RouterError::EmbeddingUnavailable(msg)) = result else {
            panic!("expected EmbeddingUnavailable");
        };
        assert!(msg.contains("timed out"));
    }

    #[tokio::test]
    async fn lookup_by_id() {
        let registry = two_entry_registry().await;
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("fetch"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.ids(), vec!["stocks".to_owned(), "fetch".to_owned()]);
    }
}
