//! Scorer adapter: cache-first, breaker-protected language-model scoring
//! with deterministic fallback parsing, a per-submitter token ledger, and
//! a bounded batch mode.

pub mod cache;
pub mod client;
pub mod parser;
pub mod prompt;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::domain::{
    AuthorityAssessment, CombinedInfo, Submitter, ValidationResult, Venue,
};
use crate::enrichment::EnrichmentOutcome;
use crate::error::{ExternalSystem, PipelineError, PipelineResult};
use crate::metrics::Metrics;

pub use cache::{cache_key, fingerprint, spawn_sweeper, CacheConfig, ScoreCache};
pub use client::{ChatConfig, ChatModel, ChatOutput, ChatUsage, OpenAiChatClient};
pub use parser::{resolve_score, FALLBACK_NOTE};
pub use prompt::{PromptLibrary, DEFAULT_PROMPT_VERSION};

/// Approximate per-token pricing used for the cost ledger.
const PROMPT_COST_PER_TOKEN: f64 = 0.15 / 1_000_000.0;
const COMPLETION_COST_PER_TOKEN: f64 = 0.60 / 1_000_000.0;

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Token budget for one scoring completion.
    pub max_tokens: u32,
    /// Items per batch in batch mode.
    pub batch_size: usize,
    /// Concurrent model calls in batch mode.
    pub concurrency: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            batch_size: 5,
            concurrency: 5,
        }
    }
}

/// Per-submitter token and cost totals across the process lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Thread-safe token usage ledger.
#[derive(Default)]
pub struct TokenLedger {
    totals: Mutex<HashMap<i64, TokenTotals>>,
}

impl TokenLedger {
    pub fn record(&self, submitter_id: i64, usage: &ChatUsage) {
        let mut totals = self.totals.lock().expect("ledger lock");
        let entry = totals.entry(submitter_id).or_default();
        entry.prompt_tokens += u64::from(usage.prompt_tokens);
        entry.completion_tokens += u64::from(usage.completion_tokens);
        entry.estimated_cost_usd += f64::from(usage.prompt_tokens) * PROMPT_COST_PER_TOKEN
            + f64::from(usage.completion_tokens) * COMPLETION_COST_PER_TOKEN;
    }

    pub fn totals_for(&self, submitter_id: i64) -> TokenTotals {
        self.totals
            .lock()
            .expect("ledger lock")
            .get(&submitter_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<i64, TokenTotals> {
        self.totals.lock().expect("ledger lock").clone()
    }
}

/// Inputs for scoring one venue.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub venue: Venue,
    pub submitter: Submitter,
    pub authority: AuthorityAssessment,
    pub combined: CombinedInfo,
    pub enrichment: EnrichmentOutcome,
}

pub struct Scorer {
    model: Arc<dyn ChatModel>,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<ScoreCache>,
    prompts: Arc<PromptLibrary>,
    ledger: TokenLedger,
    config: ScorerConfig,
    metrics: Option<Metrics>,
}

impl Scorer {
    pub fn new(
        model: Arc<dyn ChatModel>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<ScoreCache>,
        prompts: Arc<PromptLibrary>,
        config: ScorerConfig,
    ) -> Self {
        Self {
            model,
            breaker,
            cache,
            prompts,
            ledger: TokenLedger::default(),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Score one venue, cache first.
    pub async fn score(&self, request: &ScoreRequest) -> PipelineResult<ValidationResult> {
        let fp = fingerprint(&request.venue);
        let key = cache_key(&fp, request.authority.trust, request.submitter.id);

        if let Some(cached) = self.cache.get(&key) {
            debug!(venue_id = request.venue.id, "score cache hit");
            return Ok(ValidationResult {
                venue_id: request.venue.id,
                ..cached
            });
        }

        let template = self.prompts.select_for(request.venue.id);
        let user_prompt = prompt::build_user_prompt(
            &request.venue,
            &request.combined,
            &request.enrichment,
            &request.authority,
        );

        let output = self
            .breaker
            .call(|| {
                self.model
                    .chat_json(&template.system, &user_prompt, self.config.max_tokens)
            })
            .await
            .map_err(|e| match e {
                BreakerError::Service(inner) => inner,
                other => PipelineError::external(
                    ExternalSystem::Model,
                    "score",
                    anyhow::anyhow!(other.to_string()),
                ),
            })?;

        if let Some(usage) = &output.usage {
            self.ledger.record(request.submitter.id, usage);
            if let Some(m) = &self.metrics {
                m.add_model_tokens("prompt", u64::from(usage.prompt_tokens));
                m.add_model_tokens("completion", u64::from(usage.completion_tokens));
            }
        }

        let resolved = resolve_score(&output.content);
        if resolved.fallback_used {
            warn!(
                venue_id = request.venue.id,
                "model response malformed, fallback parsing used"
            );
        }

        let breakdown = BTreeMap::from([
            ("legitimacy".to_string(), resolved.legitimacy),
            ("completeness".to_string(), resolved.completeness),
            ("relevance".to_string(), resolved.relevance),
        ]);

        let result = ValidationResult {
            venue_id: request.venue.id,
            score: resolved.score,
            outcome: ValidationResult::outcome_from_raw_score(resolved.score),
            notes: resolved.notes,
            breakdown,
            raw_model_output: Some(output.content),
            prompt_version: Some(template.version.clone()),
        };

        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// Batch mode: partition into batches, fan each batch out across the
    /// concurrency semaphore, and stop cleanly on cancellation.
    /// Cancellation is checked between batches and between items; items
    /// never started produce no result.
    pub async fn score_batch(
        self: &Arc<Self>,
        requests: Vec<ScoreRequest>,
        cancel: &watch::Receiver<bool>,
    ) -> Vec<PipelineResult<ValidationResult>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let batch_size = self.config.batch_size.max(1);
        let mut results = Vec::with_capacity(requests.len());

        let mut remaining = requests.into_iter().peekable();
        'batches: while remaining.peek().is_some() {
            if *cancel.borrow() {
                break;
            }

            let mut handles: Vec<tokio::task::JoinHandle<PipelineResult<ValidationResult>>> =
                Vec::with_capacity(batch_size);
            for _ in 0..batch_size {
                let Some(request) = remaining.next() else {
                    break;
                };
                if *cancel.borrow() {
                    for handle in handles {
                        handle.abort();
                    }
                    break 'batches;
                }
                let scorer = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                    scorer.score(&request).await
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(result) => results.push(result),
                    Err(e) => warn!(error = %e, "batch scoring task aborted"),
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::config::PromptConfig;
    use crate::domain::authority::assess;
    use crate::domain::combined;
    use crate::domain::submitter::test_submitter;
    use crate::domain::venue::test_venue;
    use crate::domain::Outcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubModel {
        response: String,
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl StubModel {
        fn scoring(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: Arc::new(AtomicU32::new(0)),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ChatModel for StubModel {
        async fn chat_json(
            &self,
            _system: &str,
            _user: &str,
            _max_tokens: u32,
        ) -> Result<ChatOutput, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::external(
                    ExternalSystem::Model,
                    "chat_completion",
                    anyhow::anyhow!("down"),
                ));
            }
            Ok(ChatOutput {
                content: self.response.clone(),
                usage: Some(ChatUsage {
                    prompt_tokens: 100,
                    completion_tokens: 25,
                    total_tokens: 125,
                }),
            })
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn request_for(venue_id: i64, submitter_id: i64) -> ScoreRequest {
        let venue = test_venue(venue_id);
        let submitter = test_submitter(submitter_id);
        let authority = assess(&submitter, &venue.location);
        let merged = combined::build(&venue, None, &submitter, &authority).unwrap();
        ScoreRequest {
            enrichment: EnrichmentOutcome {
                venue: venue.clone(),
                place: None,
                breakdown: Default::default(),
                distance_meters: None,
                conflicts: 0,
                place_found: false,
                reason: None,
                rating: None,
            },
            venue,
            submitter,
            authority,
            combined: merged,
        }
    }

    fn scorer_with(model: StubModel) -> Arc<Scorer> {
        Arc::new(Scorer::new(
            Arc::new(model),
            Arc::new(CircuitBreaker::new(BreakerConfig {
                name: "model-test",
                ..BreakerConfig::default()
            })),
            Arc::new(ScoreCache::new(CacheConfig::default())),
            Arc::new(PromptLibrary::load(&PromptConfig::default())),
            ScorerConfig::default(),
        ))
    }

    const GOOD_RESPONSE: &str = r#"{"score": 90, "notes": "looks real", "breakdown": {"legitimacy": 33, "completeness": 27, "relevance": 30}}"#;

    #[tokio::test]
    async fn test_score_parses_and_derives_outcome() {
        let scorer = scorer_with(StubModel::scoring(GOOD_RESPONSE));
        let result = scorer.score(&request_for(1, 7)).await.unwrap();
        assert_eq!(result.score, 90);
        assert_eq!(result.outcome, Outcome::Approved);
        assert_eq!(result.breakdown["legitimacy"], 33);
        assert_eq!(result.prompt_version.as_deref(), Some(DEFAULT_PROMPT_VERSION));
        assert!(result.raw_model_output.is_some());
    }

    #[tokio::test]
    async fn test_second_score_hits_cache() {
        let model = StubModel::scoring(GOOD_RESPONSE);
        let calls = Arc::clone(&model.calls);
        let scorer = scorer_with(model);
        let request = request_for(1, 7);
        let first = scorer.score(&request).await.unwrap();
        let second = scorer.score(&request).await.unwrap();
        assert_eq!(first.score, second.score);
        // Only one external call happened.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_submitter_misses_cache() {
        let model = StubModel::scoring(GOOD_RESPONSE);
        let calls = Arc::clone(&model.calls);
        let scorer = scorer_with(model);
        scorer.score(&request_for(1, 7)).await.unwrap();
        scorer.score(&request_for(1, 8)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_model_failure_propagates_as_external() {
        let mut stub = StubModel::scoring(GOOD_RESPONSE);
        stub.fail = true;
        let scorer = scorer_with(stub);
        let err = scorer.score(&request_for(1, 7)).await.unwrap_err();
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn test_malformed_response_scores_via_fallback() {
        let scorer = scorer_with(StubModel::scoring("score is great, maybe 72?"));
        let result = scorer.score(&request_for(1, 7)).await.unwrap();
        assert_eq!(result.score, 50);
        assert_eq!(result.notes, FALLBACK_NOTE);
        assert_eq!(result.outcome, Outcome::ManualReview);
    }

    #[tokio::test]
    async fn test_ledger_accumulates_per_submitter() {
        let scorer = scorer_with(StubModel::scoring(GOOD_RESPONSE));
        scorer.score(&request_for(1, 7)).await.unwrap();
        let mut second = request_for(2, 7);
        // Distinct content so the cache does not absorb the second call.
        second.venue.description = Some("Different description".to_string());
        scorer.score(&second).await.unwrap();
        let totals = scorer.ledger().totals_for(7);
        assert_eq!(totals.prompt_tokens, 200);
        assert_eq!(totals.completion_tokens, 50);
        assert!(totals.estimated_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_batch_scores_everything_without_cancel() {
        let scorer = scorer_with(StubModel::scoring(GOOD_RESPONSE));
        let requests: Vec<ScoreRequest> = (1..=7).map(|id| request_for(id, id)).collect();
        let (_tx, rx) = watch::channel(false);
        let results = scorer.score_batch(requests, &rx).await;
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_cancelled_batch_produces_no_further_results() {
        let scorer = scorer_with(StubModel::scoring(GOOD_RESPONSE));
        let requests: Vec<ScoreRequest> = (1..=10).map(|id| request_for(id, id)).collect();
        let (tx, rx) = watch::channel(true);
        let results = scorer.score_batch(requests, &rx).await;
        assert!(results.is_empty());
        drop(tx);
    }
}
