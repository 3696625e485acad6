//! Process-wide metrics registry.
//!
//! Created once at startup and passed explicitly to the components that
//! report; business logic never reaches for a hidden singleton. Exposed as
//! Prometheus text at the configured metrics path.

use std::sync::Arc;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    breaker_events: IntCounterVec,
    breaker_state: IntGaugeVec,
    breaker_call_seconds: HistogramVec,
    jobs_processed: IntCounterVec,
    jobs_failed: IntCounter,
    queue_depth: IntGauge,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    model_tokens: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let breaker_events = IntCounterVec::new(
            Opts::new("breaker_events_total", "Circuit breaker events"),
            &["breaker", "event"],
        )?;
        let breaker_state = IntGaugeVec::new(
            Opts::new(
                "breaker_state",
                "Circuit breaker state (0 closed, 1 open, 2 half-open)",
            ),
            &["breaker"],
        )?;
        let breaker_call_seconds = HistogramVec::new(
            HistogramOpts::new("breaker_call_seconds", "Latency of protected calls").buckets(
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
            ),
            &["breaker"],
        )?;
        let jobs_processed = IntCounterVec::new(
            Opts::new("validation_jobs_total", "Validation jobs by outcome"),
            &["outcome"],
        )?;
        let jobs_failed = IntCounter::new(
            "validation_job_failures_total",
            "Validation jobs that failed before producing a decision",
        )?;
        let queue_depth = IntGauge::new("validation_queue_depth", "Jobs waiting in the queue")?;
        let cache_hits = IntCounter::new("score_cache_hits_total", "Score cache hits")?;
        let cache_misses = IntCounter::new("score_cache_misses_total", "Score cache misses")?;
        let model_tokens = IntCounterVec::new(
            Opts::new("model_tokens_total", "Language-model tokens consumed"),
            &["kind"],
        )?;

        registry.register(Box::new(breaker_events.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;
        registry.register(Box::new(breaker_call_seconds.clone()))?;
        registry.register(Box::new(jobs_processed.clone()))?;
        registry.register(Box::new(jobs_failed.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(model_tokens.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                breaker_events,
                breaker_state,
                breaker_call_seconds,
                jobs_processed,
                jobs_failed,
                queue_depth,
                cache_hits,
                cache_misses,
                model_tokens,
            }),
        })
    }

    pub fn breaker_event(&self, breaker: &str, event: &str) {
        self.inner
            .breaker_events
            .with_label_values(&[breaker, event])
            .inc();
    }

    pub fn breaker_state(&self, breaker: &str, state: i64) {
        self.inner
            .breaker_state
            .with_label_values(&[breaker])
            .set(state);
    }

    pub fn breaker_call_seconds(&self, breaker: &str, seconds: f64) {
        self.inner
            .breaker_call_seconds
            .with_label_values(&[breaker])
            .observe(seconds);
    }

    pub fn job_processed(&self, outcome: &str) {
        self.inner
            .jobs_processed
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn job_failed(&self) {
        self.inner.jobs_failed.inc();
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    pub fn cache_hit(&self) {
        self.inner.cache_hits.inc();
    }

    pub fn cache_miss(&self) {
        self.inner.cache_misses.inc();
    }

    pub fn add_model_tokens(&self, kind: &str, count: u64) {
        self.inner
            .model_tokens
            .with_label_values(&[kind])
            .inc_by(count);
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.inner.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
