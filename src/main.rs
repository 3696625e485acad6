//! Server binary: wires configuration, database, external clients,
//! metrics, the worker pool, and the HTTP trigger surface together, with a
//! watch-channel shutdown fanned out to every long-lived task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use venue_approval::api::{self, AppState};
use venue_approval::breaker::{BreakerConfig, CircuitBreaker};
use venue_approval::config::{self, Config, LogFormat};
use venue_approval::decision::{DecisionConfig, LogEventSink};
use venue_approval::drafts::DraftStore;
use venue_approval::enrichment::{Enricher, PlacesClient, PlacesConfig};
use venue_approval::metrics::Metrics;
use venue_approval::persistence::DatabaseManager;
use venue_approval::pipeline::{PipelineConfig, PipelineDeps, ValidationPipeline};
use venue_approval::scoring::{
    CacheConfig, ChatConfig, OpenAiChatClient, PromptLibrary, ScoreCache, Scorer, ScorerConfig,
};

/// Grace period for draining in-flight jobs on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);
    info!("starting venue approval pipeline");

    if let Err(e) = run(config).await {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            if config.enable_file_logging {
                match std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open("venue-approval.log")
                {
                    Ok(file) => {
                        tracing_subscriber::registry()
                            .with(filter)
                            .with(tracing_subscriber::fmt::layer().with_writer(Arc::new(file)))
                            .init();
                        return;
                    }
                    Err(e) => eprintln!("file logging unavailable: {e}"),
                }
            }
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let metrics = Metrics::new()?;

    // Database.
    let db = DatabaseManager::connect(&config.database_url, &config.db).await?;
    db.test_connection().await?;

    // External clients behind their breakers.
    let places = PlacesClient::new(PlacesConfig::new(config.google_maps_api_key.clone()))?;
    let places_breaker = Arc::new(
        CircuitBreaker::new(BreakerConfig {
            name: "place-lookup",
            call_timeout: Duration::from_secs(12),
            ..BreakerConfig::default()
        })
        .with_metrics(metrics.clone()),
    );
    let enricher = Enricher::new(Arc::new(places), places_breaker);

    let chat = OpenAiChatClient::new(ChatConfig::new(config.openai_api_key.clone()))?;
    let model_breaker = Arc::new(
        CircuitBreaker::new(BreakerConfig {
            name: "model",
            call_timeout: Duration::from_secs(60),
            slow_call_threshold: Duration::from_secs(30),
            ..BreakerConfig::default()
        })
        .with_metrics(metrics.clone()),
    );

    // Shutdown fan-out.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Score cache with its sweeper.
    let cache = Arc::new(ScoreCache::new(CacheConfig::default()).with_metrics(metrics.clone()));
    let sweeper = venue_approval::scoring::spawn_sweeper(Arc::clone(&cache), shutdown_rx.clone());

    let prompts = Arc::new(PromptLibrary::load(&config.prompt));
    info!(versions = ?prompts.versions(), "prompt library ready");

    let scorer = Arc::new(
        Scorer::new(
            Arc::new(chat),
            model_breaker,
            cache,
            prompts,
            ScorerConfig::default(),
        )
        .with_metrics(metrics.clone()),
    );

    // Config reload task.
    let (config_rx, config_task) = config::spawn_reload_task(config.clone(), shutdown_rx.clone());

    // Worker pool.
    let store = Arc::new(db.validation_store());
    let pipeline = Arc::new(ValidationPipeline::new(
        PipelineDeps {
            enricher,
            scorer,
            store: store.clone(),
            events: Arc::new(LogEventSink),
            decision: DecisionConfig::from_config(&config),
            metrics: Some(metrics.clone()),
        },
        PipelineConfig {
            worker_count: config.worker_count,
            ..PipelineConfig::default()
        },
    ));
    pipeline.start().await;

    if config.profiling_enabled {
        warn!(
            port = config.profiling_port,
            "profiling requested but no profiler is compiled in; ignoring"
        );
    }

    // HTTP surface.
    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        venues: db.venues(),
        members: db.members(),
        history: db.history(),
        feedback: db.feedback(),
        drafts: Arc::new(DraftStore::default()),
        store,
        metrics: metrics.clone(),
        config: config_rx,
    };
    let router = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("shutdown signal received");
        })
        .await?;

    // Deterministic fan-in: signal every task, drain the pool, then close
    // the database.
    let _ = shutdown_tx.send(true);
    pipeline.stop(SHUTDOWN_GRACE).await;
    let _ = sweeper.await;
    let _ = config_task.await;
    db.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
