//! Typed configuration with a single loader.
//!
//! Every recognized option comes from the environment (see `.env.example`);
//! an optional YAML overlay file (`CONFIG_FILE`) can override the tunable
//! subset at runtime and is re-read on an interval by the reload task, which
//! publishes fresh snapshots over a watch channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Database pool tuning.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_open_conns: 20,
            max_idle_conns: 10,
            conn_max_lifetime: Duration::from_secs(30 * 60),
            conn_max_idle_time: Duration::from_secs(10 * 60),
        }
    }
}

/// Logging output selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Critical-data specification thresholds and toggles.
#[derive(Debug, Clone)]
pub struct SpecConfig {
    pub min_contact_fields: usize,
    pub require_lookup_data: bool,
    pub max_distance_meters: f64,
    pub enable_vegan_relevance: bool,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self {
            min_contact_fields: 2,
            require_lookup_data: true,
            max_distance_meters: 500.0,
            enable_vegan_relevance: true,
        }
    }
}

/// Prompt library options.
#[derive(Debug, Clone, Default)]
pub struct PromptConfig {
    pub dir: Option<PathBuf>,
    pub stable_only: bool,
    /// Parsed `PROMPT_WEIGHTS` entries, `name=weight`.
    pub weights: Vec<(String, u32)>,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub google_maps_api_key: String,
    pub openai_api_key: String,
    pub port: u16,
    pub approval_threshold: u8,
    pub worker_count: usize,
    pub db: DbConfig,
    pub log_level: String,
    pub log_format: LogFormat,
    pub enable_file_logging: bool,
    pub metrics_enabled: bool,
    pub metrics_path: String,
    pub profiling_enabled: bool,
    pub profiling_port: u16,
    pub spec: SpecConfig,
    pub prompt: PromptConfig,
    pub config_file: Option<PathBuf>,
    pub config_reload_interval: Duration,
}

impl Config {
    /// Load the configuration from the process environment.
    ///
    /// `DATABASE_URL`, `GOOGLE_MAPS_API_KEY` and `OPENAI_API_KEY` are
    /// required; everything else has a default. If `CONFIG_FILE` is set the
    /// overlay is applied on top before returning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            database_url: require_var("DATABASE_URL")?,
            google_maps_api_key: require_var("GOOGLE_MAPS_API_KEY")?,
            openai_api_key: require_var("OPENAI_API_KEY")?,
            port: parse_var("PORT", 8080)?,
            approval_threshold: parse_threshold("APPROVAL_THRESHOLD", 85)?,
            worker_count: parse_var("WORKER_COUNT", 10)?,
            db: DbConfig {
                max_open_conns: parse_var("DB_MAX_OPEN_CONNS", 20)?,
                max_idle_conns: parse_var("DB_MAX_IDLE_CONNS", 10)?,
                conn_max_lifetime: Duration::from_secs(
                    parse_var::<u64>("DB_CONN_MAX_LIFETIME_MINUTES", 30)? * 60,
                ),
                conn_max_idle_time: Duration::from_secs(
                    parse_var::<u64>("DB_CONN_MAX_IDLE_TIME_MINUTES", 10)? * 60,
                ),
            },
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: match std::env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            enable_file_logging: parse_bool("ENABLE_FILE_LOGGING", false)?,
            metrics_enabled: parse_bool("METRICS_ENABLED", true)?,
            metrics_path: std::env::var("METRICS_PATH").unwrap_or_else(|_| "/metrics".to_string()),
            profiling_enabled: parse_bool("PROFILING_ENABLED", false)?,
            profiling_port: parse_var("PROFILING_PORT", 6060)?,
            spec: SpecConfig {
                min_contact_fields: parse_var("SPEC_MIN_CONTACT_FIELDS", 2)?,
                require_lookup_data: parse_bool("SPEC_REQUIRE_GOOGLE_DATA", true)?,
                max_distance_meters: parse_var("SPEC_MAX_DISTANCE_METERS", 500.0)?,
                enable_vegan_relevance: parse_bool("SPEC_ENABLE_VEGAN_RELEVANCE", true)?,
            },
            prompt: PromptConfig {
                dir: std::env::var("PROMPT_DIR").ok().map(PathBuf::from),
                stable_only: parse_bool("PROMPT_STABLE_ONLY", false)?,
                weights: parse_prompt_weights(
                    &std::env::var("PROMPT_WEIGHTS").unwrap_or_default(),
                ),
            },
            config_file: std::env::var("CONFIG_FILE").ok().map(PathBuf::from),
            config_reload_interval: Duration::from_secs(parse_var(
                "CONFIG_RELOAD_INTERVAL_SECONDS",
                60,
            )?),
        };

        if let Some(path) = config.config_file.clone() {
            let overlay = ConfigOverlay::from_file(&path)?;
            overlay.apply(&mut config);
        }

        Ok(config)
    }
}

/// Runtime-tunable subset overridable via `CONFIG_FILE`.
///
/// Secrets and wiring (database URL, API keys, port) deliberately stay
/// env-only; the overlay covers thresholds and toggles an operator may want
/// to move without a restart.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub approval_threshold: Option<u8>,
    pub worker_count: Option<usize>,
    pub spec_min_contact_fields: Option<usize>,
    pub spec_require_google_data: Option<bool>,
    pub spec_max_distance_meters: Option<f64>,
    pub spec_enable_vegan_relevance: Option<bool>,
    pub prompt_stable_only: Option<bool>,
}

impl ConfigOverlay {
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::FileParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = self.approval_threshold {
            config.approval_threshold = v.min(100);
        }
        if let Some(v) = self.worker_count {
            config.worker_count = v;
        }
        if let Some(v) = self.spec_min_contact_fields {
            config.spec.min_contact_fields = v;
        }
        if let Some(v) = self.spec_require_google_data {
            config.spec.require_lookup_data = v;
        }
        if let Some(v) = self.spec_max_distance_meters {
            config.spec.max_distance_meters = v;
        }
        if let Some(v) = self.spec_enable_vegan_relevance {
            config.spec.enable_vegan_relevance = v;
        }
        if let Some(v) = self.prompt_stable_only {
            config.prompt.stable_only = v;
        }
    }
}

/// Spawn the periodic config reload task.
///
/// Publishes a fresh `Arc<Config>` whenever the overlay file changes the
/// effective configuration. Without a `CONFIG_FILE` the task idles until
/// shutdown, keeping the channel shape uniform for consumers.
pub fn spawn_reload_task(
    initial: Config,
    mut shutdown_rx: watch::Receiver<bool>,
) -> (watch::Receiver<Arc<Config>>, tokio::task::JoinHandle<()>) {
    let interval = initial.config_reload_interval;
    let (tx, rx) = watch::channel(Arc::new(initial.clone()));
    let handle = tokio::spawn(async move {
        let base = initial;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            let Some(path) = base.config_file.clone() else {
                continue;
            };
            match ConfigOverlay::from_file(&path) {
                Ok(overlay) => {
                    let mut next = base.clone();
                    overlay.apply(&mut next);
                    if next.approval_threshold != tx.borrow().approval_threshold
                        || next.worker_count != tx.borrow().worker_count
                        || next.spec.min_contact_fields != tx.borrow().spec.min_contact_fields
                    {
                        info!(path = %path.display(), "configuration overlay reloaded");
                    }
                    let _ = tx.send(Arc::new(next));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config reload failed, keeping previous snapshot");
                }
            }
        }
    });
    (rx, handle)
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        _ => Ok(default),
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value: raw }),
        },
        _ => Ok(default),
    }
}

fn parse_threshold(name: &'static str, default: u8) -> Result<u8, ConfigError> {
    let value: u8 = parse_var(name, default)?;
    if value > 100 {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Parse `name=weight` comma-separated prompt weights, skipping malformed
/// entries with a warning.
fn parse_prompt_weights(raw: &str) -> Vec<(String, u32)> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (name, weight) = entry.split_once('=')?;
            match weight.trim().parse::<u32>() {
                Ok(w) => Some((name.trim().to_string(), w)),
                Err(_) => {
                    warn!(entry, "ignoring malformed prompt weight");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_weights() {
        let weights = parse_prompt_weights("v1-default=10, v2-strict=1");
        assert_eq!(
            weights,
            vec![("v1-default".to_string(), 10), ("v2-strict".to_string(), 1)]
        );
    }

    #[test]
    fn test_parse_prompt_weights_skips_malformed() {
        let weights = parse_prompt_weights("v1=x,,v2=3");
        assert_eq!(weights, vec![("v2".to_string(), 3)]);
    }

    #[test]
    fn test_overlay_apply_clamps_threshold() {
        let mut config = test_config();
        let overlay = ConfigOverlay {
            approval_threshold: Some(120),
            ..Default::default()
        };
        overlay.apply(&mut config);
        assert_eq!(config.approval_threshold, 100);
    }

    #[test]
    fn test_overlay_apply_spec_toggles() {
        let mut config = test_config();
        let overlay = ConfigOverlay {
            spec_require_google_data: Some(false),
            spec_max_distance_meters: Some(250.0),
            ..Default::default()
        };
        overlay.apply(&mut config);
        assert!(!config.spec.require_lookup_data);
        assert_eq!(config.spec.max_distance_meters, 250.0);
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgresql://localhost/test".into(),
            google_maps_api_key: "k".into(),
            openai_api_key: "k".into(),
            port: 8080,
            approval_threshold: 85,
            worker_count: 10,
            db: DbConfig::default(),
            log_level: "info".into(),
            log_format: LogFormat::Text,
            enable_file_logging: false,
            metrics_enabled: true,
            metrics_path: "/metrics".into(),
            profiling_enabled: false,
            profiling_port: 6060,
            spec: SpecConfig::default(),
            prompt: PromptConfig::default(),
            config_file: None,
            config_reload_interval: Duration::from_secs(60),
        }
    }
}
