use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::aggregate::MatchOrdering;
use crate::core::matcher::PipelineOptions;
use crate::core::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    pub oracle: OracleSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub appwrite: Option<AppwriteSettings>,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub retry_backoff_ms: u64,
    /// Unset means unbounded fan-out
    pub max_in_flight: Option<usize>,
    #[serde(default)]
    pub sort_by_rank: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            call_timeout_secs: default_call_timeout_secs(),
            retry_backoff_ms: 0,
            max_in_flight: None,
            sort_by_rank: false,
        }
    }
}

fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_call_timeout_secs() -> u64 { 30 }

impl From<&PipelineSettings> for PipelineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: settings.max_attempts.max(1),
                call_timeout: match settings.call_timeout_secs {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                },
                backoff: Duration::from_millis(settings.retry_backoff_ms),
            },
            max_in_flight: settings.max_in_flight.filter(|n| *n > 0),
            ordering: if settings.sort_by_rank {
                MatchOrdering::RankScore
            } else {
                MatchOrdering::Discovery
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_api_version() -> String { "2024-02-01".to_string() }
fn default_temperature() -> f32 { 0.2 }

/// Which backends feed the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// In-memory demo data, or a TOML fixture file
    #[default]
    Fixture,
    /// Appwrite patient registry and Postgres trial catalog
    Remote,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub kind: SourceKind,
    pub fixture_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteSettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
    #[serde(default = "default_patients_collection")]
    pub patients_collection: String,
}

fn default_patients_collection() -> String { "patients".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with TRIALMATCH_)
    /// 5. Conventional unprefixed secrets (DATABASE_URL, AZURE_OPENAI_*)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., TRIALMATCH__PIPELINE__MAX_ATTEMPTS -> pipeline.max_attempts
            .add_source(
                Environment::with_prefix("TRIALMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_secret_overrides(settings, |name| std::env::var(name).ok())?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("TRIALMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Overlay secrets that deployments conventionally pass without the prefix
fn apply_secret_overrides(
    settings: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    const OVERRIDES: &[(&str, &str)] = &[
        ("DATABASE_URL", "database.url"),
        ("AZURE_OPENAI_API_KEY", "oracle.api_key"),
        ("AZURE_OPENAI_ENDPOINT", "oracle.endpoint"),
        ("AZURE_OPENAI_DEPLOYMENT_NAME", "oracle.deployment"),
        ("OPENAI_API_VERSION", "oracle.api_version"),
    ];

    let mut builder = Config::builder().add_source(settings);

    for (var, key) in OVERRIDES {
        if let Some(value) = lookup(var) {
            builder = builder.set_override(*key, value)?;
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(raw: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"
        [oracle]
        endpoint = "https://example.openai.azure.com"
        api_key = "key"
        deployment = "gpt-4o"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings = from_toml(MINIMAL);

        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.pipeline.max_attempts, 2);
        assert_eq!(settings.pipeline.max_in_flight, None);
        assert_eq!(settings.sources.kind, SourceKind::Fixture);
        assert_eq!(settings.oracle.api_version, "2024-02-01");
        assert!(settings.database.is_none());
    }

    #[test]
    fn test_pipeline_options_from_settings() {
        let settings = PipelineSettings {
            max_attempts: 0,
            call_timeout_secs: 0,
            retry_backoff_ms: 250,
            max_in_flight: Some(0),
            sort_by_rank: true,
        };

        let options = PipelineOptions::from(&settings);
        assert_eq!(options.retry.max_attempts, 1);
        assert_eq!(options.retry.call_timeout, None);
        assert_eq!(options.retry.backoff, Duration::from_millis(250));
        assert_eq!(options.max_in_flight, None);
        assert_eq!(options.ordering, MatchOrdering::RankScore);
    }

    #[test]
    fn test_secret_overrides() {
        let base = Config::builder()
            .add_source(File::from_str(MINIMAL, FileFormat::Toml))
            .build()
            .unwrap();

        let settings: Settings = apply_secret_overrides(base, |name| match name {
            "AZURE_OPENAI_API_KEY" => Some("from-env".to_string()),
            _ => None,
        })
        .unwrap()
        .try_deserialize()
        .unwrap();

        assert_eq!(settings.oracle.api_key, "from-env");
        assert_eq!(settings.oracle.deployment, "gpt-4o");
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }
}
