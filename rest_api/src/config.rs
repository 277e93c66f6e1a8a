// rest_api/src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use clinic_models::password::PASSWORD_HASH_COST;
use clinic_security::DEFAULT_TOKEN_TTL_HOURS;
use clinic_storage::StorageConfig;

use crate::rate_limit::LimiterSettings;

pub const DEFAULT_REST_API_PORT: u16 = 4000;
pub const ENV_PREFIX: &str = "CLINIC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// development | staging | production
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    pub path: PathBuf,
    pub temporary: bool,
    pub query_timeout_secs: u64,
}

impl StorageSection {
    pub fn to_storage_config(&self) -> StorageConfig {
        StorageConfig {
            path: self.path.clone(),
            temporary: self.temporary,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token_ttl_hours: i64,
    pub password_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub enabled: bool,
    pub rps: f64,
    pub burst: u32,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl LimiterConfig {
    pub fn settings(&self) -> LimiterSettings {
        LimiterSettings {
            enabled: self.enabled,
            rps: self.rps,
            burst: self.burst,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub trusted_origins: Vec<String>,
}

/// Sections missing from every source fall back to `ApiConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub storage: StorageSection,
    pub auth: AuthConfig,
    pub limiter: LimiterConfig,
    pub cors: CorsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: DEFAULT_REST_API_PORT,
                env: "development".to_string(),
            },
            storage: StorageSection {
                path: PathBuf::from("./data/clinic"),
                temporary: false,
                query_timeout_secs: 3,
            },
            auth: AuthConfig {
                token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
                password_cost: PASSWORD_HASH_COST,
            },
            limiter: LimiterConfig {
                enabled: true,
                rps: 2.0,
                burst: 4,
                idle_timeout_secs: 180,
                sweep_interval_secs: 60,
            },
            cors: CorsConfig::default(),
        }
    }
}

/// Defaults, then the optional file, then `CLINIC_*` environment variables
/// (`CLINIC_SERVER__PORT=8080`, `CLINIC_CORS__TRUSTED_ORIGINS="http://a http://b"`).
pub fn load_config(path: Option<&Path>) -> Result<ApiConfig> {
    let mut builder = Config::builder().add_source(
        Config::try_from(&ApiConfig::default()).context("Failed to seed configuration defaults")?,
    );

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("cors.trusted_origins"),
    );

    let config = builder
        .build()
        .context("Failed to assemble configuration")?
        .try_deserialize::<ApiConfig>()
        .context("Failed to parse configuration")?;
    Ok(config)
}

#[derive(Parser, Debug, Default)]
#[command(name = "clinic-api")]
#[command(version)]
#[command(about = "Clinic REST API: staff accounts, bearer tokens and patient records")]
pub struct CliArgs {
    /// Configuration file (toml, yaml, json, ...)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    #[arg(long = "db-path", value_name = "DIR")]
    pub db_path: Option<PathBuf>,

    /// Environment name reported by the healthcheck
    #[arg(long = "env", value_name = "ENV")]
    pub env: Option<String>,
}

impl CliArgs {
    /// Command-line flags win over every other source.
    pub fn apply(&self, config: &mut ApiConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.db_path {
            config.storage.path = path.clone();
        }
        if let Some(env) = &self.env {
            config.server.env = env.clone();
        }
    }
}
