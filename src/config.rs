use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub stats: StatsConfig,
    pub analysis: AnalysisConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub fetch_timeout_seconds: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// One configured play type and the stats URL that serves its table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayTypeSource {
    pub play_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    pub requests_per_second: u32,
    pub request_timeout_seconds: u64,
    /// Offensive (player) tables, in display order.
    pub offense: Vec<PlayTypeSource>,
    /// Defensive (team) tables, in display order.
    pub defense: Vec<PlayTypeSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub search_grounding: bool,
    pub request_timeout_seconds: u64,
    /// Total attempts per persona call, counting the first one.
    pub max_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl AnalysisConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
pub struct Secrets {
    pub gemini_api_key: Option<SecretString>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
        }
    }
}

/// Command-line overrides.
#[derive(Debug, Parser)]
#[command(name = "nba-matchup", about = "NBA play-type matchup API")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the listen port from the config file.
    #[arg(long)]
    pub port: Option<u16>,

    /// Start serving without the initial synchronous cache load.
    #[arg(long)]
    pub skip_initial_refresh: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file, overlaying environment variables for secrets.
    pub fn load(path: &Path) -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let secrets = Secrets::from_env();

        Ok((config, secrets))
    }

    /// Apply command-line overrides on top of the file configuration.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
    }
}
