use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;
use serde::Deserialize;
use smartmeter_client::db::{BackendKind, ConnectionConfig};

use crate::streaming::{StreamSettings, DEFAULT_CLEANUP_EVERY};

pub const CONFIG_ENV: &str = "SMARTMETER_CONFIG";

/// Upper bound for `preload_days` and `retention_days` (a century).
pub const MAX_DAYS: u32 = 36_500;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid --db-config JSON: {0}")]
    DbConfigJson(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    #[serde(flatten)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_devices: usize,
    pub interval_seconds: u64,
    pub preload_days: u32,
    pub retention_days: u32,
    pub cleanup_every_cycles: u32,
    pub base_usage: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_devices: 100,
            interval_seconds: 3600,
            preload_days: 100,
            retention_days: 100,
            cleanup_every_cycles: DEFAULT_CLEANUP_EVERY,
            base_usage: crate::usage_model::DEFAULT_BASE_USAGE,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub simulation: SimulationConfig,
    pub metrics: Option<MetricsConfig>,
}

/// Command line for both binaries. Flags override the config file, which
/// overrides the built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(version, about = "Simulate smart-meter power usage into a SQL database")]
pub struct Cli {
    /// TOML config file.
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Database type: sqlite, mysql, postgres.
    #[arg(long)]
    pub db_type: Option<BackendKind>,

    /// JSON object with connection settings, e.g. '{"database":"demo.db"}'.
    #[arg(long)]
    pub db_config: Option<String>,

    /// Number of devices (metadata rows).
    #[arg(long)]
    pub num_devices: Option<usize>,

    /// Seconds between streaming cycles.
    #[arg(long)]
    pub interval_seconds: Option<u64>,

    /// Days of historical data to insert first.
    #[arg(long)]
    pub preload_days: Option<u32>,

    /// How many days of data to keep before deletion.
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Seed for the random generator; omit for a fresh run every time.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl AppConfig {
    pub fn from_toml(contents: &str, path: PathBuf) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Toml { path, source })
    }

    pub fn load_file(path: PathBuf) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    /// Resolve the final configuration from the command line.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut cfg = match &cli.config {
            Some(path) => Self::load_file(path.clone())?,
            None => Self::default(),
        };
        cfg.apply_cli(cli)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if let Some(backend) = cli.db_type {
            self.database.backend = backend;
        }
        if let Some(json) = &cli.db_config {
            let overrides: ConnectionConfig = serde_json::from_str(json)?;
            self.database.connection = std::mem::take(&mut self.database.connection).merged_with(overrides);
        }

        let sim = &mut self.simulation;
        if let Some(v) = cli.num_devices {
            sim.num_devices = v;
        }
        if let Some(v) = cli.interval_seconds {
            sim.interval_seconds = v;
        }
        if let Some(v) = cli.preload_days {
            sim.preload_days = v;
        }
        if let Some(v) = cli.retention_days {
            sim.retention_days = v;
        }
        if cli.seed.is_some() {
            sim.seed = cli.seed;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.num_devices < 1 {
            return Err(ConfigError::Invalid("num_devices must be at least 1".to_string()));
        }
        if sim.preload_days > MAX_DAYS {
            return Err(ConfigError::Invalid(format!("preload_days must be at most {MAX_DAYS}")));
        }
        if sim.retention_days > MAX_DAYS {
            return Err(ConfigError::Invalid(format!("retention_days must be at most {MAX_DAYS}")));
        }
        if sim.cleanup_every_cycles < 1 {
            return Err(ConfigError::Invalid("cleanup_every_cycles must be at least 1".to_string()));
        }
        if !(sim.base_usage.is_finite() && sim.base_usage > 0.0) {
            return Err(ConfigError::Invalid("base_usage must be a positive number".to_string()));
        }
        Ok(())
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            interval: Duration::from_secs(self.simulation.interval_seconds),
            retention_days: self.simulation.retention_days,
            cleanup_every: self.simulation.cleanup_every_cycles,
        }
    }
}
