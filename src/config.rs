//! Configuration for rulelint.
//!
//! Configuration sources (highest priority first):
//! 1. Command line flags (--prometheus)
//! 2. Environment variables (RULELINT_PROMETHEUS_URL)
//! 3. Config file (.rulelint/config.yaml)
//! 4. Defaults
//!
//! Config file discovery:
//! - An explicit --config path wins
//! - Otherwise searches current directory and parents for .rulelint/config.yaml

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::{parse_duration, SeriesSettings};
use crate::domain::Directives;

/// Env var holding the URL of the `default` server
pub const PROMETHEUS_URL_ENV: &str = "RULELINT_PROMETHEUS_URL";

/// Name given to servers configured from the environment or command line
pub const DEFAULT_SERVER_NAME: &str = "default";

/// Per-query timeout used when a server doesn't set one
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub prometheus: Vec<ServerConfig>,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub directives: Directives,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub uri: String,
    /// Tried in order when the primary URI is unreachable
    #[serde(default)]
    pub failover: Vec<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecksConfig {
    pub series: Option<SeriesConfig>,
}

/// Durations use the Prometheus syntax, e.g. `7d`, `1h30m`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesConfig {
    pub lookback: Option<String>,
    pub step: Option<String>,
    pub min_age: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Servers to check rules against
    pub servers: Vec<ServerSettings>,
    /// Series check settings
    pub series: SeriesSettings,
    /// Directives applied to every rule
    pub directives: Directives,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub name: String,
    /// Primary URI first, then failover URIs
    pub uris: Vec<String>,
    pub timeout: Duration,
}

impl ServerSettings {
    fn from_url(url: &str) -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            uris: vec![url.to_string()],
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

impl ResolvedConfig {
    /// Add a server named `default`, replacing any configured one
    pub fn with_prometheus_url(mut self, url: &str) -> Self {
        self.servers.retain(|s| s.name != DEFAULT_SERVER_NAME);
        self.servers.push(ServerSettings::from_url(url));
        self
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".rulelint").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn resolve_duration(
    field: &str,
    value: Option<&str>,
    default: chrono::Duration,
) -> Result<chrono::Duration> {
    match value {
        Some(text) => parse_duration(text)
            .with_context(|| format!("Invalid checks.series.{} duration: {:?}", field, text)),
        None => Ok(default),
    }
}

fn resolve_series(config: Option<&SeriesConfig>) -> Result<SeriesSettings> {
    let defaults = SeriesSettings::default();
    let Some(config) = config else {
        return Ok(defaults);
    };

    let settings = SeriesSettings {
        lookback: resolve_duration("lookback", config.lookback.as_deref(), defaults.lookback)?,
        step: resolve_duration("step", config.step.as_deref(), defaults.step)?,
        min_age: resolve_duration("min_age", config.min_age.as_deref(), defaults.min_age)?,
    };

    if settings.step <= chrono::Duration::zero() {
        bail!("checks.series.step must be greater than zero");
    }
    if settings.lookback <= settings.step {
        bail!("checks.series.lookback must be longer than checks.series.step");
    }
    Ok(settings)
}

/// Combine the config file and environment into resolved settings
fn resolve(
    file: Option<ConfigFile>,
    config_file: Option<PathBuf>,
    env_url: Option<String>,
) -> Result<ResolvedConfig> {
    let (servers, series, directives) = match file {
        Some(file) => {
            let servers = file
                .prometheus
                .into_iter()
                .map(|server| ServerSettings {
                    uris: std::iter::once(server.uri).chain(server.failover).collect(),
                    timeout: Duration::from_secs(
                        server.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
                    ),
                    name: server.name,
                })
                .collect();
            let series = resolve_series(file.checks.series.as_ref())?;
            (servers, series, file.directives)
        }
        None => (Vec::new(), SeriesSettings::default(), Directives::new()),
    };

    let config = ResolvedConfig {
        config_file,
        servers,
        series,
        directives,
    };

    Ok(match env_url {
        Some(url) if !url.is_empty() => config.with_prometheus_url(&url),
        _ => config,
    })
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let config_file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            find_config_file_from(&cwd)
        }
    };

    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    resolve(file, config_file, std::env::var(PROMETHEUS_URL_ENV).ok())
}
