use crate::{error::RunError, transport::DEFAULT_USER_AGENT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::time::Duration;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Parses a duration string (e.g., "5s", "1m") into a `tokio::time::Duration`.
// Used for deserializing duration values from the config file.
fn parse_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

fn parse_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Configuration of each outgoing probe.
/// Corresponds to the [probe] section in the TOML config file.
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    // Upper bound for a single probe, independent of the run duration.
    #[serde(
        default = "ProbeConfig::default_timeout",
        deserialize_with = "parse_duration"
    )]
    pub timeout: Duration,

    #[serde(default = "ProbeConfig::default_user_agent")]
    pub user_agent: String,
}

impl ProbeConfig {
    fn default_timeout() -> Duration {
        DEFAULT_PROBE_TIMEOUT
    }

    fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
            user_agent: Self::default_user_agent(),
        }
    }
}

/// Configuration of the run supervisor.
/// Corresponds to the [supervisor] section in the TOML config file.
#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    // How often the supervisor checks the stop signal and the elapsed time.
    #[serde(
        default = "SupervisorConfig::default_poll_interval",
        deserialize_with = "parse_duration"
    )]
    pub poll_interval: Duration,
}

impl SupervisorConfig {
    fn default_poll_interval() -> Duration {
        DEFAULT_POLL_INTERVAL
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Self::default_poll_interval(),
        }
    }
}

/// Configuration of the per-probe reporters.
/// Corresponds to the [reporter] section in the TOML config file.
#[derive(Debug, Deserialize, Clone)]
pub struct ReporterConfig {
    // Whether to print a progress line per probe.
    #[serde(default = "ReporterConfig::default_enable_stdout")]
    pub enable_stdout: bool,

    // Optional file path for the JSON-lines reporter. If specified, it is enabled.
    pub file_path: Option<String>,
}

impl ReporterConfig {
    fn default_enable_stdout() -> bool {
        true
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enable_stdout: Self::default_enable_stdout(),
            file_path: None,
        }
    }
}

/// Application configuration, loaded from a TOML file.
///
/// `target`, `workers` and `duration` may be left out; the CLI then takes
/// them from flags or asks for them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub target: Option<String>,

    pub workers: Option<usize>,

    #[serde(default, deserialize_with = "parse_optional_duration")]
    pub duration: Option<Duration>,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub reporter: ReporterConfig,
}

impl Config {
    pub fn new(config_path: &Path) -> Result<Self> {
        Self::load_from_file(config_path)
    }

    // Loads configuration from a TOML file.
    fn load_from_file(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }
}

/// Parameters of one run. Fixed once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub target: String,
    pub worker_count: usize,
    pub max_duration: Duration,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
}

impl RunConfig {
    pub fn new(target: impl Into<String>, worker_count: usize, max_duration: Duration) -> Self {
        Self {
            target: target.into(),
            worker_count,
            max_duration,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Checks the config before anything is spawned.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.worker_count < 1 {
            return Err(RunError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(RunError::InvalidConfig("target must not be empty".to_string()));
        }
        if self.probe_timeout.is_zero() {
            return Err(RunError::InvalidConfig(
                "probe timeout must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(RunError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
