use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::LogOptions;
use crate::diff::DiffPolicy;
use crate::dispatcher::DispatchSettings;
use crate::stream::StreamSettings;

pub const CONFIG_ENV: &str = "DOCKVIEW_CONFIG";
const CONFIG_NAMES: [&str; 4] = ["dockview.yaml", "dockview.yml", ".dockview.yaml", ".dockview.yml"];

static SINCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhd])$").expect("Invalid since pattern"));

/// Log pane settings
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Ring buffer lines per open stream
    pub capacity: usize,
    /// History lines requested when a stream opens
    pub tail: usize,
    /// History window, `<n>[smhd]`
    pub since: Option<String>,
    /// Most lines carried by one event
    pub batch_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: 2000,
            tail: 200,
            since: Some("15m".into()),
            batch_lines: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub poll_interval_ms: u64,
    /// Consecutive missed polls before an entity is removed
    pub removal_debounce: u32,
    pub action_timeout_ms: u64,
    pub max_concurrent_actions: usize,
    pub log: LogConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            removal_debounce: 2,
            action_timeout_ms: 30_000,
            max_concurrent_actions: 4,
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid log.since '{0}', expected <number>[smhd]")]
    InvalidSince(String),

    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

/// Parse `30s`, `15m`, `2h`, `1d`.
pub fn parse_since(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidSince(text.to_string());
    let caps = SINCE_PATTERN.captures(text.trim()).ok_or_else(invalid)?;
    let n: u64 = caps[1].parse().map_err(|_| invalid())?;
    let unit = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86_400,
    };
    let secs = n.checked_mul(unit).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: DashboardConfig = if content.trim().is_empty() {
            DashboardConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// `$DOCKVIEW_CONFIG` first, then `start_dir` and each parent.
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Like [`discover`](Self::discover), but a missing file means defaults.
    pub fn discover_or_default(start_dir: &Path) -> Result<(Option<PathBuf>, Self), ConfigError> {
        match Self::discover(start_dir) {
            Ok((path, config)) => Ok((Some(path), config)),
            Err(ConfigError::NotFound { .. }) => Ok((None, Self::default())),
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("removal_debounce", self.removal_debounce == 0),
            ("action_timeout_ms", self.action_timeout_ms == 0),
            ("max_concurrent_actions", self.max_concurrent_actions == 0),
            ("log.capacity", self.log.capacity == 0),
            ("log.batch_lines", self.log.batch_lines == 0),
        ];
        if let Some((field, _)) = nonzero.into_iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::Zero { field });
        }
        if let Some(since) = &self.log.since {
            parse_since(since)?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn diff_policy(&self) -> DiffPolicy {
        DiffPolicy {
            removal_misses: self.removal_debounce,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            action_timeout: Duration::from_millis(self.action_timeout_ms),
            max_concurrent: self.max_concurrent_actions,
        }
    }

    pub fn stream_settings(&self) -> Result<StreamSettings, ConfigError> {
        let since = self.log.since.as_deref().map(parse_since).transpose()?;
        Ok(StreamSettings {
            capacity: self.log.capacity,
            batch_lines: self.log.batch_lines,
            options: LogOptions {
                tail: self.log.tail,
                since,
            },
        })
    }
}
