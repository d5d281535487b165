//! Environment resolution
//!
//! Merges a named environment from the environment file with command-line
//! overrides into the single [`RunConfig`] a replay runs with.

use crate::error::ReplayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Browser engine requested by an environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" => Ok(BrowserEngine::Webkit),
            other => Err(format!(
                "unknown browser '{}' (expected chromium, firefox or webkit)",
                other
            )),
        }
    }
}

/// Timeout windows in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Default element wait window for a step
    pub step: u64,
    /// Navigation timeout (initial navigation and `navigation` steps)
    pub global: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP_TIMEOUT_MS,
            global: DEFAULT_GLOBAL_TIMEOUT_MS,
        }
    }
}

impl Timeouts {
    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step)
    }

    pub fn navigation_duration(&self) -> Duration {
        Duration::from_millis(self.global)
    }
}

/// One entry of the environment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(rename = "baseURL", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub browser: BrowserEngine,

    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_headless() -> bool {
    true
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            browser: BrowserEngine::default(),
            headless: default_headless(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Mapping from environment name to its configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentFile {
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

/// Command-line overrides; `None` keeps the environment's value
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub base_url: Option<String>,
    pub browser: Option<BrowserEngine>,
    pub headless: Option<bool>,
    pub step_timeout_ms: Option<u64>,
    pub global_timeout_ms: Option<u64>,
    pub stop_on_fail: Option<bool>,
    pub artifacts_dir: Option<PathBuf>,
}

/// Effective configuration of one replay
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub env_name: String,

    /// Environment or override base URL; the macro's own base URL is the
    /// fallback applied when the run starts
    pub base_url: Option<String>,

    pub browser: BrowserEngine,
    pub headless: bool,
    pub timeouts: Timeouts,
    pub stop_on_fail: bool,
    pub artifacts_dir: PathBuf,
}

impl RunConfig {
    /// Config for an ad-hoc environment with default settings
    pub fn for_environment(env_name: impl Into<String>) -> Self {
        EnvironmentFile::merge(
            env_name.into(),
            EnvironmentConfig::default(),
            RunOverrides::default(),
        )
    }
}

impl EnvironmentFile {
    /// Load the environment file (JSON)
    pub async fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReplayError::Configuration(format!(
                "Failed to read environment file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content).map_err(|e| {
            ReplayError::Configuration(format!(
                "Invalid environment file {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Merge the named environment with overrides.
    ///
    /// An unknown name is a configuration error, never a silent default.
    pub fn resolve(
        &self,
        env_name: &str,
        overrides: RunOverrides,
    ) -> Result<RunConfig, ReplayError> {
        let environment = self.environments.get(env_name).cloned().ok_or_else(|| {
            ReplayError::UnknownEnvironment {
                name: env_name.to_string(),
                known: if self.environments.is_empty() {
                    "none".to_string()
                } else {
                    self.environments
                        .keys()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            }
        })?;

        let config = Self::merge(env_name.to_string(), environment, overrides);

        if config.timeouts.step == 0 || config.timeouts.global == 0 {
            return Err(ReplayError::Configuration(format!(
                "Environment '{}' has a zero timeout",
                env_name
            )));
        }

        Ok(config)
    }

    fn merge(
        env_name: String,
        environment: EnvironmentConfig,
        overrides: RunOverrides,
    ) -> RunConfig {
        let base_url = overrides
            .base_url
            .or(environment.base_url)
            .filter(|url| !url.trim().is_empty());

        RunConfig {
            env_name,
            base_url,
            browser: overrides.browser.unwrap_or(environment.browser),
            headless: overrides.headless.unwrap_or(environment.headless),
            timeouts: Timeouts {
                step: overrides.step_timeout_ms.unwrap_or(environment.timeouts.step),
                global: overrides
                    .global_timeout_ms
                    .unwrap_or(environment.timeouts.global),
            },
            stop_on_fail: overrides.stop_on_fail.unwrap_or(true),
            artifacts_dir: overrides
                .artifacts_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
        }
    }
}
