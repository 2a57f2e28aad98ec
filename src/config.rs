//! Configuration file support for rolecheck
//!
//! Reads configuration from `~/.config/rolecheck/config.json` (or
//! `config.toml`), or from the file given with `--config`:
//!
//! ```json
//! {
//!   "base_url": "https://192.168.188.28/api/",
//!   "insecure": false,
//!   "parallel": false,
//!   "pace_ms": 1000,
//!   "success_criterion": "http-status",
//!   "min_login_rate": 90,
//!   "min_endpoint_rate": 90,
//!   "accounts": [
//!     { "email": "admin@ptms.com", "password": "admin123",
//!       "expected_role_id": 1, "role_name": "ADMIN" }
//!   ],
//!   "endpoints": [
//!     { "path": "projects.php", "method": "GET" }
//!   ]
//! }
//! ```
//!
//! Every field is optional. Environment variables and CLI flags are applied
//! on top through [`Overrides`].

use crate::account::{TestAccount, default_accounts};
use crate::endpoints::{EndpointSpec, SYSTEM_STATUS_PATH, default_endpoints};
use crate::harness::{DEFAULT_PACE, RunMode, SuccessCriterion};
use crate::http::{DEFAULT_TIMEOUT_SECS, TransportOptions};
use crate::report::Thresholds;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Test server used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "https://192.168.188.28/api/";

/// Default minimum success rate, the "excellent" tier
const DEFAULT_MIN_RATE: f64 = 90.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine config directory. HOME environment variable not set.")]
    NoConfigDir,

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Duplicate test account: {0}")]
    DuplicateAccount(String),
}

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Skip TLS verification; must be requested explicitly
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause between accounts in sequential mode
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub success_criterion: SuccessCriterion,

    #[serde(default = "default_min_rate")]
    pub min_login_rate: f64,

    #[serde(default = "default_min_rate")]
    pub min_endpoint_rate: f64,

    #[serde(default = "default_accounts")]
    pub accounts: Vec<TestAccount>,

    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointSpec>,

    /// Also probe `system/status`
    #[serde(default)]
    pub include_system_status: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_pace_ms() -> u64 {
    DEFAULT_PACE.as_millis() as u64
}

fn default_min_rate() -> f64 {
    DEFAULT_MIN_RATE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            insecure: false,
            timeout_secs: default_timeout_secs(),
            pace_ms: default_pace_ms(),
            parallel: false,
            success_criterion: SuccessCriterion::default(),
            min_login_rate: DEFAULT_MIN_RATE,
            min_endpoint_rate: DEFAULT_MIN_RATE,
            accounts: default_accounts(),
            endpoints: default_endpoints(),
            include_system_status: false,
        }
    }
}

/// Values from the environment and command line; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub insecure: bool,
    pub timeout_secs: Option<u64>,
    pub pace_ms: Option<u64>,
    pub parallel: bool,
    pub success_criterion: Option<SuccessCriterion>,
    pub min_login_rate: Option<f64>,
    pub min_endpoint_rate: Option<f64>,
    /// Replaces the whole account list when non-empty
    pub accounts: Vec<TestAccount>,
    pub include_system_status: bool,
}

impl Config {
    /// Load from `path`, or from the default location if `path` is `None`
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                path.to_path_buf()
            }
            None => match find_default_config()? {
                Some(path) => path,
                None => {
                    tracing::debug!("no config file found, using defaults");
                    return Ok(Config::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "loading config");
        Self::parse(&content, &path)
    }

    /// Parse by extension: `.toml` as TOML, anything else as JSON
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            toml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::ParseError {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        self.insecure |= overrides.insecure;
        self.parallel |= overrides.parallel;
        self.include_system_status |= overrides.include_system_status;
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(pace) = overrides.pace_ms {
            self.pace_ms = pace;
        }
        if let Some(criterion) = overrides.success_criterion {
            self.success_criterion = criterion;
        }
        if let Some(rate) = overrides.min_login_rate {
            self.min_login_rate = rate;
        }
        if let Some(rate) = overrides.min_endpoint_rate {
            self.min_endpoint_rate = rate;
        }
        if !overrides.accounts.is_empty() {
            self.accounts = overrides.accounts;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must start with http:// or https:// (got '{}')",
                self.base_url
            )));
        }
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("no test accounts configured".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than 0".to_string()));
        }
        for (name, rate) in [
            ("min_login_rate", self.min_login_rate),
            ("min_endpoint_rate", self.min_endpoint_rate),
        ] {
            if !(0.0..=100.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and 100 (got {})",
                    name, rate
                )));
            }
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.email.to_lowercase()) {
                return Err(ConfigError::DuplicateAccount(account.email.clone()));
            }
        }

        for endpoint in &self.endpoints {
            if endpoint.path.trim().is_empty() {
                return Err(ConfigError::Invalid("endpoint path cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Endpoints to probe, with `system/status` appended when requested
    pub fn endpoint_list(&self) -> Vec<EndpointSpec> {
        let mut endpoints = self.endpoints.clone();
        if self.include_system_status && !endpoints.iter().any(|e| e.path == SYSTEM_STATUS_PATH) {
            endpoints.push(EndpointSpec::get(SYSTEM_STATUS_PATH));
        }
        endpoints
    }

    pub fn run_mode(&self) -> RunMode {
        if self.parallel {
            RunMode::Parallel
        } else {
            RunMode::Sequential {
                pace: Duration::from_millis(self.pace_ms),
            }
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_login_rate: self.min_login_rate,
            min_endpoint_rate: self.min_endpoint_rate,
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            insecure: self.insecure,
        }
    }
}

/// Returns the config directory: `~/.config/rolecheck`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    // Use XDG_CONFIG_HOME if set, otherwise fall back to ~/.config
    let config_base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".config"))
                .unwrap_or_default()
        });

    if config_base.as_os_str().is_empty() {
        return Err(ConfigError::NoConfigDir);
    }

    Ok(config_base.join("rolecheck"))
}

/// First existing `config.json` or `config.toml` in the config directory
fn find_default_config() -> Result<Option<PathBuf>, ConfigError> {
    let dir = config_dir()?;
    Ok(["config.json", "config.toml"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists()))
}
