//! # Configuration Module
//!
//! Connection settings for the remote calculation service.
//!
//! ## Sources
//!
//! Settings are read from a TOML file (default `regraft.toml`), then
//! overridden by environment variables:
//! - `REGRAFT_API_URL`: base URL of the service API
//! - `REGRAFT_API_TOKEN`: Bearer token sent with every request
//! - `REGRAFT_CONTEXT`: context identifier passed as `?context=`
//!
//! A missing file is not an error as long as an API URL comes from the
//! environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "regraft.toml";

const ENV_API_URL: &str = "REGRAFT_API_URL";
const ENV_API_TOKEN: &str = "REGRAFT_API_TOKEN";
const ENV_CONTEXT: &str = "REGRAFT_CONTEXT";

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised while loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("invalid configuration in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no api_url configured: set it in {path} or REGRAFT_API_URL")]
    MissingApiUrl { path: PathBuf },

    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

// =============================================================================
// CONFIG
// =============================================================================

/// Settings as they appear in the file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub context_id: Option<String>,
}

impl ConfigFile {
    /// Parse file contents.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL, without a trailing slash.
    pub api_url: String,
    pub api_token: Option<String>,
    pub context_id: Option<String>,
}

impl Config {
    /// Load `path` and apply the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load `path` and apply overrides from `env`.
    pub fn load_with(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match std::fs::read_to_string(path) {
            Ok(contents) => ConfigFile::parse(path, &contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}", path.display());
                ConfigFile::default()
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        Self::resolve(path, file, env)
    }

    /// Combine file settings with environment overrides.
    pub fn resolve(
        path: &Path,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |key: &str, fallback: Option<String>| {
            env(key).filter(|v| !v.is_empty()).or(fallback)
        };

        let api_url = pick(ENV_API_URL, file.api_url)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiUrl {
                path: path.to_path_buf(),
            })?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: pick(ENV_API_TOKEN, file.api_token),
            context_id: pick(ENV_CONTEXT, file.context_id),
        })
    }

    /// Contents written by `regraft init`.
    #[must_use]
    pub fn template() -> String {
        concat!(
            "# Regraft configuration\n",
            "\n",
            "# Base URL of the calculation service API\n",
            "api_url = \"https://example.thinknode.io/api/v1.0\"\n",
            "\n",
            "# Bearer token (or set REGRAFT_API_TOKEN)\n",
            "# api_token = \"\"\n",
            "\n",
            "# Context passed with every request (or set REGRAFT_CONTEXT)\n",
            "# context_id = \"\"\n",
        )
        .to_string()
    }

    /// Write [`Config::template`] to `path`.
    pub fn write_template(path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, Self::template()).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
