//! Configuration for phaseloop.
//!
//! The config file is optional. It lives at `~/.phaseloop/config.toml` unless
//! `PHASELOOP_CONFIG` points elsewhere:
//!
//! ```toml
//! [fetch]
//! url = "http://localhost:8080/csrf"   # ${VAR} references are expanded
//! timeout_secs = 10
//!
//! [network]
//! refused_host = "127.0.0.1"
//! refused_port = 9
//! listen_host = "127.0.0.1"
//! ```
//!
//! [`PhaseloopConfig`] mirrors the file as written; [`Settings`] is the
//! resolved form with env overrides and defaults applied.

mod resolved;

use std::env;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub use resolved::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FETCH_URL, DEFAULT_REFUSED_PORT, FETCH_URL_ENV, Settings,
};

/// Env var that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PHASELOOP_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct PhaseloopConfig {
    pub fetch: Option<FetchConfig>,
    pub network: Option<NetworkConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchConfig {
    /// URL for the `--fetch` request. Supports `${VAR}` expansion.
    pub url: Option<String>,
    /// Whole-request timeout in seconds. Zero disables the timeout.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkConfig {
    /// Host the deliberately refused connection targets.
    pub refused_host: Option<IpAddr>,
    /// Port expected to be closed on `refused_host`.
    pub refused_port: Option<u16>,
    /// Interface the demo server binds to (always on an OS-assigned port).
    pub listen_host: Option<IpAddr>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid fetch url {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ConfigError {
    /// Config file the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::InvalidUrl { .. } => None,
        }
    }
}

impl PhaseloopConfig {
    /// Load the config from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".phaseloop").join("config.toml"))
}

/// Replace `${VAR}` references with the variable's value. Unset variables
/// expand to nothing; an unclosed `${` is kept verbatim.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out
}
