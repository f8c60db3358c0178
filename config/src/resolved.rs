//! Resolved settings: env overrides and defaults applied, no `Option`s left.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use url::Url;

use crate::{ConfigError, PhaseloopConfig, expand_env_vars};

/// Env var that overrides `[fetch] url`.
pub const FETCH_URL_ENV: &str = "PHASELOOP_FETCH_URL";

pub const DEFAULT_FETCH_URL: &str = "http://localhost:8080/csrf";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
/// The discard port; nothing listens on it on a typical machine.
pub const DEFAULT_REFUSED_PORT: u16 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub fetch_url: Url,
    /// `None` means the request may take as long as it takes.
    pub fetch_timeout: Option<Duration>,
    pub refused_addr: SocketAddr,
    /// Always port 0; the OS picks the port at bind time.
    pub listen_addr: SocketAddr,
}

impl Settings {
    /// Resolve from an optional config file plus the process environment.
    pub fn resolve(config: Option<&PhaseloopConfig>) -> Result<Self, ConfigError> {
        Self::resolve_with_env(config, env::var(FETCH_URL_ENV).ok())
    }

    /// Resolve with an explicit value for [`FETCH_URL_ENV`].
    pub fn resolve_with_env(
        config: Option<&PhaseloopConfig>,
        env_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let fetch = config.and_then(|cfg| cfg.fetch.as_ref());
        let network = config.and_then(|cfg| cfg.network.as_ref());

        let raw_url = env_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| fetch.and_then(|f| f.url.clone()))
            .map(|url| expand_env_vars(&url))
            .unwrap_or_else(|| DEFAULT_FETCH_URL.to_string());
        let fetch_url = Url::parse(raw_url.trim()).map_err(|source| ConfigError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;

        let timeout_secs = fetch
            .and_then(|f| f.timeout_secs)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        let fetch_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let refused_addr = SocketAddr::new(
            network.and_then(|n| n.refused_host).unwrap_or(localhost),
            network
                .and_then(|n| n.refused_port)
                .unwrap_or(DEFAULT_REFUSED_PORT),
        );
        let listen_addr = SocketAddr::new(network.and_then(|n| n.listen_host).unwrap_or(localhost), 0);

        Ok(Self {
            fetch_url,
            fetch_timeout,
            refused_addr,
            listen_addr,
        })
    }
}
