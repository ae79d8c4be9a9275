// ── Runtime connection configuration ──
//
// These types describe *how* to reach an openHAB server. They carry
// credentials and tuning, but never touch disk; the CLI (or any other
// front end) builds a `ServerConfig` and hands it in.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Basic-auth credentials for the server.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Proxy policy applied to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxySetting {
    /// Honor the system / environment proxy configuration.
    #[default]
    System,
    /// Connect directly, ignoring any environment proxy.
    NoProxy,
    /// Send http and https traffic through this proxy.
    Url(Url),
}

impl FromStr for ProxySetting {
    type Err = CoreError;

    /// Parses `system`, `none`, or a proxy URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "system" => Ok(Self::System),
            "none" => Ok(Self::NoProxy),
            other => Url::parse(other)
                .map(Self::Url)
                .map_err(|e| CoreError::Config {
                    message: format!("invalid proxy '{other}': {e}"),
                }),
        }
    }
}

/// Configuration for one server session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server base URL (e.g., `http://openhab.lan:8080`).
    pub url: Url,
    pub credentials: Option<Credentials>,
    pub proxy: ProxySetting,
    /// Timeout for ordinary requests.
    pub timeout: Duration,
    /// Timeout for long-poll requests; must outlast the server's hold
    /// window of roughly five minutes.
    pub long_poll_timeout: Duration,
    /// Spawn a long-polling worker for every page that gets created.
    pub poll_pages: bool,
}

impl ServerConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            proxy: ProxySetting::System,
            timeout: Duration::from_secs(30),
            long_poll_timeout: Duration::from_secs(330),
            poll_pages: false,
        }
    }

    /// Build a config for `host:port`, the way openHAB servers are
    /// usually addressed.
    pub fn for_host(host: &str, port: u16) -> Result<Self, CoreError> {
        let url = Url::parse(&format!("http://{host}:{port}/"))?;
        Ok(Self::new(url))
    }
}
