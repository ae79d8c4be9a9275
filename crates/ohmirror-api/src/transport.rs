// Shared transport configuration for building the reqwest::Client.
//
// Proxy policy, timeouts and the static basic-auth header are applied
// uniformly to every request the client issues.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap};
use url::Url;

use crate::auth::BasicAuth;
use crate::error::Error;

/// Proxy policy (api-level mirror of core's `ProxySetting`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyMode {
    /// Use the proxies from the environment (`HTTP_PROXY` and friends).
    #[default]
    System,
    /// Never use a proxy, even if the environment configures one.
    Disabled,
    /// Route both http and https through this proxy.
    Explicit(Url),
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for ordinary requests.
    pub timeout: Duration,
    /// Timeout for long-poll requests. Must exceed the server's hold
    /// window (about five minutes on openHAB 2).
    pub long_poll_timeout: Duration,
    pub proxy: ProxyMode,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            long_poll_timeout: Duration::from_secs(330),
            proxy: ProxyMode::System,
            basic_auth: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        if let Some(ref auth) = self.basic_auth {
            headers.insert(AUTHORIZATION, auth.header_value()?);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("ohmirror/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);

        match &self.proxy {
            ProxyMode::System => {}
            ProxyMode::Disabled => {
                builder = builder.no_proxy();
            }
            ProxyMode::Explicit(url) => {
                let proxy = reqwest::Proxy::all(url.as_str())
                    .map_err(|e| Error::ClientBuild(format!("invalid proxy {url}: {e}")))?;
                builder = builder.proxy(proxy);
            }
        }

        builder
            .build()
            .map_err(|e| Error::ClientBuild(e.to_string()))
    }
}
