// openHAB REST client
//
// Wraps `reqwest::Client` with JSON decoding, the long-poll header
// protocol, and the mapping of transport conditions onto typed errors.
// Each call is self-contained: the continuation token for long-polling
// is owned by the caller (one per watched entity), never by the client.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::resources::Resources;
use crate::transport::TransportConfig;
use crate::{TRACKING_ID_HEADER, TRANSPORT_HEADER};

/// A decoded JSON body together with the response headers.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub body: Value,
    pub headers: HeaderMap,
}

impl JsonResponse {
    /// The long-poll continuation token, if the server handed one out.
    pub fn tracking_id(&self) -> Option<&str> {
        self.headers
            .get(TRACKING_ID_HEADER)
            .and_then(|v| v.to_str().ok())
    }
}

/// HTTP client for a single openHAB server.
///
/// Cheap to share behind an `Arc`; the underlying `reqwest::Client`
/// pools connections across all polling workers.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    long_poll_timeout: Duration,
}

impl RestClient {
    /// Create a client for the server at `base_url` (e.g.
    /// `http://openhab.lan:8080`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(
            http,
            base_url,
            transport.long_poll_timeout,
        ))
    }

    /// Wrap a pre-built `reqwest::Client` (caller manages auth and proxy).
    pub fn with_client(http: reqwest::Client, base_url: Url, long_poll_timeout: Duration) -> Self {
        Self {
            http,
            base_url: Self::normalize_base_url(base_url),
            long_poll_timeout,
        }
    }

    /// Ensure the base path ends in `/` so relative joins append.
    fn normalize_base_url(mut url: Url) -> Url {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url
    }

    /// The server base URL (always ends in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}rest{path}`; `path` is either empty or starts with `/`.
    pub fn rest_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(&format!("rest{path}"))?)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// GET `url` and decode the JSON body.
    ///
    /// `extra_headers` are merged over the default `accept` header.
    pub async fn fetch_json(
        &self,
        url: &Url,
        extra_headers: Option<HeaderMap>,
    ) -> Result<JsonResponse, Error> {
        self.get(url, extra_headers.unwrap_or_default(), None).await
    }

    /// Fetch a path relative to the `/rest` root.
    pub async fn fetch_rel_json(&self, path: &str) -> Result<JsonResponse, Error> {
        let url = self.rest_url(path)?;
        self.fetch_json(&url, None).await
    }

    /// Issue a long-poll GET. The server holds the request open until the
    /// resource changes or its hold window elapses (then the body is
    /// empty and [`Error::EmptyResponse`] is returned).
    pub async fn long_poll(
        &self,
        url: &Url,
        tracking_id: Option<&str>,
    ) -> Result<JsonResponse, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSPORT_HEADER, HeaderValue::from_static("long-polling"));
        if let Some(id) = tracking_id {
            let value = HeaderValue::from_str(id).map_err(|_| Error::InvalidHeader {
                name: TRACKING_ID_HEADER,
            })?;
            headers.insert(TRACKING_ID_HEADER, value);
        }
        self.get(url, headers, Some(self.long_poll_timeout)).await
    }

    /// Fetch the `/rest` root and merge its links over the defaults.
    pub async fn load_resources(&self) -> Result<Resources, Error> {
        let mut resources = Resources::with_defaults(&self.base_url)?;
        let root = self.fetch_rel_json("").await?;
        let count = resources.merge_root(&root.body)?;
        debug!(count, "loaded REST resources");
        Ok(resources)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// POST a command to an item link (`ON`, `OFF`, `42`, ...).
    pub async fn send_command(&self, link: &Url, command: &str) -> Result<(), Error> {
        debug!(%link, command, "POST command");
        let resp = self
            .http
            .post(link.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(command.to_owned())
            .send()
            .await
            .map_err(|e| Error::from_reqwest(link, e))?;
        Self::check_status(link, &resp)
    }

    /// PUT a state update to `{link}/state`.
    pub async fn put_state(&self, link: &Url, state: &str) -> Result<(), Error> {
        let url = Url::parse(&format!("{}/state", link.as_str().trim_end_matches('/')))?;
        debug!(%url, state, "PUT state");
        let resp = self
            .http
            .put(url.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(state.to_owned())
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&url, e))?;
        Self::check_status(&url, &resp)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get(
        &self,
        url: &Url,
        extra_headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<JsonResponse, Error> {
        debug!(%url, headers = ?extra_headers, "GET");

        let mut builder = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .headers(extra_headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::from_reqwest(url, e))?;

        Self::check_status(url, &resp)?;

        let headers = resp.headers().clone();
        let text = resp.text().await.map_err(|e| Error::from_reqwest(url, e))?;
        trace!(%url, body = %text, "response");

        if text.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }

        let body = serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: text.clone(),
            }
        })?;

        Ok(JsonResponse { body, headers })
    }

    fn check_status(url: &Url, resp: &reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        warn!(%url, %status, "request failed");
        Err(Error::Http {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}
