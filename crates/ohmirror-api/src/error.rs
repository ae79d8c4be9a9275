use thiserror::Error;

/// Top-level error type for the `ohmirror-api` crate.
///
/// The long-poll conventions of the openHAB server are modelled as
/// distinct variants so the synchronization loop can tell an expected
/// "nothing changed" apart from a dead session.
#[derive(Debug, Error)]
pub enum Error {
    // ── Long-poll outcomes ──────────────────────────────────────────
    /// The server answered with an empty body. openHAB does this when a
    /// long-poll request saw no change within its hold window.
    #[error("Empty response from server")]
    EmptyResponse,

    /// The request timed out while waiting for the response.
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    // ── HTTP ────────────────────────────────────────────────────────
    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The connection was refused or reset. The session is gone.
    #[error("Connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    /// Any other HTTP transport error.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header value could not be constructed (e.g. credentials with
    /// control characters).
    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    /// The proxy URL was rejected or the HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` for conditions the polling loop simply retries:
    /// empty long-poll answers, read timeouts and non-success statuses.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyResponse | Self::Timeout { .. } | Self::Http { .. }
        )
    }

    /// Returns `true` if the whole server session should be torn down.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// The HTTP status code, if the server answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Classify a `reqwest` failure for `url`.
    pub(crate) fn from_reqwest(url: &url::Url, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Connection {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Transport(err)
        }
    }
}
