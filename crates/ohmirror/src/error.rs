//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable process exit code.

use miette::Diagnostic;
use thiserror::Error;

use ohmirror_config::ConfigError;
use ohmirror_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to openHAB at {url}")]
    #[diagnostic(
        code(ohmirror::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Reason: {reason}\n\
             A proxy may be in the way; try --proxy none"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the server was lost")]
    #[diagnostic(code(ohmirror::disconnected))]
    Disconnected,

    #[error("Request to {url} timed out")]
    #[diagnostic(
        code(ohmirror::timeout),
        help("Increase the timeout with --timeout or check server responsiveness.")
    )]
    Timeout { url: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Server rejected the credentials ({status})")]
    #[diagnostic(
        code(ohmirror::auth_failed),
        help(
            "Verify the username in your profile, then store the password with:\n\
             ohmirror config set-password"
        )
    )]
    AuthFailed { status: u16 },

    #[error("No password configured for user '{username}' (profile '{profile}')")]
    #[diagnostic(
        code(ohmirror::no_credentials),
        help(
            "Run: ohmirror config set-password --profile {profile}\n\
             Or set the OHMIRROR_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String, username: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ohmirror::not_found),
        help("Run: ohmirror {list_command} to see what the server offers")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Server / data ────────────────────────────────────────────────
    #[error("Server answered HTTP {status} for {url}")]
    #[diagnostic(code(ohmirror::http))]
    Http { status: u16, url: String },

    #[error("Unexpected data from server: {message}")]
    #[diagnostic(code(ohmirror::data))]
    Data { message: String },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(ohmirror::unsupported),
        help("Run: ohmirror items to check the item's type")
    )]
    Unsupported { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ohmirror::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ohmirror::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(ohmirror::no_config),
        help(
            "Pass --url, set OHMIRROR_URL, or add a profile to:\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ohmirror::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(ohmirror::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<ohmirror_api::Error> for CliError {
    fn from(err: ohmirror_api::Error) -> Self {
        use ohmirror_api::Error as ApiError;

        match err {
            ApiError::Connection { url, reason } => Self::ConnectionFailed { url, reason },
            ApiError::Timeout { url } => Self::Timeout { url },
            ApiError::Http { status, .. } if status == 401 || status == 403 => {
                Self::AuthFailed { status }
            }
            ApiError::Http { status, url } => Self::Http { status, url },
            ApiError::InvalidUrl(e) => Self::Validation {
                field: "url".into(),
                reason: e.to_string(),
            },
            ApiError::ClientBuild(reason) => Self::Validation {
                field: "proxy".into(),
                reason,
            },
            ApiError::EmptyResponse => Self::Data {
                message: "empty response".into(),
            },
            other => Self::Data {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Api(api) => api.into(),

            CoreError::SitemapNotFound { name } => Self::NotFound {
                resource_type: "Sitemap".into(),
                identifier: name,
                list_command: "sitemaps".into(),
            },

            CoreError::ItemNotFound { name } => Self::NotFound {
                resource_type: "Item".into(),
                identifier: name,
                list_command: "items".into(),
            },

            CoreError::TypeMismatch { .. } => Self::Validation {
                field: "value".into(),
                reason: err.to_string(),
            },

            CoreError::Unsupported { .. } => Self::Unsupported {
                message: err.to_string(),
            },

            CoreError::Terminated => Self::Disconnected,

            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Decode { .. }
            | CoreError::MissingField { .. }
            | CoreError::UnknownKind { .. } => Self::Data {
                message: err.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile, username } => {
                Self::NoCredentials { profile, username }
            }
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
