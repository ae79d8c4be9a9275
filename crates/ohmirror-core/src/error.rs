// ── Core error types ──
//
// Errors surfaced by the mirror. Transport failures stay wrapped in
// `Api` so the polling loop can classify them; everything else is a
// domain condition the command caller can act on.

use thiserror::Error;

use crate::model::ItemKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport (wrapped) ──────────────────────────────────────────
    #[error(transparent)]
    Api(#[from] ohmirror_api::Error),

    // ── Data errors ──────────────────────────────────────────────────
    /// A server payload could not be decoded (bad decimal, date, ...).
    #[error("Cannot decode {context}: {message}")]
    Decode { context: String, message: String },

    /// A payload lacked a field the entity cannot live without.
    #[error("Missing field '{field}' in {entity} payload")]
    MissingField { entity: &'static str, field: String },

    /// The server sent a type tag this client does not model.
    #[error("Unknown {entity} type '{kind}'")]
    UnknownKind { entity: &'static str, kind: String },

    #[error("Sitemap not found: {name}")]
    SitemapNotFound { name: String },

    #[error("Item not found: {name}")]
    ItemNotFound { name: String },

    // ── Command errors ───────────────────────────────────────────────
    /// A command or state argument has the wrong type for the item.
    #[error("{item_type} item expects {expected}")]
    TypeMismatch {
        item_type: ItemKind,
        expected: &'static str,
    },

    /// The item kind does not accept this command at all.
    #[error("{item_type} item does not support {operation}")]
    Unsupported {
        operation: String,
        item_type: ItemKind,
    },

    // ── Session ──────────────────────────────────────────────────────
    /// The session was terminated or closed; it issues no more requests.
    #[error("Server session terminated")]
    Terminated,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn missing(entity: &'static str, field: &str) -> Self {
        Self::MissingField {
            entity,
            field: field.to_owned(),
        }
    }

    /// The wrapped transport error, if this is one.
    pub fn as_api(&self) -> Option<&ohmirror_api::Error> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<url::ParseError> for CoreError {
    fn from(err: url::ParseError) -> Self {
        Self::Api(ohmirror_api::Error::InvalidUrl(err))
    }
}
