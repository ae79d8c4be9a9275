use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// HTTP Basic credentials.
///
/// openHAB only needs them as a static `authorization` header, so the
/// encoded value is computed once when the client is built.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// The `authorization` header value, marked sensitive so it never
    /// shows up in debug output.
    pub fn header_value(&self) -> Result<HeaderValue, Error> {
        let raw = format!("{}:{}", self.username, self.password.expose_secret());
        let encoded = STANDARD.encode(raw.as_bytes());
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|_| Error::InvalidHeader {
                name: "authorization",
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encodes_rfc7617_example() {
        let auth = BasicAuth::new("Aladdin", SecretString::from("open sesame".to_string()));
        let value = auth.header_value().unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
        assert!(value.is_sensitive());
    }
}
