//! Configuration for the ohmirror command line.
//!
//! TOML profiles (one per openHAB server), credential resolution
//! (env + keyring + plaintext) and translation to
//! `ohmirror_core::ServerConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ohmirror_core::{Credentials, ProxySetting, ServerConfig};

/// Keyring service name under which passwords are stored.
pub const KEYRING_SERVICE: &str = "ohmirror";

/// Environment variable consulted for the password when the profile
/// does not name one.
pub const PASSWORD_ENV: &str = "OHMIRROR_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no password configured for user '{username}' in profile '{profile}'")]
    NoCredentials { profile: String, username: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is given on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name.to_owned(), p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Long-poll timeout in seconds. Must outlast the server's hold
    /// window of about five minutes.
    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout: u64,

    /// `system`, `none`, or a proxy URL.
    #[serde(default = "default_proxy")]
    pub proxy: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            long_poll_timeout: default_long_poll_timeout(),
            proxy: default_proxy(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_long_poll_timeout() -> u64 {
    330
}
fn default_proxy() -> String {
    "system".into()
}

/// A named server profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "http://openhab.lan:8080").
    pub url: String,

    /// Sitemap opened by `watch` when none is given.
    pub sitemap: Option<String>,

    /// Username for basic auth. No username means no authentication.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override the proxy policy.
    pub proxy: Option<String>,

    /// Override the request timeout.
    pub timeout: Option<u64>,

    /// Override the long-poll timeout.
    pub long_poll_timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "ohmirror", "ohmirror").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ohmirror");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered over defaults and under `OHMIRROR_*`
/// environment overrides (`OHMIRROR_DEFAULTS__TIMEOUT=10`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OHMIRROR_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/password"),
    )?)
}

/// Store a password for `profile_name` in the system keyring.
pub fn store_password(profile_name: &str, password: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password.expose_secret())?;
    Ok(())
}

/// Resolve basic-auth credentials for a profile.
///
/// A profile without a username needs none. Otherwise the password is
/// taken from the profile's env var (or `OHMIRROR_PASSWORD`), then the
/// keyring, then plaintext config.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile.username.clone() else {
        return Ok(None);
    };
    let credentials = |password: String| {
        Ok(Some(Credentials {
            username: username.clone(),
            password: SecretString::from(password),
        }))
    };

    // 1. Env var
    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Ok(pw) = std::env::var(env_name) {
        return credentials(pw);
    }

    // 2. Keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return credentials(pw);
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return credentials(pw.clone());
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        username,
    })
}

/// Build a `ServerConfig` from a profile and the global defaults.
pub fn profile_to_server_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ServerConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let proxy_raw = profile.proxy.as_deref().unwrap_or(&defaults.proxy);
    let proxy: ProxySetting = proxy_raw.parse().map_err(|_| ConfigError::Validation {
        field: "proxy".into(),
        reason: format!("expected 'system', 'none' or a URL, got '{proxy_raw}'"),
    })?;

    let mut config = ServerConfig::new(url);
    config.credentials = resolve_credentials(profile, profile_name)?;
    config.proxy = proxy;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.long_poll_timeout = Duration::from_secs(
        profile
            .long_poll_timeout
            .unwrap_or(defaults.long_poll_timeout),
    );
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn loads_profiles_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "home"

[defaults]
timeout = 10

[profiles.home]
url = "http://openhab.lan:8080"
sitemap = "default"
proxy = "none"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.defaults.timeout, 10);
        assert_eq!(cfg.defaults.long_poll_timeout, 330);
        assert_eq!(cfg.defaults.output, "table");

        let (name, profile) = cfg.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(profile.sitemap.as_deref(), Some("default"));
        assert!(matches!(
            cfg.profile(Some("office")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                url: "http://localhost:8080".into(),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles["default"].url, "http://localhost:8080");
    }

    #[test]
    fn profile_maps_to_server_config() {
        let profile = Profile {
            url: "http://openhab.lan:8080".into(),
            proxy: Some("none".into()),
            timeout: Some(5),
            ..Profile::default()
        };
        let config = profile_to_server_config(&profile, "home", &Defaults::default()).unwrap();
        assert_eq!(config.url.as_str(), "http://openhab.lan:8080/");
        assert_eq!(config.proxy, ProxySetting::NoProxy);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.long_poll_timeout, Duration::from_secs(330));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn rejects_bad_url_and_proxy() {
        let mut profile = Profile {
            url: "not a url".into(),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_server_config(&profile, "x", &Defaults::default()),
            Err(ConfigError::Validation { .. })
        ));

        profile.url = "http://oh:8080".into();
        profile.proxy = Some("::bad::".into());
        assert!(matches!(
            profile_to_server_config(&profile, "x", &Defaults::default()),
            Err(ConfigError::Validation { .. })
        ));
    }
}
