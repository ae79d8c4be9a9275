//! Profile selection and command-line overrides.
//!
//! Files, keyring and env resolution live in `ohmirror-config`; this
//! module only decides which profile applies and layers the global
//! flags on top before handing a `ServerConfig` to core.

use ohmirror_config::{Config, Profile};
use ohmirror_core::ServerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use ohmirror_config::{config_path, load_config_or_default, save_config, store_password};

/// A server config plus the profile it came from.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub server: ServerConfig,
    /// Sitemap named in the profile, used by `watch` without an argument.
    pub sitemap: Option<String>,
}

/// Name of the profile in effect for this invocation.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the server config from the config file, profile, and flag overrides.
///
/// An explicitly requested profile must exist. Without one, flags and
/// env vars alone may describe the server.
pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(p) => p.clone(),
        None if global.profile.is_some() => {
            let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
            names.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            });
        }
        None => Profile::default(),
    };

    apply_overrides(&mut profile, global);
    if profile.url.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    let server = ohmirror_config::profile_to_server_config(&profile, &profile_name, &cfg.defaults)?;
    Ok(Resolved {
        profile_name,
        server,
        sitemap: profile.sitemap,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if let Some(ref proxy) = global.proxy {
        profile.proxy = Some(proxy.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}
