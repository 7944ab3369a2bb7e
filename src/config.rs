//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/bindery/config.toml` (XDG) or platform config dir
//! 2. Project config: `bindery.toml`
//! 3. Environment variables: `BINDERY_*`, nested with `__`
//!
//! # Intended Usage
//!
//! ```toml
//! [application]
//! name = "inventory"
//!
//! # Bound as `authenticators.basic.config`
//! [extensions.authenticators.basic]
//! realm = "users"
//!
//! # Bound as `greeters.config`
//! [extensions.greeters.config]
//! default = "en"
//! ```
//!
//! `BINDERY_APPLICATION__NAME=inventory` overrides the application name.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Project config file, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "bindery.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "BINDERY_";

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Extension configuration: `extensions.<point>.<extension>`.
    #[serde(default)]
    pub extensions: BTreeMap<String, BTreeMap<String, JsonValue>>,
}

/// Application-wide settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApplicationConfig {
    /// Name of the root context; generated when absent.
    pub name: Option<String>,
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load config from an explicit file, still honoring env overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
    }

    /// The layered provider chain used by [`Config::load`].
    pub fn figment() -> Figment {
        Figment::new()
            // Layer 1: User config (lowest priority)
            .merge(Toml::file(Self::user_config_path()))
            // Layer 2: Project config
            .merge(Toml::file(PROJECT_CONFIG_FILE))
            // Layer 3: Environment variables (highest priority)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Configuration of one extension, if present.
    pub fn extension(&self, extension_point: &str, extension: &str) -> Option<&JsonValue> {
        self.extensions.get(extension_point)?.get(extension)
    }

    /// User config path: ~/.config/bindery/config.toml (XDG) or platform config dir.
    fn user_config_path() -> PathBuf {
        // Prefer XDG config location (~/.config) on all platforms
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("bindery").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        // Fall back to platform-specific config dir
        dirs::config_dir()
            .map(|p| p.join("bindery").join("config.toml"))
            .unwrap_or_default()
    }
}
