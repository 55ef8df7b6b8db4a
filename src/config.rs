//! Configuration loading.
//!
//! Loads `~/.skybot/config.toml` (or `$SKYBOT_CONFIG_PATH`). Environment
//! variables override file values; file values override defaults. The
//! `-i` flag beats all of them and is applied by [`Config::instance_url`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::client::xrpc::{DEFAULT_CHAT_PROXY, DEFAULT_INSTANCE_URL};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// PDS the bot logs in to.
    pub instance_url: String,
    /// `atproto-proxy` target for chat calls.
    pub chat_proxy: String,
    /// HTTP client settings.
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_url: DEFAULT_INSTANCE_URL.to_owned(),
            chat_proxy: DEFAULT_CHAT_PROXY.to_owned(),
            http: HttpConfig::default(),
        }
    }
}

/// HTTP client timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = config_path_with(&env)?;
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SKYBOT_INSTANCE_URL") {
            self.instance_url = v;
        }
        if let Some(v) = env("SKYBOT_CHAT_PROXY") {
            self.chat_proxy = v;
        }
        if let Some(v) = env("SKYBOT_REQUEST_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.http.request_timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "SKYBOT_REQUEST_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or mistyped fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// The instance URL to use, preferring `override_url` when given.
    ///
    /// # Errors
    ///
    /// Returns an error unless the URL is an absolute `http` or `https` URL.
    pub fn instance_url(&self, override_url: Option<&str>) -> Result<Url> {
        let raw = override_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.instance_url);
        let url = Url::parse(raw).with_context(|| format!("invalid instance URL {raw:?}"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
            anyhow::bail!("instance URL {raw:?} must be an http(s) URL");
        }
        Ok(url)
    }
}

/// Resolve the default config directory (`~/.skybot/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".skybot"))
}

/// Resolve the config file path: `$SKYBOT_CONFIG_PATH`, else
/// `~/.skybot/config.toml`.
///
/// # Errors
///
/// Returns an error if no override is set and the home directory is unknown.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(p) = env("SKYBOT_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}
