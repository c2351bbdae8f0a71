//! Configuration parsing and validation for chatrelay.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub database: Option<DatabaseConfig>,
    pub endpoints: Vec<EndpointConfig>,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:5000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Upper bound on requests handled at once
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_listen() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_max_concurrent_requests() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

/// Upstream client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Whole-call budget for one upstream request, body included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// System message sent ahead of every question
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Use Chinese to respond.".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./chatrelay.db".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to persist dispatch outcomes to the database
    #[serde(default = "default_true")]
    pub log_requests: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_requests: true,
        }
    }
}

/// API key wrapper that redacts in Debug/Display and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How an endpoint's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
        }
    }
}

/// One upstream chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Full chat-completions URL (e.g., "https://api.example.com/v1/chat/completions")
    pub url: String,
    pub key: ApiKey,
    pub model: String,
}

impl EndpointConfig {
    /// Check that every field is usable; `index` is only used for the message.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Endpoint #{} has empty url",
                index
            )));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Endpoint #{} url '{}' must start with http:// or https://",
                index, self.url
            )));
        }
        if self.key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Endpoint #{} has empty key",
                index
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Endpoint #{} has empty model",
                index
            )));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse JSON config: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for endpoint #{endpoint}: {message}")]
    EnvVar {
        var: String,
        endpoint: usize,
        message: String,
    },
}

/// Raw endpoint entry as written in the file; values may still hold `${VAR}`.
///
/// Field aliases accept the older JSON layout (`ai_list` entries with `key`).
#[derive(Deserialize)]
pub struct RawEndpointConfig {
    url: String,
    #[serde(alias = "api_key", alias = "credential")]
    key: String,
    model: String,
}

/// Raw configuration deserialized directly from TOML or JSON.
#[derive(Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    client: ClientConfig,
    database: Option<DatabaseConfig>,
    #[serde(default, alias = "ai_list")]
    endpoints: Vec<RawEndpointConfig>,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, endpoint: usize, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            endpoint,
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                endpoint,
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            endpoint,
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn expand_env_vars(input: &str, endpoint: usize) -> Result<String, ConfigError> {
    expand_env_vars_with(input, endpoint, |name| std::env::var(name).ok())
}

impl Config {
    /// Load configuration from a file, returning per-endpoint key sources.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<KeySource>), ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let raw: RawConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        let (config, key_sources) = Self::from_raw(raw)?;
        config.validate()?;
        Ok((config, key_sources))
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(path).map(|(config, _)| config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let (config, _) = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert raw (deserialized) config to final config with env var expansion.
    ///
    /// Both `url` and `key` may reference environment variables.
    pub fn from_raw(raw: RawConfig) -> Result<(Self, Vec<KeySource>), ConfigError> {
        let mut endpoints = Vec::with_capacity(raw.endpoints.len());
        let mut key_sources = Vec::with_capacity(raw.endpoints.len());

        for (index, re) in raw.endpoints.into_iter().enumerate() {
            let url = expand_env_vars(&re.url, index)?;
            let (key, source) = if re.key.contains("${") {
                (
                    ApiKey::from(expand_env_vars(&re.key, index)?),
                    KeySource::EnvExpanded,
                )
            } else {
                (ApiKey::from(re.key), KeySource::Literal)
            };

            key_sources.push(source);
            endpoints.push(EndpointConfig {
                url,
                key,
                model: re.model,
            });
        }

        let config = Config {
            server: raw.server,
            client: raw.client,
            database: raw.database,
            endpoints,
            logging: raw.logging,
        };

        Ok((config, key_sources))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::Validation(
                "No endpoints configured".to_string(),
            ));
        }

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            endpoint.validate(index)?;
        }

        if self.server.max_concurrent_requests == 0 {
            return Err(ConfigError::Validation(
                "server.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.client.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "client.timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
