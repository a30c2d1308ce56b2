use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Environment variable that overrides `upstream.base_url`.
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the fallback bearer token.
    #[serde(default = "default_token_env")]
    pub default_token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_env() -> String {
    "DEFAULT_BEARER_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl GatewayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, falling back to defaults.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load(path)?,
            None => match config_search_paths().into_iter().find(|p| p.exists()) {
                Some(candidate) => {
                    tracing::info!(path = %candidate.display(), "Loading config");
                    Self::load(&candidate)?
                }
                None => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.upstream.base_url = url;
            }
        }
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash on the base URL.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.upstream.base_url.trim_end_matches('/')
        )
    }

    /// Fallback bearer token from the configured environment variable, if set.
    pub fn resolve_default_token(&self) -> Option<String> {
        std::env::var(&self.upstream.default_token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("anthropic-gateway.toml")];

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("anthropic-gateway").join("config.toml"));
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("anthropic-gateway").join("config.toml"));
        paths.push(home.join(".anthropic-gateway.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
