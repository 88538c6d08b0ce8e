//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.tdt/config.json`) and environment.
//! Deployment secrets and paths (`TAXONOMIES_VOLUME`, `ADMIN_SECRET`, `GITHUB_TOKEN`, ...) are
//! usually supplied through the environment and override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Taxonomy volume and proxied tool settings.
    #[serde(default)]
    pub taxonomies: TaxonomiesConfig,

    /// Secrets and permission lookup settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Gateway bind, port and URL prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Prefix all routes are nested under (e.g. "/tdt"). Overridden by TDT_URL_PREFIX env.
    #[serde(default)]
    pub url_prefix: Option<String>,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            url_prefix: None,
        }
    }
}

/// Which browser tool generation is bundled in taxonomy checkouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Legacy nanobot CGI tool.
    Nanobot,
    /// Relatable (`rltbl`) CGI tool.
    #[default]
    Rltbl,
}

impl ToolKind {
    /// Tool binary, relative to the taxonomy directory.
    pub fn default_tool_path(self) -> &'static str {
        match self {
            ToolKind::Nanobot => "bin/nanobot",
            ToolKind::Rltbl => "bin/rltbl",
        }
    }

    /// Database file whose presence means `make init` has run, relative to the taxonomy directory.
    pub fn default_database_marker(self) -> &'static str {
        match self {
            ToolKind::Nanobot => "build/nanobot.db",
            ToolKind::Rltbl => ".relatable/relatable.db",
        }
    }
}

/// What the browser does for callers resolved to `no_access`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoAccessPolicy {
    /// Proxy the call with the read-only flag set; the tool enforces the boundary.
    #[default]
    ReadOnly,
    /// Reject the call with 403.
    Deny,
}

/// Taxonomy volume and tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomiesConfig {
    /// Root directory holding one checkout per taxonomy. Overridden by TAXONOMIES_VOLUME env.
    #[serde(default)]
    pub volume: Option<PathBuf>,

    /// Tool generation (default rltbl).
    #[serde(default)]
    pub tool: ToolKind,

    /// Override the tool binary path (relative to the taxonomy directory).
    #[serde(default)]
    pub tool_path: Option<PathBuf>,

    /// Override the database marker path (relative to the taxonomy directory).
    #[serde(default)]
    pub database_marker: Option<PathBuf>,

    /// Seconds a proxied tool call may run before it is killed (default 300).
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Handling of `no_access` callers on browse routes.
    #[serde(default)]
    pub no_access_policy: NoAccessPolicy,

    /// Public URL root passed to rltbl as RLTBL_ROOT (taxonomy name appended). Overridden by RLTBL_ROOT env.
    #[serde(default)]
    pub rltbl_root: Option<String>,
}

fn default_tool_timeout_secs() -> u64 {
    300
}

impl Default for TaxonomiesConfig {
    fn default() -> Self {
        Self {
            volume: None,
            tool: ToolKind::default(),
            tool_path: None,
            database_marker: None,
            tool_timeout_secs: default_tool_timeout_secs(),
            no_access_policy: NoAccessPolicy::default(),
            rltbl_root: None,
        }
    }
}

impl TaxonomiesConfig {
    pub fn tool_path(&self) -> PathBuf {
        self.tool_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.tool.default_tool_path()))
    }

    pub fn database_marker(&self) -> PathBuf {
        self.database_marker
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.tool.default_database_marker()))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }
}

/// Secrets and GitHub permission lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Shared secret for admin routes. Overridden by ADMIN_SECRET env.
    pub admin_secret: Option<String>,

    /// HS256 secret for session tokens. Overridden by TOKEN_SECRET env.
    pub token_secret: Option<String>,

    /// GitHub token for collaborator permission lookups. Overridden by GITHUB_TOKEN env.
    pub github_token: Option<String>,

    /// GitHub API base URL (default https://api.github.com).
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Permission cache entry lifetime in seconds (default 600).
    #[serde(default = "default_permission_cache_ttl_secs")]
    pub permission_cache_ttl_secs: u64,

    /// Permission cache capacity (default 100).
    #[serde(default = "default_permission_cache_capacity")]
    pub permission_cache_capacity: usize,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_permission_cache_ttl_secs() -> u64 {
    600
}

fn default_permission_cache_capacity() -> usize {
    100
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_secret: None,
            token_secret: None,
            github_token: None,
            github_api_url: default_github_api_url(),
            permission_cache_ttl_secs: default_permission_cache_ttl_secs(),
            permission_cache_capacity: default_permission_cache_capacity(),
        }
    }
}

/// Env value if set and non-empty (trimmed), else the config value if non-empty.
fn env_or(var: &str, configured: Option<&str>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the taxonomies volume: env TAXONOMIES_VOLUME overrides config.
pub fn resolve_taxonomies_volume(config: &Config) -> Option<PathBuf> {
    let configured = config
        .taxonomies
        .volume
        .as_ref()
        .and_then(|p| p.to_str().map(String::from));
    env_or("TAXONOMIES_VOLUME", configured.as_deref()).map(PathBuf::from)
}

/// Resolve the admin secret: env ADMIN_SECRET overrides config.
pub fn resolve_admin_secret(config: &Config) -> Option<String> {
    env_or("ADMIN_SECRET", config.auth.admin_secret.as_deref())
}

/// Resolve the session token secret: env TOKEN_SECRET overrides config.
pub fn resolve_token_secret(config: &Config) -> Option<String> {
    env_or("TOKEN_SECRET", config.auth.token_secret.as_deref())
}

/// Resolve the GitHub token: env GITHUB_TOKEN overrides config.
pub fn resolve_github_token(config: &Config) -> Option<String> {
    env_or("GITHUB_TOKEN", config.auth.github_token.as_deref())
}

/// Resolve the rltbl URL root: env RLTBL_ROOT overrides config.
pub fn resolve_rltbl_root(config: &Config) -> Option<String> {
    env_or("RLTBL_ROOT", config.taxonomies.rltbl_root.as_deref())
}

/// Resolve the route prefix: env TDT_URL_PREFIX overrides config. Normalised to "/segment" form or empty.
pub fn resolve_url_prefix(config: &Config) -> String {
    let raw = env_or("TDT_URL_PREFIX", config.gateway.url_prefix.as_deref()).unwrap_or_default();
    normalize_url_prefix(&raw)
}

fn normalize_url_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TDT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".tdt").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or TDT_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Directory holding the config file.
pub fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}
