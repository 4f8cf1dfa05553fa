use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete pagevault configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagevaultConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub warmer: WarmerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Per-owner request ceiling; 0 disables the guard
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u64,
}

fn default_store_path() -> String {
    "pagevault.db".to_string()
}

fn default_max_requests_per_minute() -> u64 {
    600
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_requests_per_minute: default_max_requests_per_minute(),
        }
    }
}

/// Token cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Window before expiry in which cached tokens are served and refreshed in the background
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_seconds: u64,
    /// Lifetime given to credentials that carry no platform expiry
    #[serde(default = "default_assumed_ttl")]
    pub assumed_ttl_seconds: u64,
}

fn default_refresh_threshold() -> u64 {
    300
}

fn default_assumed_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_seconds: default_refresh_threshold(),
            assumed_ttl_seconds: default_assumed_ttl(),
        }
    }
}

/// Bulk warmer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WarmerConfig {
    /// Fixed delay between consecutive page fetches
    #[serde(default = "default_inter_request_delay")]
    pub inter_request_delay_ms: u64,
}

fn default_inter_request_delay() -> u64 {
    200
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: default_inter_request_delay(),
        }
    }
}

/// Messaging platform (OAuth + Graph API) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_name")]
    pub name: String,
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Public base URL the platform redirects back to
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
    #[serde(default = "default_oauth_state_expiry")]
    pub oauth_state_expiry_seconds: u64,
}

fn default_platform_name() -> String {
    "meta".to_string()
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_auth_url() -> String {
    "https://www.facebook.com/v19.0/dialog/oauth".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "pages_show_list".to_string(),
        "pages_messaging".to_string(),
        "pages_manage_metadata".to_string(),
    ]
}

fn default_callback_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_oauth_state_expiry() -> u64 {
    600
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: default_platform_name(),
            graph_api_base: default_graph_api_base(),
            auth_url: default_auth_url(),
            scopes: default_scopes(),
            callback_base_url: default_callback_base_url(),
            oauth_state_expiry_seconds: default_oauth_state_expiry(),
        }
    }
}

/// Bearer sessions accepted by the identity provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub token: String,
    pub owner: String,
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PagevaultConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: PagevaultConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
