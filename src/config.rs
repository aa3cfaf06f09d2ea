use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Spotify application client id.
    pub client_id: String,
    /// Only needed for confidential clients; PKCE clients leave it unset.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_use_pkce")]
    pub use_pkce: bool,

    // Endpoint bases (tests point these at a mock server)
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    // Selection / drafting
    #[serde(default = "default_duration")]
    pub default_duration_minutes: i64,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_recommendation_playlist")]
    pub recommendation_playlist: String,
    #[serde(default = "default_recommendation_owner")]
    pub recommendation_owner: String,
    #[serde(default = "default_label_max_len")]
    pub label_max_len: usize,
    #[serde(default = "default_max_batch")]
    pub max_batch_size: usize,

    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Server sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    /// Server sessions that never finish logging in are dropped after this.
    #[serde(default = "default_pending_login_secs")]
    pub pending_login_secs: u64,
    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,
}

fn default_redirect_uri() -> String { "http://127.0.0.1:8888/callback".into() }
fn default_scopes() -> Vec<String> {
    vec![
        "user-read-private",
        "user-read-email",
        "playlist-read-private",
        "playlist-modify-private",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_use_pkce() -> bool { true }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pomodorify")
}
fn default_db_path() -> PathBuf { default_data_dir().join("pomodorify.db") }
fn default_log_dir() -> PathBuf { default_data_dir().join("logs") }
fn default_duration() -> i64 { 25 }
fn default_search_limit() -> usize { 50 }
fn default_recommendation_playlist() -> String { "Discover Weekly".into() }
fn default_recommendation_owner() -> String { "spotify".into() }
fn default_label_max_len() -> usize { 20 }
fn default_max_batch() -> usize { 100 }
fn default_server_addr() -> String { "127.0.0.1:8888".into() }
fn default_session_idle_secs() -> u64 { 3600 }
fn default_pending_login_secs() -> u64 { 600 }
fn default_session_sweep_secs() -> u64 { 60 }

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        Ok(cfg)
    }

    /// Minimal config for a client id with every other field defaulted.
    pub fn for_client(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            use_pkce: default_use_pkce(),
            auth_base: default_auth_base(),
            api_base: default_api_base(),
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            default_duration_minutes: default_duration(),
            search_limit: default_search_limit(),
            recommendation_playlist: default_recommendation_playlist(),
            recommendation_owner: default_recommendation_owner(),
            label_max_len: default_label_max_len(),
            max_batch_size: default_max_batch(),
            server_addr: default_server_addr(),
            session_idle_secs: default_session_idle_secs(),
            pending_login_secs: default_pending_login_secs(),
            session_sweep_secs: default_session_sweep_secs(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow!("client_id must not be empty"));
        }
        let has_secret = self.client_secret.as_deref().map_or(false, |s| !s.is_empty());
        if !self.use_pkce && !has_secret {
            return Err(anyhow!("client_secret is required when use_pkce = false"));
        }
        url::Url::parse(&self.redirect_uri)
            .map_err(|e| anyhow!("invalid redirect_uri {}: {}", self.redirect_uri, e))?;
        if !(1..=50).contains(&self.search_limit) {
            return Err(anyhow!("search_limit must be between 1 and 50"));
        }
        if !(1..=100).contains(&self.max_batch_size) {
            return Err(anyhow!("max_batch_size must be between 1 and 100"));
        }
        if self.label_max_len == 0 {
            return Err(anyhow!("label_max_len must be positive"));
        }
        if self.default_duration_minutes <= 0 {
            return Err(anyhow!("default_duration_minutes must be positive"));
        }
        if self.session_idle_secs == 0 || self.pending_login_secs == 0 || self.session_sweep_secs == 0 {
            return Err(anyhow!("session timeouts must be positive"));
        }
        Ok(())
    }
}
