//! OAuth credential lifecycle: login, refresh, expiry look-ahead and logout.
//!
//! The [`TokenManager`] is the only writer of an account's credentials. Every
//! API call reads the bearer token through [`TokenManager::access_token`],
//! which waits for any refresh already in flight.
use crate::api::pkce;
use crate::config::Config;
use crate::error::{PomoError, Result};
use crate::models::{Credentials, TokenResponse};
use crate::store::{CredentialStore, SqliteCredentialStore};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    LoggedOut,
    Valid,
    Expiring,
    Refreshing,
}

/// The OAuth client registration used for authorize and token requests.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_base: String,
    pub use_pkce: bool,
}

impl OAuthSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone().filter(|s| !s.is_empty()),
            redirect_uri: cfg.redirect_uri.clone(),
            scopes: cfg.scopes.clone(),
            auth_base: cfg.auth_base.trim_end_matches('/').to_string(),
            use_pkce: cfg.use_pkce,
        }
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.auth_base)
    }

    fn basic_auth(&self) -> Option<String> {
        self.client_secret.as_ref().map(|secret| {
            format!(
                "Basic {}",
                general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, secret))
            )
        })
    }
}

#[derive(Default)]
struct TokenSlot {
    loaded: bool,
    creds: Option<Credentials>,
}

pub struct TokenManager {
    client: Client,
    oauth: OAuthSettings,
    store: Arc<dyn CredentialStore>,
    account: String,
    slot: Mutex<TokenSlot>,
    refreshing: AtomicBool,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl TokenManager {
    pub fn new(oauth: OAuthSettings, store: Arc<dyn CredentialStore>, account: &str) -> Self {
        Self {
            client: Client::new(),
            oauth,
            store,
            account: account.to_string(),
            slot: Mutex::new(TokenSlot::default()),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Token manager persisting into the configured SQLite database.
    pub fn from_config(cfg: &Config, account: &str) -> Self {
        let store = Arc::new(SqliteCredentialStore::new(cfg.db_path.clone()));
        Self::new(OAuthSettings::from_config(cfg), store, account)
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    async fn load_if_needed(&self, slot: &mut TokenSlot) -> Result<()> {
        if !slot.loaded {
            slot.creds = self.store.load(&self.account).await?;
            slot.loaded = true;
        }
        Ok(())
    }

    pub async fn state(&self) -> Result<TokenState> {
        if self.refreshing.load(Ordering::SeqCst) {
            return Ok(TokenState::Refreshing);
        }
        let mut slot = self.slot.lock().await;
        self.load_if_needed(&mut slot).await?;
        Ok(match &slot.creds {
            None => TokenState::LoggedOut,
            Some(c) if c.is_expiring(now_ms()) => TokenState::Expiring,
            Some(_) => TokenState::Valid,
        })
    }

    /// Snapshot of the current credentials, if logged in.
    pub async fn credentials(&self) -> Result<Option<Credentials>> {
        let mut slot = self.slot.lock().await;
        self.load_if_needed(&mut slot).await?;
        Ok(slot.creds.clone())
    }

    /// `Ok(true)` when a non-expiring token is available, refreshing first
    /// if needed. `Ok(false)` means the caller has to log in again.
    pub async fn ensure_valid_token(&self) -> Result<bool> {
        let mut slot = self.slot.lock().await;
        self.ensure_locked(&mut slot).await
    }

    /// Current access token, refreshed if it is about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut slot = self.slot.lock().await;
        if !self.ensure_locked(&mut slot).await? {
            return Err(PomoError::NotLoggedIn);
        }
        slot.creds
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(PomoError::NotLoggedIn)
    }

    async fn ensure_locked(&self, slot: &mut TokenSlot) -> Result<bool> {
        self.load_if_needed(slot).await?;
        let Some(creds) = slot.creds.as_ref() else {
            return Ok(false);
        };
        if !creds.is_expiring(now_ms()) {
            return Ok(true);
        }
        if creds.refresh_token.is_none() {
            debug!(account = %self.account, "token expiring and no refresh token available");
            return Ok(false);
        }
        debug!(account = %self.account, "token is near expiry, refreshing");
        match self.refresh_locked(slot).await {
            Ok(()) => Ok(true),
            Err(PomoError::Refresh(msg)) => {
                warn!(account = %self.account, "token refresh rejected: {}", msg);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.load_if_needed(&mut slot).await?;
        if slot.creds.is_none() {
            return Err(PomoError::NotLoggedIn);
        }
        self.refresh_locked(&mut slot).await
    }

    async fn refresh_locked(&self, slot: &mut TokenSlot) -> Result<()> {
        let refresh_token = slot
            .creds
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
            .ok_or_else(|| PomoError::Refresh("no refresh token".into()))?;

        self.refreshing.store(true, Ordering::SeqCst);
        let result = self.request_refresh(&refresh_token).await;
        self.refreshing.store(false, Ordering::SeqCst);

        match result {
            Ok(resp) => {
                let creds = Credentials::from_token_response(resp, now_ms(), Some(refresh_token));
                self.store.save(&self.account, &creds).await?;
                slot.creds = Some(creds);
                info!(account = %self.account, "access token refreshed");
                Ok(())
            }
            Err(PomoError::Refresh(msg)) => {
                // The refresh token is dead; drop it so nobody retries with it.
                slot.creds = None;
                self.store.delete(&self.account).await?;
                Err(PomoError::Refresh(msg))
            }
            Err(e) => Err(e),
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.oauth.client_id.as_str()),
        ];
        let mut req = self.client.post(self.oauth.token_url()).form(&params);
        if let Some(auth_header) = self.oauth.basic_auth() {
            req = req.header(AUTHORIZATION, auth_header);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PomoError::Refresh(format!("{} - {}", status, body)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PomoError::api(
                "refresh token",
                Some(status.as_u16()),
                format!("{} => {}", status, body),
            ));
        }
        // An unreadable success body says nothing about the refresh token; keep it.
        let tr: TokenResponse = resp.json().await.map_err(|e| {
            PomoError::api(
                "refresh token",
                Some(status.as_u16()),
                format!("invalid token response: {}", e),
            )
        })?;
        Ok(tr)
    }

    /// Build the authorize URL the user has to visit. With PKCE a fresh
    /// verifier is stored until [`complete_login`](Self::complete_login).
    pub async fn begin_login(&self) -> Result<String> {
        let mut url = Url::parse(&format!("{}/authorize", self.oauth.auth_base))
            .map_err(|e| PomoError::Config(format!("invalid auth_base: {}", e)))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("response_type", "code")
                .append_pair("client_id", &self.oauth.client_id)
                .append_pair("scope", &self.oauth.scopes.join(" "))
                .append_pair("redirect_uri", &self.oauth.redirect_uri)
                .append_pair("state", &self.account);
        }
        if self.oauth.use_pkce {
            let verifier = pkce::generate_code_verifier();
            let challenge = pkce::code_challenge_s256(&verifier);
            self.store.put_verifier(&self.account, &verifier).await?;
            url.query_pairs_mut()
                .append_pair("code_challenge_method", "S256")
                .append_pair("code_challenge", &challenge);
        }
        debug!(account = %self.account, pkce = self.oauth.use_pkce, "built authorize url");
        Ok(url.to_string())
    }

    /// Exchange an authorization code for credentials.
    pub async fn complete_login(&self, code: &str) -> Result<()> {
        let verifier = if self.oauth.use_pkce {
            Some(
                self.store
                    .take_verifier(&self.account)
                    .await?
                    .ok_or(PomoError::MissingVerifier)?,
            )
        } else {
            None
        };

        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("client_id", self.oauth.client_id.as_str()),
        ];
        if let Some(v) = verifier.as_deref() {
            params.push(("code_verifier", v));
        }
        let mut req = self.client.post(self.oauth.token_url()).form(&params);
        if let Some(auth_header) = self.oauth.basic_auth() {
            req = req.header(AUTHORIZATION, auth_header);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(PomoError::AuthExchange(format!("{} => {}", status, txt)));
        }
        let tr: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PomoError::AuthExchange(format!("invalid token response: {}", e)))?;

        let creds = Credentials::from_token_response(tr, now_ms(), None);
        let mut slot = self.slot.lock().await;
        self.store.save(&self.account, &creds).await?;
        slot.creds = Some(creds);
        slot.loaded = true;
        info!(account = %self.account, "login completed");
        Ok(())
    }

    /// Forget everything about this account. Safe to call repeatedly.
    pub async fn logout(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        slot.creds = None;
        slot.loaded = true;
        self.store.delete(&self.account).await?;
        self.store.discard_verifier(&self.account).await?;
        info!(account = %self.account, "logged out");
        Ok(())
    }
}
