//! Per-user state for the server-mediated flow, keyed by an opaque session id.
use crate::api::spotify::SpotifyClient;
use crate::api::MusicApi;
use crate::builder::{BuilderSettings, PlaylistBuilder};
use crate::config::Config;
use crate::error::{PomoError, Result};
use crate::models::{CreatedPlaylist, PlaylistDraft, PlaylistSummary, TrackSource, UserProfile};
use crate::store::{CredentialStore, MemoryCredentialStore};
use crate::token::{OAuthSettings, TokenManager};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Builds the API collaborator for a session from its token manager.
pub type ApiFactory = Arc<dyn Fn(Arc<TokenManager>) -> Arc<dyn MusicApi> + Send + Sync>;

pub struct Session {
    id: Uuid,
    tokens: Arc<TokenManager>,
    builder: PlaylistBuilder,
    draft: Mutex<Option<PlaylistDraft>>,
    default_minutes: i64,
    created_at: Instant,
    last_seen: StdMutex<Instant>,
    logged_in: AtomicBool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn touch(&self, now: Instant) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Idle past `idle`, or still not logged in after `pending`.
    fn is_expired(&self, now: Instant, idle: Duration, pending: Duration) -> bool {
        let last_seen = *self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        if now.saturating_duration_since(last_seen) > idle {
            return true;
        }
        !self.is_logged_in() && now.saturating_duration_since(self.created_at) > pending
    }

    async fn require_login(&self) -> Result<()> {
        if self.tokens.ensure_valid_token().await? {
            Ok(())
        } else {
            Err(PomoError::NotLoggedIn)
        }
    }

    pub async fn login_url(&self) -> Result<String> {
        self.tokens.begin_login().await
    }

    pub async fn complete_login(&self, code: &str) -> Result<UserProfile> {
        self.tokens.complete_login(code).await?;
        self.logged_in.store(true, Ordering::SeqCst);
        self.builder.api().current_user().await
    }

    pub async fn playlists(&self) -> Result<Vec<PlaylistSummary>> {
        self.require_login().await?;
        self.builder.list_playlists().await
    }

    /// Draft a playlist and keep it as the session's current draft.
    pub async fn generate(&self, source: &TrackSource, minutes: Option<i64>) -> Result<PlaylistDraft> {
        self.require_login().await?;
        let minutes = minutes.unwrap_or(self.default_minutes);
        let draft = self.builder.draft(source, minutes).await?;
        *self.draft.lock().await = Some(draft.clone());
        Ok(draft)
    }

    pub async fn current_draft(&self) -> Option<PlaylistDraft> {
        self.draft.lock().await.clone()
    }

    /// Save the current draft. It is discarded on success and kept on failure
    /// so the user can retry.
    pub async fn save(&self, name: Option<&str>) -> Result<CreatedPlaylist> {
        self.require_login().await?;
        let mut guard = self.draft.lock().await;
        let draft = guard.as_mut().ok_or(PomoError::NoDraft)?;
        if let Some(n) = name {
            draft.rename(n);
        }
        let created = self.builder.save(draft).await?;
        *guard = None;
        Ok(created)
    }

    pub async fn logout(&self) -> Result<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        *self.draft.lock().await = None;
        self.tokens.logout().await
    }
}

pub struct SessionStore {
    cfg: Config,
    credentials: Arc<dyn CredentialStore>,
    api_factory: ApiFactory,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionStore {
    /// Sessions talking to Spotify, with credentials kept in memory only.
    pub fn new(cfg: Config) -> Self {
        let api_base = cfg.api_base.clone();
        let factory: ApiFactory = Arc::new(move |tokens: Arc<TokenManager>| {
            Arc::new(SpotifyClient::new(&api_base, tokens)) as Arc<dyn MusicApi>
        });
        Self::with_api_factory(cfg, factory)
    }

    pub fn with_api_factory(cfg: Config, api_factory: ApiFactory) -> Self {
        Self {
            cfg,
            credentials: Arc::new(MemoryCredentialStore::new()),
            api_factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.cfg.session_idle_secs)
    }

    fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.cfg.pending_login_secs)
    }

    /// Start a session. Expired sessions are swept first so abandoned logins
    /// cannot pile up between sweeper ticks.
    pub async fn create(&self) -> Arc<Session> {
        self.purge_expired().await;
        let id = Uuid::new_v4();
        let now = Instant::now();
        let tokens = Arc::new(TokenManager::new(
            OAuthSettings::from_config(&self.cfg),
            Arc::clone(&self.credentials),
            &id.to_string(),
        ));
        let api = (self.api_factory)(Arc::clone(&tokens));
        let session = Arc::new(Session {
            id,
            tokens,
            builder: PlaylistBuilder::new(api, BuilderSettings::from_config(&self.cfg)),
            draft: Mutex::new(None),
            default_minutes: self.cfg.default_duration_minutes,
            created_at: now,
            last_seen: StdMutex::new(now),
            logged_in: AtomicBool::new(false),
        });
        self.sessions.write().await.insert(id, Arc::clone(&session));
        info!("created session {}", id);
        session
    }

    /// Look up a live session and mark it as used.
    pub async fn get(&self, id: &str) -> Result<Arc<Session>> {
        let uuid = Uuid::parse_str(id).map_err(|_| PomoError::UnknownSession(id.to_string()))?;
        let now = Instant::now();
        let session = self
            .sessions
            .read()
            .await
            .get(&uuid)
            .cloned()
            .ok_or_else(|| PomoError::UnknownSession(id.to_string()))?;
        if session.is_expired(now, self.idle_ttl(), self.pending_ttl()) {
            return Err(PomoError::UnknownSession(id.to_string()));
        }
        session.touch(now);
        Ok(session)
    }

    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    /// Drop every session expired as of `now` and forget its credentials.
    /// Returns how many were removed.
    pub async fn purge_expired_at(&self, now: Instant) -> usize {
        let (idle, pending) = (self.idle_ttl(), self.pending_ttl());
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| s.is_expired(now, idle, pending))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &expired {
            if let Err(e) = session.logout().await {
                warn!("failed to clear expired session {}: {}", session.id(), e);
            }
        }
        if !expired.is_empty() {
            info!("purged {} expired sessions", expired.len());
        }
        expired.len()
    }

    /// Purge expired sessions every `session_sweep_secs` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let period = Duration::from_secs(self.cfg.session_sweep_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(live) = store.upgrade() else {
                    break;
                };
                let removed = live.purge_expired().await;
                debug!("session sweep removed {}", removed);
            }
        })
    }

    /// Log the session out and forget it. Unknown ids are ignored.
    pub async fn end(&self, id: &str) -> Result<()> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(());
        };
        let removed = self.sessions.write().await.remove(&uuid);
        if let Some(session) = removed {
            session.logout().await?;
            info!("ended session {}", uuid);
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
