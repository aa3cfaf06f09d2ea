use crate::api::MusicApi;
use crate::config::Config;
use crate::error::{PomoError, Result};
use crate::models::{CreatedPlaylist, PlaylistDraft, PlaylistSummary, Track, TrackSource};
use crate::{selector, util};
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BuilderSettings {
    pub search_limit: usize,
    pub recommendation_playlist: String,
    pub recommendation_owner: String,
    pub label_max_len: usize,
    pub max_batch_size: usize,
}

impl BuilderSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            search_limit: cfg.search_limit,
            recommendation_playlist: cfg.recommendation_playlist.clone(),
            recommendation_owner: cfg.recommendation_owner.clone(),
            label_max_len: cfg.label_max_len,
            max_batch_size: cfg.max_batch_size.max(1),
        }
    }
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self::from_config(&Config::for_client(""))
    }
}

/// Candidate tracks plus the label used in the default playlist name.
#[derive(Debug, Clone)]
pub struct Candidates {
    pub tracks: Vec<Track>,
    pub label: String,
    pub description: String,
}

/// Sequences fetch -> select -> draft -> save against a [`MusicApi`].
/// Errors from the API are passed through untouched.
pub struct PlaylistBuilder {
    api: Arc<dyn MusicApi>,
    settings: BuilderSettings,
}

impl PlaylistBuilder {
    pub fn new(api: Arc<dyn MusicApi>, settings: BuilderSettings) -> Self {
        Self { api, settings }
    }

    pub fn api(&self) -> &Arc<dyn MusicApi> {
        &self.api
    }

    pub async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        self.api.list_user_playlists().await
    }

    pub async fn resolve_candidates(&self, source: &TrackSource) -> Result<Candidates> {
        match source {
            TrackSource::Playlist { id, name } => {
                let tracks = self.api.playlist_tracks(id).await?;
                let label = match name {
                    Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                    _ => self
                        .list_playlists()
                        .await?
                        .into_iter()
                        .find(|p| &p.id == id)
                        .map(|p| p.name)
                        .unwrap_or_else(|| id.clone()),
                };
                Ok(Candidates {
                    tracks,
                    description: format!("playlist {}", label),
                    label,
                })
            }
            TrackSource::Search { keywords } => {
                let tracks = self
                    .api
                    .search_tracks(keywords, self.settings.search_limit)
                    .await?;
                let mut label = util::sanitize_label(keywords, self.settings.label_max_len);
                if label.is_empty() {
                    label = "search".into();
                }
                Ok(Candidates {
                    tracks,
                    description: format!("search \"{}\"", keywords.trim()),
                    label,
                })
            }
            TrackSource::Recommended => {
                let wanted = &self.settings.recommendation_playlist;
                let owner = &self.settings.recommendation_owner;
                let playlist = self
                    .list_playlists()
                    .await?
                    .into_iter()
                    .find(|p| &p.name == wanted && &p.owner_id == owner)
                    .ok_or_else(|| PomoError::SourceNotFound(format!("{} (owner {})", wanted, owner)))?;
                debug!("recommendation playlist resolved to {}", playlist.id);
                let tracks = self.api.playlist_tracks(&playlist.id).await?;
                Ok(Candidates {
                    tracks,
                    description: format!("recommendations {}", playlist.name),
                    label: playlist.name,
                })
            }
        }
    }

    /// Fetch candidates, select and return a draft named after local time now.
    pub async fn draft(&self, source: &TrackSource, target_minutes: i64) -> Result<PlaylistDraft> {
        let timestamp = util::short_timestamp(&Local::now());
        self.draft_stamped(source, target_minutes, &timestamp).await
    }

    /// As [`draft`](Self::draft) with an explicit short timestamp ("Jan05_0930").
    pub async fn draft_stamped(&self, source: &TrackSource, target_minutes: i64, timestamp: &str) -> Result<PlaylistDraft> {
        let candidates = self.resolve_candidates(source).await?;
        let selection = selector::try_select(&candidates.tracks, target_minutes)?;
        info!(
            "selected {} of {} tracks ({}) for a {} minute target",
            selection.selected_tracks.len(),
            candidates.tracks.len(),
            util::format_duration(selection.total_duration_ms),
            target_minutes
        );
        Ok(PlaylistDraft {
            name: util::default_playlist_name(&candidates.label, timestamp),
            source_description: format!(
                "{} min from {}",
                target_minutes.max(0),
                candidates.description
            ),
            tracks: selection.selected_tracks,
        })
    }

    /// Create the playlist and fill it in selection order. A failure after
    /// creation leaves the (partially filled) playlist in place.
    pub async fn save(&self, draft: &PlaylistDraft) -> Result<CreatedPlaylist> {
        if draft.tracks.is_empty() {
            return Err(PomoError::NoCandidates);
        }
        let user = self.api.current_user().await?;
        let description = format!(
            "{} ({}), made with Pomodorify",
            draft.source_description,
            util::format_duration(draft.total_duration_ms())
        );
        let created = self
            .api
            .create_playlist(&user.id, &draft.name, &description)
            .await?;
        info!("created playlist {} ({})", draft.name, created.id);

        let uris = draft.uris();
        for batch in uris.chunks(self.settings.max_batch_size) {
            self.api.add_tracks(&created.id, batch).await?;
        }
        info!("added {} tracks to {}", uris.len(), created.id);
        Ok(created)
    }
}
