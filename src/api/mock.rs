use super::MusicApi;
use crate::error::{PomoError, Result};
use crate::models::{CreatedPlaylist, PlaylistSummary, Track, UserProfile};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::info;

/// In-memory music API used in tests and demos.
/// It records every call and returns deterministic ids and URLs; any
/// operation can be made to fail with [`MockApi::fail_on`].
pub struct MockApi {
    user_id: String,
    playlists: Vec<PlaylistSummary>,
    tracks: HashMap<String, Vec<Track>>,
    search_results: Vec<Track>,
    fail_on: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<(CreatedPlaylist, String)>>,
    added: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockApi {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            playlists: Vec::new(),
            tracks: HashMap::new(),
            search_results: Vec::new(),
            fail_on: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            added: Mutex::new(Vec::new()),
        }
    }

    pub fn with_playlist(mut self, id: &str, name: &str, owner_id: &str, tracks: Vec<Track>) -> Self {
        self.playlists.push(PlaylistSummary {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            track_count: tracks.len() as u32,
        });
        self.tracks.insert(id.to_string(), tracks);
        self
    }

    pub fn with_search_results(mut self, tracks: Vec<Track>) -> Self {
        self.search_results = tracks;
        self
    }

    /// Make the named operation ("add_tracks", "current_user", ...) fail.
    pub fn fail_on(&self, operation: &str) {
        self.lock_fail_on().insert(operation.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Created playlists with their names, in creation order.
    pub fn created_playlists(&self) -> Vec<(CreatedPlaylist, String)> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every add_tracks batch for a playlist, in call order.
    pub fn added_batches(&self, playlist_id: &str) -> Vec<Vec<String>> {
        self.added
            .lock()
            .map(|a| {
                a.iter()
                    .filter(|(id, _)| id == playlist_id)
                    .map(|(_, uris)| uris.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock_fail_on(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.fail_on.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, operation: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(operation.to_string());
        }
        if self.lock_fail_on().contains(operation) {
            return Err(PomoError::api(operation, Some(500), "mock failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl MusicApi for MockApi {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_user_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        self.record("list_user_playlists")?;
        Ok(self.playlists.clone())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.record("playlist_tracks")?;
        self.tracks
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| PomoError::api("playlist_tracks", Some(404), format!("no playlist {}", playlist_id)))
    }

    async fn search_tracks(&self, keywords: &str, limit: usize) -> Result<Vec<Track>> {
        self.record("search_tracks")?;
        info!("MockApi: search {:?} (limit {})", keywords, limit);
        Ok(self.search_results.iter().take(limit).cloned().collect())
    }

    async fn current_user(&self) -> Result<UserProfile> {
        self.record("current_user")?;
        Ok(UserProfile {
            id: self.user_id.clone(),
            display_name: None,
        })
    }

    async fn create_playlist(&self, user_id: &str, name: &str, _description: &str) -> Result<CreatedPlaylist> {
        self.record("create_playlist")?;
        info!("MockApi: create_playlist {} for {}", name, user_id);
        let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
        let id = format!("mock-playlist-{}", created.len() + 1);
        let playlist = CreatedPlaylist {
            url: format!("https://open.spotify.com/playlist/{}", id),
            id,
        };
        created.push((playlist.clone(), name.to_string()));
        Ok(playlist)
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        self.record("add_tracks")?;
        info!("MockApi: add_tracks {} -> {} tracks", playlist_id, uris.len());
        self.added
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((playlist_id.to_string(), uris.to_vec()));
        Ok(())
    }
}
