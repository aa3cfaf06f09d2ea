pub mod mock;
pub mod pkce;
pub mod spotify;

use crate::error::Result;
use crate::models::{CreatedPlaylist, PlaylistSummary, Track, UserProfile};

/// MusicApi trait: the remote operations playlist building needs.
/// Implementations: spotify::SpotifyClient, mock::MockApi.
#[async_trait::async_trait]
pub trait MusicApi: Send + Sync {
    /// All playlists of the current user (every page).
    async fn list_user_playlists(&self) -> Result<Vec<PlaylistSummary>>;

    /// All playable tracks of a playlist, in playlist order.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Keyword search for tracks, at most `limit` results.
    async fn search_tracks(&self, keywords: &str, limit: usize) -> Result<Vec<Track>>;

    async fn current_user(&self) -> Result<UserProfile>;

    /// Create an empty private playlist owned by `user_id`.
    async fn create_playlist(&self, user_id: &str, name: &str, description: &str) -> Result<CreatedPlaylist>;

    /// Append tracks (URIs) to a playlist (batching done by caller)
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// Return the backend's name (for logging, UI, etc)
    fn name(&self) -> &str;
}
