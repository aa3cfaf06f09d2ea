use super::MusicApi;
use crate::config::Config;
use crate::error::{PomoError, Result};
use crate::models::{CreatedPlaylist, PlaylistSummary, Track, UserProfile};
use crate::token::TokenManager;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

/// Spotify Web API client. Every request takes its bearer token from the
/// shared [`TokenManager`], so a refresh in flight is awaited first.
pub struct SpotifyClient {
    client: Client,
    api_base: String,
    tokens: Arc<TokenManager>,
}

impl SpotifyClient {
    pub fn new(api_base: &str, tokens: Arc<TokenManager>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn from_config(cfg: &Config, tokens: Arc<TokenManager>) -> Self {
        Self::new(&cfg.api_base, tokens)
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.tokens.access_token().await?))
    }

    async fn get_json(&self, operation: &str, url: &str) -> Result<Value> {
        let bearer = self.bearer().await?;
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, &bearer)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Self::read_json(operation, resp).await
    }

    async fn post_json(&self, operation: &str, url: &str, body: &Value) -> Result<Value> {
        let bearer = self.bearer().await?;
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, &bearer)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        Self::read_json(operation, resp).await
    }

    async fn read_json(operation: &str, resp: Response) -> Result<Value> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            warn!("{} rate limited (retry_after={:?})", operation, retry_after);
            return Err(PomoError::api(
                operation,
                Some(status.as_u16()),
                format!("rate_limited: retry_after={:?}", retry_after),
            ));
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(PomoError::api(
                operation,
                Some(status.as_u16()),
                format!("{} => {}", status, txt),
            ));
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| PomoError::api(operation, Some(status.as_u16()), format!("invalid json: {}", e)))
    }
}

/// Parse a track object; local files and episodes without a uri are skipped.
fn parse_track(t: &Value) -> Option<Track> {
    if t.is_null() {
        return None;
    }
    let uri = t["uri"].as_str()?;
    if uri.is_empty() {
        return None;
    }
    Some(Track {
        uri: uri.to_string(),
        name: t["name"].as_str().unwrap_or("").to_string(),
        artist: t["artists"][0]["name"].as_str().unwrap_or("").to_string(),
        duration_ms: t["duration_ms"].as_u64().unwrap_or(0),
    })
}

fn parse_playlist(pl: &Value) -> Option<PlaylistSummary> {
    let id = pl["id"].as_str()?;
    Some(PlaylistSummary {
        id: id.to_string(),
        name: pl["name"].as_str().unwrap_or("").to_string(),
        owner_id: pl["owner"]["id"].as_str().unwrap_or("").to_string(),
        track_count: pl["tracks"]["total"].as_u64().unwrap_or(0) as u32,
    })
}

fn required_str(j: &Value, key: &str, operation: &str) -> Result<String> {
    j[key]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| PomoError::api(operation, None, format!("response has no {}", key)))
}

#[async_trait]
impl MusicApi for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn list_user_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let mut playlists = Vec::new();
        let mut next_url = Some(format!("{}/me/playlists?limit=50", self.api_base));
        while let Some(url) = next_url {
            let j = self.get_json("list playlists", &url).await?;
            if let Some(items) = j["items"].as_array() {
                playlists.extend(items.iter().filter_map(parse_playlist));
            }
            next_url = j["next"].as_str().map(|s| s.to_string());
        }
        debug!("listed {} playlists", playlists.len());
        Ok(playlists)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut next: Option<String> = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            self.api_base,
            urlencoding::encode(playlist_id)
        ));
        while let Some(url) = next {
            let j = self.get_json("fetch playlist tracks", &url).await?;
            if let Some(items) = j["items"].as_array() {
                tracks.extend(items.iter().filter_map(|it| parse_track(&it["track"])));
            }
            next = j["next"].as_str().map(|s| s.to_string());
        }
        debug!("playlist {} has {} playable tracks", playlist_id, tracks.len());
        Ok(tracks)
    }

    async fn search_tracks(&self, keywords: &str, limit: usize) -> Result<Vec<Track>> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            self.api_base,
            urlencoding::encode(keywords),
            limit
        );
        let j = self.get_json("search tracks", &url).await?;
        let tracks: Vec<Track> = j["tracks"]["items"]
            .as_array()
            .map(|items| items.iter().filter_map(parse_track).take(limit).collect())
            .unwrap_or_default();
        debug!("search {:?} returned {} tracks", keywords, tracks.len());
        Ok(tracks)
    }

    async fn current_user(&self) -> Result<UserProfile> {
        let url = format!("{}/me", self.api_base);
        let j = self.get_json("fetch current user", &url).await?;
        Ok(UserProfile {
            id: required_str(&j, "id", "fetch current user")?,
            display_name: j["display_name"].as_str().map(|s| s.to_string()),
        })
    }

    async fn create_playlist(&self, user_id: &str, name: &str, description: &str) -> Result<CreatedPlaylist> {
        let url = format!(
            "{}/users/{}/playlists",
            self.api_base,
            urlencoding::encode(user_id)
        );
        let body = json!({
            "name": name,
            "description": description,
            "public": false
        });
        let j = self.post_json("create playlist", &url, &body).await?;
        let id = required_str(&j, "id", "create playlist")?;
        let url = j["external_urls"]["spotify"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", id));
        Ok(CreatedPlaylist { id, url })
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.api_base,
            urlencoding::encode(playlist_id)
        );
        let body = json!({ "uris": uris });
        self.post_json("add tracks", &url, &body).await?;
        Ok(())
    }
}
