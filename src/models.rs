use serde::{Deserialize, Serialize};

/// Look-ahead before expiry at which a token counts as expiring (5 minutes).
pub const EXPIRY_LOOKAHEAD_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    pub name: String,
    pub artist: String,
    pub duration_ms: u64,
}

impl Track {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, artist: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            artist: artist.into(),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// In selection order, not candidate order.
    pub selected_tracks: Vec<Track>,
    pub total_duration_ms: u64,
}

/// An unsaved selection waiting for the user to confirm it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDraft {
    pub name: String,
    pub source_description: String,
    pub tracks: Vec<Track>,
}

impl PlaylistDraft {
    pub fn total_duration_ms(&self) -> u64 {
        self.tracks.iter().map(|t| t.duration_ms).sum()
    }

    pub fn uris(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.uri.clone()).collect()
    }

    pub fn rename(&mut self, name: &str) {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            self.name = trimmed.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub track_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
    /// Public web URL of the playlist.
    pub url: String,
}

/// Where candidate tracks come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackSource {
    Playlist {
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
    Search {
        keywords: String,
    },
    Recommended,
}

/// Body of a successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth credentials as persisted by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_at_ms: i64, // epoch millis
    pub scope: Option<String>,
}

impl Credentials {
    /// Build credentials from a token response accepted at `now_ms`. A response
    /// without a refresh token keeps `previous_refresh`.
    pub fn from_token_response(resp: TokenResponse, now_ms: i64, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: resp.access_token,
            token_type: resp.token_type.unwrap_or_else(|| "Bearer".into()),
            refresh_token: resp.refresh_token.or(previous_refresh),
            expires_at_ms: now_ms.saturating_add(resp.expires_in.saturating_mul(1000)),
            scope: resp.scope,
        }
    }

    pub fn is_expiring(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_ms.saturating_sub(EXPIRY_LOOKAHEAD_MS)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "a".into(),
            token_type: None,
            expires_in: 3600,
            refresh_token: refresh.map(String::from),
            scope: None,
        }
    }

    #[test]
    fn expiry_is_derived_from_acceptance_time() {
        let c = Credentials::from_token_response(response(Some("r")), 1_000, None);
        assert_eq!(c.expires_at_ms, 1_000 + 3_600_000);
        assert_eq!(c.token_type, "Bearer");
    }

    #[test]
    fn huge_expires_in_saturates() {
        let mut resp = response(None);
        resp.expires_in = i64::MAX;
        let c = Credentials::from_token_response(resp, 1_000, None);
        assert_eq!(c.expires_at_ms, i64::MAX);
        assert!(!c.is_expiring(1_000));

        let mut resp = response(None);
        resp.expires_in = i64::MIN;
        let c = Credentials::from_token_response(resp, 1_000, None);
        assert!(c.is_expiring(1_000));
    }

    #[test]
    fn missing_refresh_token_keeps_previous() {
        let c = Credentials::from_token_response(response(None), 0, Some("old".into()));
        assert_eq!(c.refresh_token.as_deref(), Some("old"));
    }

    #[test]
    fn expiring_inside_lookahead_window() {
        let c = Credentials::from_token_response(response(None), 0, None);
        assert!(!c.is_expiring(c.expires_at_ms - EXPIRY_LOOKAHEAD_MS));
        assert!(c.is_expiring(c.expires_at_ms - 60_000));
    }

    #[test]
    fn track_source_json_shape() {
        let s: TrackSource = serde_json::from_str(r#"{"type":"search","keywords":"lofi"}"#).unwrap();
        assert_eq!(s, TrackSource::Search { keywords: "lofi".into() });
        let p: TrackSource = serde_json::from_str(r#"{"type":"playlist","id":"p1"}"#).unwrap();
        assert_eq!(p, TrackSource::Playlist { id: "p1".into(), name: None });
    }
}
