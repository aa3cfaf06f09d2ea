mod common;

use common::*;
use mockito::{Matcher, Server, ServerGuard};
use pomodorify::api::spotify::SpotifyClient;
use pomodorify::api::MusicApi;
use pomodorify::error::PomoError;
use pomodorify::store::{CredentialStore, MemoryCredentialStore};
use pomodorify::token::{OAuthSettings, TokenManager};
use serde_json::json;
use std::sync::Arc;

async fn logged_in_client(server: &ServerGuard) -> SpotifyClient {
    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config(&server.url(), dir.path());
    let store = Arc::new(MemoryCredentialStore::new());
    store
        .save("default", &credentials("valid", now_ms() + 3_600_000, Some("r")))
        .await
        .unwrap();
    let tokens = Arc::new(TokenManager::new(OAuthSettings::from_config(&cfg), store, "default"));
    SpotifyClient::from_config(&cfg, tokens)
}

fn item(id: &str, ms: u64) -> serde_json::Value {
    json!({
        "track": {
            "uri": format!("spotify:track:{}", id),
            "name": id,
            "duration_ms": ms,
            "artists": [{"name": "artist"}]
        }
    })
}

#[tokio::test]
async fn playlist_tracks_follow_next_and_skip_unplayable() {
    let mut server = Server::new_async().await;
    let page2 = format!("{}/playlists/p1/tracks?offset=100&limit=100", server.url());
    let m1 = server
        .mock("GET", "/playlists/p1/tracks")
        .match_query(Matcher::Exact("limit=100".into()))
        .match_header("authorization", "Bearer valid")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [item("a", 1000), {"track": null}, {"track": {"uri": "", "name": "local"}}],
                "next": page2
            })
            .to_string(),
        )
        .create_async()
        .await;
    let m2 = server
        .mock("GET", "/playlists/p1/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "100".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [item("b", 2000)], "next": null}).to_string())
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    let tracks = client.playlist_tracks("p1").await.unwrap();
    let uris: Vec<&str> = tracks.iter().map(|t| t.uri.as_str()).collect();
    assert_eq!(uris, vec!["spotify:track:a", "spotify:track:b"]);
    assert_eq!(tracks[1].duration_ms, 2000);
    m1.assert_async().await;
    m2.assert_async().await;
}

#[tokio::test]
async fn user_playlists_are_listed() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me/playlists")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {"id": "p1", "name": "Focus", "owner": {"id": "me"}, "tracks": {"total": 12}},
                    {"id": "dw", "name": "Discover Weekly", "owner": {"id": "spotify"}, "tracks": {"total": 30}}
                ],
                "next": null
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    let playlists = client.list_user_playlists().await.unwrap();
    assert_eq!(playlists.len(), 2);
    assert_eq!(playlists[1].owner_id, "spotify");
    assert_eq!(playlists[0].track_count, 12);
}

#[tokio::test]
async fn search_sends_keywords_and_limit() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "lo-fi beats".into()),
            Matcher::UrlEncoded("type".into(), "track".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"tracks": {"items": [item("x", 1)["track"].clone(), item("y", 2)["track"].clone()]}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    let tracks = client.search_tracks("lo-fi beats", 2).await.unwrap();
    assert_eq!(tracks.len(), 2);
    m.assert_async().await;
}

#[tokio::test]
async fn create_playlist_then_add_tracks() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/users/me/playlists")
        .match_body(Matcher::PartialJson(json!({"name": "POMO_test", "public": false})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"id": "new1", "external_urls": {"spotify": "https://open.spotify.com/playlist/new1"}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let add = server
        .mock("POST", "/playlists/new1/tracks")
        .match_body(Matcher::Json(json!({"uris": ["spotify:track:a", "spotify:track:b"]})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"snapshot_id":"s1"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    let created = client.create_playlist("me", "POMO_test", "desc").await.unwrap();
    assert_eq!(created.id, "new1");
    assert_eq!(created.url, "https://open.spotify.com/playlist/new1");
    client
        .add_tracks("new1", &["spotify:track:a".to_string(), "spotify:track:b".to_string()])
        .await
        .unwrap();
    create.assert_async().await;
    add.assert_async().await;
}

#[tokio::test]
async fn rate_limit_is_reported_with_retry_after() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/playlists/p1/tracks")
        .with_status(429)
        .with_header("retry-after", "3")
        .with_body(r#"{"error":"rate_limited"}"#)
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    let err = client
        .add_tracks("p1", &["spotify:track:1".to_string()])
        .await
        .unwrap_err();
    match &err {
        PomoError::ApiRequest { status, message, .. } => {
            assert_eq!(*status, Some(429));
            assert!(message.contains("retry_after=Some(3)"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.requires_login());
}

#[tokio::test]
async fn unauthorized_response_requires_login() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me")
        .with_status(401)
        .with_body(r#"{"error":{"status":401,"message":"The access token expired"}}"#)
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    let err = client.current_user().await.unwrap_err();
    assert!(err.requires_login());
    assert!(err.to_string().contains("fetch current user"));
}

#[tokio::test]
async fn missing_playlist_surfaces_status() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/playlists/gone/tracks")
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;

    let client = logged_in_client(&server).await;
    match client.playlist_tracks("gone").await {
        Err(PomoError::ApiRequest { status: Some(404), .. }) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn logged_out_client_makes_no_request() {
    let mut server = Server::new_async().await;
    let m = server.mock("GET", "/me").expect(0).create_async().await;
    let dir = tempfile::tempdir().expect("tmpdir");
    let cfg = test_config(&server.url(), dir.path());
    let tokens = Arc::new(TokenManager::new(
        OAuthSettings::from_config(&cfg),
        Arc::new(MemoryCredentialStore::new()),
        "default",
    ));
    let client = SpotifyClient::from_config(&cfg, tokens);
    assert!(matches!(client.current_user().await, Err(PomoError::NotLoggedIn)));
    m.assert_async().await;
}
