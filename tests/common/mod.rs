#![allow(dead_code)]
use pomodorify::config::Config;
use pomodorify::db;
use pomodorify::models::{Credentials, Track};
use std::path::{Path, PathBuf};

/// Config with both endpoint bases on the mock server and a db inside `dir`.
pub fn test_config(server_url: &str, dir: &Path) -> Config {
    let mut cfg = Config::for_client("test_id");
    cfg.auth_base = server_url.to_string();
    cfg.api_base = server_url.to_string();
    cfg.db_path = dir.join("pomodorify.db");
    cfg.log_dir = dir.join("logs");
    cfg
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn credentials(access: &str, expires_at_ms: i64, refresh: Option<&str>) -> Credentials {
    Credentials {
        access_token: access.to_string(),
        token_type: "Bearer".into(),
        refresh_token: refresh.map(String::from),
        expires_at_ms,
        scope: Some("playlist-read-private".into()),
    }
}

/// Write credentials straight into the sqlite db, as an earlier run would have.
pub fn seed_credentials(db_path: &PathBuf, account: &str, creds: &Credentials) {
    let conn = db::open_or_create(db_path).expect("open db");
    let blob = serde_json::to_string(creds).expect("serialize creds");
    db::save_credential_raw(&conn, account, &blob).expect("save cred");
}

pub fn stored_credentials(db_path: &PathBuf, account: &str) -> Option<Credentials> {
    let conn = db::open_or_create(db_path).expect("open db");
    db::load_credential_raw(&conn, account)
        .expect("load cred")
        .map(|s| serde_json::from_str(&s).expect("parse cred"))
}

pub fn track(id: &str, ms: u64) -> Track {
    Track::new(format!("spotify:track:{}", id), id, "artist", ms)
}

pub fn token_body(access: &str, refresh: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "playlist-read-private"
    });
    if let Some(r) = refresh {
        body["refresh_token"] = serde_json::Value::String(r.to_string());
    }
    body.to_string()
}
