use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

use pomodorify::config::Config;
use pomodorify::db;
use pomodorify::models::Credentials;
use pomodorify::store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};

#[test]
fn config_from_path_parses_toml() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("cfg.toml");
    let mut f = File::create(&cfg_path).unwrap();
    let toml = r#"
client_id = "abc"
db_path = "/tmp/test.db"
log_dir = "/tmp"
default_duration_minutes = 50
"#;
    f.write_all(toml.as_bytes()).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert_eq!(cfg.client_id, "abc");
    assert_eq!(cfg.db_path.to_str().unwrap(), "/tmp/test.db");
    assert_eq!(cfg.default_duration_minutes, 50);
    // untouched fields keep their defaults
    assert!(cfg.use_pkce);
    assert_eq!(cfg.search_limit, 50);
    assert_eq!(cfg.auth_base, "https://accounts.spotify.com");
    assert_eq!(cfg.session_idle_secs, 3600);
    assert_eq!(cfg.pending_login_secs, 600);
    assert!(cfg.scopes.iter().any(|s| s == "playlist-modify-private"));
    cfg.validate().expect("valid config");
}

#[test]
fn example_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/example-config.toml");
    let cfg = Config::from_path(&path).expect("parse example config");
    cfg.validate().expect("example config validates");
}

#[test]
fn validation_rejects_bad_values() {
    let mut cfg = Config::for_client("");
    assert!(cfg.validate().is_err());

    cfg = Config::for_client("abc");
    cfg.use_pkce = false;
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("client_secret"));
    cfg.client_secret = Some("s".into());
    cfg.validate().expect("confidential client is valid");

    cfg = Config::for_client("abc");
    cfg.redirect_uri = "not a url".into();
    assert!(cfg.validate().is_err());

    cfg = Config::for_client("abc");
    cfg.search_limit = 51;
    assert!(cfg.validate().is_err());

    cfg = Config::for_client("abc");
    cfg.max_batch_size = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::for_client("abc");
    cfg.default_duration_minutes = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::for_client("abc");
    cfg.pending_login_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn run_migrations_creates_tables() {
    let td = tempdir().unwrap();
    let db_path = td.path().join("test.db");
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    db::run_migrations(&conn).expect("run migrations");
    // running twice is harmless
    db::run_migrations(&conn).expect("rerun migrations");
    for table in ["credentials", "pending_logins"] {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |r| r.get(0),
            )
            .ok();
        assert!(found.is_some(), "{} table should exist after migrations", table);
    }
}

#[test]
fn open_or_create_makes_parent_dirs() {
    let td = tempdir().unwrap();
    let db_path = td.path().join("nested").join("dir").join("p.db");
    db::open_or_create(&db_path).expect("open nested db");
    assert!(db_path.exists());
}

#[test]
fn credential_rows_upsert_and_delete() {
    let td = tempdir().unwrap();
    let conn = db::open_or_create(&td.path().join("t.db")).unwrap();
    db::save_credential_raw(&conn, "a", "{\"v\":1}").unwrap();
    db::save_credential_raw(&conn, "a", "{\"v\":2}").unwrap();
    assert_eq!(db::load_credential_raw(&conn, "a").unwrap().as_deref(), Some("{\"v\":2}"));
    assert_eq!(db::delete_credential(&conn, "a").unwrap(), 1);
    assert_eq!(db::delete_credential(&conn, "a").unwrap(), 0);
    assert!(db::load_credential_raw(&conn, "a").unwrap().is_none());
}

#[test]
fn pending_verifier_is_taken_once() {
    let td = tempdir().unwrap();
    let mut conn = db::open_or_create(&td.path().join("t.db")).unwrap();
    db::save_pending_verifier(&conn, "a", "first").unwrap();
    db::save_pending_verifier(&conn, "a", "second").unwrap();
    assert_eq!(db::take_pending_verifier(&mut conn, "a").unwrap().as_deref(), Some("second"));
    assert!(db::take_pending_verifier(&mut conn, "a").unwrap().is_none());
}

fn sample() -> Credentials {
    Credentials {
        access_token: "a".into(),
        token_type: "Bearer".into(),
        refresh_token: Some("r".into()),
        expires_at_ms: 1_700_000_000_000,
        scope: None,
    }
}

async fn exercise_store(store: &dyn CredentialStore) {
    assert!(store.load("acc").await.unwrap().is_none());
    store.save("acc", &sample()).await.unwrap();
    assert_eq!(store.load("acc").await.unwrap(), Some(sample()));
    store.delete("acc").await.unwrap();
    store.delete("acc").await.unwrap();
    assert!(store.load("acc").await.unwrap().is_none());

    store.put_verifier("acc", "v").await.unwrap();
    store.discard_verifier("acc").await.unwrap();
    assert!(store.take_verifier("acc").await.unwrap().is_none());
    store.put_verifier("acc", "v2").await.unwrap();
    assert_eq!(store.take_verifier("acc").await.unwrap().as_deref(), Some("v2"));
    assert!(store.take_verifier("acc").await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_store_behaves_like_memory_store() {
    let td = tempdir().unwrap();
    exercise_store(&SqliteCredentialStore::new(td.path().join("s.db"))).await;
    exercise_store(&MemoryCredentialStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    let td = tempdir().unwrap();
    let path = td.path().join("s.db");
    SqliteCredentialStore::new(path.clone()).save("acc", &sample()).await.unwrap();
    let reopened = SqliteCredentialStore::new(path);
    assert_eq!(reopened.load("acc").await.unwrap(), Some(sample()));
}
