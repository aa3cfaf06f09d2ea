//! Durable key-value storage for credentials and pending PKCE verifiers.
use crate::db;
use crate::error::{PomoError, Result};
use crate::models::Credentials;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Storage the token manager persists into, keyed by account.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, account: &str) -> Result<Option<Credentials>>;

    async fn save(&self, account: &str, creds: &Credentials) -> Result<()>;

    /// Remove stored credentials; a no-op when there are none.
    async fn delete(&self, account: &str) -> Result<()>;

    async fn put_verifier(&self, account: &str, verifier: &str) -> Result<()>;

    /// Return the pending verifier and erase it.
    async fn take_verifier(&self, account: &str) -> Result<Option<String>>;

    async fn discard_verifier(&self, account: &str) -> Result<()>;
}

/// SQLite-backed store used by the CLI so logins survive restarts.
pub struct SqliteCredentialStore {
    db_path: PathBuf,
}

impl SqliteCredentialStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<T> {
            let mut conn = db::open_or_create(&db_path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PomoError::Storage(e.to_string()))?
        .map_err(|e| PomoError::Storage(format!("{:#}", e)))
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, account: &str) -> Result<Option<Credentials>> {
        let account = account.to_string();
        let json_opt = self
            .with_conn(move |conn| db::load_credential_raw(conn, &account))
            .await?;
        match json_opt {
            Some(s) => {
                let creds: Credentials = serde_json::from_str(&s)
                    .map_err(|e| PomoError::Storage(format!("parse token json: {}", e)))?;
                Ok(Some(creds))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, account: &str, creds: &Credentials) -> Result<()> {
        let account = account.to_string();
        let s = serde_json::to_string(creds).map_err(|e| PomoError::Storage(e.to_string()))?;
        self.with_conn(move |conn| db::save_credential_raw(conn, &account, &s))
            .await
    }

    async fn delete(&self, account: &str) -> Result<()> {
        let account = account.to_string();
        self.with_conn(move |conn| db::delete_credential(conn, &account))
            .await?;
        Ok(())
    }

    async fn put_verifier(&self, account: &str, verifier: &str) -> Result<()> {
        let account = account.to_string();
        let verifier = verifier.to_string();
        self.with_conn(move |conn| db::save_pending_verifier(conn, &account, &verifier))
            .await
    }

    async fn take_verifier(&self, account: &str) -> Result<Option<String>> {
        let account = account.to_string();
        self.with_conn(move |conn| db::take_pending_verifier(conn, &account))
            .await
    }

    async fn discard_verifier(&self, account: &str) -> Result<()> {
        let account = account.to_string();
        self.with_conn(move |conn| db::delete_pending_verifier(conn, &account))
            .await?;
        Ok(())
    }
}

/// Process-local store; nothing outlives the process. Server sessions use it.
#[derive(Default)]
pub struct MemoryCredentialStore {
    creds: Mutex<HashMap<String, Credentials>>,
    verifiers: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, account: &str) -> Result<Option<Credentials>> {
        Ok(self.creds.lock().await.get(account).cloned())
    }

    async fn save(&self, account: &str, creds: &Credentials) -> Result<()> {
        self.creds
            .lock()
            .await
            .insert(account.to_string(), creds.clone());
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<()> {
        self.creds.lock().await.remove(account);
        Ok(())
    }

    async fn put_verifier(&self, account: &str, verifier: &str) -> Result<()> {
        self.verifiers
            .lock()
            .await
            .insert(account.to_string(), verifier.to_string());
        Ok(())
    }

    async fn take_verifier(&self, account: &str) -> Result<Option<String>> {
        Ok(self.verifiers.lock().await.remove(account))
    }

    async fn discard_verifier(&self, account: &str) -> Result<()> {
        self.verifiers.lock().await.remove(account);
        Ok(())
    }
}
