use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = include_str!("../db/schema.sql");

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Save raw credential JSON for an account
pub fn save_credential_raw(conn: &Connection, account: &str, json_blob: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO credentials (account, token_json, last_refreshed) VALUES (?1, ?2, strftime('%s','now')) ON CONFLICT(account) DO UPDATE SET token_json = excluded.token_json, last_refreshed = strftime('%s','now')",
        params![account, json_blob],
    )?;
    Ok(())
}

/// Load raw credential JSON for an account
pub fn load_credential_raw(conn: &Connection, account: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT token_json FROM credentials WHERE account = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![account], |r| r.get::<_, String>(0))
        .optional()?;
    Ok(row)
}

/// Delete stored credentials. Returns the number of rows removed.
pub fn delete_credential(conn: &Connection, account: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM credentials WHERE account = ?1", params![account])?;
    Ok(removed)
}

/// Store the PKCE verifier of a login in progress, replacing any older one.
pub fn save_pending_verifier(conn: &Connection, account: &str, verifier: &str) -> Result<()> {
    let now = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO pending_logins (account, code_verifier, created_at) VALUES (?1, ?2, ?3) ON CONFLICT(account) DO UPDATE SET code_verifier = excluded.code_verifier, created_at = excluded.created_at",
        params![account, verifier, now],
    )?;
    Ok(())
}

/// Read and erase the pending verifier in one transaction.
pub fn take_pending_verifier(conn: &mut Connection, account: &str) -> Result<Option<String>> {
    let tx = conn.transaction()?;
    let verifier = {
        let mut stmt = tx.prepare("SELECT code_verifier FROM pending_logins WHERE account = ?1 LIMIT 1")?;
        stmt.query_row(params![account], |r| r.get::<_, String>(0)).optional()?
    };
    if verifier.is_some() {
        tx.execute("DELETE FROM pending_logins WHERE account = ?1", params![account])?;
    }
    tx.commit()?;
    Ok(verifier)
}

pub fn delete_pending_verifier(conn: &Connection, account: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM pending_logins WHERE account = ?1", params![account])?;
    Ok(removed)
}
