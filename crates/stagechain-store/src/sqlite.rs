//! SQLite implementation of the StageStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use stagechain_core::{now_millis, AccessHeader, StageId, StageRecord};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::StageStore;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// Helper to convert a row to StageRecord
fn row_to_stage(row: &rusqlite::Row<'_>) -> rusqlite::Result<StageRecord> {
    let id: String = row.get("stage_id")?;
    let content: Vec<u8> = row.get("content")?;
    let header_name: Option<String> = row.get("header_name")?;
    let header_value: Option<String> = row.get("header_value")?;

    // The schema CHECK keeps these paired
    let access = match (header_name, header_value) {
        (Some(name), Some(value)) => Some(AccessHeader::new(name, value)),
        _ => None,
    };

    Ok(StageRecord {
        id: StageId::new(id),
        content: Bytes::from(content),
        access,
        expires_at: row.get("expires_at")?,
    })
}

#[async_trait]
impl StageStore for SqliteStore {
    async fn insert_stages(&self, stages: &[StageRecord]) -> Result<()> {
        let stages = stages.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();

            for stage in &stages {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT stage_id FROM stages WHERE stage_id = ?1",
                        params![stage.id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                if existing.is_some() {
                    // Dropping the transaction rolls back earlier rows
                    return Err(StoreError::DuplicateId(stage.id.to_string()));
                }

                tx.execute(
                    "INSERT INTO stages (
                        stage_id, content, header_name, header_value, expires_at, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        stage.id.as_str(),
                        stage.content.as_ref(),
                        stage.access.as_ref().map(|a| a.name.as_str()),
                        stage.access.as_ref().map(|a| a.value.as_str()),
                        stage.expires_at,
                        now,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_stage(&self, id: &StageId) -> Result<Option<StageRecord>> {
        let id = id.clone();

        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT stage_id, content, header_name, header_value, expires_at
                     FROM stages WHERE stage_id = ?1",
                    params![id.as_str()],
                    row_to_stage,
                )
                .optional()?)
        })
        .await
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        self.blocking(move |conn| {
            let removed = conn.execute("DELETE FROM stages WHERE expires_at < ?1", params![now])?;
            Ok(removed)
        })
        .await
    }

    async fn stage_count(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM stages", [], |row| row.get(0))?;
            usize::try_from(count)
                .map_err(|_| StoreError::InvalidData(format!("negative row count {}", count)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StageStoreExt;

    fn make_stage(id: &str, expires_at: i64, access: bool) -> StageRecord {
        StageRecord {
            id: StageId::from(id),
            content: Bytes::from(vec![0u8, 159, 146, 150, b'x']),
            access: access.then(|| AccessHeader::new("X-Auth-abcd1234", "v".repeat(24))),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let with_header = make_stage("aaaaaaaaaaaaaaaa", 5_000, true);
        let without_header = make_stage("bbbbbbbbbbbbbbbb", 5_000, false);

        store
            .insert_stages(&[with_header.clone(), without_header.clone()])
            .await
            .unwrap();

        assert_eq!(
            store.get_stage(&with_header.id).await.unwrap().unwrap(),
            with_header
        );
        assert_eq!(
            store.get_stage(&without_header.id).await.unwrap().unwrap(),
            without_header
        );
        assert!(store.get_stage(&"nope".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_duplicate_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_stages(&[make_stage("a", 10, true)])
            .await
            .unwrap();

        let result = store
            .insert_stages(&[make_stage("b", 10, true), make_stage("a", 10, true)])
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateId(_))));
        assert_eq!(store.stage_count().await.unwrap(), 1);
        assert!(store.get_stage(&"b".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_purge() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_stages(&[
                make_stage("old", 100, true),
                make_stage("edge", 200, true),
                make_stage("new", 300, true),
            ])
            .await
            .unwrap();

        assert!(store.get_live_stage(&"old".into(), 200).await.unwrap().is_none());
        assert!(store.get_live_stage(&"edge".into(), 200).await.unwrap().is_some());

        assert_eq!(store.purge_expired(200).await.unwrap(), 1);
        assert_eq!(store.stage_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stages.db");
        let stage = make_stage("persisted", i64::MAX, true);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_stages(&[stage.clone()]).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_stage(&stage.id).await.unwrap().unwrap(), stage);
    }
}
