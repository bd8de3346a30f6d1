use async_trait::async_trait;
use chrono::{DateTime, Utc};
use policyplanner_core::ports::{StorageError, StoragePort, StorageScope};
use serde::Serialize;
use sqlx::Row;
use tracing::debug;

use crate::DbPool;

/// Session column value for durable rows, which every session shares.
pub const DURABLE_SESSION: &str = "";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredEntry {
    pub scope: StorageScope,
    pub session_id: String,
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// [`StoragePort`] over the `storage_entry` table.
///
/// Session-scoped rows are keyed by the session this handle was opened for;
/// ending the session deletes them and leaves durable rows untouched.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: DbPool,
    session_id: String,
}

impl SqliteStorage {
    pub fn new(pool: DbPool, session_id: impl Into<String>) -> Self {
        Self { pool, session_id: session_id.into() }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn owner(&self, scope: StorageScope) -> &str {
        match scope {
            StorageScope::Session => &self.session_id,
            StorageScope::Durable => DURABLE_SESSION,
        }
    }

    /// Deletes this session's rows. Returns how many were removed.
    pub async fn end_session(&self) -> Result<u64, StorageError> {
        let result =
            sqlx::query("DELETE FROM storage_entry WHERE scope = 'session' AND session_id = ?")
                .bind(&self.session_id)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        debug!(
            event_name = "storage.session.ended",
            session_id = %self.session_id,
            removed = result.rows_affected(),
            "session storage cleared"
        );
        Ok(result.rows_affected())
    }

    /// Entries visible to this session in `scope`, ordered by key.
    pub async fn entries(&self, scope: StorageScope) -> Result<Vec<StoredEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT scope, session_id, key, value, updated_at
             FROM storage_entry
             WHERE scope = ? AND session_id = ?
             ORDER BY key",
        )
        .bind(scope.as_str())
        .bind(self.owner(scope))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(stored_entry_from_row).collect()
    }
}

#[async_trait]
impl StoragePort for SqliteStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query(
            "SELECT value FROM storage_entry WHERE scope = ? AND session_id = ? AND key = ?",
        )
        .bind(scope.as_str())
        .bind(self.owner(scope))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|row| row.try_get::<String, _>("value").map_err(backend)).transpose()
    }

    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO storage_entry (scope, session_id, key, value, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(scope, session_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(scope.as_str())
        .bind(self.owner(scope))
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM storage_entry WHERE scope = ? AND session_id = ? AND key = ?")
            .bind(scope.as_str())
            .bind(self.owner(scope))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(error: sqlx::Error) -> StorageError {
    StorageError::Backend(error.to_string())
}

fn stored_entry_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredEntry, StorageError> {
    let key: String = row.try_get("key").map_err(backend)?;
    let raw_scope: String = row.try_get("scope").map_err(backend)?;
    let scope = StorageScope::parse(&raw_scope).ok_or_else(|| StorageError::Decode {
        key: key.clone(),
        reason: format!("unknown scope `{raw_scope}`"),
    })?;
    let updated_at: String = row.try_get("updated_at").map_err(backend)?;
    DateTime::parse_from_rfc3339(&updated_at).map_err(|error| StorageError::Decode {
        key: key.clone(),
        reason: format!("invalid updated_at: {error}"),
    })?;

    Ok(StoredEntry {
        scope,
        session_id: row.try_get("session_id").map_err(backend)?,
        key,
        value: row.try_get("value").map_err(backend)?,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use policyplanner_core::ports::{StoragePort, StorageScope};

    use super::SqliteStorage;
    use crate::{connect_with_settings, migrations::run_pending, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn set_get_and_remove_round_through_the_table() {
        let storage = SqliteStorage::new(setup_pool().await, "tab-1");

        storage.set(StorageScope::Durable, "supertopup_enquiry", "{\"a\":1}").await.expect("set");
        storage.set(StorageScope::Durable, "supertopup_enquiry", "{\"a\":2}").await.expect("upsert");
        assert_eq!(
            storage.get(StorageScope::Durable, "supertopup_enquiry").await.expect("get"),
            Some("{\"a\":2}".to_string())
        );

        storage.remove(StorageScope::Durable, "supertopup_enquiry").await.expect("remove");
        assert_eq!(storage.get(StorageScope::Durable, "supertopup_enquiry").await.expect("get"), None);
    }

    #[tokio::test]
    async fn scopes_do_not_shadow_each_other() {
        let storage = SqliteStorage::new(setup_pool().await, "tab-1");

        storage.set(StorageScope::Session, "lastPage", "quote").await.expect("session set");
        storage.set(StorageScope::Durable, "lastPage", "other").await.expect("durable set");

        assert_eq!(
            storage.get(StorageScope::Session, "lastPage").await.expect("get"),
            Some("quote".to_string())
        );
        assert_eq!(
            storage.get(StorageScope::Durable, "lastPage").await.expect("get"),
            Some("other".to_string())
        );
    }

    #[tokio::test]
    async fn sessions_are_isolated_but_share_durable_rows() {
        let pool = setup_pool().await;
        let first = SqliteStorage::new(pool.clone(), "tab-1");
        let second = SqliteStorage::new(pool, "tab-2");

        first.set(StorageScope::Session, "allowSessionRestore", "1").await.expect("set");
        first.set(StorageScope::Durable, "gmc_enquiry", "{}").await.expect("set");

        assert_eq!(second.get(StorageScope::Session, "allowSessionRestore").await.expect("get"), None);
        assert_eq!(
            second.get(StorageScope::Durable, "gmc_enquiry").await.expect("get"),
            Some("{}".to_string())
        );
    }

    #[tokio::test]
    async fn ending_a_session_keeps_durable_entries() {
        let storage = SqliteStorage::new(setup_pool().await, "tab-1");
        storage.set(StorageScope::Session, "lastPage", "quote").await.expect("set");
        storage.set(StorageScope::Session, "allowSessionRestore", "1").await.expect("set");
        storage.set(StorageScope::Durable, "pa_enquiry", "{}").await.expect("set");

        assert_eq!(storage.end_session().await.expect("end session"), 2);
        assert!(storage.entries(StorageScope::Session).await.expect("entries").is_empty());

        let durable = storage.entries(StorageScope::Durable).await.expect("entries");
        assert_eq!(durable.len(), 1);
        assert_eq!(durable[0].key, "pa_enquiry");
        assert_eq!(durable[0].session_id, "");
    }
}
