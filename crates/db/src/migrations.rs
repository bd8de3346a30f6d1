use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] =
        &["storage_entry", "idx_storage_entry_session_id", "idx_storage_entry_updated_at"];

    async fn managed_object_count(pool: &crate::DbPool) -> i64 {
        let placeholders = vec!["?"; MANAGED_SCHEMA_OBJECTS.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE name IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for name in MANAGED_SCHEMA_OBJECTS {
            query = query.bind(*name);
        }
        query.fetch_one(pool).await.expect("count schema objects").get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_storage_table() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let table_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'storage_entry'",
        )
        .fetch_one(&pool)
        .await
        .expect("check storage_entry table")
        .get::<i64, _>("count");

        assert_eq!(table_count, 1);
        assert_eq!(managed_object_count(&pool).await, MANAGED_SCHEMA_OBJECTS.len() as i64);
    }

    #[tokio::test]
    async fn scope_check_constraint_rejects_unknown_scopes() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let result = sqlx::query(
            "INSERT INTO storage_entry (scope, session_id, key, value, updated_at)
             VALUES ('cookie', '', 'k', 'v', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn migrations_can_be_undone_and_reapplied() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert_eq!(managed_object_count(&pool).await, 0);

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(managed_object_count(&pool).await, MANAGED_SCHEMA_OBJECTS.len() as i64);
    }
}
