//! Database migrations for the persistence layer

use crate::persistence::error::PersistenceError;
use crate::persistence::pool::ConnectionPool;
use sqlx::Row;

/// Initial schema: items mirrored from the catalog and their conversations
const MIGRATION_001_INITIAL: &str = r#"
-- Items (negotiation-relevant subset of the catalog record)
CREATE TABLE IF NOT EXISTS items (
    id VARCHAR(255) PRIMARY KEY,
    seller_id VARCHAR(255) NOT NULL,
    name TEXT NOT NULL,
    price BIGINT NOT NULL,
    min_price BIGINT,
    negotiation_enabled BIGINT NOT NULL DEFAULT 0,
    status VARCHAR(16) NOT NULL,
    buyer_id VARCHAR(255),
    revision BIGINT NOT NULL DEFAULT 0,
    created_at VARCHAR(40) NOT NULL,
    updated_at VARCHAR(40) NOT NULL
);

-- Messages (append-only; only draft_state ever changes)
CREATE TABLE IF NOT EXISTS messages (
    id VARCHAR(64) PRIMARY KEY,
    item_id VARCHAR(255) NOT NULL,
    seq BIGINT NOT NULL,
    sender_id VARCHAR(255) NOT NULL,
    content TEXT NOT NULL,
    is_ai_response BIGINT NOT NULL DEFAULT 0,
    draft_state VARCHAR(16),
    ai_reasoning TEXT,
    suggested_price BIGINT,
    reply_to_seq BIGINT,
    request_id VARCHAR(255),
    created_at VARCHAR(40) NOT NULL,
    UNIQUE(item_id, seq),
    FOREIGN KEY (item_id) REFERENCES items(id)
);

CREATE INDEX idx_messages_item ON messages(item_id, created_at, seq);
CREATE INDEX idx_messages_draft ON messages(item_id, draft_state);
CREATE UNIQUE INDEX idx_messages_request ON messages(item_id, sender_id, request_id)
"#;

/// Migration definition
struct Migration {
    name: &'static str,
    sql: &'static str,
    checksum: &'static str,
}

/// Get all migrations in order
fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        name: "001_initial_schema",
        sql: MIGRATION_001_INITIAL,
        checksum: "v1",
    }]
}

/// Migration runner for the persistence layer
pub struct MigrationRunner {
    pool: ConnectionPool,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations
    pub async fn migrate_up(&self) -> Result<MigrationResult, PersistenceError> {
        let mut applied = 0;
        let mut skipped = 0;

        self.ensure_migrations_table().await?;

        for migration in get_migrations() {
            if self.is_migration_applied(migration.name).await? {
                tracing::debug!("Migration '{}' already applied, skipping", migration.name);
                skipped += 1;
                continue;
            }

            tracing::info!("Applying migration: {}", migration.name);

            // Statements run one by one; SQLite rejects multi-statement queries
            for statement in migration.sql.split(';') {
                let statement = strip_comments(statement);
                if statement.is_empty() {
                    continue;
                }

                sqlx::query(&statement)
                    .execute(self.pool.pool())
                    .await
                    .map_err(|e| {
                        PersistenceError::Migration(format!(
                            "Failed to execute migration '{}': {}",
                            migration.name, e
                        ))
                    })?;
            }

            self.record_migration(migration.name, migration.checksum)
                .await?;

            tracing::info!("Migration '{}' applied successfully", migration.name);
            applied += 1;
        }

        Ok(MigrationResult { applied, skipped })
    }

    async fn ensure_migrations_table(&self) -> Result<(), PersistenceError> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS _smartnego_migrations (
                name VARCHAR(255) PRIMARY KEY,
                applied_at VARCHAR(40) NOT NULL,
                checksum VARCHAR(64) NOT NULL
            )
        "#;

        sqlx::query(sql)
            .execute(self.pool.pool())
            .await
            .map_err(|e| {
                PersistenceError::Migration(format!("Failed to create migrations table: {}", e))
            })?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, PersistenceError> {
        let result =
            sqlx::query(&self.pool.backend().bind_params(
                "SELECT COUNT(*) AS count FROM _smartnego_migrations WHERE name = ?",
            ))
                .bind(name)
                .fetch_one(self.pool.pool())
                .await
                .map_err(|e| {
                    PersistenceError::Migration(format!(
                        "Failed to check migration status: {}",
                        e
                    ))
                })?;

        let count: i64 = result.try_get("count").unwrap_or(0);
        Ok(count > 0)
    }

    async fn record_migration(&self, name: &str, checksum: &str) -> Result<(), PersistenceError> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(&self.pool.backend().bind_params(
            "INSERT INTO _smartnego_migrations (name, applied_at, checksum) VALUES (?, ?, ?)",
        ))
        .bind(name)
        .bind(&now)
        .bind(checksum)
        .execute(self.pool.pool())
        .await
        .map_err(|e| PersistenceError::Migration(format!("Failed to record migration: {}", e)))?;

        Ok(())
    }
}

/// Drop `--` comment lines so a statement preceded by a comment still runs
fn strip_comments(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Number of migrations applied
    pub applied: usize,
    /// Number of migrations skipped (already applied)
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        let sql = "-- header\nCREATE TABLE t (id TEXT)\n";
        assert_eq!(strip_comments(sql), "CREATE TABLE t (id TEXT)");
        assert_eq!(strip_comments("-- only a comment\n"), "");
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = ConnectionPool::new("sqlite::memory:", 1, 5).await.unwrap();
        let runner = MigrationRunner::new(pool.clone());

        let first = runner.migrate_up().await.unwrap();
        assert_eq!(first.applied, 1);

        let second = runner.migrate_up().await.unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped, 1);
    }
}
