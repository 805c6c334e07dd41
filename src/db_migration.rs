use crate::errors::{DbError, DbResult};
use log::{debug, info};
use sqlx::SqlitePool;

// Embed all migration SQL files at compile time
const MIGRATION_CREATE_UPLOADS: &str = include_str!("../migrations/20250601000000_create_uploads.sql");

// List of migrations with their names and SQL content, oldest first
const MIGRATIONS: &[(&str, &str)] = &[
    ("20250601000000_create_uploads.sql", MIGRATION_CREATE_UPLOADS),
];

/// Bring the database schema up to date
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("[DB_MIGRATION] Starting database migration process");

    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    match &last_migration {
        Some(name) => debug!("[DB_MIGRATION] Last applied migration: {}", name),
        None => debug!("[DB_MIGRATION] No migrations applied yet"),
    }

    apply_pending_migrations(pool, last_migration).await?;

    info!("[DB_MIGRATION] Database migration process completed");
    Ok(())
}

/// Create migrations table if it doesn't exist
async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to create migrations table: {}", e)))?;

    Ok(())
}

/// Get the last applied migration
async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM migrations ORDER BY id DESC LIMIT 1"
    )
    .fetch_optional(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to get last migration: {}", e)))
}

/// Migrations that come after `last_migration` in MIGRATIONS order
fn get_pending_migrations(last_migration: Option<String>) -> DbResult<Vec<(&'static str, &'static str)>> {
    let start = match last_migration {
        None => 0,
        Some(last) => {
            let position = MIGRATIONS
                .iter()
                .position(|(name, _)| *name == last)
                .ok_or_else(|| DbError::Migration(format!("Unknown applied migration: {}", last)))?;
            position + 1
        }
    };
    Ok(MIGRATIONS[start..].to_vec())
}

/// Apply pending migrations in one transaction
async fn apply_pending_migrations(pool: &SqlitePool, last_migration: Option<String>) -> DbResult<()> {
    let pending_migrations = get_pending_migrations(last_migration)?;

    if pending_migrations.is_empty() {
        debug!("[DB_MIGRATION] No pending migrations to apply");
        return Ok(());
    }

    info!("[DB_MIGRATION] Found {} pending migrations", pending_migrations.len());

    let mut tx = pool.begin().await
        .map_err(|e| DbError::Migration(format!("Failed to begin transaction: {}", e)))?;

    for (migration_name, migration_sql) in pending_migrations {
        info!("[DB_MIGRATION] Applying migration: {}", migration_name);

        sqlx::raw_sql(migration_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to apply migration {}: {}", migration_name, e)))?;

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO migrations (name, applied_at) VALUES (?, ?)"
        )
        .bind(migration_name)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Migration(format!("Failed to record migration {}: {}", migration_name, e)))?;
    }

    tx.commit().await
        .map_err(|e| DbError::Migration(format!("Failed to commit transaction: {}", e)))?;

    Ok(())
}
