//! Database migration management for the PostgreSQL storage backend.
//!
//! Migrations are embedded at compile time for single-binary deployment.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::Result;

/// Embedded migrations, in chronological order.
///
/// Each entry is (version, description, sql). To add a migration, create the
/// SQL file under `migrations/` and append an entry here.
macro_rules! embedded_migrations {
    () => {
        &[
            (
                20260301000001i64,
                "consolidated_schema",
                include_str!("../../migrations/20260301000001_consolidated_schema.sql"),
            ),
            (
                20260301000002i64,
                "indexes",
                include_str!("../../migrations/20260301000002_indexes.sql"),
            ),
        ]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Runs all pending migrations. Applied versions are tracked in the
/// `_sqlx_migrations` table, so reruns are no-ops.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running database migrations (embedded)");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| crate::error::PostgresError::Migration(format!("Migration failed: {e}")))?;

    info!("Database migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let migrations = build_migrations();
        assert!(!migrations.is_empty());
        let mut last = 0i64;
        for migration in &migrations {
            assert!(migration.version > last, "migration versions must ascend");
            assert!(!migration.sql.is_empty());
            last = migration.version;
        }
    }
}
