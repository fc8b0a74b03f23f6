use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Versions of the migrations embedded in this build.
pub fn known_versions() -> Vec<i64> {
    MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).map(|m| m.version).collect()
}
