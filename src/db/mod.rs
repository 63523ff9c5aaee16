//! Database layer
//!
//! SQLite (default, single-file deployment) or MySQL, selected by
//! configuration. Repositories work against [`DynDatabasePool`] and carry
//! one query set per driver.
//!
//! ```ignore
//! let pool = kalpla::db::create_pool(&config.database).await?;
//! kalpla::db::migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// True when any error in the chain is a unique-constraint violation.
///
/// Services use this to turn insert races (duplicate slug, double booking,
/// double enrollment) into conflicts instead of internal errors.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}
