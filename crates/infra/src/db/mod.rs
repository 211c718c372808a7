//! Database adapters: connection pools and schema wiring.

pub mod error;
pub(crate) mod rows;
pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::instrument;

use idstore_core::StoreError;

use crate::config::DatabaseConfig;

pub use error::{is_foreign_key_violation, is_unique_violation, map_sqlx_error};

/// Open a pool for `config`, creating the database file if needed.
#[instrument(skip_all, fields(url = %config.url, max_connections = config.max_connections), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| map_sqlx_error("parse_database_url", e))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Single-connection in-memory database with the schema applied.
///
/// An in-memory SQLite database lives exactly as long as its connection, so
/// the pool is pinned to one connection that never expires.
pub async fn connect_in_memory() -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| map_sqlx_error("parse_database_url", e))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect_in_memory", e))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Apply [`schema::SCHEMA`] in one transaction. Safe to run repeatedly.
#[instrument(skip_all, err)]
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_transaction", e))?;

    for statement in schema::SCHEMA {
        sqlx::query(*statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))?;

    tracing::debug!(statements = schema::SCHEMA.len(), "schema applied");
    Ok(())
}
