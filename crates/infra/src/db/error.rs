//! Mapping of `sqlx` errors into `StoreError`.
//!
//! | SQLx error | StoreError |
//! |------------|------------|
//! | Database (any constraint or engine error) | `Storage`, with the DB message |
//! | PoolClosed / PoolTimedOut | `Storage` |
//! | RowNotFound | `Storage` (queries use `fetch_optional`/`fetch_all`) |
//! | ColumnDecode / Decode | `Storage` (corrupt row) |
//! | Other | `Storage` |
//!
//! Constraint violations that an operation can explain (duplicate membership,
//! missing owner row) are detected with [`is_unique_violation`] and
//! [`is_foreign_key_violation`] before falling back to this mapping.

use idstore_core::StoreError;

pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            StoreError::storage(format!(
                "database error in {operation} (code {code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            StoreError::storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::storage(format!("timed out acquiring a connection in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StoreError::storage(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::ColumnDecode { index, source } => StoreError::storage(format!(
            "failed to decode column {index} in {operation}: {source}"
        )),
        _ => StoreError::storage(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique/primary-key constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Check if an error is a foreign key constraint violation.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_foreign_key_violation(),
        _ => false,
    }
}
