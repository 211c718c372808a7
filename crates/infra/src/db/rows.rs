//! Row types and their conversion into identity records.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use idstore_auth::{Claim, Role, User, UserRoleLink};
use idstore_core::{RoleId, StoreError, StoreResult, UserId};

fn decode_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Parse a role id read back as a bare scalar.
pub(crate) fn role_id_from_text(raw: &str) -> StoreResult<RoleId> {
    Uuid::parse_str(raw)
        .map(RoleId::from_uuid)
        .map_err(|e| StoreError::storage(format!("stored role id '{raw}' is not a uuid: {e}")))
}

#[derive(Debug)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    password_hash: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for UserRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: decode_uuid(row, "id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            password_hash: row.password_hash,
        }
    }
}

#[derive(Debug)]
pub(crate) struct RoleRow {
    id: Uuid,
    name: String,
    normalized_name: String,
    concurrency_stamp: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for RoleRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: decode_uuid(row, "id")?,
            name: row.try_get("name")?,
            normalized_name: row.try_get("normalized_name")?,
            concurrency_stamp: row.try_get("concurrency_stamp")?,
        })
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::from_uuid(row.id),
            name: row.name,
            normalized_name: row.normalized_name,
            concurrency_stamp: row.concurrency_stamp,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ClaimRow {
    claim_type: String,
    claim_value: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for ClaimRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ClaimRow {
            claim_type: row.try_get("claim_type")?,
            claim_value: row.try_get("claim_value")?,
        })
    }
}

impl From<ClaimRow> for Claim {
    fn from(row: ClaimRow) -> Self {
        Claim::new(row.claim_type, row.claim_value)
    }
}

#[derive(Debug)]
pub(crate) struct UserRoleRow {
    user_id: Uuid,
    role_id: Uuid,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for UserRoleRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(UserRoleRow {
            user_id: decode_uuid(row, "user_id")?,
            role_id: decode_uuid(row, "role_id")?,
        })
    }
}

impl From<UserRoleRow> for UserRoleLink {
    fn from(row: UserRoleRow) -> Self {
        UserRoleLink::new(UserId::from_uuid(row.user_id), RoleId::from_uuid(row.role_id))
    }
}
