//! SQLite-backed role store with optimistic concurrency on update and delete.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use idstore_auth::{
    Claim, IdentityError, IdentityResult, Role, RoleClaimStore, RoleStore, new_concurrency_stamp,
};
use idstore_core::{RoleId, StoreError, StoreResult, ensure_not_cancelled};

use crate::db::rows::{ClaimRow, RoleRow};
use crate::db::{is_foreign_key_violation, is_unique_violation, map_sqlx_error};

/// Role store over a SQLite pool.
///
/// Once [`close`](Self::close) is called every operation fails with
/// `StoreError::Disposed`. The pool itself is left open for other stores.
#[derive(Debug)]
pub struct SqliteRoleStore {
    pool: SqlitePool,
    closed: AtomicBool,
}

impl SqliteRoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Mark the store unusable. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("role store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cancellation first, then disposal.
    fn ensure_usable(&self, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_not_cancelled(cancel)?;
        if self.is_closed() {
            return Err(StoreError::Disposed("SqliteRoleStore"));
        }
        Ok(())
    }

    async fn begin(&self) -> StoreResult<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

#[async_trait]
impl RoleStore for SqliteRoleStore {
    #[instrument(skip_all, fields(role_id = %role.id, role_name = %role.name), err)]
    async fn create(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        self.ensure_usable(cancel)?;

        let mut tx = self.begin().await?;
        let outcome = sqlx::query(
            r#"
            INSERT INTO roles (id, name, normalized_name, concurrency_stamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(role.id.to_string())
        .bind(&role.name)
        .bind(&role.normalized_name)
        .bind(&role.concurrency_stamp)
        .execute(&mut *tx)
        .await;

        let rows = match outcome {
            Ok(done) => done.rows_affected(),
            Err(e) if is_unique_violation(&e) => 0,
            Err(e) => return Err(map_sqlx_error("insert_role", e)),
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(IdentityResult::from_rows_affected(rows, || {
            IdentityError::default_error(format!("Could not create role {}.", role.name))
        }))
    }

    #[instrument(skip_all, fields(role_id = %role.id, role_name = %role.name), err)]
    async fn update(
        &self,
        role: &mut Role,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.ensure_usable(cancel)?;

        let next_stamp = new_concurrency_stamp();
        let mut tx = self.begin().await?;
        let done = sqlx::query(
            r#"
            UPDATE roles
            SET name = ?1, normalized_name = ?2, concurrency_stamp = ?3
            WHERE id = ?4 AND concurrency_stamp = ?5
            "#,
        )
        .bind(&role.name)
        .bind(&role.normalized_name)
        .bind(&next_stamp)
        .bind(role.id.to_string())
        .bind(&role.concurrency_stamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        if done.rows_affected() == 0 {
            tracing::warn!(
                role_id = %role.id,
                stamp = %role.concurrency_stamp,
                "role update rejected: stale concurrency stamp"
            );
            return Ok(IdentityResult::failed(IdentityError::concurrency_failure()));
        }

        role.concurrency_stamp = next_stamp;
        Ok(IdentityResult::Success)
    }

    #[instrument(skip_all, fields(role_id = %role.id, role_name = %role.name), err)]
    async fn delete(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        self.ensure_usable(cancel)?;

        let mut tx = self.begin().await?;
        let done = sqlx::query("DELETE FROM roles WHERE id = ?1 AND concurrency_stamp = ?2")
            .bind(role.id.to_string())
            .bind(&role.concurrency_stamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        if done.rows_affected() == 0 {
            tracing::warn!(role_id = %role.id, "role delete rejected: stale concurrency stamp");
            return Ok(IdentityResult::failed(IdentityError::concurrency_failure()));
        }
        Ok(IdentityResult::Success)
    }

    fn get_role_id(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<String> {
        self.ensure_usable(cancel)?;
        Ok(role.id.to_string())
    }

    fn get_role_name(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<String> {
        self.ensure_usable(cancel)?;
        Ok(role.name.clone())
    }

    fn set_role_name(
        &self,
        role: &mut Role,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        self.ensure_usable(cancel)?;
        role.name = role_name.to_string();
        Ok(())
    }

    fn get_normalized_role_name(
        &self,
        role: &Role,
        cancel: &CancellationToken,
    ) -> StoreResult<String> {
        self.ensure_usable(cancel)?;
        Ok(role.normalized_name.clone())
    }

    fn set_normalized_role_name(
        &self,
        role: &mut Role,
        normalized_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        self.ensure_usable(cancel)?;
        role.normalized_name = normalized_name.to_string();
        Ok(())
    }

    #[instrument(skip(self, cancel), err)]
    async fn find_by_id(
        &self,
        role_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Role>> {
        self.ensure_usable(cancel)?;
        let role_id: RoleId = role_id.parse()?;

        let row: Option<RoleRow> = sqlx::query_as(
            "SELECT id, name, normalized_name, concurrency_stamp FROM roles WHERE id = ?1",
        )
        .bind(role_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_role_by_id", e))?;

        Ok(row.map(Role::from))
    }

    #[instrument(skip(self, cancel), err)]
    async fn find_by_name(
        &self,
        normalized_role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Role>> {
        self.ensure_usable(cancel)?;
        StoreError::require_non_blank(normalized_role_name, "role name")?;

        let row: Option<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, name, normalized_name, concurrency_stamp
            FROM roles
            WHERE normalized_name = ?1
            ORDER BY rowid
            LIMIT 1
            "#,
        )
        .bind(normalized_role_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_role_by_name", e))?;

        Ok(row.map(Role::from))
    }
}

#[async_trait]
impl RoleClaimStore for SqliteRoleStore {
    #[instrument(skip_all, fields(role_id = %role.id), err)]
    async fn get_claims(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<Vec<Claim>> {
        self.ensure_usable(cancel)?;

        let rows: Vec<ClaimRow> = sqlx::query_as(
            "SELECT claim_type, claim_value FROM role_claims WHERE role_id = ?1 ORDER BY id",
        )
        .bind(role.id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_role_claims", e))?;

        Ok(rows.into_iter().map(Claim::from).collect())
    }

    #[instrument(skip_all, fields(role_id = %role.id, claim_type = %claim.claim_type), err)]
    async fn add_claim(
        &self,
        role: &Role,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.ensure_usable(cancel)?;

        let mut tx = self.begin().await?;
        let outcome = sqlx::query(
            "INSERT INTO role_claims (role_id, claim_type, claim_value) VALUES (?1, ?2, ?3)",
        )
        .bind(role.id.to_string())
        .bind(&claim.claim_type)
        .bind(&claim.value)
        .execute(&mut *tx)
        .await;

        match outcome {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Ok(IdentityResult::failed(IdentityError::role_not_found(
                    &role.name,
                )));
            }
            Err(e) => return Err(map_sqlx_error("insert_role_claim", e)),
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(IdentityResult::Success)
    }

    /// Removes at most one row matching the claim's type and value. No match is not an error.
    #[instrument(skip_all, fields(role_id = %role.id, claim_type = %claim.claim_type), err)]
    async fn remove_claim(
        &self,
        role: &Role,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.ensure_usable(cancel)?;

        let mut tx = self.begin().await?;
        let claim_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM role_claims
            WHERE role_id = ?1 AND claim_type = ?2 AND claim_value = ?3
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(role.id.to_string())
        .bind(&claim.claim_type)
        .bind(&claim.value)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_role_claim", e))?;

        let Some(claim_id) = claim_id else {
            tracing::debug!("no matching role claim");
            return Ok(IdentityResult::Success);
        };

        sqlx::query("DELETE FROM role_claims WHERE id = ?1")
            .bind(claim_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role_claim", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(IdentityResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    async fn store() -> SqliteRoleStore {
        SqliteRoleStore::new(connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn create_then_find_by_id_and_normalized_name() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let role = Role::new("Admin");

        assert!(store.create(&role, &cancel).await.unwrap().succeeded());

        let by_id = store.find_by_id(&role.id.to_string(), &cancel).await.unwrap();
        assert_eq!(by_id, Some(role.clone()));

        let by_name = store.find_by_name("ADMIN", &cancel).await.unwrap();
        assert_eq!(by_name.map(|r| r.id), Some(role.id));

        // Lookup goes by the normalized column only.
        assert!(store.find_by_name("Admin", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn creating_the_same_role_twice_fails_softly() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let role = Role::new("Admin");

        assert!(store.create(&role, &cancel).await.unwrap().succeeded());
        let again = store.create(&role, &cancel).await.unwrap();
        assert_eq!(again.errors()[0].description, "Could not create role Admin.");
    }

    #[tokio::test]
    async fn update_rotates_the_stamp() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let mut role = Role::new("Admin");
        assert!(store.create(&role, &cancel).await.unwrap().succeeded());
        let original_stamp = role.concurrency_stamp.clone();

        store.set_role_name(&mut role, "Administrators", &cancel).unwrap();
        store
            .set_normalized_role_name(&mut role, "ADMINISTRATORS", &cancel)
            .unwrap();
        assert!(store.update(&mut role, &cancel).await.unwrap().succeeded());
        assert_ne!(role.concurrency_stamp, original_stamp);

        let stored = store
            .find_by_id(&role.id.to_string(), &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, role);
    }

    #[tokio::test]
    async fn stale_stamp_rejects_update_and_delete() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let mut first = Role::new("Admin");
        assert!(store.create(&first, &cancel).await.unwrap().succeeded());
        let mut second = first.clone();

        assert!(store.update(&mut first, &cancel).await.unwrap().succeeded());

        let stale_stamp = second.concurrency_stamp.clone();
        second.name = "Root".into();
        let rejected = store.update(&mut second, &cancel).await.unwrap();
        assert!(rejected.has_error("ConcurrencyFailure"));
        // The caller's stamp is untouched on failure.
        assert_eq!(second.concurrency_stamp, stale_stamp);

        let stored = store
            .find_by_id(&first.id.to_string(), &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Admin");

        let rejected = store.delete(&second, &cancel).await.unwrap();
        assert!(rejected.has_error("ConcurrencyFailure"));
        assert!(store.delete(&first, &cancel).await.unwrap().succeeded());
        assert!(
            store
                .find_by_id(&first.id.to_string(), &cancel)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unchanged_update_still_rotates_the_stamp() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let mut role = Role::new("Poster");
        assert!(store.create(&role, &cancel).await.unwrap().succeeded());

        let before = role.concurrency_stamp.clone();
        assert!(store.update(&mut role, &cancel).await.unwrap().succeeded());
        assert_ne!(role.concurrency_stamp, before);

        let stored = store
            .find_by_id(&role.id.to_string(), &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.concurrency_stamp, role.concurrency_stamp);
        assert_eq!(stored.name, "Poster");
    }

    #[tokio::test]
    async fn removing_a_duplicated_role_claim_drops_one_row() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let role = Role::new("Poster");
        assert!(store.create(&role, &cancel).await.unwrap().succeeded());
        let claim = Claim::new("permission", "posts.write");

        for _ in 0..2 {
            assert!(store.add_claim(&role, &claim, &cancel).await.unwrap().succeeded());
        }

        assert!(store.remove_claim(&role, &claim, &cancel).await.unwrap().succeeded());
        assert_eq!(store.get_claims(&role, &cancel).await.unwrap(), vec![claim.clone()]);

        assert!(store.remove_claim(&role, &claim, &cancel).await.unwrap().succeeded());
        assert!(store.get_claims(&role, &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_claims_round_trip() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let role = Role::new("Poster");
        assert!(store.create(&role, &cancel).await.unwrap().succeeded());
        let claim = Claim::new("permission", "posts.write");

        assert!(store.add_claim(&role, &claim, &cancel).await.unwrap().succeeded());
        assert_eq!(store.get_claims(&role, &cancel).await.unwrap(), vec![claim.clone()]);

        assert!(store.remove_claim(&role, &claim, &cancel).await.unwrap().succeeded());
        assert!(store.get_claims(&role, &cancel).await.unwrap().is_empty());

        // Removing again is a no-op.
        assert!(store.remove_claim(&role, &claim, &cancel).await.unwrap().succeeded());
    }

    #[tokio::test]
    async fn claim_on_missing_role_is_role_not_found() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let ghost = Role::new("Ghost");

        let result = store
            .add_claim(&ghost, &Claim::new("a", "b"), &cancel)
            .await
            .unwrap();
        assert!(result.has_error("RoleNotFound"));
    }

    #[tokio::test]
    async fn closed_store_rejects_everything() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let role = Role::new("Admin");

        store.close();
        store.close();
        assert!(store.is_closed());

        assert_eq!(
            store.create(&role, &cancel).await.unwrap_err(),
            StoreError::Disposed("SqliteRoleStore")
        );
        assert_eq!(
            store.get_role_name(&role, &cancel).unwrap_err(),
            StoreError::Disposed("SqliteRoleStore")
        );
    }

    #[tokio::test]
    async fn cancellation_is_checked_before_disposal() {
        let store = store().await;
        store.close();
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let err = store.find_by_name("ADMIN", &cancelled).await.unwrap_err();
        assert_eq!(err, StoreError::Cancelled);
    }

    #[tokio::test]
    async fn malformed_id_and_blank_name_are_invalid_arguments() {
        let store = store().await;
        let cancel = CancellationToken::new();

        assert!(matches!(
            store.find_by_id("not-a-uuid", &cancel).await.unwrap_err(),
            StoreError::InvalidArgument(_)
        ));
        assert!(matches!(
            store.find_by_name(" ", &cancel).await.unwrap_err(),
            StoreError::InvalidArgument(_)
        ));
    }
}
