//! SQLite-backed user store.
//!
//! Implements every user capability: password, email, role membership and
//! claims. Each mutating call runs in its own transaction and commits before
//! returning.
//!
//! The email column doubles as the user name. The "normalized" setters are
//! no-ops and the store never folds case on write. `find_by_name` compares
//! ASCII-lower-cased forms of both sides, so emails stored in any case resolve
//! by name; `find_by_email` stays an exact comparison.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use idstore_auth::{
    Claim, IdentityError, IdentityResult, User, UserClaimStore, UserEmailStore,
    UserPasswordStore, UserRoleLink, UserRoleStore, UserStore,
};
use idstore_core::{RoleId, StoreError, StoreResult, UserId, ensure_not_cancelled};

use crate::db::rows::{ClaimRow, UserRoleRow, UserRow, role_id_from_text};
use crate::db::{is_foreign_key_violation, is_unique_violation, map_sqlx_error};

/// How a role name is compared when resolving memberships.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum NameMatch {
    Exact,
    IgnoreCase,
}

/// User store over a SQLite pool.
///
/// Cheap to clone; clones share the pool. Holds no cached rows.
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin(&self) -> StoreResult<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn find_role_id(
    conn: &mut SqliteConnection,
    role_name: &str,
    matching: NameMatch,
) -> StoreResult<Option<RoleId>> {
    let sql = match matching {
        NameMatch::Exact => "SELECT id FROM roles WHERE name = ?1 ORDER BY rowid LIMIT 1",
        NameMatch::IgnoreCase => {
            "SELECT id FROM roles WHERE UPPER(name) = UPPER(?1) ORDER BY rowid LIMIT 1"
        }
    };

    let raw: Option<String> = sqlx::query_scalar(sql)
        .bind(role_name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_role_id", e))?;

    raw.as_deref().map(role_id_from_text).transpose()
}

async fn find_membership(
    conn: &mut SqliteConnection,
    user_id: UserId,
    role_id: RoleId,
) -> StoreResult<Option<UserRoleLink>> {
    let row: Option<UserRoleRow> = sqlx::query_as(
        "SELECT user_id, role_id FROM user_roles WHERE user_id = ?1 AND role_id = ?2",
    )
    .bind(user_id.to_string())
    .bind(role_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("find_membership", e))?;

    Ok(row.map(UserRoleLink::from))
}

fn load_users(rows: Vec<UserRow>) -> Vec<User> {
    rows.into_iter().map(User::from).collect()
}

#[async_trait]
impl UserStore for SqliteUserStore {
    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn create(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;

        let mut tx = self.begin().await?;
        let outcome = sqlx::query("INSERT INTO users (id, email, password_hash) VALUES (?1, ?2, ?3)")
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .execute(&mut *tx)
            .await;

        let rows = match outcome {
            Ok(done) => done.rows_affected(),
            // Same id inserted twice: nothing was written.
            Err(e) if is_unique_violation(&e) => 0,
            Err(e) => return Err(map_sqlx_error("insert_user", e)),
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(IdentityResult::from_rows_affected(rows, || {
            IdentityError::default_error(format!("Could not create user {}.", user.email))
        }))
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn update(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;

        let mut tx = self.begin().await?;
        let done = sqlx::query("UPDATE users SET email = ?1, password_hash = ?2 WHERE id = ?3")
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .bind(user.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(IdentityResult::from_rows_affected(done.rows_affected(), || {
            IdentityError::default_error(format!("Could not update user {}.", user.email))
        }))
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn delete(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;

        let could_not_delete =
            || IdentityError::default_error(format!("Could not delete user {}.", user.email));

        let mut tx = self.begin().await?;
        let stored: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?1")
            .bind(user.id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_id", e))?;

        let Some(stored_id) = stored else {
            return Ok(IdentityResult::failed(could_not_delete()));
        };

        let done = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(stored_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(IdentityResult::from_rows_affected(
            done.rows_affected(),
            could_not_delete,
        ))
    }

    #[instrument(skip(self, cancel), err)]
    async fn find_by_id(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>> {
        ensure_not_cancelled(cancel)?;
        let user_id: UserId = user_id.parse()?;

        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, password_hash FROM users WHERE id = ?1")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_user_by_id", e))?;

        Ok(row.map(User::from))
    }

    #[instrument(skip_all, err)]
    async fn find_by_name(
        &self,
        normalized_user_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(normalized_user_name, "user name")?;

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, password_hash
            FROM users
            WHERE LOWER(email) = ?1
            ORDER BY rowid
            LIMIT 1
            "#,
        )
        // SQLite's LOWER folds ASCII only; fold the argument the same way.
        .bind(normalized_user_name.to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_name", e))?;

        Ok(row.map(User::from))
    }

    fn get_user_id(&self, user: &User, cancel: &CancellationToken) -> StoreResult<String> {
        ensure_not_cancelled(cancel)?;
        Ok(user.id.to_string())
    }

    fn get_user_name(&self, user: &User, cancel: &CancellationToken) -> StoreResult<String> {
        ensure_not_cancelled(cancel)?;
        Ok(user.email.clone())
    }

    fn set_user_name(
        &self,
        user: &mut User,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_not_cancelled(cancel)?;
        user.email = user_name.to_string();
        Ok(())
    }

    fn get_normalized_user_name(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<String> {
        ensure_not_cancelled(cancel)?;
        Ok(user.email.clone())
    }

    fn set_normalized_user_name(
        &self,
        _user: &mut User,
        _normalized_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_not_cancelled(cancel)
    }
}

impl UserPasswordStore for SqliteUserStore {
    fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_not_cancelled(cancel)?;
        user.password_hash = password_hash.map(str::to_string);
        Ok(())
    }

    fn get_password_hash(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<String>> {
        ensure_not_cancelled(cancel)?;
        Ok(user.password_hash.clone())
    }

    fn has_password(&self, user: &User, cancel: &CancellationToken) -> StoreResult<bool> {
        ensure_not_cancelled(cancel)?;
        Ok(user.has_password())
    }
}

#[async_trait]
impl UserEmailStore for SqliteUserStore {
    fn set_email(
        &self,
        user: &mut User,
        email: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_not_cancelled(cancel)?;
        user.email = email.to_string();
        Ok(())
    }

    fn get_email(&self, user: &User, cancel: &CancellationToken) -> StoreResult<String> {
        ensure_not_cancelled(cancel)?;
        Ok(user.email.clone())
    }

    /// Confirmation is not tracked; every email counts as confirmed.
    fn get_email_confirmed(&self, _user: &User, cancel: &CancellationToken) -> StoreResult<bool> {
        ensure_not_cancelled(cancel)?;
        Ok(true)
    }

    fn set_email_confirmed(
        &self,
        _user: &mut User,
        _confirmed: bool,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_not_cancelled(cancel)
    }

    #[instrument(skip_all, err)]
    async fn find_by_email(
        &self,
        normalized_email: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(normalized_email, "email")?;

        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash FROM users WHERE email = ?1 ORDER BY rowid LIMIT 1",
        )
        .bind(normalized_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;

        Ok(row.map(User::from))
    }

    fn get_normalized_email(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<String> {
        ensure_not_cancelled(cancel)?;
        Ok(user.email.clone())
    }

    fn set_normalized_email(
        &self,
        _user: &mut User,
        _normalized_email: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_not_cancelled(cancel)
    }
}

#[async_trait]
impl UserRoleStore for SqliteUserStore {
    /// Role names match case-insensitively here, unlike `remove_from_role`.
    #[instrument(skip_all, fields(user_id = %user.id, role_name = %role_name), err)]
    async fn add_to_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(role_name, "role name")?;

        let mut tx = self.begin().await?;
        let Some(role_id) = find_role_id(&mut tx, role_name, NameMatch::IgnoreCase).await? else {
            return Ok(IdentityResult::failed(IdentityError::role_not_found(role_name)));
        };

        let outcome = sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)")
            .bind(user.id.to_string())
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await;

        match outcome {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Ok(IdentityResult::failed(IdentityError::user_already_in_role(
                    role_name,
                )));
            }
            Err(e) if is_foreign_key_violation(&e) => {
                return Ok(IdentityResult::failed(IdentityError::default_error(format!(
                    "Could not add user {} to role {role_name}.",
                    user.email
                ))));
            }
            Err(e) => return Err(map_sqlx_error("insert_user_role", e)),
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(IdentityResult::Success)
    }

    /// Role names match exactly (case-sensitive).
    #[instrument(skip_all, fields(user_id = %user.id, role_name = %role_name), err)]
    async fn remove_from_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(role_name, "role name")?;

        let mut tx = self.begin().await?;
        let Some(role_id) = find_role_id(&mut tx, role_name, NameMatch::Exact).await? else {
            return Ok(IdentityResult::failed(IdentityError::role_not_found(role_name)));
        };
        let Some(link) = find_membership(&mut tx, user.id, role_id).await? else {
            return Ok(IdentityResult::failed(IdentityError::user_not_in_role(role_name)));
        };

        let done = sqlx::query("DELETE FROM user_roles WHERE user_id = ?1 AND role_id = ?2")
            .bind(link.user_id.to_string())
            .bind(link.role_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user_role", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(IdentityResult::from_rows_affected(done.rows_affected(), || {
            IdentityError::user_not_in_role(role_name)
        }))
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn get_roles(&self, user: &User, cancel: &CancellationToken) -> StoreResult<Vec<String>> {
        ensure_not_cancelled(cancel)?;

        sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM user_roles ur
            INNER JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ?1
            ORDER BY r.name
            "#,
        )
        .bind(user.id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_roles", e))
    }

    #[instrument(skip_all, fields(user_id = %user.id, role_name = %role_name), err)]
    async fn is_in_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(role_name, "role name")?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))?;

        match find_role_id(&mut conn, role_name, NameMatch::IgnoreCase).await? {
            Some(role_id) => Ok(find_membership(&mut conn, user.id, role_id).await?.is_some()),
            None => Ok(false),
        }
    }

    /// Users holding a membership in the role named exactly `role_name`.
    #[instrument(skip_all, fields(role_name = %role_name), err)]
    async fn get_users_in_role(
        &self,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<User>> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(role_name, "role name")?;

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.email, u.password_hash
            FROM users u
            INNER JOIN user_roles ur ON ur.user_id = u.id
            INNER JOIN roles r ON r.id = ur.role_id
            WHERE r.name = ?1
            ORDER BY u.email
            "#,
        )
        .bind(role_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_users_in_role", e))?;

        Ok(load_users(rows))
    }
}

#[async_trait]
impl UserClaimStore for SqliteUserStore {
    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn get_claims(&self, user: &User, cancel: &CancellationToken) -> StoreResult<Vec<Claim>> {
        ensure_not_cancelled(cancel)?;

        let rows: Vec<ClaimRow> = sqlx::query_as(
            "SELECT claim_type, claim_value FROM user_claims WHERE user_id = ?1 ORDER BY id",
        )
        .bind(user.id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user_claims", e))?;

        Ok(rows.into_iter().map(Claim::from).collect())
    }

    #[instrument(skip_all, fields(user_id = %user.id, claim_count = claims.len()), err)]
    async fn add_claims(
        &self,
        user: &User,
        claims: &[Claim],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;
        if claims.is_empty() {
            return Ok(IdentityResult::Success);
        }

        let mut tx = self.begin().await?;
        for claim in claims {
            let outcome = sqlx::query(
                "INSERT INTO user_claims (user_id, claim_type, claim_value) VALUES (?1, ?2, ?3)",
            )
            .bind(user.id.to_string())
            .bind(&claim.claim_type)
            .bind(&claim.value)
            .execute(&mut *tx)
            .await;

            match outcome {
                Ok(_) => {}
                Err(e) if is_foreign_key_violation(&e) => {
                    return Ok(IdentityResult::failed(IdentityError::default_error(format!(
                        "Could not add claims to user {}.",
                        user.email
                    ))));
                }
                Err(e) => return Err(map_sqlx_error("insert_user_claim", e)),
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(IdentityResult::Success)
    }

    async fn replace_claim(
        &self,
        _user: &User,
        _claim: &Claim,
        _new_claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;
        Err(StoreError::NotSupported("replace_claim"))
    }

    /// Each claim removes at most one matching row; claims with no match are skipped.
    #[instrument(skip_all, fields(user_id = %user.id, claim_count = claims.len()), err)]
    async fn remove_claims(
        &self,
        user: &User,
        claims: &[Claim],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        ensure_not_cancelled(cancel)?;

        let mut tx = self.begin().await?;
        let mut removed = 0u64;
        for claim in claims {
            let claim_id: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM user_claims
                WHERE user_id = ?1 AND claim_type = ?2 AND claim_value = ?3
                ORDER BY id
                LIMIT 1
                "#,
            )
            .bind(user.id.to_string())
            .bind(&claim.claim_type)
            .bind(&claim.value)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_user_claim", e))?;

            if let Some(claim_id) = claim_id {
                let done = sqlx::query("DELETE FROM user_claims WHERE id = ?1")
                    .bind(claim_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_user_claim", e))?;
                removed += done.rows_affected();
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        tracing::debug!(removed, "user claims removed");
        Ok(IdentityResult::Success)
    }

    #[instrument(skip_all, fields(claim_type = %claim.claim_type), err)]
    async fn get_users_for_claim(
        &self,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<User>> {
        ensure_not_cancelled(cancel)?;

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.email, u.password_hash
            FROM users u
            WHERE EXISTS (
                SELECT 1 FROM user_claims c
                WHERE c.user_id = u.id AND c.claim_type = ?1 AND c.claim_value = ?2
            )
            ORDER BY u.email
            "#,
        )
        .bind(&claim.claim_type)
        .bind(&claim.value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_users_for_claim", e))?;

        Ok(load_users(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::role_store::SqliteRoleStore;
    use idstore_auth::{Role, RoleStore};

    async fn setup() -> (SqliteUserStore, SqliteRoleStore, CancellationToken) {
        let pool = connect_in_memory().await.unwrap();
        (
            SqliteUserStore::new(pool.clone()),
            SqliteRoleStore::new(pool),
            CancellationToken::new(),
        )
    }

    async fn stored_user(store: &SqliteUserStore, email: &str) -> User {
        let mut user = User::new(email);
        user.password_hash = Some("hash".into());
        let result = store.create(&user, &CancellationToken::new()).await.unwrap();
        assert!(result.succeeded());
        user
    }

    async fn stored_role(roles: &SqliteRoleStore, name: &str) -> Role {
        let role = Role::new(name);
        assert!(roles.create(&role, &CancellationToken::new()).await.unwrap().succeeded());
        role
    }

    #[tokio::test]
    async fn create_then_find_by_id_returns_same_user() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;

        let found = store
            .find_by_id(&user.id.to_string(), &cancel)
            .await
            .unwrap()
            .expect("user should exist");
        assert_eq!(found, user);
    }

    #[tokio::test]
    async fn creating_the_same_id_twice_fails_softly() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;

        let again = store.create(&user, &cancel).await.unwrap();
        assert!(!again.succeeded());
        assert_eq!(
            again.errors()[0].description,
            "Could not create user alice@example.com."
        );
    }

    #[tokio::test]
    async fn find_by_name_lower_cases_and_find_by_email_does_not() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;

        let by_name = store.find_by_name("ALICE@EXAMPLE.COM", &cancel).await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(user.id));

        let by_email = store.find_by_email("ALICE@EXAMPLE.COM", &cancel).await.unwrap();
        assert!(by_email.is_none());

        let exact = store.find_by_email("alice@example.com", &cancel).await.unwrap();
        assert_eq!(exact.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn mixed_case_email_resolves_by_name() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "Alice@Example.com").await;

        for name in ["ALICE@EXAMPLE.COM", "alice@example.com", "Alice@Example.com"] {
            let found = store.find_by_name(name, &cancel).await.unwrap();
            assert_eq!(found.map(|u| u.id), Some(user.id), "{name}");
        }

        // The stored email keeps its original case.
        let found = store.find_by_email("Alice@Example.com", &cancel).await.unwrap();
        assert_eq!(found.map(|u| u.email).as_deref(), Some("Alice@Example.com"));
    }

    #[tokio::test]
    async fn find_by_id_rejects_malformed_ids() {
        let (store, _, cancel) = setup().await;
        let err = store.find_by_id("nope", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn update_persists_email_and_hash() {
        let (store, _, cancel) = setup().await;
        let mut user = stored_user(&store, "alice@example.com").await;

        store.set_email(&mut user, "alice@new.example", &cancel).unwrap();
        store.set_password_hash(&mut user, Some("rehash"), &cancel).unwrap();
        assert!(store.update(&user, &cancel).await.unwrap().succeeded());

        let found = store
            .find_by_id(&user.id.to_string(), &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.email, "alice@new.example");
        assert_eq!(found.password_hash.as_deref(), Some("rehash"));
    }

    #[tokio::test]
    async fn update_and_delete_of_unknown_user_fail_softly() {
        let (store, _, cancel) = setup().await;
        let ghost = User::new("ghost@example.com");

        let updated = store.update(&ghost, &cancel).await.unwrap();
        assert_eq!(
            updated.errors()[0].description,
            "Could not update user ghost@example.com."
        );

        let deleted = store.delete(&ghost, &cancel).await.unwrap();
        assert_eq!(
            deleted.errors()[0].description,
            "Could not delete user ghost@example.com."
        );
    }

    #[tokio::test]
    async fn delete_cascades_to_claims_and_memberships() {
        let (store, roles, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;
        stored_role(&roles, "Admin").await;

        assert!(store.add_to_role(&user, "Admin", &cancel).await.unwrap().succeeded());
        assert!(
            store
                .add_claims(&user, &[Claim::new("dept", "ops")], &cancel)
                .await
                .unwrap()
                .succeeded()
        );

        assert!(store.delete(&user, &cancel).await.unwrap().succeeded());
        assert!(store.find_by_id(&user.id.to_string(), &cancel).await.unwrap().is_none());
        assert!(store.get_roles(&user, &cancel).await.unwrap().is_empty());
        assert!(store.get_claims(&user, &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_name_and_email_share_one_field() {
        let (store, _, cancel) = setup().await;
        let mut user = User::new("alice@example.com");

        store.set_user_name(&mut user, "bob@example.com", &cancel).unwrap();
        assert_eq!(store.get_email(&user, &cancel).unwrap(), "bob@example.com");
        assert_eq!(store.get_normalized_email(&user, &cancel).unwrap(), "bob@example.com");

        // Normalized setters do nothing.
        store
            .set_normalized_user_name(&mut user, "SOMETHING ELSE", &cancel)
            .unwrap();
        store
            .set_normalized_email(&mut user, "SOMETHING ELSE", &cancel)
            .unwrap();
        assert_eq!(store.get_normalized_user_name(&user, &cancel).unwrap(), "bob@example.com");
        assert_eq!(store.get_user_id(&user, &cancel).unwrap(), user.id.to_string());
    }

    #[tokio::test]
    async fn email_is_always_confirmed() {
        let (store, _, cancel) = setup().await;
        let mut user = User::new("alice@example.com");

        store.set_email_confirmed(&mut user, false, &cancel).unwrap();
        assert!(store.get_email_confirmed(&user, &cancel).unwrap());
    }

    #[tokio::test]
    async fn password_accessors() {
        let (store, _, cancel) = setup().await;
        let mut user = User::new("alice@example.com");
        assert!(!store.has_password(&user, &cancel).unwrap());

        store.set_password_hash(&mut user, Some("hash"), &cancel).unwrap();
        assert!(store.has_password(&user, &cancel).unwrap());
        assert_eq!(store.get_password_hash(&user, &cancel).unwrap().as_deref(), Some("hash"));

        store.set_password_hash(&mut user, None, &cancel).unwrap();
        assert!(!store.has_password(&user, &cancel).unwrap());
    }

    #[tokio::test]
    async fn add_to_role_ignores_case_but_remove_does_not() {
        let (store, roles, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;
        stored_role(&roles, "Admin").await;

        assert!(store.add_to_role(&user, "admin", &cancel).await.unwrap().succeeded());
        assert!(store.is_in_role(&user, "ADMIN", &cancel).await.unwrap());
        assert_eq!(store.get_roles(&user, &cancel).await.unwrap(), vec!["Admin"]);

        let wrong_case = store.remove_from_role(&user, "admin", &cancel).await.unwrap();
        assert!(wrong_case.has_error("RoleNotFound"));
        assert!(store.is_in_role(&user, "Admin", &cancel).await.unwrap());

        assert!(store.remove_from_role(&user, "Admin", &cancel).await.unwrap().succeeded());
        assert!(!store.is_in_role(&user, "Admin", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn membership_failures_are_typed() {
        let (store, roles, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;

        let missing = store.add_to_role(&user, "Nope", &cancel).await.unwrap();
        assert!(missing.has_error("RoleNotFound"));

        stored_role(&roles, "Poster").await;
        let not_member = store.remove_from_role(&user, "Poster", &cancel).await.unwrap();
        assert!(not_member.has_error("UserNotInRole"));

        assert!(store.add_to_role(&user, "Poster", &cancel).await.unwrap().succeeded());
        let twice = store.add_to_role(&user, "Poster", &cancel).await.unwrap();
        assert!(twice.has_error("UserAlreadyInRole"));
    }

    #[tokio::test]
    async fn blank_role_names_are_invalid_arguments() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;

        let err = store.add_to_role(&user, "  ", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        let err = store.get_users_in_role("", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn users_in_role_follow_memberships_not_ids() {
        let (store, roles, cancel) = setup().await;
        let alice = stored_user(&store, "alice@example.com").await;
        let bob = stored_user(&store, "bob@example.com").await;

        // A user whose id equals the role id must not be returned just for that.
        let admin = stored_role(&roles, "Admin").await;
        let twin = User::with_id(idstore_core::UserId::from_uuid(*admin.id.as_uuid()), "twin@example.com");
        assert!(store.create(&twin, &cancel).await.unwrap().succeeded());

        assert!(store.add_to_role(&alice, "Admin", &cancel).await.unwrap().succeeded());
        assert!(store.add_to_role(&bob, "Admin", &cancel).await.unwrap().succeeded());

        let members = store.get_users_in_role("Admin", &cancel).await.unwrap();
        let emails: Vec<_> = members.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["alice@example.com", "bob@example.com"]);

        // Exact name match.
        assert!(store.get_users_in_role("admin", &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claims_are_added_listed_and_removed() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;
        let dept = Claim::new("dept", "ops");
        let level = Claim::new("level", "3");

        assert!(
            store
                .add_claims(&user, &[dept.clone(), level.clone(), dept.clone()], &cancel)
                .await
                .unwrap()
                .succeeded()
        );
        assert_eq!(
            store.get_claims(&user, &cancel).await.unwrap(),
            vec![dept.clone(), level.clone(), dept.clone()]
        );

        // One removal per listed claim.
        assert!(store.remove_claims(&user, &[dept.clone()], &cancel).await.unwrap().succeeded());
        assert_eq!(
            store.get_claims(&user, &cancel).await.unwrap(),
            vec![level.clone(), dept.clone()]
        );
    }

    #[tokio::test]
    async fn removing_a_missing_claim_is_a_no_op() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;
        let added = store
            .add_claims(&user, &[Claim::new("dept", "ops")], &cancel)
            .await
            .unwrap();
        assert!(added.succeeded());

        let result = store
            .remove_claims(&user, &[Claim::new("dept", "finance")], &cancel)
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(store.get_claims(&user, &cancel).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claims_for_unknown_user_fail_softly() {
        let (store, _, cancel) = setup().await;
        let ghost = User::new("ghost@example.com");

        let result = store
            .add_claims(&ghost, &[Claim::new("dept", "ops")], &cancel)
            .await
            .unwrap();
        assert!(result.has_error("DefaultError"));
    }

    #[tokio::test]
    async fn users_for_claim_only_returns_holders() {
        let (store, _, cancel) = setup().await;
        let alice = stored_user(&store, "alice@example.com").await;
        stored_user(&store, "bob@example.com").await;

        let ops = Claim::new("dept", "ops");
        assert!(store.add_claims(&alice, &[ops.clone()], &cancel).await.unwrap().succeeded());

        let holders = store.get_users_for_claim(&ops, &cancel).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].id, alice.id);
    }

    #[tokio::test]
    async fn replace_claim_is_never_supported() {
        let (store, _, cancel) = setup().await;
        let user = stored_user(&store, "alice@example.com").await;
        let claim = Claim::new("dept", "ops");

        let err = store
            .replace_claim(&user, &claim, &Claim::new("dept", "finance"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotSupported("replace_claim"));
    }

    #[tokio::test]
    async fn cancelled_calls_write_nothing() {
        let (store, _, cancel) = setup().await;
        let user = User::new("alice@example.com");

        let cancelled = CancellationToken::new();
        cancelled.cancel();

        assert_eq!(store.create(&user, &cancelled).await.unwrap_err(), StoreError::Cancelled);
        assert_eq!(
            store.add_claims(&user, &[Claim::new("a", "b")], &cancelled).await.unwrap_err(),
            StoreError::Cancelled
        );
        assert_eq!(store.get_user_name(&user, &cancelled).unwrap_err(), StoreError::Cancelled);

        assert!(store.find_by_id(&user.id.to_string(), &cancel).await.unwrap().is_none());
    }
}
