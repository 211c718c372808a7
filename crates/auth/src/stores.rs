//! Store capability contracts.
//!
//! A storage adapter implements the subset of these traits it supports. Every
//! method takes a cancellation token and must check it before touching the
//! backing store, so a cancelled call never performs partial work.
//!
//! Mutating operations return `StoreResult<IdentityResult>`:
//! - `Err(StoreError)` for hard failures (cancelled, closed store, bad
//!   argument, unsupported operation, storage fault);
//! - `Ok(IdentityResult::Failed(..))` for outcomes the caller is expected to
//!   inspect (stale concurrency stamp, missing role, ...).
//!
//! Lookups return `Ok(None)` (or an empty list) on a miss.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use idstore_core::StoreResult;

use crate::{Claim, IdentityResult, Role, User};

/// Base user persistence: CRUD plus user-name access.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult>;

    async fn update(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult>;

    async fn delete(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult>;

    /// `user_id` is the textual form of a `UserId`; malformed ids are invalid arguments.
    async fn find_by_id(&self, user_id: &str, cancel: &CancellationToken)
    -> StoreResult<Option<User>>;

    async fn find_by_name(
        &self,
        normalized_user_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>>;

    fn get_user_id(&self, user: &User, cancel: &CancellationToken) -> StoreResult<String>;

    fn get_user_name(&self, user: &User, cancel: &CancellationToken) -> StoreResult<String>;

    fn set_user_name(
        &self,
        user: &mut User,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    fn get_normalized_user_name(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<String>;

    fn set_normalized_user_name(
        &self,
        user: &mut User,
        normalized_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;
}

/// Password hash storage.
pub trait UserPasswordStore: UserStore {
    fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    fn get_password_hash(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<String>>;

    fn has_password(&self, user: &User, cancel: &CancellationToken) -> StoreResult<bool>;
}

/// Email storage and lookup.
#[async_trait]
pub trait UserEmailStore: UserStore {
    fn set_email(&self, user: &mut User, email: &str, cancel: &CancellationToken)
    -> StoreResult<()>;

    fn get_email(&self, user: &User, cancel: &CancellationToken) -> StoreResult<String>;

    fn get_email_confirmed(&self, user: &User, cancel: &CancellationToken) -> StoreResult<bool>;

    fn set_email_confirmed(
        &self,
        user: &mut User,
        confirmed: bool,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    async fn find_by_email(
        &self,
        normalized_email: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>>;

    fn get_normalized_email(&self, user: &User, cancel: &CancellationToken)
    -> StoreResult<String>;

    fn set_normalized_email(
        &self,
        user: &mut User,
        normalized_email: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;
}

/// Role membership of users.
#[async_trait]
pub trait UserRoleStore: UserStore {
    async fn add_to_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    async fn remove_from_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    /// Names of the roles `user` belongs to.
    async fn get_roles(&self, user: &User, cancel: &CancellationToken) -> StoreResult<Vec<String>>;

    async fn is_in_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<bool>;

    async fn get_users_in_role(
        &self,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<User>>;
}

/// Claims attached to users.
#[async_trait]
pub trait UserClaimStore: UserStore {
    async fn get_claims(&self, user: &User, cancel: &CancellationToken) -> StoreResult<Vec<Claim>>;

    async fn add_claims(
        &self,
        user: &User,
        claims: &[Claim],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    async fn replace_claim(
        &self,
        user: &User,
        claim: &Claim,
        new_claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    async fn remove_claims(
        &self,
        user: &User,
        claims: &[Claim],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    async fn get_users_for_claim(
        &self,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<User>>;
}

/// Role persistence.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<IdentityResult>;

    /// Persist `role` under a freshly generated concurrency stamp.
    ///
    /// On success `role.concurrency_stamp` holds the new stamp. If the stored
    /// stamp no longer matches the one `role` was read with, nothing is written
    /// and the result is a `ConcurrencyFailure`.
    async fn update(
        &self,
        role: &mut Role,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    async fn delete(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<IdentityResult>;

    fn get_role_id(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<String>;

    fn get_role_name(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<String>;

    fn set_role_name(
        &self,
        role: &mut Role,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    fn get_normalized_role_name(
        &self,
        role: &Role,
        cancel: &CancellationToken,
    ) -> StoreResult<String>;

    fn set_normalized_role_name(
        &self,
        role: &mut Role,
        normalized_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    async fn find_by_id(&self, role_id: &str, cancel: &CancellationToken)
    -> StoreResult<Option<Role>>;

    async fn find_by_name(
        &self,
        normalized_role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Role>>;
}

/// Claims attached to roles.
#[async_trait]
pub trait RoleClaimStore: RoleStore {
    async fn get_claims(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<Vec<Claim>>;

    async fn add_claim(
        &self,
        role: &Role,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;

    async fn remove_claim(
        &self,
        role: &Role,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult>;
}
