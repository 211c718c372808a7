use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use idstore_core::{StoreError, StoreResult, ensure_not_cancelled};

use crate::normalizer::{LookupNormalizer, UpperInvariantNormalizer};
use crate::stores::{RoleStore, UserClaimStore, UserEmailStore, UserPasswordStore, UserRoleStore};
use crate::{Claim, IdentityError, IdentityResult, Role, RoleManager, User};

/// User lifecycle, membership and claims on top of a full-capability user store.
///
/// Resolves role names into [`Role`] records through its [`RoleManager`].
pub struct UserManager<S, R> {
    store: S,
    roles: RoleManager<R>,
    normalizer: Arc<dyn LookupNormalizer>,
}

impl<S, R> UserManager<S, R>
where
    S: UserPasswordStore + UserEmailStore + UserRoleStore + UserClaimStore,
    R: RoleStore,
{
    pub fn new(store: S, roles: RoleManager<R>) -> Self {
        Self::with_normalizer(store, roles, Arc::new(UpperInvariantNormalizer))
    }

    pub fn with_normalizer(
        store: S,
        roles: RoleManager<R>,
        normalizer: Arc<dyn LookupNormalizer>,
    ) -> Self {
        Self {
            store,
            roles,
            normalizer,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn role_manager(&self) -> &RoleManager<R> {
        &self.roles
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Create `user` unless another account already uses its name.
    pub async fn create(
        &self,
        user: &mut User,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        let validation = self.validate_user(user, cancel).await?;
        if !validation.succeeded() {
            return Ok(validation);
        }
        self.update_normalized_keys(user, cancel)?;
        self.store.create(user, cancel).await
    }

    pub async fn update(
        &self,
        user: &mut User,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        let validation = self.validate_user(user, cancel).await?;
        if !validation.succeeded() {
            return Ok(validation);
        }
        self.update_normalized_keys(user, cancel)?;
        self.store.update(user, cancel).await
    }

    pub async fn delete(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        self.store.delete(user, cancel).await
    }

    pub async fn find_by_id(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>> {
        self.store.find_by_id(user_id, cancel).await
    }

    /// Look up by user name; the name is normalized before it reaches the store.
    pub async fn find_by_name(
        &self,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(user_name, "user name")?;
        let normalized = self.normalizer.normalize_name(user_name);
        self.store.find_by_name(&normalized, cancel).await
    }

    /// Exact email lookup. The store compares emails verbatim, so the
    /// argument is passed through unnormalized.
    pub async fn find_by_email(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<User>> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(email, "email")?;
        self.store.find_by_email(email, cancel).await
    }

    fn update_normalized_keys(&self, user: &mut User, cancel: &CancellationToken) -> StoreResult<()> {
        let name = self.store.get_user_name(user, cancel)?;
        let normalized_name = self.normalizer.normalize_name(&name);
        self.store
            .set_normalized_user_name(user, &normalized_name, cancel)?;

        let email = self.store.get_email(user, cancel)?;
        let normalized_email = self.normalizer.normalize_email(&email);
        self.store.set_normalized_email(user, &normalized_email, cancel)
    }

    async fn validate_user(&self, user: &User, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        let name = self.store.get_user_name(user, cancel)?;
        StoreError::require_non_blank(&name, "user name")?;

        match self.find_by_name(&name, cancel).await? {
            Some(owner) if owner.id != user.id => {
                Ok(IdentityResult::failed(IdentityError::duplicate_user_name(&name)))
            }
            _ => Ok(IdentityResult::Success),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Password
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_password_hash(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<String>> {
        self.store.get_password_hash(user, cancel)
    }

    pub fn has_password(&self, user: &User, cancel: &CancellationToken) -> StoreResult<bool> {
        self.store.has_password(user, cancel)
    }

    /// Replace the stored hash and persist the user.
    pub async fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.store.set_password_hash(user, password_hash, cancel)?;
        self.store.update(user, cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────

    pub async fn add_to_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        if self.store.is_in_role(user, role_name, cancel).await? {
            return Ok(IdentityResult::failed(IdentityError::user_already_in_role(
                role_name,
            )));
        }
        self.store.add_to_role(user, role_name, cancel).await
    }

    /// Add `user` to each role in order, stopping at the first failure.
    pub async fn add_to_roles(
        &self,
        user: &User,
        role_names: &[&str],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        for role_name in role_names {
            let result = self.add_to_role(user, role_name, cancel).await?;
            if !result.succeeded() {
                return Ok(result);
            }
        }
        Ok(IdentityResult::Success)
    }

    /// The membership check matches role names case-insensitively, the
    /// store's removal does not: a differently-cased name that passes the
    /// check still fails with `RoleNotFound`.
    pub async fn remove_from_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        if !self.store.is_in_role(user, role_name, cancel).await? {
            return Ok(IdentityResult::failed(IdentityError::user_not_in_role(
                role_name,
            )));
        }
        self.store.remove_from_role(user, role_name, cancel).await
    }

    pub async fn get_roles(&self, user: &User, cancel: &CancellationToken) -> StoreResult<Vec<String>> {
        self.store.get_roles(user, cancel).await
    }

    pub async fn is_in_role(
        &self,
        user: &User,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        self.store.is_in_role(user, role_name, cancel).await
    }

    pub async fn get_users_in_role(
        &self,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<User>> {
        self.store.get_users_in_role(role_name, cancel).await
    }

    /// Resolve the user's role names into full role records.
    ///
    /// One lookup per name, in membership order. A name whose role has since
    /// been deleted is skipped rather than reported.
    pub async fn get_model_roles(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Role>> {
        let role_names = self.store.get_roles(user, cancel).await?;

        let mut roles = Vec::with_capacity(role_names.len());
        for role_name in role_names {
            match self.roles.find_by_name(&role_name, cancel).await? {
                Some(role) => roles.push(role),
                None => {
                    tracing::debug!(user_id = %user.id, role_name = %role_name, "skipping role that no longer resolves");
                }
            }
        }
        Ok(roles)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Claims
    // ─────────────────────────────────────────────────────────────────────

    pub async fn get_claims(&self, user: &User, cancel: &CancellationToken) -> StoreResult<Vec<Claim>> {
        self.store.get_claims(user, cancel).await
    }

    pub async fn add_claim(
        &self,
        user: &User,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.add_claims(user, core::slice::from_ref(claim), cancel).await
    }

    pub async fn add_claims(
        &self,
        user: &User,
        claims: &[Claim],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.store.add_claims(user, claims, cancel).await
    }

    pub async fn remove_claim(
        &self,
        user: &User,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.remove_claims(user, core::slice::from_ref(claim), cancel).await
    }

    pub async fn remove_claims(
        &self,
        user: &User,
        claims: &[Claim],
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.store.remove_claims(user, claims, cancel).await
    }

    pub async fn get_users_for_claim(
        &self,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<User>> {
        self.store.get_users_for_claim(claim, cancel).await
    }
}
