use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use idstore_core::{StoreError, StoreResult, ensure_not_cancelled};

use crate::normalizer::{LookupNormalizer, UpperInvariantNormalizer};
use crate::stores::{RoleClaimStore, RoleStore};
use crate::{Claim, IdentityError, IdentityResult, Role};

/// Role lifecycle on top of a [`RoleStore`].
pub struct RoleManager<R> {
    store: R,
    normalizer: Arc<dyn LookupNormalizer>,
}

impl<R: RoleStore> RoleManager<R> {
    pub fn new(store: R) -> Self {
        Self::with_normalizer(store, Arc::new(UpperInvariantNormalizer))
    }

    pub fn with_normalizer(store: R, normalizer: Arc<dyn LookupNormalizer>) -> Self {
        Self { store, normalizer }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn normalize_key(&self, role_name: &str) -> String {
        self.normalizer.normalize_name(role_name)
    }

    /// Create `role` unless its name is blank or already taken.
    pub async fn create(
        &self,
        role: &mut Role,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        let validation = self.validate(role, cancel).await?;
        if !validation.succeeded() {
            return Ok(validation);
        }
        self.update_normalized_name(role, cancel)?;
        self.store.create(role, cancel).await
    }

    pub async fn update(
        &self,
        role: &mut Role,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        let validation = self.validate(role, cancel).await?;
        if !validation.succeeded() {
            return Ok(validation);
        }
        self.update_normalized_name(role, cancel)?;
        self.store.update(role, cancel).await
    }

    pub async fn delete(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        self.store.delete(role, cancel).await
    }

    pub async fn role_exists(&self, role_name: &str, cancel: &CancellationToken) -> StoreResult<bool> {
        Ok(self.find_by_name(role_name, cancel).await?.is_some())
    }

    pub async fn find_by_id(
        &self,
        role_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Role>> {
        self.store.find_by_id(role_id, cancel).await
    }

    pub async fn find_by_name(
        &self,
        role_name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Role>> {
        ensure_not_cancelled(cancel)?;
        StoreError::require_non_blank(role_name, "role name")?;
        self.store
            .find_by_name(&self.normalize_key(role_name), cancel)
            .await
    }

    fn update_normalized_name(&self, role: &mut Role, cancel: &CancellationToken) -> StoreResult<()> {
        let name = self.store.get_role_name(role, cancel)?;
        let normalized = self.normalize_key(&name);
        self.store.set_normalized_role_name(role, &normalized, cancel)
    }

    async fn validate(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<IdentityResult> {
        let name = self.store.get_role_name(role, cancel)?;
        if name.trim().is_empty() {
            return Ok(IdentityResult::failed(IdentityError::invalid_role_name(&name)));
        }

        match self.find_by_name(&name, cancel).await? {
            Some(owner) if owner.id != role.id => {
                Ok(IdentityResult::failed(IdentityError::duplicate_role_name(&name)))
            }
            _ => Ok(IdentityResult::Success),
        }
    }
}

impl<R: RoleClaimStore> RoleManager<R> {
    pub async fn get_claims(&self, role: &Role, cancel: &CancellationToken) -> StoreResult<Vec<Claim>> {
        self.store.get_claims(role, cancel).await
    }

    pub async fn add_claim(
        &self,
        role: &Role,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.store.add_claim(role, claim, cancel).await
    }

    pub async fn remove_claim(
        &self,
        role: &Role,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> StoreResult<IdentityResult> {
        self.store.remove_claim(role, claim, cancel).await
    }
}
