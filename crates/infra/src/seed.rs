//! Default role seeding.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use idstore_auth::{IdentityResult, Role, RoleManager, RoleStore};
use idstore_core::StoreError;

/// Roles every deployment starts with.
pub const DEFAULT_ROLES: [&str; 2] = ["Admin", "Poster"];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("role '{role}' was rejected: {result}")]
    Rejected { role: String, result: IdentityResult },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create [`DEFAULT_ROLES`] that do not exist yet.
pub async fn ensure_default_roles<R: RoleStore>(
    roles: &RoleManager<R>,
    cancel: &CancellationToken,
) -> Result<usize, SeedError> {
    ensure_roles(roles, &DEFAULT_ROLES, cancel).await
}

/// Create each named role unless one with the same normalized name exists.
///
/// Returns how many roles were created. Running it again is a no-op.
#[instrument(skip_all, fields(roles = names.len()), err)]
pub async fn ensure_roles<R: RoleStore>(
    roles: &RoleManager<R>,
    names: &[&str],
    cancel: &CancellationToken,
) -> Result<usize, SeedError> {
    let mut created = 0;
    for name in names {
        if roles.role_exists(name, cancel).await? {
            tracing::debug!(role = %name, "role already present");
            continue;
        }

        let mut role = Role::new(*name);
        let result = roles.create(&mut role, cancel).await?;
        if !result.succeeded() {
            return Err(SeedError::Rejected {
                role: (*name).to_string(),
                result,
            });
        }

        tracing::info!(role = %name, role_id = %role.id, "role seeded");
        created += 1;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::role_store::SqliteRoleStore;

    #[tokio::test]
    async fn seeding_twice_creates_each_role_once() {
        let pool = connect_in_memory().await.unwrap();
        let manager = RoleManager::new(SqliteRoleStore::new(pool.clone()));
        let cancel = CancellationToken::new();

        assert_eq!(ensure_default_roles(&manager, &cancel).await.unwrap(), 2);
        assert_eq!(ensure_default_roles(&manager, &cancel).await.unwrap(), 0);

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM roles ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(names, vec!["Admin", "Poster"]);
    }

    #[tokio::test]
    async fn existing_role_in_other_case_is_not_duplicated() {
        let pool = connect_in_memory().await.unwrap();
        let manager = RoleManager::new(SqliteRoleStore::new(pool));
        let cancel = CancellationToken::new();

        let mut admin = Role::new("admin");
        assert!(manager.create(&mut admin, &cancel).await.unwrap().succeeded());

        assert_eq!(ensure_default_roles(&manager, &cancel).await.unwrap(), 1);
        assert!(manager.role_exists("Poster", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let pool = connect_in_memory().await.unwrap();
        let manager = RoleManager::new(SqliteRoleStore::new(pool));
        let cancel = CancellationToken::new();

        let err = ensure_roles(&manager, &[" "], &cancel).await.unwrap_err();
        assert!(matches!(err, SeedError::Store(StoreError::InvalidArgument(_))));
    }
}
