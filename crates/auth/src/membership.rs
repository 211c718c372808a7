//! User-to-role membership link.

use serde::{Deserialize, Serialize};

use idstore_core::{RoleId, UserId};

/// Association of one user with one role. Carries no payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRoleLink {
    pub user_id: UserId,
    pub role_id: RoleId,
}

impl UserRoleLink {
    pub fn new(user_id: UserId, role_id: RoleId) -> Self {
        Self { user_id, role_id }
    }
}
