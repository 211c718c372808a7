//! User account record.

use serde::{Deserialize, Serialize};

use idstore_core::UserId;

/// One stored account.
///
/// The email doubles as the user name: every user-name and email accessor
/// on the stores reads and writes this single field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Already-hashed password. Hashing happens before the store sees it.
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self::with_id(UserId::new(), email)
    }

    pub fn with_id(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            password_hash: None,
        }
    }

    /// A hash consisting only of whitespace counts as no password.
    pub fn has_password(&self) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| !hash.trim().is_empty())
    }
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
