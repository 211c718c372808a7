use serde::{Deserialize, Serialize};
use uuid::Uuid;

use idstore_core::RoleId;

use crate::normalizer::{LookupNormalizer, UpperInvariantNormalizer};

/// One stored role.
///
/// `concurrency_stamp` changes on every successful update. A write carrying
/// an older stamp than the stored one is rejected as a concurrency failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub normalized_name: String,
    pub concurrency_stamp: String,
}

impl Role {
    /// New role with an upper-cased normalized name and a fresh stamp.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: RoleId::new(),
            normalized_name: UpperInvariantNormalizer.normalize_name(&name),
            name,
            concurrency_stamp: new_concurrency_stamp(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Generate an opaque concurrency stamp.
pub fn new_concurrency_stamp() -> String {
    Uuid::new_v4().to_string()
}
