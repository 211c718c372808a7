//! `idstore-auth` — identity records and the store capability contracts.
//!
//! This crate is intentionally decoupled from any database. Storage adapters
//! implement the traits in [`stores`]; the managers orchestrate them.

pub mod claims;
pub mod manager;
pub mod membership;
pub mod normalizer;
pub mod result;
pub mod roles;
pub mod stores;
pub mod user;

pub use claims::Claim;
pub use manager::{RoleManager, UserManager};
pub use membership::UserRoleLink;
pub use normalizer::{LookupNormalizer, UpperInvariantNormalizer};
pub use result::{IdentityError, IdentityResult};
pub use roles::{Role, new_concurrency_stamp};
pub use stores::{
    RoleClaimStore, RoleStore, UserClaimStore, UserEmailStore, UserPasswordStore, UserRoleStore,
    UserStore,
};
pub use user::User;

pub use idstore_core::{RoleId, StoreError, StoreResult, UserId};
