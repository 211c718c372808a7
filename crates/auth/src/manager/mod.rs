//! Orchestration over the store contracts.
//!
//! Managers own the lookup normalization and the validation the stores leave
//! out (duplicate names, membership pre-checks).

pub mod role_manager;
pub mod user_manager;

pub use role_manager::RoleManager;
pub use user_manager::UserManager;
