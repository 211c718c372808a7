//! Infrastructure layer: SQLite stores, schema, config and seeding.

pub mod config;
pub mod db;
pub mod role_store;
pub mod seed;
pub mod user_store;


pub use config::DatabaseConfig;
pub use role_store::SqliteRoleStore;
pub use seed::{DEFAULT_ROLES, SeedError, ensure_default_roles, ensure_roles};
pub use user_store::SqliteUserStore;
