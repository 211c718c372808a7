//! Relational schema assumed by the stores.
//!
//! Applied statement by statement by [`super::migrate`]; every statement is
//! idempotent.

pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY NOT NULL,
        email         TEXT NOT NULL,
        password_hash TEXT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_users_email ON users (email)",
    "CREATE INDEX IF NOT EXISTS ix_users_email_lower ON users (LOWER(email))",
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id                TEXT PRIMARY KEY NOT NULL,
        name              TEXT NOT NULL,
        normalized_name   TEXT NOT NULL,
        concurrency_stamp TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_roles_normalized_name ON roles (normalized_name)",
    r#"
    CREATE TABLE IF NOT EXISTS user_claims (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        claim_type  TEXT NOT NULL,
        claim_value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_user_claims_user_id ON user_claims (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS role_claims (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        role_id     TEXT NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        claim_type  TEXT NOT NULL,
        claim_value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_role_claims_role_id ON role_claims (role_id)",
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        role_id TEXT NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_user_roles_role_id ON user_roles (role_id)",
];
