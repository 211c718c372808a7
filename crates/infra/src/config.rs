//! Configuration loading and representation.

pub const DATABASE_URL_ENV: &str = "IDSTORE_DATABASE_URL";
pub const MAX_CONNECTIONS_ENV: &str = "IDSTORE_DB_MAX_CONNECTIONS";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://idstore.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection settings for the identity database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl DatabaseConfig {
    /// Read settings from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; missing or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = lookup(DATABASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                tracing::warn!("{DATABASE_URL_ENV} not set; using {DEFAULT_DATABASE_URL}");
                DEFAULT_DATABASE_URL.to_string()
            });

        let max_connections = match lookup(MAX_CONNECTIONS_ENV) {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(
                        value = %raw,
                        "invalid {MAX_CONNECTIONS_ENV}; using {DEFAULT_MAX_CONNECTIONS}"
                    );
                    DEFAULT_MAX_CONNECTIONS
                }
            },
        };

        Self {
            url,
            max_connections,
        }
    }
}
