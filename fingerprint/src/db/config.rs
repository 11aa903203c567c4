//! Database configuration module.

use std::env;

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 5)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    ///
    /// Returns `None` when `DATABASE_URL` is unset. Unparseable numeric
    /// values fall back to their defaults.
    pub fn from_env() -> Option<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    ///
    /// Reads the same variables as [`DatabaseConfig::from_env`].
    pub fn from_source<F>(var: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::development();
        Some(Self {
            database_url: var("DATABASE_URL")?,
            max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_or(&var, "DB_MIN_CONNECTIONS", defaults.min_connections),
            connection_timeout_secs: parse_or(
                &var,
                "DB_CONNECTION_TIMEOUT",
                defaults.connection_timeout_secs,
            ),
            idle_timeout_secs: parse_or(&var, "DB_IDLE_TIMEOUT", defaults.idle_timeout_secs),
            max_lifetime_secs: parse_or(&var, "DB_MAX_LIFETIME", defaults.max_lifetime_secs),
        })
    }

    /// Create a default configuration for development
    ///
    /// Uses `postgres://postgres@localhost/fingerprint` as the database URL
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/fingerprint".to_string(),
            max_connections: 20,
            min_connections: 5,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Option<DatabaseConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseConfig::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_missing_url() {
        assert!(load(&[("DB_MAX_CONNECTIONS", "7")]).is_none());
    }

    #[test]
    fn test_from_source() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/fp"),
            ("DB_MAX_CONNECTIONS", "7"),
            ("DB_IDLE_TIMEOUT", "not-a-number"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgres://db/fp");
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.idle_timeout_secs, 600);
    }

    #[test]
    fn test_development_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connection_timeout_secs, 10);
        assert_eq!(config.idle_timeout_secs, 600);
        assert_eq!(config.max_lifetime_secs, 1800);
    }
}
