//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use fingerprint::{
    CredentialManager, HashingConfig, IdentityManager, SealingKey, TokenSealer,
    db::{DatabaseConfig, IdentityStore},
    deadline::DEFAULT_REQUEST_DEADLINE,
};
use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Minimum pepper length in characters
pub const MIN_PEPPER_LEN: usize = 16;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Keys and pepper
    pub security: SecurityConfig,
    /// Argon2 work factor
    pub hashing: HashingConfig,
    /// Deadline applied to every request
    pub request_deadline: Duration,
}

/// Security-related configuration
#[derive(Clone)]
pub struct SecurityConfig {
    /// Key new tokens are sealed with (required)
    pub sealing_key: SealingKey,
    /// Keys still accepted when opening tokens, selected by id
    pub retired_sealing_keys: Vec<SealingKey>,
    /// Password hashing pepper (required)
    pub password_pepper: String,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("sealing_key", &self.sealing_key)
            .field("retired_sealing_keys", &self.retired_sealing_keys)
            .field("password_pepper", &"<redacted>")
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_source(
            |key| std::env::var(key).ok(),
            bind_override,
            database_url_override,
        )
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_source<F>(
        var: F,
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Bind address
        let bind = match bind_override {
            Some(bind) => bind,
            None => match var("SERVER_BIND") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{raw}' is not an IP:PORT address"),
                })?,
                None => SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            },
        };

        // Database configuration (REQUIRED, CLI URL wins)
        let database = DatabaseConfig::from_source(|key| match key {
            "DATABASE_URL" => database_url_override.clone().or_else(|| var(key)),
            _ => var(key),
        })
        .ok_or_else(|| ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "Set DATABASE_URL or pass --db-url".to_string(),
        })?;

        // Security configuration (REQUIRED)
        let sealing_key_hex = var("SEALING_KEY").ok_or_else(|| ConfigError::MissingRequired {
            var: "SEALING_KEY".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;
        let mut sealing_key =
            SealingKey::from_hex(&sealing_key_hex).map_err(|e| ConfigError::Invalid {
                var: "SEALING_KEY".to_string(),
                reason: e.to_string(),
            })?;
        if let Some(id) = var("SEALING_KEY_ID") {
            sealing_key = sealing_key.with_id(id.trim());
        }

        let retired_sealing_keys = var("PREVIOUS_SEALING_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                SealingKey::from_tagged_hex(entry).map_err(|e| ConfigError::Invalid {
                    var: "PREVIOUS_SEALING_KEYS".to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let password_pepper =
            var("PASSWORD_PEPPER").ok_or_else(|| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let security = SecurityConfig {
            sealing_key,
            retired_sealing_keys,
            password_pepper,
        };

        // Password hashing cost
        let hashing_defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: parse_or(&var, "ARGON2_MEMORY_KIB", hashing_defaults.memory_kib),
            iterations: parse_or(&var, "ARGON2_ITERATIONS", hashing_defaults.iterations),
            parallelism: parse_or(&var, "ARGON2_PARALLELISM", hashing_defaults.parallelism),
        };

        let request_deadline = Duration::from_secs(parse_or(
            &var,
            "REQUEST_DEADLINE_SECS",
            DEFAULT_REQUEST_DEADLINE.as_secs(),
        ));

        Ok(ServerConfig {
            bind,
            database,
            security,
            hashing,
            request_deadline,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.password_pepper.len() < MIN_PEPPER_LEN {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: format!("Must be at least {MIN_PEPPER_LEN} characters"),
            });
        }

        // Retired keys are only reachable through their id
        let mut ids = HashSet::new();
        if let Some(id) = self.security.sealing_key.id() {
            ids.insert(id);
        }
        for key in &self.security.retired_sealing_keys {
            let Some(id) = key.id() else {
                return Err(ConfigError::Invalid {
                    var: "PREVIOUS_SEALING_KEYS".to_string(),
                    reason: "Every entry must be written as kid:hex".to_string(),
                });
            };
            if !ids.insert(id) {
                return Err(ConfigError::Invalid {
                    var: "PREVIOUS_SEALING_KEYS".to_string(),
                    reason: format!("Key id '{id}' is used more than once"),
                });
            }
        }

        if CredentialManager::new(String::new(), self.hashing).is_err() {
            return Err(ConfigError::Invalid {
                var: "ARGON2_MEMORY_KIB".to_string(),
                reason: format!(
                    "Work factor {:?} is outside argon2 limits (memory must be at least 8 KiB per lane)",
                    self.hashing
                ),
            });
        }

        if self.request_deadline.is_zero() {
            return Err(ConfigError::Invalid {
                var: "REQUEST_DEADLINE_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }

    /// Token sealer holding the active and retired keys
    pub fn token_sealer(&self) -> TokenSealer {
        self.security
            .retired_sealing_keys
            .iter()
            .cloned()
            .fold(
                TokenSealer::new(self.security.sealing_key.clone()),
                TokenSealer::with_retired_key,
            )
    }

    /// Identity manager over `store` using this configuration
    pub fn identity_manager(
        &self,
        store: Arc<dyn IdentityStore>,
    ) -> Result<IdentityManager, ConfigError> {
        let credentials =
            CredentialManager::new(self.security.password_pepper.clone(), self.hashing).map_err(
                |e| ConfigError::Invalid {
                    var: "ARGON2_MEMORY_KIB".to_string(),
                    reason: e.to_string(),
                },
            )?;

        Ok(IdentityManager::new(
            store,
            Arc::new(self.token_sealer()),
            credentials,
        ))
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse a variable with default fallback
fn parse_or<F, T>(var: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
