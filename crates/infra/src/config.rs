//! Configuration loading and representation.
//!
//! | variable | default |
//! |---|---|
//! | `TANIA_PERSISTENCE_ENGINE` | `inmemory` (or `postgres`) |
//! | `TANIA_DATABASE_URL` | required for `postgres` |
//! | `TANIA_DB_MAX_CONNECTIONS` | `5` |
//! | `TANIA_LOG` | `info` |
//! | `TANIA_DEFAULT_USERNAME` | `tania` (empty disables the default account) |
//! | `TANIA_DEFAULT_CREDENTIAL_DIGEST` | digest of the password `tania` |
//!
//! Invalid values fall back to the default with a warning.

use thiserror::Error;
use tracing::warn;

pub const ENGINE_VAR: &str = "TANIA_PERSISTENCE_ENGINE";
pub const DATABASE_URL_VAR: &str = "TANIA_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "TANIA_DB_MAX_CONNECTIONS";
pub const LOG_VAR: &str = "TANIA_LOG";
pub const DEFAULT_USERNAME_VAR: &str = "TANIA_DEFAULT_USERNAME";
pub const DEFAULT_DIGEST_VAR: &str = "TANIA_DEFAULT_CREDENTIAL_DIGEST";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_USERNAME: &str = "tania";
/// `sha256` of `tania`, in the format the authentication layer stores.
const DEFAULT_CREDENTIAL_DIGEST: &str =
    "sha256:37755b1afe16a4973d4d2208c4a7dea45e2e5772015dc3d34e04eeed77f58591";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("TANIA_DATABASE_URL must be set when TANIA_PERSISTENCE_ENGINE=postgres")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistenceEngine {
    #[default]
    InMemory,
    Postgres,
}

impl PersistenceEngine {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inmemory" | "in_memory" | "memory" => Some(PersistenceEngine::InMemory),
            "postgres" | "postgresql" => Some(PersistenceEngine::Postgres),
            _ => None,
        }
    }
}

/// Account registered at startup when no user holds its name yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultUser {
    pub username: String,
    pub credential_digest: String,
}

impl Default for DefaultUser {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            credential_digest: DEFAULT_CREDENTIAL_DIGEST.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaniaConfig {
    pub engine: PersistenceEngine,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,
    pub default_user: Option<DefaultUser>,
}

impl Default for TaniaConfig {
    fn default() -> Self {
        Self {
            engine: PersistenceEngine::InMemory,
            database_url: None,
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_user: Some(DefaultUser::default()),
        }
    }
}

impl TaniaConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn postgres(database_url: impl Into<String>) -> Self {
        Self {
            engine: PersistenceEngine::Postgres,
            database_url: Some(database_url.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine = match lookup(ENGINE_VAR) {
            None => PersistenceEngine::default(),
            Some(raw) => PersistenceEngine::parse(&raw).unwrap_or_else(|| {
                warn!(variable = ENGINE_VAR, value = %raw, "unknown persistence engine; using inmemory");
                PersistenceEngine::default()
            }),
        };

        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());
        if engine == PersistenceEngine::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let db_max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(
                        variable = MAX_CONNECTIONS_VAR,
                        value = %raw,
                        default = DEFAULT_MAX_CONNECTIONS,
                        "invalid connection count; using default"
                    );
                    DEFAULT_MAX_CONNECTIONS
                }
            },
        };

        let log_filter = match lookup(LOG_VAR) {
            Some(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            Some(_) => {
                warn!(variable = LOG_VAR, "empty log filter; using default");
                DEFAULT_LOG_FILTER.to_string()
            }
            None => DEFAULT_LOG_FILTER.to_string(),
        };

        let default_user = match lookup(DEFAULT_USERNAME_VAR) {
            Some(raw) if raw.trim().is_empty() => None,
            username => {
                let credential_digest = match lookup(DEFAULT_DIGEST_VAR) {
                    Some(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
                    Some(_) => {
                        warn!(variable = DEFAULT_DIGEST_VAR, "empty credential digest; using default");
                        DEFAULT_CREDENTIAL_DIGEST.to_string()
                    }
                    None => DEFAULT_CREDENTIAL_DIGEST.to_string(),
                };
                Some(DefaultUser {
                    username: username
                        .map(|raw| raw.trim().to_string())
                        .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
                    credential_digest,
                })
            }
        };

        Ok(Self {
            engine,
            database_url,
            db_max_connections,
            log_filter,
            default_user,
        })
    }
}
