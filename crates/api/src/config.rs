//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use ironbooks_observability::LogFormat;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is invalid: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("{0} must be set in production")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub environment: Environment,
    /// Selects the Postgres event store when built with the `postgres` feature.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    /// Attempts for a ledger posting that loses an optimistic-concurrency race.
    pub ledger_retry_limit: u32,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let environment = match var("IRONBOOKS_ENV").as_deref().map(str::trim) {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "IRONBOOKS_ENV",
                    message: format!("unknown environment '{other}'"),
                });
            }
        };

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                message: format!("{e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                return Err(ConfigError::Missing("JWT_SECRET"));
            }
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|message| ConfigError::Invalid { name: "LOG_FORMAT", message })?,
            None => LogFormat::default(),
        };

        let ledger_retry_limit = match var("LEDGER_RETRY_LIMIT") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "LEDGER_RETRY_LIMIT",
                        message: format!("expected a positive integer, got '{raw}'"),
                    });
                }
            },
            None => 3,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            environment,
            database_url: var("DATABASE_URL"),
            log_format,
            ledger_retry_limit,
        })
    }

    /// In-memory defaults with the given secret. Used by tests and local tooling.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            environment: Environment::Development,
            database_url: None,
            log_format: LogFormat::Pretty,
            ledger_retry_limit: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_in_development() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.ledger_retry_limit, 3);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn production_requires_a_secret() {
        assert_eq!(
            load(&[("IRONBOOKS_ENV", "production")]).unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
        let cfg = load(&[("IRONBOOKS_ENV", "production"), ("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.environment, Environment::Production);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[("BIND_ADDR", "nope")]),
            Err(ConfigError::Invalid { name: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[("LEDGER_RETRY_LIMIT", "0")]),
            Err(ConfigError::Invalid { name: "LEDGER_RETRY_LIMIT", .. })
        ));
        assert!(matches!(
            load(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { name: "LOG_FORMAT", .. })
        ));
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("LOG_FORMAT", "pretty"),
            ("LEDGER_RETRY_LIMIT", "5"),
            ("DATABASE_URL", "postgres://localhost/ironbooks"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.ledger_retry_limit, 5);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/ironbooks"));
    }
}
