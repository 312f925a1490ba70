use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime environment selector (`APP_ENV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Log filter used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Self::Development => "debug,hyper=info,sqlx=warn",
            Self::Production => "info",
        }
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub environment: Environment,
    pub hcloud_token: String,
    pub hcloud_endpoint: Option<String>,
    pub hcloud_location: Option<String>,
    pub request_timeout: Duration,
    pub action_timeout: Duration,
    pub audit_queue_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            listen_addr: parse_or(&lookup, "LISTEN_ADDR", "0.0.0.0:8080")?,
            environment: parse_or(&lookup, "APP_ENV", "development")?,
            hcloud_token: required("HCLOUD_TOKEN")?,
            hcloud_endpoint: optional("HCLOUD_ENDPOINT"),
            hcloud_location: optional("HCLOUD_LOCATION"),
            request_timeout: timeout_or(&lookup, "REQUEST_TIMEOUT_SECS", "10")?,
            action_timeout: timeout_or(&lookup, "ACTION_TIMEOUT_SECS", "120")?,
            audit_queue_capacity: parse_or::<usize>(&lookup, "AUDIT_QUEUE_CAPACITY", "256")?
                .max(1),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

/// Whole seconds, at least one.
fn timeout_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<Duration, ConfigError> {
    match parse_or::<u64>(lookup, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/atlas"),
        ("HCLOUD_TOKEN", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let cfg = config(&BASE).unwrap();
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.action_timeout, Duration::from_secs(120));
        assert_eq!(cfg.audit_queue_capacity, 256);
        assert!(cfg.hcloud_endpoint.is_none());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = config(&[("DATABASE_URL", "postgres://localhost/atlas")])
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Missing("HCLOUD_TOKEN")));

        let err = config(&[("DATABASE_URL", "postgres://x"), ("HCLOUD_TOKEN", "  ")])
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Missing("HCLOUD_TOKEN")));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut vars = BASE.to_vec();
        vars.push(("ACTION_TIMEOUT_SECS", "soon"));
        let err = config(&vars).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { name: "ACTION_TIMEOUT_SECS", .. }));

        let mut vars = BASE.to_vec();
        vars.push(("APP_ENV", "staging"));
        assert!(config(&vars).is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        for name in ["REQUEST_TIMEOUT_SECS", "ACTION_TIMEOUT_SECS"] {
            let mut vars = BASE.to_vec();
            vars.push((name, "0"));
            let err = config(&vars).err().unwrap();
            assert!(
                matches!(err, ConfigError::Invalid { name: n, ref value } if n == name && value == "0"),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn test_overrides() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("APP_ENV", "Production"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("AUDIT_QUEUE_CAPACITY", "0"),
            ("HCLOUD_LOCATION", "nbg1"),
        ]);
        let cfg = config(&vars).unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.audit_queue_capacity, 1);
        assert_eq!(cfg.hcloud_location.as_deref(), Some("nbg1"));
    }
}
