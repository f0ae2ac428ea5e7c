//! Endpoint configuration: TOML file and environment parsing.
//!
//! Durations are expressed in whole seconds in both sources. A zero duration
//! or pool size means "not set": timeouts fall back to the defaults below and
//! pool bounds are left to the driver.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::PoolKey;

/// Read/write timeout applied when the configuration leaves it at zero.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect/ping deadline applied when the configuration leaves it at zero.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable prefix used by [`MongoConfig::from_env`].
pub const ENV_PREFIX: &str = "MONGRID_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "connect_timeout_secs", with = "secs")]
    pub connect_timeout: Duration,
    #[serde(rename = "read_timeout_secs", with = "secs")]
    pub read_timeout: Duration,
    #[serde(rename = "write_timeout_secs", with = "secs")]
    pub write_timeout: Duration,
    #[serde(rename = "max_conn_idle_secs", with = "secs")]
    pub max_conn_idle_time: Duration,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            username: None,
            password: None,
            connect_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            max_conn_idle_time: Duration::ZERO,
            max_pool_size: 0,
            min_pool_size: 0,
        }
    }
}

impl MongoConfig {
    /// Configuration for `host:port` with everything else defaulted.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Build a configuration from `MONGRID_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unset variables keep their default; a variable that is set but does
    /// not parse is an error.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (name, v))
        };

        let mut config = Self::default();
        if let Some((_, host)) = var("HOST") {
            config.host = host;
        }
        if let Some(entry) = var("PORT") {
            config.port = parse_var(entry)?;
        }
        config.username = var("USERNAME").map(|(_, v)| v);
        config.password = var("PASSWORD").map(|(_, v)| v);
        if let Some(entry) = var("CONNECT_TIMEOUT") {
            config.connect_timeout = Duration::from_secs(parse_var(entry)?);
        }
        if let Some(entry) = var("READ_TIMEOUT") {
            config.read_timeout = Duration::from_secs(parse_var(entry)?);
        }
        if let Some(entry) = var("WRITE_TIMEOUT") {
            config.write_timeout = Duration::from_secs(parse_var(entry)?);
        }
        if let Some(entry) = var("MAX_CONN_IDLE_TIME") {
            config.max_conn_idle_time = Duration::from_secs(parse_var(entry)?);
        }
        if let Some(entry) = var("MAX_POOL_SIZE") {
            config.max_pool_size = parse_var(entry)?;
        }
        if let Some(entry) = var("MIN_POOL_SIZE") {
            config.min_pool_size = parse_var(entry)?;
        }
        Ok(config)
    }

    /// Reject configurations that can never identify an endpoint.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        Ok(())
    }

    pub fn key(&self) -> PoolKey {
        PoolKey::new(&self.host, self.port)
    }

    /// Username and password, only when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    pub fn connect_timeout_or_default(&self) -> Duration {
        non_zero_or(self.connect_timeout, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn read_timeout_or_default(&self) -> Duration {
        non_zero_or(self.read_timeout, DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn write_timeout_or_default(&self) -> Duration {
        non_zero_or(self.write_timeout, DEFAULT_OPERATION_TIMEOUT)
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() { fallback } else { value }
}

fn parse_var<T: std::str::FromStr>((name, value): (String, String)) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { name, value })
}

/// Serialize a `Duration` as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MongoConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 27017);
        assert_eq!(config.read_timeout_or_default(), Duration::from_secs(5));
        assert_eq!(config.write_timeout_or_default(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout_or_default(), DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_explicit_timeouts_kept() {
        let config = MongoConfig {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(9),
            ..MongoConfig::default()
        };
        assert_eq!(config.read_timeout_or_default(), Duration::from_secs(2));
        assert_eq!(config.write_timeout_or_default(), Duration::from_secs(9));
    }

    #[test]
    fn test_zero_port_rejected() {
        let config = MongoConfig::new("localhost", 0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPort)));
        assert!(MongoConfig::new("localhost", 27017).validate().is_ok());
    }

    #[test]
    fn test_key_ignores_tuning() {
        let a = MongoConfig {
            max_pool_size: 10,
            ..MongoConfig::new("db", 27017)
        };
        let b = MongoConfig {
            max_pool_size: 50,
            username: Some("app".into()),
            ..MongoConfig::new("db", 27017)
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_credentials_require_both() {
        let mut config = MongoConfig::new("db.local", 27018);
        assert_eq!(config.credentials(), None);

        config.username = Some("app".into());
        assert_eq!(config.credentials(), None);

        config.password = Some(String::new());
        assert_eq!(config.credentials(), None);

        config.password = Some("secret".into());
        assert_eq!(config.credentials(), Some(("app", "secret")));
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
host = "mongo.internal"
port = 27019
"#;
        let config = MongoConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.host, "mongo.internal");
        assert_eq!(config.port, 27019);
        assert_eq!(config.max_pool_size, 0);
        assert!(config.username.is_none());
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
host = "mongo.internal"
port = 27017
username = "app"
password = "secret"
connect_timeout_secs = 3
read_timeout_secs = 4
write_timeout_secs = 6
max_conn_idle_secs = 120
max_pool_size = 20
min_pool_size = 2
"#;
        let config = MongoConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.read_timeout, Duration::from_secs(4));
        assert_eq!(config.write_timeout, Duration::from_secs(6));
        assert_eq!(config.max_conn_idle_time, Duration::from_secs(120));
        assert_eq!(config.max_pool_size, 20);
        assert_eq!(config.min_pool_size, 2);
        assert_eq!(config.credentials(), Some(("app", "secret")));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MongoConfig {
            read_timeout: Duration::from_secs(7),
            max_pool_size: 4,
            ..MongoConfig::new("db", 27017)
        };
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("read_timeout_secs = 7"));
        assert_eq!(MongoConfig::from_toml_str(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mongrid.toml");
        std::fs::write(&path, "host = \"filehost\"\nport = 1234\n").unwrap();
        let config = MongoConfig::from_file(&path).unwrap();
        assert_eq!(config.key(), PoolKey::new("filehost", 1234));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = MongoConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn test_from_lookup() {
        let config = MongoConfig::from_lookup(lookup(&[
            ("MONGRID_HOST", "envhost"),
            ("MONGRID_PORT", "27020"),
            ("MONGRID_READ_TIMEOUT", "3"),
            ("MONGRID_MAX_POOL_SIZE", "15"),
        ]))
        .unwrap();
        assert_eq!(config.host, "envhost");
        assert_eq!(config.port, 27020);
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.write_timeout, Duration::ZERO);
        assert_eq!(config.max_pool_size, 15);
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = MongoConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, MongoConfig::default());
    }

    #[test]
    fn test_from_lookup_bad_port() {
        let err = MongoConfig::from_lookup(lookup(&[("MONGRID_PORT", "not-a-port")])).unwrap_err();
        match err {
            ConfigError::Env { name, value } => {
                assert_eq!(name, "MONGRID_PORT");
                assert_eq!(value, "not-a-port");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
