//! Runtime configuration
//!
//! Defaults match the reference deployment (`localhost:5000`, raw framing,
//! 1024-byte units). A JSON file named by `CHAT_RELAY_CONFIG` may override
//! any field.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::codec::Framing;
use crate::error::ConfigError;

/// Default server address
pub const DEFAULT_ADDR: &str = "localhost:5000";

/// Maximum size of one transmission unit
pub const MAX_UNIT_SIZE: usize = 1024;

/// Per-connection outbound queue depth
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Channel buffer size for registry commands
pub const REGISTRY_CHANNEL_SIZE: usize = 256;

/// Environment variable naming an optional JSON configuration file
pub const CONFIG_ENV: &str = "CHAT_RELAY_CONFIG";

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind
    pub addr: String,
    /// Wire framing
    pub framing: Framing,
    /// Largest unit accepted or produced
    pub max_unit_size: usize,
    /// Outbound queue depth per connection
    pub outbox_capacity: usize,
    /// Cap on concurrently served connections; `None` means unbounded
    pub max_connections: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            framing: Framing::default(),
            max_unit_size: MAX_UNIT_SIZE,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_connections: None,
        }
    }
}

impl ServerConfig {
    /// Load from `CHAT_RELAY_CONFIG` if set, otherwise use defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would leave the server unable to serve anyone
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_connections",
                reason: "must be at least 1, or omitted for no cap",
            });
        }
        if self.max_unit_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_unit_size",
                reason: "must be at least 1",
            });
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "outbox_capacity",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server address to connect to
    pub addr: String,
    /// Wire framing, must match the server
    pub framing: Framing,
    /// Largest unit accepted or produced
    pub max_unit_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            framing: Framing::default(),
            max_unit_size: MAX_UNIT_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load from `CHAT_RELAY_CONFIG` if set, otherwise use defaults
    pub fn load() -> Result<Self, ConfigError> {
        load_from_env()
    }
}

fn load_from_env<T>() -> Result<T, ConfigError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match env::var_os(CONFIG_ENV) {
        Some(path) => load_file(Path::new(&path)),
        None => Ok(T::default()),
    }
}

/// Parse a JSON configuration file
pub fn load_file<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: PathBuf::from(path),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: PathBuf::from(path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "localhost:5000");
        assert_eq!(config.framing, Framing::Raw);
        assert_eq!(config.max_unit_size, 1024);
        assert!(config.max_connections.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"addr": "0.0.0.0:6000", "max_connections": 10}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.addr, "0.0.0.0:6000");
        assert_eq!(config.max_connections, Some(10));
        assert_eq!(config.outbox_capacity, DEFAULT_OUTBOX_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_zero_connection_cap() {
        let config = ServerConfig {
            max_connections: Some(0),
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_connections",
                ..
            }
        ));

        assert!(ServerConfig::default().validate().is_ok());
        let capped = ServerConfig {
            max_connections: Some(1),
            ..ServerConfig::default()
        };
        assert!(capped.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let no_units = ServerConfig {
            max_unit_size: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            no_units.validate(),
            Err(ConfigError::Invalid {
                field: "max_unit_size",
                ..
            })
        ));

        let no_queue = ServerConfig {
            outbox_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            no_queue.validate(),
            Err(ConfigError::Invalid {
                field: "outbox_capacity",
                ..
            })
        ));
    }

    #[test]
    fn test_framing_snake_case() {
        let json = r#"{"framing": "length_prefixed"}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.framing, Framing::LengthPrefixed);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"port": 5000}"#;
        assert!(serde_json::from_str::<ClientConfig>(json).is_err());
    }

    #[test]
    fn test_load_file_missing() {
        let path = Path::new("/definitely/not/here.json");
        let err = load_file::<ServerConfig>(path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_file_parse_error() {
        let path = env::temp_dir().join(format!("chat-relay-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not json").unwrap();
        let err = load_file::<ServerConfig>(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
