//! Channel configuration and JSON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::routing::SecurityLevel;

/// Dispatcher port used when none is configured.
pub const DEFAULT_PORT: u16 = 64000;

/// Settings for one exec-session channel.
///
/// Missing fields take their defaults; unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct ChannelConfig {
    /// Dispatcher host name or address.
    pub host: String,
    /// Dispatcher TCP port.
    pub port: u16,
    /// Local socket path. Takes precedence over `host`/`port` when set.
    pub unix_socket: Option<PathBuf>,
    /// Routing policy.
    pub security_level: SecurityLevel,
    /// Session authenticated on connect.
    pub session_id: Uuid,
    /// VM the session belongs to.
    pub vm_id: String,
    /// Connect deadline in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            unix_socket: None,
            security_level: SecurityLevel::default(),
            session_id: Uuid::nil(),
            vm_id: String::new(),
            connect_timeout_ms: 60_000,
        }
    }
}

impl ChannelConfig {
    /// Parses a JSON document.
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(io::BufWriter::new(file), self)?;
        Ok(())
    }

    /// Connect deadline.
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether the channel goes over a local socket.
    pub const fn is_local(&self) -> bool {
        self.unix_socket.is_some()
    }

    /// Checks the values a channel cannot start without.
    pub fn validate(&self) -> Result<()> {
        if !self.is_local() {
            if self.host.is_empty() {
                return Err(Error::InvalidConfig("host is empty"));
            }
            if self.port == 0 {
                return Err(Error::InvalidConfig("port must be non-zero"));
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::InvalidConfig("connect_timeout_ms must be non-zero"));
        }
        if self.session_id.is_nil() {
            return Err(Error::InvalidConfig("session_id is nil"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ChannelConfig {
        ChannelConfig {
            session_id: Uuid::new_v4(),
            vm_id: "vm-1".into(),
            ..ChannelConfig::default()
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = ChannelConfig::from_json(r#"{"security_level": "high"}"#).unwrap();
        assert_eq!(cfg.security_level, SecurityLevel::High);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ChannelConfig::from_json(r#"{"hostname": "x"}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn validation() {
        assert!(valid().validate().is_ok());
        assert!(ChannelConfig::default().validate().is_err());

        let cfg = ChannelConfig { port: 0, ..valid() };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let local = ChannelConfig {
            port: 0,
            unix_socket: Some("/run/vmio.sock".into()),
            ..valid()
        };
        assert!(local.validate().is_ok());

        let cfg = ChannelConfig {
            connect_timeout_ms: 0,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel.json");
        let cfg = ChannelConfig {
            security_level: SecurityLevel::Low,
            connect_timeout_ms: 1500,
            ..valid()
        };
        cfg.save(&path).unwrap();
        assert_eq!(ChannelConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel.json");
        fs::write(&path, r#"{"port": 0, "session_id": "67e55044-10b1-426f-9247-bb680e5fe0c8"}"#)
            .unwrap();
        assert!(matches!(
            ChannelConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ChannelConfig::load(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
