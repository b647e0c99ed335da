//! Configuration for unitransmit
//!
//! [`LinkConfig`] selects a transport kind and carries the section for that
//! kind. [`AppConfig`] wraps it with logging settings for the CLI and loads
//! from TOML:
//!
//! ```toml
//! [link]
//! kind = "udp"
//! delimiter = "\n"
//!
//! [link.udp]
//! local_addr = "0.0.0.0:5005"
//! remote_addr = "127.0.0.1:5006"
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Default line delimiter
pub const DEFAULT_DELIMITER: &str = "\n";

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Transport selection plus kind-specific settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Transport kind: "loopback" (or "loop"), "serial", "udp", "tcp"
    pub kind: String,
    /// Line delimiter for `read_line` / `write_line`
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Required when `kind = "serial"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<SerialConfig>,
    /// Required when `kind = "udp"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<UdpConfig>,
    /// Required when `kind = "tcp"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpConfig>,
}

/// Serial port settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Port identifier (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout handed to the serial backend
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// UDP socket settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UdpConfig {
    /// Local bind address, `host:port`
    pub local_addr: String,
    /// Default destination for `write`, `host:port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

/// Which end of the TCP connection this side is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TcpRole {
    /// Connect to `host:port`
    #[default]
    Client,
    /// Listen on `host:port` and accept one client
    Server,
}

impl fmt::Display for TcpRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcpRole::Client => write!(f, "client"),
            TcpRole::Server => write!(f, "server"),
        }
    }
}

/// TCP connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpConfig {
    #[serde(default)]
    pub role: TcpRole,
    pub host: String,
    pub port: u16,
    /// Client role only
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl LinkConfig {
    fn with_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            delimiter: default_delimiter(),
            serial: None,
            udp: None,
            tcp: None,
        }
    }

    /// In-process loopback
    pub fn loopback() -> Self {
        Self::with_kind("loopback")
    }

    /// Serial port at `baud_rate`
    pub fn serial(port: &str, baud_rate: u32) -> Self {
        Self {
            serial: Some(SerialConfig {
                port: port.to_string(),
                baud_rate,
                read_timeout_ms: default_read_timeout_ms(),
            }),
            ..Self::with_kind("serial")
        }
    }

    /// UDP bound to `local_addr`, optionally with a default remote
    pub fn udp(local_addr: &str, remote_addr: Option<&str>) -> Self {
        Self {
            udp: Some(UdpConfig {
                local_addr: local_addr.to_string(),
                remote_addr: remote_addr.map(str::to_string),
            }),
            ..Self::with_kind("udp")
        }
    }

    /// TCP client connecting to `host:port`
    pub fn tcp_client(host: &str, port: u16) -> Self {
        Self::tcp(TcpRole::Client, host, port)
    }

    /// TCP server accepting one client on `host:port`
    pub fn tcp_server(host: &str, port: u16) -> Self {
        Self::tcp(TcpRole::Server, host, port)
    }

    fn tcp(role: TcpRole, host: &str, port: u16) -> Self {
        Self {
            tcp: Some(TcpConfig {
                role,
                host: host.to_string(),
                port,
                connect_timeout_ms: default_connect_timeout_ms(),
            }),
            ..Self::with_kind("tcp")
        }
    }

    /// Replace the line delimiter
    pub fn with_delimiter(mut self, delimiter: &str) -> Self {
        self.delimiter = delimiter.to_string();
        self
    }

    /// Delimiter as bytes; rejects an empty delimiter
    pub fn delimiter_bytes(&self) -> Result<Vec<u8>> {
        if self.delimiter.is_empty() {
            return Err(Error::Config("line delimiter must not be empty".to_string()));
        }
        Ok(self.delimiter.as_bytes().to_vec())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Top-level configuration for the `unitransmit` binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub link: LinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_deserialization() {
        let toml_content = r#"
[link]
kind = "udp"

[link.udp]
local_addr = "0.0.0.0:5005"
remote_addr = "127.0.0.1:5006"

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.link.kind, "udp");
        assert_eq!(config.link.delimiter, "\n");
        let udp = config.link.udp.unwrap();
        assert_eq!(udp.local_addr, "0.0.0.0:5005");
        assert_eq!(udp.remote_addr.as_deref(), Some("127.0.0.1:5006"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_serial_and_tcp_defaults() {
        let toml_content = r#"
[link]
kind = "serial"
delimiter = "\r\n"

[link.serial]
port = "/dev/ttyUSB0"

[link.tcp]
host = "127.0.0.1"
port = 5555
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.link.delimiter_bytes().unwrap(), b"\r\n");

        let serial = config.link.serial.unwrap();
        assert_eq!(serial.baud_rate, 115200);
        assert_eq!(serial.read_timeout_ms, 100);

        let tcp = config.link.tcp.unwrap();
        assert_eq!(tcp.role, TcpRole::Client);
        assert_eq!(tcp.connect_timeout_ms, 5000);
    }

    #[test]
    fn test_tcp_role_parsing() {
        let tcp: TcpConfig = toml::from_str("role = \"server\"\nhost = \"0.0.0.0\"\nport = 9000").unwrap();
        assert_eq!(tcp.role, TcpRole::Server);
        assert_eq!(tcp.role.to_string(), "server");
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig {
            link: LinkConfig::tcp_server("0.0.0.0", 9000),
            logging: LoggingConfig::default(),
        };
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[link]"));
        assert!(toml_string.contains("[link.tcp]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("role = \"server\""));
        assert!(!toml_string.contains("[link.udp]"));
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        let config = LinkConfig::loopback().with_delimiter("");
        assert!(matches!(config.delimiter_bytes(), Err(Error::Config(_))));
    }
}
