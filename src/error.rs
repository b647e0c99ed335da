//! Error types for unitransmit

use std::io;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// unitransmit error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport kind selector not recognized
    #[error("Unsupported transport kind: {0}")]
    UnsupportedKind(String),

    /// Invalid or missing configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Destination address missing or unresolvable
    #[error("Address error: {0}")]
    Address(String),

    /// Local socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Listener failed while waiting for a client
    #[error("Failed to accept on {addr}: {source}")]
    Listen {
        /// Listening address
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Remote endpoint refused or timed out
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Remote address
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Serial port could not be opened
    #[cfg(feature = "serial")]
    #[error("Serial device {port}: {source}")]
    Device {
        /// Port identifier (e.g. "/dev/ttyUSB0")
        port: String,
        /// Error reported by the serial backend
        #[source]
        source: serialport::Error,
    },

    /// Stream peer ended the connection
    #[error("Peer closed the connection")]
    PeerClosed,

    /// Transport was closed locally
    #[error("Transport closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Config serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Background thread panicked
    #[error("Thread panic")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
