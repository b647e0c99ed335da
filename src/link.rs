//! Link facade: pick a transport from configuration
//!
//! [`Link::open`] is the single construction entry point. It parses the kind
//! selector, checks the matching config section and builds that variant.
//! After that a [`Link`] only forwards calls; it adds no transport logic.

use crate::buffer::ReceiveBuffer;
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::notify::Sink;
#[cfg(feature = "serial")]
use crate::transport::SerialTransport;
use crate::transport::{LoopbackTransport, TcpTransport, Transport, UdpTransport};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Closed set of transport kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Loopback,
    Serial,
    Udp,
    Tcp,
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loop" | "loopback" => Ok(TransportKind::Loopback),
            "serial" => Ok(TransportKind::Serial),
            "udp" => Ok(TransportKind::Udp),
            "tcp" => Ok(TransportKind::Tcp),
            _ => Err(Error::UnsupportedKind(s.to_string())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Loopback => "loopback",
            TransportKind::Serial => "serial",
            TransportKind::Udp => "udp",
            TransportKind::Tcp => "tcp",
        };
        f.write_str(name)
    }
}

/// An open transport of any kind
pub enum Link {
    Loopback(LoopbackTransport),
    #[cfg(feature = "serial")]
    Serial(SerialTransport),
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

impl Link {
    /// Open the transport described by `config`
    ///
    /// `sink`, if given, receives an [`Event`](crate::notify::Event) for every
    /// chunk that arrives and for the end of the link. A TCP server config
    /// blocks here until a client connects.
    pub fn open(config: &LinkConfig, sink: Option<Sink>) -> Result<Self> {
        let kind: TransportKind = config.kind.parse()?;
        let delimiter = config.delimiter_bytes()?;
        log::info!("Opening {} link", kind);

        match kind {
            TransportKind::Loopback => Ok(Link::Loopback(LoopbackTransport::new(delimiter, sink)?)),
            TransportKind::Serial => open_serial(config, delimiter, sink),
            TransportKind::Udp => {
                let udp = config.udp.as_ref().ok_or_else(|| missing_section(kind))?;
                Ok(Link::Udp(UdpTransport::open(udp, delimiter, sink)?))
            }
            TransportKind::Tcp => {
                let tcp = config.tcp.as_ref().ok_or_else(|| missing_section(kind))?;
                Ok(Link::Tcp(TcpTransport::open(tcp, delimiter, sink)?))
            }
        }
    }

    /// Kind of the underlying transport
    pub fn kind(&self) -> TransportKind {
        match self {
            Link::Loopback(_) => TransportKind::Loopback,
            #[cfg(feature = "serial")]
            Link::Serial(_) => TransportKind::Serial,
            Link::Udp(_) => TransportKind::Udp,
            Link::Tcp(_) => TransportKind::Tcp,
        }
    }

    /// Write with an optional explicit destination
    ///
    /// Only UDP accepts a destination; other kinds have a single implicit
    /// peer and reject `Some(_)`.
    pub fn send_to(&self, data: &[u8], dest: Option<SocketAddr>) -> Result<()> {
        match (self, dest) {
            (Link::Udp(udp), dest) => udp.send_to(data, dest),
            (link, None) => link.write(data),
            (link, Some(addr)) => Err(Error::Config(format!(
                "explicit destination {} not supported by {} transport",
                addr,
                link.kind()
            ))),
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            Link::Loopback(t) => t,
            #[cfg(feature = "serial")]
            Link::Serial(t) => t,
            Link::Udp(t) => t,
            Link::Tcp(t) => t,
        }
    }
}

impl Transport for Link {
    fn buffer(&self) -> &ReceiveBuffer {
        self.inner().buffer()
    }

    fn delimiter(&self) -> &[u8] {
        self.inner().delimiter()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.inner().write(data)
    }

    fn close(&self) -> Result<()> {
        self.inner().close()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}

fn missing_section(kind: TransportKind) -> Error {
    Error::Config(format!("missing [{}] section for {} link", kind, kind))
}

#[cfg(feature = "serial")]
fn open_serial(config: &LinkConfig, delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Link> {
    let serial = config
        .serial
        .as_ref()
        .ok_or_else(|| missing_section(TransportKind::Serial))?;
    Ok(Link::Serial(SerialTransport::open(serial, delimiter, sink)?))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_config: &LinkConfig, _delimiter: Vec<u8>, _sink: Option<Sink>) -> Result<Link> {
    Err(Error::Config(
        "serial support not available (built without the `serial` feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("loop".parse::<TransportKind>().unwrap(), TransportKind::Loopback);
        assert_eq!("LoopBack".parse::<TransportKind>().unwrap(), TransportKind::Loopback);
        assert_eq!("UDP".parse::<TransportKind>().unwrap(), TransportKind::Udp);
        assert_eq!(TransportKind::Tcp.to_string(), "tcp");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let config = LinkConfig {
            kind: "carrier-pigeon".to_string(),
            ..LinkConfig::loopback()
        };
        match Link::open(&config, None) {
            Err(Error::UnsupportedKind(kind)) => assert_eq!(kind, "carrier-pigeon"),
            other => panic!("expected UnsupportedKind, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_section_rejected() {
        let config = LinkConfig {
            kind: "udp".to_string(),
            ..LinkConfig::loopback()
        };
        assert!(matches!(Link::open(&config, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_loopback_delegates() {
        let link = Link::open(&LinkConfig::loopback().with_delimiter(";"), None).unwrap();
        assert_eq!(link.kind(), TransportKind::Loopback);

        link.write_text("a").unwrap();
        link.send_to(b"b;", None).unwrap();
        assert_eq!(link.read_line(), b"a;");
        assert_eq!(link.read_line(), b"b;");

        let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(matches!(link.send_to(b"x", Some(dest)), Err(Error::Config(_))));
    }
}
