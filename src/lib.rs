//! unitransmit - one byte-stream interface over loopback, serial, UDP and TCP
//!
//! Every transport exposes the same blocking, line-oriented read contract on
//! top of its own receive buffer. Packet media (UDP) and stream media (TCP,
//! serial, loopback) look the same to the reader: bytes in arrival order, no
//! datagram boundaries.
//!
//! ```no_run
//! use unitransmit::{Link, LinkConfig, Transport};
//!
//! let link = Link::open(&LinkConfig::udp("0.0.0.0:5005", Some("127.0.0.1:5006")), None)?;
//! link.write_text("hello")?;
//! let _reply = link.read_line();
//! link.close()?;
//! # Ok::<(), unitransmit::Error>(())
//! ```
//!
//! ## Features
//!
//! - `serial` (default): serial port transport via the `serialport` crate

pub mod buffer;
pub mod config;
pub mod error;
pub mod link;
pub mod notify;
pub mod transport;

// Re-export commonly used types
pub use buffer::{LinkState, ReceiveBuffer};
pub use config::{AppConfig, LinkConfig, TcpRole};
pub use error::{Error, Result};
pub use link::{Link, TransportKind};
pub use notify::{Event, HandlerResult, RecvHandler, Sink};
pub use transport::Transport;
