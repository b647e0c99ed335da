//! TCP transport, client or server role
//!
//! # Connection Lifecycle
//!
//! ```text
//! server: bind ──▶ accept exactly one client ──▶ drop listener ──▶ stream
//! client: resolve ──▶ connect (bounded) ──────────────────────────▶ stream
//! ```
//!
//! Construction returns once the stream exists and the receiver thread is
//! running. A zero-length read means the peer shut its side down: the link
//! moves to [`LinkState::PeerClosed`], buffered bytes stay readable, and
//! reads stop blocking. The running flag itself is only cleared by `close`.
//! Writes are still attempted after that, since a half-closed peer keeps
//! reading; they fail with [`Error::PeerClosed`] once the peer resets.
//!
//! [`Error::PeerClosed`]: crate::error::Error::PeerClosed
//!
//! [`LinkState::PeerClosed`]: crate::buffer::LinkState::PeerClosed

use super::receiver::{Received, ReceiverTask, Source, idle_on_timeout};
use super::{Core, RECV_TIMEOUT, Transport};
use crate::buffer::ReceiveBuffer;
use crate::config::{TcpConfig, TcpRole};
use crate::error::{Error, Result};
use crate::notify::Sink;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Largest chunk taken off the stream per read
const CHUNK_SIZE: usize = 4096;

/// TCP transport over a single connected stream
pub struct TcpTransport {
    core: Core,
    role: TcpRole,
    peer_addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
    /// Clone used only by `close`, so shutdown never waits on a stuck write
    shutdown: Mutex<Option<TcpStream>>,
    receiver: ReceiverTask,
}

impl TcpTransport {
    /// Connect or accept according to `config.role`, then start receiving
    ///
    /// In the server role this blocks until one client connects.
    pub fn open(config: &TcpConfig, delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Self> {
        let core = Core::new("tcp", delimiter, sink)?;
        let addr = format!("{}:{}", config.host, config.port);
        let stream = match config.role {
            TcpRole::Server => accept_one(&addr)?,
            TcpRole::Client => {
                connect(&addr, Duration::from_millis(config.connect_timeout_ms))?
            }
        };

        let peer_addr = stream.peer_addr()?;
        // Timeout is per socket, so it covers the receive clone as well
        stream.set_read_timeout(Some(RECV_TIMEOUT))?;
        let rx_stream = stream.try_clone()?;
        let shutdown = stream.try_clone()?;

        let receiver = ReceiverTask::spawn(
            "tcp-rx",
            StreamSource { stream: rx_stream },
            CHUNK_SIZE,
            core.ingest().clone(),
        )?;

        log::info!("TCP {} connected to {}", config.role, peer_addr);

        Ok(Self {
            core,
            role: config.role,
            peer_addr,
            stream: Mutex::new(Some(stream)),
            shutdown: Mutex::new(Some(shutdown)),
            receiver,
        })
    }

    /// Role this side played when the connection was set up
    pub fn role(&self) -> TcpRole {
        self.role
    }

    /// Address of the connected peer
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Transport for TcpTransport {
    fn buffer(&self) -> &ReceiveBuffer {
        self.core.buffer()
    }

    fn delimiter(&self) -> &[u8] {
        self.core.delimiter()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or(Error::Closed)?;

        match stream.write_all(data) {
            Ok(()) => Ok(()),
            // Shut down under this write by a concurrent close
            Err(_) if !self.core.buffer().is_running() => Err(Error::Closed),
            Err(e)
                if e.kind() == io::ErrorKind::BrokenPipe
                    || e.kind() == io::ErrorKind::ConnectionReset =>
            {
                Err(Error::PeerClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) -> Result<()> {
        self.core.close_with(|| {
            // Wakes the receiver's read and any write stuck on a full send buffer
            if let Some(stream) = self.shutdown.lock().take()
                && let Err(e) = stream.shutdown(Shutdown::Both)
            {
                log::debug!("TCP shutdown: {}", e);
            }
            let joined = self.receiver.join();
            self.stream.lock().take();
            joined
        })
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Bind `addr`, wait for exactly one client, then drop the listener
fn accept_one(addr: &str) -> Result<TcpStream> {
    let listener = TcpListener::bind(addr).map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })?;
    log::info!("TCP server listening on {}, waiting for a client", listener.local_addr()?);

    let (stream, peer) = listener.accept().map_err(|source| Error::Listen {
        addr: addr.to_string(),
        source,
    })?;
    log::info!("TCP client connected: {}", peer);
    Ok(stream)
}

/// Try every resolved address of `addr` within `timeout` each
fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| Error::Address(format!("{}: {}", addr, e)))?
        .collect();

    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no addresses found");
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("Connect to {} failed: {}", candidate, e);
                last_error = e;
            }
        }
    }

    Err(Error::Connect {
        addr: addr.to_string(),
        source: last_error,
    })
}

/// Receive half: bounded reads off the stream
struct StreamSource {
    stream: TcpStream,
}

impl Source for StreamSource {
    fn recv(&mut self, chunk: &mut [u8]) -> io::Result<Received> {
        match self.stream.read(chunk) {
            Ok(0) => Ok(Received::Eof),
            Ok(n) => Ok(Received::Data(n)),
            Err(e)
                if e.kind() == io::ErrorKind::ConnectionReset
                    || e.kind() == io::ErrorKind::ConnectionAborted =>
            {
                Ok(Received::Eof)
            }
            Err(e) => idle_on_timeout(e),
        }
    }
}
