//! UDP transport
//!
//! Datagrams are appended to the receive buffer as they arrive, one chunk per
//! datagram. Boundaries are not kept: a line or exact-size read can span
//! several datagrams, and a single datagram can satisfy several reads.
//!
//! Sending needs a destination. It comes from the configured default remote
//! or from an explicit address passed to [`UdpTransport::send_to`].

use super::receiver::{Received, ReceiverTask, Source, idle_on_timeout};
use super::{Core, RECV_TIMEOUT, Transport, resolve};
use crate::buffer::ReceiveBuffer;
use crate::config::UdpConfig;
use crate::error::{Error, Result};
use crate::notify::Sink;
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Maximum UDP datagram size
const MAX_DATAGRAM_SIZE: usize = 65535;

/// UDP transport bound to one local address
pub struct UdpTransport {
    core: Core,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    socket: Mutex<Option<UdpSocket>>,
    receiver: ReceiverTask,
}

impl UdpTransport {
    /// Bind the local address and start the receiver thread
    pub fn open(config: &UdpConfig, delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Self> {
        let core = Core::new("udp", delimiter, sink)?;
        let socket = UdpSocket::bind(&config.local_addr).map_err(|source| Error::Bind {
            addr: config.local_addr.clone(),
            source,
        })?;
        let local_addr = socket.local_addr()?;
        let remote_addr = config.remote_addr.as_deref().map(resolve).transpose()?;

        // Timeout is per socket, so it covers the receive clone as well
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let rx_socket = socket.try_clone()?;

        match remote_addr {
            Some(remote) => log::info!("UDP transport bound to {} (default remote {})", local_addr, remote),
            None => log::info!("UDP transport bound to {} (no default remote)", local_addr),
        }

        let receiver = ReceiverTask::spawn(
            "udp-rx",
            DatagramSource { socket: rx_socket },
            MAX_DATAGRAM_SIZE,
            core.ingest().clone(),
        )?;

        Ok(Self {
            core,
            local_addr,
            remote_addr,
            socket: Mutex::new(Some(socket)),
            receiver,
        })
    }

    /// Address the socket is bound to (resolved, so port 0 shows the real port)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Default destination, if configured
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Send one datagram to `dest`, or to the default remote when `None`
    pub fn send_to(&self, data: &[u8], dest: Option<SocketAddr>) -> Result<()> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(Error::Closed)?;
        let target = dest
            .or(self.remote_addr)
            .ok_or_else(|| Error::Address("UDP remote address not set".to_string()))?;

        socket.send_to(data, target)?;
        log::trace!("Sent {} bytes to {}", data.len(), target);
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn buffer(&self) -> &ReceiveBuffer {
        self.core.buffer()
    }

    fn delimiter(&self) -> &[u8] {
        self.core.delimiter()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.send_to(data, None)
    }

    fn close(&self) -> Result<()> {
        self.core.close_with(|| {
            let joined = self.receiver.join();
            self.socket.lock().take();
            joined
        })
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Receive half: one datagram per call
struct DatagramSource {
    socket: UdpSocket,
}

impl Source for DatagramSource {
    fn recv(&mut self, chunk: &mut [u8]) -> io::Result<Received> {
        match self.socket.recv_from(chunk) {
            Ok((n, from)) => {
                log::trace!("Datagram of {} bytes from {}", n, from);
                Ok(Received::Data(n))
            }
            // Windows reports an ICMP port-unreachable from an earlier send this way
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(Received::Idle),
            Err(e) => idle_on_timeout(e),
        }
    }
}
