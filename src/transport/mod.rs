//! Transport layer: one byte-stream contract over four media
//!
//! Every transport owns a [`ReceiveBuffer`]. Loopback writes straight into
//! it; the serial, UDP and TCP transports run one receiver thread that pulls
//! chunks off the medium. All of them feed the buffer through the same
//! [`Ingest`] path (append, wake readers, post a notification), so the read
//! side behaves identically whatever the medium.

use crate::buffer::{InputEnd, LinkState, ReceiveBuffer};
use crate::error::{Error, Result};
use crate::notify::{self, Event, Sink};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

mod loopback;
mod receiver;
#[cfg(feature = "serial")]
mod serial;
mod tcp;
mod udp;

pub use loopback::LoopbackTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Bounded wait used by socket receive loops so they notice close promptly
pub(crate) const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Uniform byte-stream contract shared by every transport
///
/// All methods take `&self`; a transport can be shared behind an `Arc` and
/// closed from one thread while another is blocked in a read.
pub trait Transport: Send + Sync {
    /// Buffer fed by this transport's receive side
    fn buffer(&self) -> &ReceiveBuffer;

    /// Line delimiter fixed at construction
    fn delimiter(&self) -> &[u8];

    /// Send bytes to the peer unmodified
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Stop the transport and release its medium; idempotent
    fn close(&self) -> Result<()>;

    /// Send `data` followed by the delimiter
    fn write_line(&self, data: &[u8]) -> Result<()> {
        let delimiter = self.delimiter();
        let mut line = Vec::with_capacity(data.len() + delimiter.len());
        line.extend_from_slice(data);
        line.extend_from_slice(delimiter);
        self.write(&line)
    }

    /// Send UTF-8 text as one line
    fn write_text(&self, text: &str) -> Result<()> {
        self.write_line(text.as_bytes())
    }

    /// Block until `n` bytes arrive; short only once the transport has ended
    fn read(&self, n: usize) -> Vec<u8> {
        self.buffer().take(n)
    }

    /// Like [`read`](Self::read) but returns short after `timeout`
    fn read_timeout(&self, n: usize, timeout: Duration) -> Vec<u8> {
        self.buffer().take_timeout(n, timeout)
    }

    /// Drain whatever is buffered without blocking
    fn read_all(&self) -> Vec<u8> {
        self.buffer().take_all()
    }

    /// Block until a full line (delimiter included) is buffered
    ///
    /// Once the transport has ended, returns the remaining bytes instead.
    fn read_line(&self) -> Vec<u8> {
        self.buffer().take_until(self.delimiter())
    }

    /// Number of buffered bytes
    fn available(&self) -> usize {
        self.buffer().len()
    }

    /// Whether reads may still block for new data
    fn state(&self) -> LinkState {
        self.buffer().state()
    }
}

/// The single path every received chunk takes into a transport
#[derive(Clone)]
pub(crate) struct Ingest {
    buffer: Arc<ReceiveBuffer>,
    events: Option<Sender<Event>>,
}

impl Ingest {
    /// Append a chunk and notify; false if the transport is closed
    pub(crate) fn push(&self, chunk: &[u8]) -> bool {
        if !self.buffer.append(chunk) {
            return false;
        }
        if !chunk.is_empty() {
            self.post(Event::Received(chunk.len()));
        }
        true
    }

    /// Record the end of input and notify if it was not already recorded
    pub(crate) fn end(&self, end: InputEnd, event: Event) {
        if self.buffer.finish(end) {
            self.post(event);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.buffer.is_running()
    }

    fn post(&self, event: Event) {
        if let Some(tx) = &self.events
            && tx.send(event).is_err()
        {
            log::debug!("Notification dispatcher already gone");
        }
    }
}

/// State every transport variant carries regardless of medium
pub(crate) struct Core {
    label: &'static str,
    ingest: Ingest,
    delimiter: Vec<u8>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    dispatcher_thread: Option<ThreadId>,
    /// Held for the whole shutdown sequence
    closing: Mutex<()>,
}

impl Core {
    pub(crate) fn new(label: &'static str, delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(Error::Config("line delimiter must not be empty".to_string()));
        }

        let buffer = Arc::new(ReceiveBuffer::new());
        let (events, dispatcher) = match sink {
            Some(sink) => {
                let (tx, handle) = notify::spawn_dispatcher(label, sink, Arc::clone(&buffer))?;
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        let dispatcher_thread = dispatcher.as_ref().map(|handle| handle.thread().id());

        Ok(Self {
            label,
            ingest: Ingest { buffer, events },
            delimiter,
            dispatcher: Mutex::new(dispatcher),
            dispatcher_thread,
            closing: Mutex::new(()),
        })
    }

    pub(crate) fn buffer(&self) -> &ReceiveBuffer {
        &self.ingest.buffer
    }

    pub(crate) fn ingest(&self) -> &Ingest {
        &self.ingest
    }

    pub(crate) fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    /// Run the shutdown sequence once
    ///
    /// Clears the running flag (waking readers), runs `release` to stop the
    /// receiver and drop the medium, then delivers `Closed` and joins the
    /// dispatcher. A caller racing the first close waits until that close
    /// has finished; calls after it return immediately.
    pub(crate) fn close_with<F>(&self, release: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        // A handler cannot wait on a close that is joining its own thread
        let _closing = if self.dispatcher_thread == Some(thread::current().id()) {
            match self.closing.try_lock() {
                Some(guard) => guard,
                None => return Ok(()),
            }
        } else {
            self.closing.lock()
        };

        if !self.ingest.buffer.close() {
            return Ok(());
        }
        log::info!("Closing {} transport", self.label);

        let released = release();
        self.ingest.post(Event::Closed);
        self.join_dispatcher()?;

        log::info!("{} transport closed", self.label);
        released
    }

    fn join_dispatcher(&self) -> Result<()> {
        let Some(handle) = self.dispatcher.lock().take() else {
            return Ok(());
        };
        // Closing from inside a handler: the dispatcher stops on its own
        if handle.thread().id() == thread::current().id() {
            return Ok(());
        }
        handle.join().map_err(|_| Error::ThreadPanic)
    }
}

/// Resolve `host:port` to the first socket address
pub(crate) fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| Error::Address(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| Error::Address(format!("{}: no addresses found", addr)))
}
