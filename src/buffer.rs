//! Receive buffer shared between a receiver thread and reading callers
//!
//! Bytes land at the back through [`ReceiveBuffer::append`] and leave from the
//! front through the `take*` family. The running flag and the input-end marker
//! live under the same mutex as the bytes, so a blocked reader re-checks all
//! three together every time the condvar fires.
//!
//! # Blocking Rules
//!
//! | Call | Returns when |
//! |------|--------------|
//! | `take(n)` | `n` bytes buffered, or the buffer stops being live |
//! | `take_timeout(n, t)` | as `take`, or `t` elapsed |
//! | `take_until(d)` | `d` found, or the buffer stops being live |
//! | `take_all()` | immediately |
//!
//! "Live" means the running flag is still set and the receive side has not
//! ended. Once it is not live, every blocking call drains what is left and
//! returns, possibly short or empty.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How the receive side of a transport ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEnd {
    /// Stream peer shut down its side of the connection
    PeerClosed,
    /// Receiver thread hit a medium error it could not recover from
    Failed,
}

/// Observable state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Running, more bytes may arrive
    Open,
    /// Peer ended the stream; only buffered bytes remain
    PeerClosed,
    /// Receiver failed; only buffered bytes remain
    Failed,
    /// Closed locally
    Closed,
}

impl LinkState {
    /// True while reads may still block waiting for new bytes
    pub fn is_open(self) -> bool {
        self == LinkState::Open
    }
}

struct Inner {
    bytes: Vec<u8>,
    running: bool,
    end: Option<InputEnd>,
    /// Total bytes ever removed, lets a waiting scan detect concurrent takes
    consumed: u64,
}

impl Inner {
    fn live(&self) -> bool {
        self.running && self.end.is_none()
    }

    fn state(&self) -> LinkState {
        match (self.running, self.end) {
            (false, _) => LinkState::Closed,
            (true, None) => LinkState::Open,
            (true, Some(InputEnd::PeerClosed)) => LinkState::PeerClosed,
            (true, Some(InputEnd::Failed)) => LinkState::Failed,
        }
    }

    fn drain(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.bytes.len());
        self.consumed += n as u64;
        self.bytes.drain(..n).collect()
    }
}

/// Ordered byte buffer fed by one producer and drained by readers
pub struct ReceiveBuffer {
    inner: Mutex<Inner>,
    arrived: Condvar,
}

impl ReceiveBuffer {
    /// Create an empty, running buffer
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                bytes: Vec::new(),
                running: true,
                end: None,
                consumed: 0,
            }),
            arrived: Condvar::new(),
        }
    }

    /// Append a chunk and wake blocked readers
    ///
    /// Returns false (and drops the chunk) once the buffer has been closed.
    pub fn append(&self, chunk: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        if !inner.running {
            return false;
        }
        if chunk.is_empty() {
            return true;
        }
        inner.bytes.extend_from_slice(chunk);
        drop(inner);
        self.arrived.notify_all();
        true
    }

    /// Remove exactly `n` bytes, blocking until they are available
    ///
    /// Returns fewer than `n` bytes only when the buffer is no longer live.
    pub fn take(&self, n: usize) -> Vec<u8> {
        self.take_before(n, None)
    }

    /// Like [`take`](Self::take) but gives up after `timeout`
    pub fn take_timeout(&self, n: usize, timeout: Duration) -> Vec<u8> {
        self.take_before(n, Instant::now().checked_add(timeout))
    }

    fn take_before(&self, n: usize, deadline: Option<Instant>) -> Vec<u8> {
        let mut inner = self.inner.lock();
        while inner.bytes.len() < n && inner.live() {
            if !self.wait(&mut inner, deadline) {
                break;
            }
        }
        inner.drain(n)
    }

    /// Remove everything currently buffered without blocking
    pub fn take_all(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        let len = inner.bytes.len();
        inner.drain(len)
    }

    /// Remove bytes up to and including the first `delimiter`
    ///
    /// Blocks until the delimiter shows up. If the buffer stops being live
    /// first, returns whatever is left (without a delimiter).
    pub fn take_until(&self, delimiter: &[u8]) -> Vec<u8> {
        if delimiter.is_empty() {
            return Vec::new();
        }

        let mut inner = self.inner.lock();
        let mut scanned = 0;
        loop {
            if let Some(pos) = find(&inner.bytes, delimiter, scanned) {
                return inner.drain(pos + delimiter.len());
            }
            if !inner.live() {
                let len = inner.bytes.len();
                return inner.drain(len);
            }

            // A delimiter may straddle the current tail and the next append
            scanned = inner.bytes.len().saturating_sub(delimiter.len() - 1);
            let consumed = inner.consumed;
            self.arrived.wait(&mut inner);
            if inner.consumed != consumed {
                scanned = 0;
            }
        }
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.inner.lock().bytes.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True until [`close`](Self::close) is called
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Current transport state as seen by readers
    pub fn state(&self) -> LinkState {
        self.inner.lock().state()
    }

    /// Clear the running flag and release every blocked reader
    ///
    /// Returns true only for the call that actually flipped the flag.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.running {
            return false;
        }
        inner.running = false;
        drop(inner);
        self.arrived.notify_all();
        true
    }

    /// Record that no more bytes will arrive from the medium
    ///
    /// Only the first end is kept, and nothing is recorded after close.
    /// Returns true if this call recorded it.
    pub fn finish(&self, end: InputEnd) -> bool {
        let mut inner = self.inner.lock();
        if !inner.running || inner.end.is_some() {
            return false;
        }
        inner.end = Some(end);
        drop(inner);
        self.arrived.notify_all();
        true
    }

    /// Returns false once the deadline has passed
    fn wait(&self, inner: &mut MutexGuard<'_, Inner>, deadline: Option<Instant>) -> bool {
        match deadline {
            None => {
                self.arrived.wait(inner);
                true
            }
            Some(deadline) => !self.arrived.wait_until(inner, deadline).timed_out(),
        }
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
