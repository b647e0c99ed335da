//! Receiver thread shared by the serial, UDP and TCP transports
//!
//! Each medium only knows how to produce one chunk with a bounded wait
//! ([`Source::recv`]); the loop around it, the running-flag checks and the
//! end-of-input handling live here once.

use super::Ingest;
use crate::buffer::InputEnd;
use crate::error::{Error, Result};
use crate::notify::Event;
use parking_lot::Mutex;
use std::io;
use std::thread::{self, JoinHandle};

/// Outcome of one bounded receive on a medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Received {
    /// This many bytes were written into the chunk
    Data(usize),
    /// Wait elapsed with nothing to read
    Idle,
    /// Peer shut the stream down
    Eof,
}

/// Medium-specific receive half
pub(crate) trait Source: Send + 'static {
    /// Receive into `chunk`, waiting no longer than the medium's poll bound
    fn recv(&mut self, chunk: &mut [u8]) -> io::Result<Received>;
}

/// Map the errors a timed-out blocking read produces onto [`Received::Idle`]
pub(crate) fn idle_on_timeout(e: io::Error) -> io::Result<Received> {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
            Ok(Received::Idle)
        }
        _ => Err(e),
    }
}

/// Handle to a running receiver thread
pub(crate) struct ReceiverTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiverTask {
    /// Start the receive loop for `source`
    pub(crate) fn spawn<S: Source>(
        name: &str,
        source: S,
        chunk_size: usize,
        ingest: Ingest,
    ) -> Result<Self> {
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || receive_loop(&thread_name, source, chunk_size, ingest))
            .map_err(|e| Error::Other(format!("Failed to spawn {} thread: {}", name, e)))?;

        Ok(Self {
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Wait for the loop to exit; the running flag must already be cleared
    pub(crate) fn join(&self) -> Result<()> {
        match self.handle.lock().take() {
            Some(handle) => handle.join().map_err(|_| Error::ThreadPanic),
            None => Ok(()),
        }
    }
}

fn receive_loop<S: Source>(name: &str, mut source: S, chunk_size: usize, ingest: Ingest) {
    log::debug!("{}: receive loop started", name);
    let mut chunk = vec![0u8; chunk_size];

    while ingest.is_running() {
        match source.recv(&mut chunk) {
            Ok(Received::Data(n)) => {
                log::trace!("{}: received {} bytes", name, n);
                ingest.push(&chunk[..n]);
            }
            Ok(Received::Idle) => {}
            Ok(Received::Eof) => {
                // Close shuts the medium down too; only report a peer that left on its own
                if ingest.is_running() {
                    log::info!("{}: peer closed the connection", name);
                    ingest.end(InputEnd::PeerClosed, Event::PeerClosed);
                }
                break;
            }
            Err(e) => {
                if ingest.is_running() {
                    log::error!("{}: receive failed: {}", name, e);
                    ingest.end(InputEnd::Failed, Event::Failed(e.to_string()));
                }
                break;
            }
        }
    }

    log::debug!("{}: receive loop stopped", name);
}
