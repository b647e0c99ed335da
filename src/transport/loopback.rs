//! In-process loopback transport
//!
//! Whatever is written comes straight back on the read side. There is no
//! receiver thread; `write` goes through the same ingestion path the other
//! transports use, which makes this the reference for testing the read
//! contract without real I/O.

use super::{Core, Transport};
use crate::buffer::ReceiveBuffer;
use crate::error::{Error, Result};
use crate::notify::Sink;

/// Loopback transport: `write()` feeds `read()`
pub struct LoopbackTransport {
    core: Core,
}

impl LoopbackTransport {
    /// Create a loopback transport
    pub fn new(delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Self> {
        let core = Core::new("loopback", delimiter, sink)?;
        log::info!("Loopback transport opened");
        Ok(Self { core })
    }
}

impl Transport for LoopbackTransport {
    fn buffer(&self) -> &ReceiveBuffer {
        self.core.buffer()
    }

    fn delimiter(&self) -> &[u8] {
        self.core.delimiter()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        if self.core.ingest().push(data) {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    fn close(&self) -> Result<()> {
        self.core.close_with(|| Ok(()))
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
