//! Serial transport implementation

use super::receiver::{Received, ReceiverTask, Source, idle_on_timeout};
use super::{Core, Transport};
use crate::buffer::ReceiveBuffer;
use crate::config::SerialConfig;
use crate::error::{Error, Result};
use crate::notify::Sink;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Interval between checks for waiting bytes
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Largest chunk taken off the port per poll
const CHUNK_SIZE: usize = 4096;

/// Port shared by the receiver (reads) and callers (writes); `None` once closed
type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Serial transport for UART communication
pub struct SerialTransport {
    core: Core,
    port_name: String,
    port: SharedPort,
    receiver: ReceiverTask,
}

impl SerialTransport {
    /// Open a serial port and start its receiver thread
    ///
    /// The port is configured 8N1 without flow control.
    pub fn open(config: &SerialConfig, delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Self> {
        let core = Core::new("serial", delimiter, sink)?;
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|source| Error::Device {
                port: config.port.clone(),
                source,
            })?;

        log::info!("Opened serial port: {} at {} baud", config.port, config.baud_rate);
        Self::start(core, port, config.port.clone())
    }

    /// Run the transport over a port the caller already opened and configured
    pub fn from_port(port: Box<dyn SerialPort>, delimiter: Vec<u8>, sink: Option<Sink>) -> Result<Self> {
        let core = Core::new("serial", delimiter, sink)?;
        let port_name = port.name().unwrap_or_else(|| "unnamed".to_string());
        Self::start(core, port, port_name)
    }

    fn start(core: Core, port: Box<dyn SerialPort>, port_name: String) -> Result<Self> {
        let port: SharedPort = Arc::new(Mutex::new(Some(port)));
        let source = PortSource {
            port: Arc::clone(&port),
        };
        let receiver = ReceiverTask::spawn("serial-rx", source, CHUNK_SIZE, core.ingest().clone())?;

        Ok(Self {
            core,
            port_name,
            port,
            receiver,
        })
    }

    /// Port identifier this transport was opened on
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    fn buffer(&self) -> &ReceiveBuffer {
        self.core.buffer()
    }

    fn delimiter(&self) -> &[u8] {
        self.core.delimiter()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(Error::Closed)?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.core.close_with(|| {
            let joined = self.receiver.join();
            if self.port.lock().take().is_some() {
                log::info!("Released serial port: {}", self.port_name);
            }
            joined
        })
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Receive half: polls the port for waiting bytes
struct PortSource {
    port: SharedPort,
}

impl Source for PortSource {
    fn recv(&mut self, chunk: &mut [u8]) -> io::Result<Received> {
        let received = {
            let mut guard = self.port.lock();
            let Some(port) = guard.as_mut() else {
                return Ok(Received::Eof);
            };
            let waiting = port.bytes_to_read().map_err(io::Error::from)? as usize;
            if waiting == 0 {
                Received::Idle
            } else {
                let want = waiting.min(chunk.len());
                match port.read(&mut chunk[..want]) {
                    Ok(n) => Received::Data(n),
                    Err(e) => idle_on_timeout(e)?,
                }
            }
        };

        // Lock is released before sleeping so writers are never starved
        thread::sleep(POLL_INTERVAL);
        Ok(received)
    }
}
