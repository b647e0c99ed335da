//! Notification sink for receive events
//!
//! A transport never runs user code on its receiver thread. Events are posted
//! to a crossbeam channel and a per-transport dispatcher thread hands them to
//! the user handler one at a time, in order. A handler that returns an error
//! or panics is logged and the dispatcher carries on with the next event.
//!
//! ```text
//! receiver thread ──push──▶ ReceiveBuffer
//!        │
//!        └──Event──▶ channel ──▶ dispatcher thread ──▶ RecvHandler
//! ```
//!
//! The handler value is its own context: a closure captures whatever state it
//! needs, or [`Sink::with_context`] pairs a plain callback with an explicit
//! context value.

use crate::buffer::ReceiveBuffer;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Something that happened on a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A chunk of this many bytes was appended to the receive buffer
    Received(usize),
    /// Stream peer ended the connection
    PeerClosed,
    /// Receiver thread stopped on a medium error
    Failed(String),
    /// Transport was closed locally; always the last event
    Closed,
}

/// Result returned by notification handlers
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Observer invoked on the dispatcher thread for every [`Event`]
pub trait RecvHandler: Send + 'static {
    /// Handle one event; `buffer` is the transport's receive buffer
    fn on_event(&mut self, event: &Event, buffer: &ReceiveBuffer) -> HandlerResult;
}

struct FnHandler<F>(F);

impl<F> RecvHandler for FnHandler<F>
where
    F: FnMut(&Event, &ReceiveBuffer) -> HandlerResult + Send + 'static,
{
    fn on_event(&mut self, event: &Event, buffer: &ReceiveBuffer) -> HandlerResult {
        (self.0)(event, buffer)
    }
}

/// User notification handler, handed to a transport at construction
pub struct Sink {
    handler: Box<dyn RecvHandler>,
}

impl Sink {
    /// Wrap a closure
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&Event, &ReceiveBuffer) -> HandlerResult + Send + 'static,
    {
        Self::from_handler(FnHandler(callback))
    }

    /// Wrap any [`RecvHandler`] implementation
    pub fn from_handler<H: RecvHandler>(handler: H) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Pair a callback with a context value it receives by mutable reference
    pub fn with_context<C, F>(mut context: C, mut callback: F) -> Self
    where
        C: Send + 'static,
        F: FnMut(&mut C, &Event, &ReceiveBuffer) -> HandlerResult + Send + 'static,
    {
        Self::new(move |event: &Event, buffer: &ReceiveBuffer| {
            callback(&mut context, event, buffer)
        })
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

/// Start the dispatcher thread for `sink`
///
/// The thread exits after delivering [`Event::Closed`], or when every sender
/// has been dropped.
pub(crate) fn spawn_dispatcher(
    name: &str,
    sink: Sink,
    buffer: Arc<ReceiveBuffer>,
) -> Result<(Sender<Event>, JoinHandle<()>)> {
    let (tx, rx) = unbounded();
    let thread_name = format!("{name}-notify");
    let handle = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || dispatch_loop(rx, sink, buffer))
        .map_err(|e| Error::Other(format!("Failed to spawn {} thread: {}", thread_name, e)))?;
    Ok((tx, handle))
}

fn dispatch_loop(rx: Receiver<Event>, mut sink: Sink, buffer: Arc<ReceiveBuffer>) {
    log::debug!("Notification dispatcher started");

    for event in rx.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            sink.handler.on_event(&event, &buffer)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Notification handler failed on {:?}: {}", event, e),
            Err(_) => log::error!("Notification handler panicked on {:?}", event),
        }

        if event == Event::Closed {
            break;
        }
    }

    log::debug!("Notification dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_events_delivered_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = Sink::new(move |event: &Event, _buffer: &ReceiveBuffer| {
            sink_seen.lock().unwrap().push(event.clone());
            Ok(())
        });

        let (tx, handle) = spawn_dispatcher("test", sink, Arc::new(ReceiveBuffer::new())).unwrap();
        tx.send(Event::Received(3)).unwrap();
        tx.send(Event::PeerClosed).unwrap();
        tx.send(Event::Closed).unwrap();
        handle.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Event::Received(3), Event::PeerClosed, Event::Closed]
        );
    }

    #[test]
    fn test_handler_failures_are_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink_calls = Arc::clone(&calls);
        let sink = Sink::new(move |event: &Event, _buffer: &ReceiveBuffer| {
            let n = sink_calls.fetch_add(1, Ordering::SeqCst);
            match (n, event) {
                (0, _) => Err("handler rejected event".into()),
                (1, _) => panic!("handler blew up"),
                _ => Ok(()),
            }
        });

        let (tx, handle) = spawn_dispatcher("test", sink, Arc::new(ReceiveBuffer::new())).unwrap();
        tx.send(Event::Received(1)).unwrap();
        tx.send(Event::Received(1)).unwrap();
        tx.send(Event::Received(1)).unwrap();
        tx.send(Event::Closed).unwrap();

        assert!(handle.join().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_context_sink_sees_buffer() {
        struct Ctx {
            name: &'static str,
            bytes: Vec<u8>,
            done: std::sync::mpsc::Sender<Vec<u8>>,
        }

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let ctx = Ctx {
            name: "ctx",
            bytes: Vec::new(),
            done: done_tx,
        };
        let sink = Sink::with_context(ctx, |ctx: &mut Ctx, event: &Event, buffer: &ReceiveBuffer| {
            match event {
                Event::Received(_) => ctx.bytes.extend(buffer.take_all()),
                Event::Closed => ctx.done.send(std::mem::take(&mut ctx.bytes))?,
                _ => {}
            }
            log::debug!("{} handled {:?}", ctx.name, event);
            Ok(())
        });

        let buffer = Arc::new(ReceiveBuffer::new());
        let (tx, handle) = spawn_dispatcher("test", sink, Arc::clone(&buffer)).unwrap();
        buffer.append(b"payload");
        tx.send(Event::Received(7)).unwrap();
        tx.send(Event::Closed).unwrap();
        handle.join().unwrap();

        assert_eq!(done_rx.recv().unwrap(), b"payload");
    }

    #[test]
    fn test_dispatcher_exits_when_senders_drop() {
        let sink = Sink::new(|_event: &Event, _buffer: &ReceiveBuffer| Ok(()));
        let (tx, handle) = spawn_dispatcher("test", sink, Arc::new(ReceiveBuffer::new())).unwrap();
        drop(tx);
        assert!(handle.join().is_ok());
    }
}
