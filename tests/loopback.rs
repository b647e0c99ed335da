//! Read-contract tests over the loopback transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use unitransmit::{Event, Link, LinkConfig, LinkState, ReceiveBuffer, Sink, Transport};

fn loopback() -> Link {
    Link::open(&LinkConfig::loopback(), None).expect("loopback always opens")
}

#[test]
fn test_read_all_returns_exactly_what_was_written() {
    let link = loopback();
    let samples: [&[u8]; 4] = [b"", b"x", b"abc\ndef\n", &[0u8, 255, 10, 13, 10]];

    for sample in samples {
        link.write(sample).unwrap();
        assert_eq!(link.read_all(), sample);
    }
}

#[test]
fn test_read_line_leaves_remainder() {
    let link = loopback();
    link.write(b"abc\ndef").unwrap();

    assert_eq!(link.read_line(), b"abc\n");
    assert_eq!(link.available(), 3);
    assert_eq!(link.read(3), b"def");
}

#[test]
fn test_sequential_reads_under_concurrent_writes() {
    const TOTAL: usize = 20_000;
    let link = Arc::new(loopback());
    let expected: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();

    let writer_link = Arc::clone(&link);
    let payload = expected.clone();
    let writer = thread::spawn(move || {
        let mut offset = 0;
        let mut size = 1;
        while offset < payload.len() {
            let end = (offset + size).min(payload.len());
            writer_link.write(&payload[offset..end]).unwrap();
            offset = end;
            size = size % 97 + 1;
        }
    });

    let mut received = Vec::with_capacity(TOTAL);
    let mut n = 1;
    while received.len() < TOTAL {
        let want = n.min(TOTAL - received.len());
        let chunk = link.read(want);
        assert_eq!(chunk.len(), want);
        received.extend(chunk);
        n = n % 61 + 1;
    }

    writer.join().unwrap();
    assert_eq!(received, expected);
}

#[test]
fn test_close_releases_blocked_read() {
    let link = Arc::new(loopback());
    let reader_link = Arc::clone(&link);

    let reader = thread::spawn(move || {
        let start = Instant::now();
        let data = reader_link.read(1000);
        (data, start.elapsed())
    });

    thread::sleep(Duration::from_millis(100));
    link.close().unwrap();

    let (data, elapsed) = reader.join().unwrap();
    assert!(data.is_empty());
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(link.state(), LinkState::Closed);
}

#[test]
fn test_close_releases_blocked_read_line_with_remainder() {
    let link = Arc::new(loopback());
    link.write(b"no newline yet").unwrap();
    let reader_link = Arc::clone(&link);

    let reader = thread::spawn(move || reader_link.read_line());
    thread::sleep(Duration::from_millis(100));
    link.close().unwrap();

    assert_eq!(reader.join().unwrap(), b"no newline yet");
    assert!(link.read_line().is_empty());
}

#[test]
fn test_read_timeout_returns_short_while_open() {
    let link = loopback();
    link.write(b"ab").unwrap();

    assert_eq!(link.read_timeout(10, Duration::from_millis(50)), b"ab");
    assert_eq!(link.state(), LinkState::Open);
}

#[test]
fn test_sink_sees_every_write_then_close() {
    let calls = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let sink_calls = Arc::clone(&calls);
    let sink_closed = Arc::clone(&closed);
    let sink = Sink::new(move |event: &Event, _buffer: &ReceiveBuffer| {
        match event {
            Event::Received(_) => {
                sink_calls.fetch_add(1, Ordering::SeqCst);
            }
            Event::Closed => {
                sink_closed.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok(())
    });

    let link = Link::open(&LinkConfig::loopback(), Some(sink)).unwrap();
    link.write(b"one").unwrap();
    link.write(b"").unwrap();
    link.write_line(b"two").unwrap();
    link.close().unwrap();
    link.close().unwrap();

    // Empty writes carry no data and produce no event
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_sink_does_not_break_transport() {
    let sink = Sink::new(|_event: &Event, _buffer: &ReceiveBuffer| Err("always fails".into()));
    let link = Link::open(&LinkConfig::loopback(), Some(sink)).unwrap();

    link.write_text("still works").unwrap();
    assert_eq!(link.read_line(), b"still works\n");
    link.close().unwrap();
}
