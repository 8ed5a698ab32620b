//! Port lifecycle tests over in-memory pipes.
//!
//! Covers close races, listener replacement, end-of-stream handling and
//! bounded writes without any hardware.

mod common;

use common::{eventually, harness, Recorder};
use duplex_port::port::{
    pipe, pipe_with_capacity, InputStream, Listener, OutputStream, PipeReader, PipeWriter,
    PortError, PortSettings, ReaderState, StopReason, StreamPort,
};
use pretty_assertions::assert_eq;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug)]
struct CountingInput {
    inner: PipeReader,
    closes: Arc<AtomicUsize>,
}

impl InputStream for CountingInput {
    fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buffer)
    }

    fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

#[derive(Debug)]
struct CountingOutput {
    inner: PipeWriter,
    closes: Arc<AtomicUsize>,
}

impl OutputStream for CountingOutput {
    fn write(&self, data: &[u8], timeout: Option<Duration>) -> io::Result<usize> {
        self.inner.write(data, timeout)
    }

    fn drain(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.drain(timeout)
    }

    fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

fn tagged_chunk(seq: u8) -> Vec<u8> {
    let mut chunk = vec![seq; 256];
    chunk[0] = 0xA5;
    chunk
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn test_concurrent_close_closes_each_stream_once() {
    // Arrange
    let input_closes = Arc::new(AtomicUsize::new(0));
    let output_closes = Arc::new(AtomicUsize::new(0));
    let (reader, _feed) = pipe();
    let (_sink, writer) = pipe();
    let port = Arc::new(
        StreamPort::open(
            "race",
            CountingInput {
                inner: reader,
                closes: input_closes.clone(),
            },
            CountingOutput {
                inner: writer,
                closes: output_closes.clone(),
            },
            PortSettings::default(),
        )
        .unwrap(),
    );
    let barrier = Arc::new(Barrier::new(8));

    // Act
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let port = port.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                port.close();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    port.close();

    // Assert
    assert_eq!(input_closes.load(Ordering::SeqCst), 1);
    assert_eq!(output_closes.load(Ordering::SeqCst), 1);
    assert!(!port.is_attached());
    assert_eq!(port.reader_state(), None);
}

#[test]
fn test_no_callback_after_close_returns() {
    // Arrange
    let h = harness("busy", PortSettings::default());
    let recorder = Recorder::new();
    h.port.set_listener(recorder.clone());

    let feed = Arc::new(h.feed);
    let producer = {
        let feed = feed.clone();
        thread::spawn(move || {
            while feed.write(b"0123456789", Some(Duration::from_millis(50))).is_ok() {}
        })
    };
    assert!(recorder.wait_for_chunks(5, Duration::from_secs(2)));

    // Act
    h.port.close();
    recorder.seal();
    thread::sleep(Duration::from_millis(100));

    // Assert
    assert_eq!(recorder.late_deliveries(), 0);
    assert!(feed.is_reader_closed());
    producer.join().unwrap();
}

#[test]
fn test_close_from_listener_does_not_deadlock() {
    // Arrange
    let port = Arc::new(StreamPort::new("self-closing"));
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let weak = Arc::downgrade(&port);
        let calls = calls.clone();
        port.set_listener(Arc::new(move |_data: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(port) = weak.upgrade() {
                port.close();
            }
        }));
    }
    let (input, feed) = pipe();
    let (_sink, output) = pipe();
    port.attach(input, output).unwrap();

    // Act
    feed.write(b"bye", None).unwrap();

    // Assert
    assert!(eventually(|| !port.is_attached()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(eventually(|| feed.is_reader_closed()));
}

#[test]
fn test_close_from_listener_while_external_close_joins() {
    // Arrange
    let port = Arc::new(StreamPort::new("contended"));
    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    {
        let weak = Arc::downgrade(&port);
        port.set_listener(Arc::new(move |_data: &[u8]| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(200));
            if let Some(port) = weak.upgrade() {
                port.close();
            }
        }));
    }
    let (input, feed) = pipe();
    let (_sink, output) = pipe();
    port.attach(input, output).unwrap();
    feed.write(b"trigger", None).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    // Act
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let closer = {
        let port = port.clone();
        thread::spawn(move || {
            port.close();
            let _ = done_tx.send(());
        })
    };

    // Assert
    assert!(
        done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
        "external close never returned"
    );
    closer.join().unwrap();
    assert!(!port.is_attached());
}

#[test]
fn test_port_can_be_reattached_after_close() {
    let h = harness("reuse", PortSettings::default());
    h.port.close();

    let recorder = Recorder::new();
    h.port.set_listener(recorder.clone());
    let (input, feed) = pipe();
    let (_sink, output) = pipe();
    h.port.attach(input, output).unwrap();

    feed.write(b"again", None).unwrap();
    assert!(recorder.wait_for_bytes(5, Duration::from_secs(2)));
    assert_eq!(recorder.chunks().concat(), b"again");
}

#[test]
fn test_attach_while_attached_is_rejected() {
    let h = harness("busy", PortSettings::default());
    let (input, feed) = pipe();
    let (sink, output) = pipe();

    let result = h.port.attach(input, output);

    assert!(matches!(result, Err(PortError::AlreadyAttached)));
    assert!(feed.is_reader_closed());
    assert!(sink.is_writer_closed());
    assert!(h.port.is_attached());
}

// ============================================================================
// Unattached Port
// ============================================================================

#[test]
fn test_unattached_write_and_drain_return_immediately() {
    let port = StreamPort::new("idle");
    let start = Instant::now();

    assert!(matches!(port.write(b"data"), Err(PortError::NotAttached)));
    assert!(matches!(
        port.full_write(b"data", Duration::from_secs(5)),
        Err(PortError::NotAttached)
    ));
    assert!(!port.drain());
    port.close();

    assert!(start.elapsed() < Duration::from_millis(100));
}

// ============================================================================
// Listener Replacement
// ============================================================================

#[test]
fn test_each_chunk_goes_to_exactly_one_listener() {
    // Arrange
    let h = harness("swap", PortSettings::default());
    let first = Recorder::new();
    let second = Recorder::new();
    h.port.set_listener(first.clone());

    let total = 64 * 100;
    let feed = Arc::new(h.feed);
    let producer = {
        let feed = feed.clone();
        thread::spawn(move || {
            for _ in 0..100 {
                feed.write(&[7u8; 64], None).unwrap();
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    // Act
    for i in 0..50 {
        let next: Arc<dyn Listener> = if i % 2 == 0 {
            second.clone()
        } else {
            first.clone()
        };
        h.port.set_listener(next);
        thread::sleep(Duration::from_micros(300));
    }
    producer.join().unwrap();

    // Assert
    assert!(eventually(
        || first.total_bytes() + second.total_bytes() == total
    ));
    h.port.close();
    assert_eq!(first.total_bytes() + second.total_bytes(), total);
}

#[test]
fn test_cleared_listener_drops_data() {
    let h = harness("muted", PortSettings::default());
    let recorder = Recorder::new();
    h.port.set_listener(recorder.clone());
    h.feed.write(b"one", None).unwrap();
    assert!(recorder.wait_for_chunks(1, Duration::from_secs(2)));

    h.port.clear_listener();
    h.feed.write(b"two", None).unwrap();
    assert!(eventually(|| h.feed.pending() == 0));
    thread::sleep(Duration::from_millis(20));

    assert_eq!(recorder.chunks(), vec![b"one".to_vec()]);
    assert_eq!(h.port.reader_state(), Some(ReaderState::Running));
}

// ============================================================================
// Data Flow
// ============================================================================

#[test]
fn test_loopback_preserves_order() {
    // Arrange
    let port = StreamPort::new("loopback");
    let recorder = Recorder::new();
    port.set_listener(recorder.clone());
    let (input, output) = pipe();
    port.attach(input, output).unwrap();

    // Act
    for seq in 0..10u8 {
        assert_eq!(port.write(&tagged_chunk(seq)).unwrap(), 256);
    }

    // Assert
    assert!(recorder.wait_for_bytes(10 * 256, Duration::from_secs(2)));
    let received = recorder.chunks().concat();
    let expected: Vec<u8> = (0..10u8).flat_map(tagged_chunk).collect();
    assert_eq!(received, expected);
    port.close();
}

#[test]
fn test_outbound_bytes_reach_the_stream() {
    let h = harness("tx", PortSettings::default());

    h.port.write_str("$PFLAC,R,ID\r\n").unwrap();

    let mut buffer = [0u8; 64];
    let n = h.sink.read(&mut buffer).unwrap();
    assert_eq!(&buffer[..n], b"$PFLAC,R,ID\r\n");
    assert!(h.port.drain());
}

#[test]
fn test_end_of_stream_stops_reader_cleanly() {
    // Arrange
    let h = harness("eof", PortSettings::default());
    let recorder = Recorder::new();
    h.port.set_listener(recorder.clone());

    // Act
    h.feed.write(b"last words", None).unwrap();
    h.feed.close().unwrap();

    // Assert
    assert!(eventually(
        || h.port.reader_state() == Some(ReaderState::Stopped)
    ));
    assert_eq!(h.port.stop_reason(), Some(StopReason::EndOfStream));
    assert_eq!(recorder.chunks().concat(), b"last words");
    h.port.close();
}

#[test]
fn test_read_error_stops_reader_with_failure() {
    let h = harness("broken", PortSettings::default());

    h.feed.inject_read_error(io::ErrorKind::ConnectionReset);

    assert!(eventually(
        || h.port.reader_state() == Some(ReaderState::Stopped)
    ));
    assert!(matches!(h.port.stop_reason(), Some(StopReason::Failed(_))));
    assert!(h.feed.is_reader_closed());
}

#[test]
fn test_close_during_blocked_read_reports_closed() {
    let h = harness("quiet", PortSettings::default());
    thread::sleep(Duration::from_millis(20));

    h.port.close();

    assert_eq!(h.port.stop_reason(), None);
    assert!(h.feed.is_reader_closed());
}

// ============================================================================
// Write Timeout
// ============================================================================

#[test]
fn test_write_to_full_stream_times_out_within_bound() {
    // Arrange
    let (input, _feed) = pipe();
    let (_sink, output) = pipe_with_capacity(16);
    let settings = PortSettings {
        write_timeout: Some(Duration::from_millis(100)),
        ..PortSettings::default()
    };
    let port = StreamPort::open("stalled", input, output, settings).unwrap();
    assert_eq!(port.write(&[0u8; 16]).unwrap(), 16);

    // Act
    let start = Instant::now();
    let result = port.write(b"more");
    let elapsed = start.elapsed();

    // Assert
    assert!(matches!(result, Err(PortError::Timeout(_))));
    assert!(elapsed >= Duration::from_millis(90));
    assert!(elapsed < Duration::from_secs(1));
    assert!(!port.drain());
}

#[test]
fn test_partial_write_reports_count() {
    let (input, _feed) = pipe();
    let (_sink, output) = pipe_with_capacity(8);
    let settings = PortSettings {
        write_timeout: Some(Duration::from_millis(50)),
        ..PortSettings::default()
    };
    let port = StreamPort::open("partial", input, output, settings).unwrap();

    assert_eq!(port.write(b"0123456789").unwrap(), 8);
}

#[test]
fn test_full_write_deadline_beats_write_timeout() {
    // Arrange
    let (input, _feed) = pipe();
    let (_sink, output) = pipe_with_capacity(4);
    let settings = PortSettings {
        write_timeout: Some(Duration::from_secs(2)),
        ..PortSettings::default()
    };
    let port = StreamPort::open("stalled", input, output, settings).unwrap();

    // Act
    let start = Instant::now();
    let result = port.full_write(b"01234567", Duration::from_millis(200));
    let elapsed = start.elapsed();

    // Assert
    assert!(matches!(result, Err(PortError::Timeout(_))));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

#[test]
fn test_full_write_bounded_without_write_timeout() {
    let (input, _feed) = pipe();
    let (_sink, output) = pipe_with_capacity(4);
    let settings = PortSettings {
        write_timeout: None,
        ..PortSettings::default()
    };
    let port = StreamPort::open("blocking", input, output, settings).unwrap();

    let start = Instant::now();
    let result = port.full_write(b"01234567", Duration::from_millis(100));

    assert!(matches!(result, Err(PortError::Timeout(_))));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_full_write_completes_as_consumer_drains() {
    // Arrange
    let (input, _feed) = pipe();
    let (sink, output) = pipe_with_capacity(32);
    let settings = PortSettings {
        write_timeout: Some(Duration::from_millis(50)),
        ..PortSettings::default()
    };
    let port = StreamPort::open("slow", input, output, settings).unwrap();
    let consumer = thread::spawn(move || {
        let mut received = Vec::new();
        let mut buffer = [0u8; 8];
        while received.len() < 256 {
            match sink.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buffer[..n]),
            }
            thread::sleep(Duration::from_millis(1));
        }
        received
    });
    let payload: Vec<u8> = (0..=255u8).collect();

    // Act
    port.full_write(&payload, Duration::from_secs(5)).unwrap();

    // Assert
    assert_eq!(consumer.join().unwrap(), payload);
}
