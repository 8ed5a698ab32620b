//! In-memory bounded byte pipe.
//!
//! `pipe()` returns a connected `PipeReader`/`PipeWriter` pair that behaves
//! like a real transport: reads block until data arrives, writes block while
//! the buffer is full, and closing either end wakes the other. Attaching both
//! ends of one pipe to a single port gives a loopback.
//!
//! # Example
//! ```
//! use duplex_port::port::{pipe, InputStream, OutputStream};
//!
//! let (reader, writer) = pipe();
//! writer.write(b"hello", None).unwrap();
//!
//! let mut buffer = [0u8; 16];
//! let n = reader.read(&mut buffer).unwrap();
//! assert_eq!(&buffer[..n], b"hello");
//! ```

use super::traits::{InputStream, OutputStream};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Buffer size used by `pipe()`.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug)]
struct PipeState {
    buffer: VecDeque<u8>,
    capacity: usize,
    reader_closed: bool,
    writer_closed: bool,
    /// Failure handed to the next `read` call instead of data.
    injected_error: Option<ErrorKind>,
    bytes_written: u64,
    bytes_read: u64,
}

#[derive(Debug)]
struct PipeShared {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
}

impl PipeShared {
    fn wake_all(&self) {
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// Create a connected pipe with the default capacity.
pub fn pipe() -> (PipeReader, PipeWriter) {
    pipe_with_capacity(DEFAULT_PIPE_CAPACITY)
}

/// Create a connected pipe that holds at most `capacity` unread bytes.
pub fn pipe_with_capacity(capacity: usize) -> (PipeReader, PipeWriter) {
    let capacity = capacity.max(1);
    let shared = Arc::new(PipeShared {
        state: Mutex::new(PipeState {
            buffer: VecDeque::with_capacity(capacity.min(DEFAULT_PIPE_CAPACITY)),
            capacity,
            reader_closed: false,
            writer_closed: false,
            injected_error: None,
            bytes_written: 0,
            bytes_read: 0,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });

    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

/// Block on `condvar` until notified or `deadline` passes.
fn wait(
    condvar: &Condvar,
    state: &mut MutexGuard<'_, PipeState>,
    deadline: Option<Instant>,
) -> io::Result<()> {
    match deadline {
        None => {
            condvar.wait(state);
            Ok(())
        }
        Some(deadline) => {
            if Instant::now() >= deadline {
                return Err(io::Error::new(ErrorKind::TimedOut, "pipe operation timed out"));
            }
            condvar.wait_until(state, deadline);
            Ok(())
        }
    }
}

/// Receiving end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<PipeShared>,
}

impl PipeReader {
    /// Number of bytes buffered and not yet read.
    pub fn available(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Total number of bytes handed out by `read` so far.
    pub fn bytes_read(&self) -> u64 {
        self.shared.state.lock().bytes_read
    }

    /// Whether the writing end has been closed or dropped.
    pub fn is_writer_closed(&self) -> bool {
        self.shared.state.lock().writer_closed
    }
}

impl InputStream for PipeReader {
    fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock();
        loop {
            if state.reader_closed {
                return Err(io::Error::new(
                    ErrorKind::ConnectionAborted,
                    "pipe reader closed",
                ));
            }
            if let Some(kind) = state.injected_error.take() {
                return Err(io::Error::new(kind, "injected read failure"));
            }
            if !state.buffer.is_empty() {
                let n = buffer.len().min(state.buffer.len());
                for (slot, byte) in buffer.iter_mut().zip(state.buffer.drain(..n)) {
                    *slot = byte;
                }
                state.bytes_read += n as u64;
                self.shared.writable.notify_all();
                return Ok(n);
            }
            if state.writer_closed {
                return Ok(0);
            }
            self.shared.readable.wait(&mut state);
        }
    }

    fn close(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.reader_closed = true;
        self.shared.wake_all();
        Ok(())
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let _ = InputStream::close(self);
    }
}

/// Sending end of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<PipeShared>,
}

impl PipeWriter {
    /// Number of bytes written but not yet read by the other end.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Total number of bytes accepted by `write` so far.
    pub fn bytes_written(&self) -> u64 {
        self.shared.state.lock().bytes_written
    }

    /// Make the reader's next `read` fail with `kind`, as a broken transport would.
    pub fn inject_read_error(&self, kind: ErrorKind) {
        let mut state = self.shared.state.lock();
        state.injected_error = Some(kind);
        self.shared.readable.notify_all();
    }

    /// Whether the reading end has been closed or dropped.
    pub fn is_reader_closed(&self) -> bool {
        self.shared.state.lock().reader_closed
    }
}

impl OutputStream for PipeWriter {
    fn write(&self, data: &[u8], timeout: Option<Duration>) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock();
        loop {
            if state.writer_closed {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "pipe writer closed"));
            }
            if state.reader_closed {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "pipe reader closed"));
            }
            let space = state.capacity.saturating_sub(state.buffer.len());
            if space > 0 {
                let n = space.min(data.len());
                state.buffer.extend(&data[..n]);
                state.bytes_written += n as u64;
                self.shared.readable.notify_all();
                return Ok(n);
            }
            wait(&self.shared.writable, &mut state, deadline)?;
        }
    }

    fn drain(&self, timeout: Option<Duration>) -> io::Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock();
        loop {
            if state.writer_closed {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "pipe writer closed"));
            }
            if state.buffer.is_empty() {
                return Ok(());
            }
            if state.reader_closed {
                return Err(io::Error::new(
                    ErrorKind::BrokenPipe,
                    "pipe reader closed with unread data",
                ));
            }
            wait(&self.shared.writable, &mut state, deadline)?;
        }
    }

    fn close(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.writer_closed = true;
        self.shared.wake_all();
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = OutputStream::close(self);
    }
}
