//! Background reader unit.
//!
//! A `Reader` owns the inbound half of a stream and runs one dedicated
//! thread that blocks in `read` and hands each chunk to the installed
//! listener. Closing clears the stream slot first, then closes the handle
//! to unblock the pending read, then joins the thread. Once `close`
//! returns no further callback can fire.
//!
//! The slot is consulted again after every read returns. An empty slot
//! means this side initiated the close, so the resulting read error is
//! expected and is not reported.

use super::error::PortError;
use super::traits::{InputStream, Listener};
use parking_lot::{Condvar, Mutex, RwLock};
use std::io::ErrorKind;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error};

/// Chunk size for each blocking read.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Lifecycle of a reader. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// The background loop is reading and delivering.
    Running,
    /// `close()` has been requested and the loop is being torn down.
    Closing,
    /// Terminal. No further reads or deliveries.
    Stopped,
}

/// Why a reader's loop exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The remote end finished the stream.
    EndOfStream,
    /// The reader was closed locally.
    Closed,
    /// The transport failed while the stream was live.
    Failed(String),
}

#[derive(Debug)]
struct Status {
    state: ReaderState,
    reason: Option<StopReason>,
}

struct ReaderShared {
    name: String,
    stream: Mutex<Option<Arc<dyn InputStream>>>,
    listener: RwLock<Option<Arc<dyn Listener>>>,
    status: Mutex<Status>,
    stopped: Condvar,
}

impl ReaderShared {
    fn current_stream(&self) -> Option<Arc<dyn InputStream>> {
        self.stream.lock().clone()
    }

    /// Exactly one caller gets the stream back.
    fn take_stream(&self) -> Option<Arc<dyn InputStream>> {
        self.stream.lock().take()
    }

    fn begin_closing(&self) {
        let mut status = self.status.lock();
        if status.state == ReaderState::Running {
            status.state = ReaderState::Closing;
        }
    }

    fn finish(&self, reason: StopReason) {
        debug!(port = %self.name, ?reason, "Reader stopped");
        let mut status = self.status.lock();
        status.state = ReaderState::Stopped;
        status.reason.get_or_insert(reason);
        self.stopped.notify_all();
    }

    fn wait_stopped(&self) {
        let mut status = self.status.lock();
        while status.state != ReaderState::Stopped {
            self.stopped.wait(&mut status);
        }
    }

    fn deliver(&self, data: &[u8]) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.data_received(data);
        }
    }
}

/// Records the stop even when a listener panics and unwinds the loop.
struct StopGuard<'a> {
    shared: &'a ReaderShared,
    reason: Option<StopReason>,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        let reason = self.reason.take().unwrap_or_else(|| {
            error!(port = %self.shared.name, "Listener panicked, reader stopped");
            StopReason::Failed("listener panicked".to_string())
        });
        self.shared.finish(reason);
    }
}

fn run(shared: Arc<ReaderShared>, buffer_size: usize) {
    let mut guard = StopGuard {
        shared: &shared,
        reason: None,
    };
    let mut buffer = vec![0u8; buffer_size];
    let mut stream = shared.current_stream();

    let reason = loop {
        let Some(current) = stream.as_ref() else {
            break StopReason::Closed;
        };

        let n = match current.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => match shared.take_stream() {
                Some(live) => {
                    error!(port = %shared.name, error = %e, "Failed to read from stream");
                    if let Err(close_err) = live.close() {
                        debug!(port = %shared.name, error = %close_err, "Closing failed stream");
                    }
                    break StopReason::Failed(e.to_string());
                }
                None => break StopReason::Closed,
            },
        };

        stream = shared.current_stream();
        if stream.is_none() {
            break StopReason::Closed;
        }
        if n == 0 {
            break StopReason::EndOfStream;
        }

        shared.deliver(&buffer[..n]);
    };

    guard.reason = Some(reason);
}

/// Owns one input stream and the thread that drains it.
pub struct Reader {
    shared: Arc<ReaderShared>,
    thread_id: ThreadId,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reader {
    /// Start reading `stream` on a new thread right away.
    ///
    /// If the thread cannot be spawned the stream is closed and the error
    /// returned.
    pub fn spawn(
        name: impl Into<String>,
        listener: Option<Arc<dyn Listener>>,
        stream: Arc<dyn InputStream>,
        buffer_size: usize,
    ) -> Result<Self, PortError> {
        let name = name.into();
        if buffer_size == 0 {
            let _ = stream.close();
            return Err(PortError::config("read buffer size must be greater than zero"));
        }

        let shared = Arc::new(ReaderShared {
            name: name.clone(),
            stream: Mutex::new(Some(Arc::clone(&stream))),
            listener: RwLock::new(listener),
            status: Mutex::new(Status {
                state: ReaderState::Running,
                reason: None,
            }),
            stopped: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("{name}-reader"))
            .spawn(move || run(worker, buffer_size))
            .map_err(|e| {
                let _ = stream.close();
                PortError::Io(e)
            })?;

        debug!(port = %name, buffer_size, "Reader started");
        Ok(Self {
            shared,
            thread_id: handle.thread().id(),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Diagnostic name of the owning port.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Replace the listener used for subsequent deliveries.
    ///
    /// A delivery already in progress finishes with whichever listener it
    /// started with.
    pub fn set_listener(&self, listener: Option<Arc<dyn Listener>>) {
        *self.shared.listener.write() = listener;
    }

    pub fn state(&self) -> ReaderState {
        self.shared.status.lock().state
    }

    /// `None` while the loop is still running.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.shared.status.lock().reason.clone()
    }

    /// Stop the loop and wait for it to exit. Idempotent.
    ///
    /// Concurrent callers all block until the loop has exited. When called
    /// from the reader thread itself (inside a listener callback) the wait
    /// is skipped; the loop exits once that callback returns.
    pub fn close(&self) {
        if let Some(stream) = self.shared.take_stream() {
            self.shared.begin_closing();
            if let Err(e) = stream.close() {
                debug!(port = %self.shared.name, error = %e, "Error closing input stream");
            }
        }

        if thread::current().id() == self.thread_id {
            return;
        }

        // Only one caller joins; the lock is not held while joining.
        let handle = self.thread.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    debug!(port = %self.shared.name, "Reader thread ended by panic");
                }
            }
            None => self.shared.wait_stopped(),
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}
