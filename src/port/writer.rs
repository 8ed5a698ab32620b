//! Bounded-wait writer unit.
//!
//! There is no background thread: `write` and `drain` run on the caller
//! and block for at most the configured timeout. The timeout bounds each
//! call as a whole. A write that only got part of the buffer through before
//! the deadline reports the partial count. A write that got nothing through
//! fails with `PortError::Timeout`.

use super::error::PortError;
use super::traits::OutputStream;
use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Owns one output stream.
pub struct Writer {
    name: String,
    stream: Mutex<Option<Arc<dyn OutputStream>>>,
    timeout: Mutex<Option<Duration>>,
}

impl Writer {
    /// Wrap `stream`. Writes block without bound until `set_timeout` is called.
    pub fn new(name: impl Into<String>, stream: Arc<dyn OutputStream>) -> Self {
        Self {
            name: name.into(),
            stream: Mutex::new(Some(stream)),
            timeout: Mutex::new(None),
        }
    }

    /// Bound every subsequent `write` and `drain` call by `timeout`.
    ///
    /// Configure this before the writer is shared.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = Some(timeout);
    }

    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.stream.lock().is_none()
    }

    fn current_stream(&self) -> Option<Arc<dyn OutputStream>> {
        self.stream.lock().clone()
    }

    /// Write as much of `data` as the transport accepts before the deadline.
    ///
    /// Returns the number of bytes accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        let timeout = self.timeout();
        self.write_until(data, timeout.map(|t| Instant::now() + t), timeout)
    }

    /// Like [`write`](Self::write), but never waits past `deadline` even
    /// when the write timeout would allow it.
    pub fn write_before(&self, data: &[u8], deadline: Instant) -> Result<usize, PortError> {
        let now = Instant::now();
        match self.timeout() {
            Some(timeout) if now + timeout < deadline => {
                self.write_until(data, Some(now + timeout), Some(timeout))
            }
            _ => self.write_until(
                data,
                Some(deadline),
                Some(deadline.saturating_duration_since(now)),
            ),
        }
    }

    fn write_until(
        &self,
        data: &[u8],
        deadline: Option<Instant>,
        bound: Option<Duration>,
    ) -> Result<usize, PortError> {
        let stream = self.current_stream().ok_or(PortError::Closed)?;
        if data.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut failure = None;

        while written < data.len() {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match stream.write(&data[written..], remaining) {
                Ok(0) => {
                    failure = Some(io::Error::from(ErrorKind::WriteZero));
                    break;
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if written > 0 {
            if written < data.len() {
                debug!(port = %self.name, written, requested = data.len(), "Partial write");
            }
            return Ok(written);
        }

        match failure {
            Some(e) => Err(self.convert(e)),
            None => Err(PortError::timeout(bound.unwrap_or_default())),
        }
    }

    /// Wait for everything written so far to leave the transport.
    ///
    /// Returns `false` on timeout, I/O error, or when closed.
    pub fn drain(&self) -> bool {
        let Some(stream) = self.current_stream() else {
            return false;
        };

        match stream.drain(self.timeout()) {
            Ok(()) => true,
            Err(e) => {
                debug!(port = %self.name, error = %e, "Drain failed");
                false
            }
        }
    }

    /// Release the output stream. Idempotent.
    ///
    /// A `write` running concurrently on another thread fails promptly
    /// because the handle itself is closed.
    pub fn close(&self) {
        let stream = self.stream.lock().take();
        if let Some(stream) = stream {
            if let Err(e) = stream.close() {
                warn!(port = %self.name, error = %e, "Error closing output stream");
            }
            debug!(port = %self.name, "Writer closed");
        }
    }

    fn convert(&self, error: io::Error) -> PortError {
        if self.is_closed() {
            PortError::Closed
        } else {
            PortError::Io(error)
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("name", &self.name)
            .field("timeout", &self.timeout())
            .field("closed", &self.is_closed())
            .finish()
    }
}
