//! The duplex port.
//!
//! A `StreamPort` owns at most one `Reader` and one `Writer`, both bound to
//! the same connection. Every change to the installed units goes through a
//! single port-level lock. `close()` takes each unit out of its slot, so
//! concurrent closers cannot both get the same unit, and then shuts it down
//! with the lock released. A listener can therefore call back into the
//! port without deadlocking.

use super::error::PortError;
use super::reader::{Reader, ReaderState, StopReason, DEFAULT_BUFFER_SIZE};
use super::traits::{InputStream, Listener, OutputStream};
use super::writer::Writer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Write timeout installed on every writer unless configured otherwise.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Settings applied to each reader/writer pair a port installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Bound for each `write`/`drain` call. `None` blocks.
    pub write_timeout: Option<Duration>,
    /// Size of the buffer handed to each blocking read.
    pub read_buffer_size: usize,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            read_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Default)]
struct Units {
    listener: Option<Arc<dyn Listener>>,
    reader: Option<Arc<Reader>>,
    /// Readers taken by `close()` whose thread may not have exited yet.
    retiring: Vec<Arc<Reader>>,
    writer: Option<Arc<Writer>>,
}

/// A listener-driven duplex port over one byte-stream connection.
///
/// # Example
/// ```
/// use duplex_port::port::{pipe, StreamPort};
/// use std::sync::{mpsc, Arc};
/// use std::time::Duration;
///
/// let (input, output) = pipe();
/// let port = StreamPort::new("loopback");
/// let (tx, rx) = mpsc::channel();
/// port.set_listener(Arc::new(move |data: &[u8]| {
///     let _ = tx.send(data.to_vec());
/// }));
/// port.attach(input, output)?;
///
/// port.write(b"ping")?;
/// assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), b"ping");
///
/// port.close();
/// assert!(port.write(b"late").is_err());
/// # Ok::<(), duplex_port::PortError>(())
/// ```
pub struct StreamPort {
    name: String,
    settings: PortSettings,
    units: Mutex<Units>,
}

impl StreamPort {
    /// Create an unattached port with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, PortSettings::default())
    }

    /// Create an unattached port.
    pub fn with_settings(name: impl Into<String>, settings: PortSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            units: Mutex::new(Units::default()),
        }
    }

    /// Create a port and attach `input`/`output` in one step.
    pub fn open<I, O>(
        name: impl Into<String>,
        input: I,
        output: O,
        settings: PortSettings,
    ) -> Result<Self, PortError>
    where
        I: InputStream + 'static,
        O: OutputStream + 'static,
    {
        let port = Self::with_settings(name, settings);
        port.attach(input, output)?;
        Ok(port)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    /// Install a reader and writer for an already-open stream pair.
    ///
    /// The reader starts immediately and delivers to the current listener.
    /// Fails with `AlreadyAttached` while a pair is installed; in that case
    /// the given streams are closed. After `close()` the port can be
    /// attached again.
    pub fn attach<I, O>(&self, input: I, output: O) -> Result<(), PortError>
    where
        I: InputStream + 'static,
        O: OutputStream + 'static,
    {
        self.attach_shared(Arc::new(input), Arc::new(output))
    }

    /// Like [`attach`](Self::attach), for streams that are already shared.
    pub fn attach_shared(
        &self,
        input: Arc<dyn InputStream>,
        output: Arc<dyn OutputStream>,
    ) -> Result<(), PortError> {
        let mut units = self.units.lock();
        if units.reader.is_some() || units.writer.is_some() {
            drop(units);
            warn!(port = %self.name, "Rejecting attach, a stream pair is already installed");
            let _ = input.close();
            let _ = output.close();
            return Err(PortError::AlreadyAttached);
        }

        let reader = match Reader::spawn(
            self.name.as_str(),
            units.listener.clone(),
            input,
            self.settings.read_buffer_size,
        ) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = output.close();
                return Err(e);
            }
        };

        let writer = Writer::new(self.name.as_str(), output);
        if let Some(timeout) = self.settings.write_timeout {
            writer.set_timeout(timeout);
        }

        units.reader = Some(Arc::new(reader));
        units.writer = Some(Arc::new(writer));
        debug!(port = %self.name, "Streams attached");
        Ok(())
    }

    /// Install `listener` for all subsequent deliveries.
    pub fn set_listener(&self, listener: Arc<dyn Listener>) {
        self.replace_listener(Some(listener));
    }

    /// Drop the current listener. Received data is discarded until a new
    /// one is installed.
    pub fn clear_listener(&self) {
        self.replace_listener(None);
    }

    fn replace_listener(&self, listener: Option<Arc<dyn Listener>>) {
        let mut units = self.units.lock();
        if let Some(reader) = units.reader.as_ref() {
            reader.set_listener(listener.clone());
        }
        units.listener = listener;
    }

    fn writer(&self) -> Option<Arc<Writer>> {
        self.units.lock().writer.clone()
    }

    /// Write through the installed writer.
    ///
    /// Returns the number of bytes accepted. Fails with `NotAttached` when
    /// no writer is installed, or `Timeout` when the transport accepted
    /// nothing within the write timeout.
    pub fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        let writer = self.writer().ok_or(PortError::NotAttached)?;
        writer.write(data)
    }

    pub fn write_str(&self, s: &str) -> Result<usize, PortError> {
        self.write(s.as_bytes())
    }

    /// Write all of `data`, retrying partial writes until `timeout` passes.
    ///
    /// `timeout` bounds the whole call. Each attempt waits for the shorter
    /// of the write timeout and the time left.
    pub fn full_write(&self, data: &[u8], timeout: Duration) -> Result<(), PortError> {
        let writer = self.writer().ok_or(PortError::NotAttached)?;
        let deadline = Instant::now() + timeout;
        let mut remaining = data;

        while !remaining.is_empty() {
            if Instant::now() >= deadline {
                return Err(PortError::timeout(timeout));
            }
            match writer.write_before(remaining, deadline) {
                Ok(n) => remaining = &remaining[n..],
                Err(PortError::Timeout(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Wait until previously written data has left the transport.
    ///
    /// Returns `false` when not attached, on timeout, or on I/O error.
    pub fn drain(&self) -> bool {
        self.writer().is_some_and(|writer| writer.drain())
    }

    /// Detach and shut down both units. Idempotent and safe to race.
    ///
    /// When this returns, the listener will not be called again for the
    /// detached reader.
    pub fn close(&self) {
        let readers = {
            let mut units = self.units.lock();
            if let Some(reader) = units.reader.take() {
                units.retiring.push(reader);
            }
            units.retiring.clone()
        };
        // Every closer waits on the join, not only the one that took the reader.
        for reader in &readers {
            reader.close();
        }
        if !readers.is_empty() {
            self.units
                .lock()
                .retiring
                .retain(|r| !readers.iter().any(|closed| Arc::ptr_eq(closed, r)));
        }

        let writer = self.units.lock().writer.take();
        if let Some(writer) = writer {
            writer.close();
        }
    }

    /// Whether a reader/writer pair is installed.
    pub fn is_attached(&self) -> bool {
        let units = self.units.lock();
        units.reader.is_some() || units.writer.is_some()
    }

    /// State of the installed reader, if any.
    pub fn reader_state(&self) -> Option<ReaderState> {
        self.units.lock().reader.as_ref().map(|reader| reader.state())
    }

    /// Why the installed reader stopped, if it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.units
            .lock()
            .reader
            .as_ref()
            .and_then(|reader| reader.stop_reason())
    }
}

impl Drop for StreamPort {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.units.lock();
        f.debug_struct("StreamPort")
            .field("name", &self.name)
            .field("reader", &units.reader)
            .field("writer", &units.writer)
            .field("has_listener", &units.listener.is_some())
            .finish()
    }
}
