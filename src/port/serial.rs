//! Serial-over-USB / rfcomm tty backend.
//!
//! Wraps the `serialport` crate. Closing a tty handle does not reliably wake
//! a thread blocked in `read` on it, so the input half reads with a short
//! poll interval and checks its closed flag between polls. Writes are cut
//! into the same slices so a close also interrupts a stalled transmit.

use super::error::PortError;
use super::traits::{InputStream, OutputStream, PortConfiguration};
use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often `drain` re-checks the transmit queue.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Open `path` and split it into input and output halves.
///
/// # Example
/// ```no_run
/// use duplex_port::port::{open_serial, PortConfiguration, PortSettings, StreamPort};
///
/// let (input, output) = open_serial("/dev/ttyUSB0", &PortConfiguration::default())?;
/// let port = StreamPort::open("gps", input, output, PortSettings::default())?;
/// # Ok::<(), duplex_port::PortError>(())
/// ```
pub fn open_serial(
    path: &str,
    config: &PortConfiguration,
) -> Result<(SerialInput, SerialOutput), PortError> {
    let port = serialport::new(path, config.baud_rate)
        .data_bits(config.data_bits.into())
        .flow_control(config.flow_control.into())
        .parity(config.parity.into())
        .stop_bits(config.stop_bits.into())
        .timeout(config.poll_interval)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => PortError::not_found(path),
            serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
            _ => PortError::Serial(e),
        })?;
    let output = port.try_clone()?;

    Ok((
        SerialInput {
            name: path.to_string(),
            port: Mutex::new(port),
            closed: AtomicBool::new(false),
        },
        SerialOutput {
            name: path.to_string(),
            port: Mutex::new(output),
            poll_interval: config.poll_interval,
            closed: AtomicBool::new(false),
        },
    ))
}

/// Names of the serial devices currently present on the system.
pub fn available_devices() -> Result<Vec<String>, PortError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect())
}

/// Length of the next blocking slice, or `None` once `deadline` has passed.
fn next_slice(deadline: Option<Instant>, poll_interval: Duration) -> Option<Duration> {
    match deadline {
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            (!left.is_zero()).then(|| left.min(poll_interval))
        }
        None => Some(poll_interval),
    }
}

fn closed_error(name: &str) -> io::Error {
    io::Error::new(ErrorKind::NotConnected, format!("{name} is closed"))
}

/// Receiving half of a serial device.
pub struct SerialInput {
    name: String,
    port: Mutex<Box<dyn SerialPort>>,
    closed: AtomicBool,
}

impl InputStream for SerialInput {
    fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
        let mut port = self.port.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(closed_error(&self.name));
            }
            match port.read(buffer) {
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                result => return result,
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for SerialInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialInput")
            .field("name", &self.name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Sending half of a serial device.
pub struct SerialOutput {
    name: String,
    port: Mutex<Box<dyn SerialPort>>,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl SerialOutput {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(closed_error(&self.name))
        } else {
            Ok(())
        }
    }
}

impl OutputStream for SerialOutput {
    fn write(&self, data: &[u8], timeout: Option<Duration>) -> io::Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut port = self.port.lock();
        loop {
            self.check_open()?;
            let Some(slice) = next_slice(deadline, self.poll_interval) else {
                return Err(io::Error::new(ErrorKind::TimedOut, "transmit queue full"));
            };
            port.set_timeout(slice)?;
            match port.write(data) {
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                result => return result,
            }
        }
    }

    fn drain(&self, timeout: Option<Duration>) -> io::Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut port = self.port.lock();
        loop {
            self.check_open()?;
            if port.bytes_to_write()? == 0 {
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(io::Error::new(ErrorKind::TimedOut, "transmit queue not empty"));
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }
        port.flush()
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for SerialOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialOutput")
            .field("name", &self.name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
