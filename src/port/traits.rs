//! Core traits for the stream port abstraction.
//!
//! `InputStream` and `OutputStream` take `&self` so one context can close a
//! handle while another is blocked inside `read` or `write` on it. That is
//! the only cancellation mechanism the reader loop relies on.

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// Receives raw inbound data from a port's background reader.
///
/// Called on the reader thread, never concurrently for the same reader.
/// Implementations should return quickly; a slow listener stalls the next
/// read.
pub trait Listener: Send + Sync {
    /// One chunk of received bytes, in read order.
    fn data_received(&self, data: &[u8]);
}

impl<F> Listener for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn data_received(&self, data: &[u8]) {
        self(data)
    }
}

/// The inbound half of an already-open byte stream.
pub trait InputStream: Send + Sync + std::fmt::Debug {
    /// Block until at least one byte is available and copy it into `buffer`.
    ///
    /// Returns `Ok(0)` on end-of-stream.
    fn read(&self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Close the handle. Must cause a concurrent `read` to return promptly,
    /// either with an error or with end-of-stream.
    fn close(&self) -> io::Result<()>;
}

/// The outbound half of an already-open byte stream.
pub trait OutputStream: Send + Sync + std::fmt::Debug {
    /// Write up to `data.len()` bytes, waiting at most `timeout` for the
    /// transport to accept any of them. `None` blocks until space is available.
    ///
    /// Returns the number of bytes accepted, or an error of kind
    /// `TimedOut` when nothing was accepted in time.
    fn write(&self, data: &[u8], timeout: Option<Duration>) -> io::Result<usize>;

    /// Wait until everything previously written has left the transport.
    fn drain(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close the handle. A concurrent `write` or `drain` must fail promptly.
    fn close(&self) -> io::Result<()>;
}

/// Line parameters for a serial-over-USB or rfcomm tty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// How long a single blocking read waits before re-checking for close.
    pub poll_interval: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}
