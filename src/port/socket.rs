//! Stream traits for connected sockets.
//!
//! Split a socket with `try_clone()` and attach both handles:
//!
//! ```no_run
//! use duplex_port::port::{PortSettings, StreamPort};
//! use std::net::TcpStream;
//!
//! let stream = TcpStream::connect("127.0.0.1:4353")?;
//! let port = StreamPort::open("kobo", stream.try_clone()?, stream, PortSettings::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Closing the input half shuts down the read direction, which wakes a
//! thread blocked in `recv`. Sockets have no transmit confirmation, so
//! `drain` only flushes.

use super::traits::{InputStream, OutputStream};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A shutdown on an already disconnected socket is not a failure.
fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// Socket write timeouts cannot be zero.
fn socket_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.map(|t| t.max(Duration::from_millis(1)))
}

macro_rules! impl_socket_stream {
    ($socket:ty) => {
        impl InputStream for $socket {
            fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
                Read::read(&mut &*self, buffer)
            }

            fn close(&self) -> io::Result<()> {
                ignore_not_connected(self.shutdown(Shutdown::Read))
            }
        }

        impl OutputStream for $socket {
            fn write(&self, data: &[u8], timeout: Option<Duration>) -> io::Result<usize> {
                self.set_write_timeout(socket_timeout(timeout))?;
                match Write::write(&mut &*self, data) {
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        Err(io::Error::new(ErrorKind::TimedOut, e))
                    }
                    result => result,
                }
            }

            fn drain(&self, _timeout: Option<Duration>) -> io::Result<()> {
                Write::flush(&mut &*self)
            }

            fn close(&self) -> io::Result<()> {
                ignore_not_connected(self.shutdown(Shutdown::Write))
            }
        }
    };
}

impl_socket_stream!(TcpStream);

#[cfg(unix)]
impl_socket_stream!(UnixStream);
