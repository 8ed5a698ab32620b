//! Port abstraction layer.
//!
//! A [`StreamPort`] wraps an already-open byte-stream pair: a [`Reader`]
//! pushes inbound data to a replaceable [`Listener`] from a background
//! thread, and a [`Writer`] performs bounded-wait writes on the caller's
//! thread. Transports plug in through [`InputStream`] and [`OutputStream`].

pub mod async_port;
pub mod error;
pub mod pipe;
pub mod reader;
pub mod serial;
pub mod socket;
pub mod stream_port;
pub mod traits;
pub mod writer;

pub use async_port::{AsyncStreamPort, ChannelListener};
pub use error::PortError;
pub use pipe::{pipe, pipe_with_capacity, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub use reader::{Reader, ReaderState, StopReason, DEFAULT_BUFFER_SIZE};
pub use serial::{available_devices, open_serial, SerialInput, SerialOutput};
pub use stream_port::{PortSettings, StreamPort, DEFAULT_WRITE_TIMEOUT};
pub use traits::*;
pub use writer::Writer;
