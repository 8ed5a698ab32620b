//! Tokio facade over [`StreamPort`].
//!
//! The port's writes and drains block the calling thread for up to the
//! write timeout, so this wrapper moves them onto tokio's blocking pool
//! with `spawn_blocking`. Inbound data can be consumed as a channel through
//! [`ChannelListener`].

use super::error::PortError;
use super::stream_port::StreamPort;
use super::traits::Listener;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::trace;

/// Listener that forwards every received chunk into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Listener for ChannelListener {
    fn data_received(&self, data: &[u8]) {
        if self.sender.send(data.to_vec()).is_err() {
            trace!(len = data.len(), "Receiver dropped, discarding chunk");
        }
    }
}

fn join_error(error: JoinError) -> PortError {
    PortError::Io(io::Error::other(error))
}

/// Cloneable async handle to a shared [`StreamPort`].
#[derive(Debug, Clone)]
pub struct AsyncStreamPort {
    inner: Arc<StreamPort>,
}

impl AsyncStreamPort {
    pub fn new(port: StreamPort) -> Self {
        Self {
            inner: Arc::new(port),
        }
    }

    /// The wrapped port, for the non-blocking parts of its API.
    pub fn port(&self) -> &StreamPort {
        &self.inner
    }

    /// Replace the listener with a channel and return its receiving end.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (listener, receiver) = ChannelListener::new();
        self.inner.set_listener(Arc::new(listener));
        receiver
    }

    pub async fn write(&self, data: impl Into<Vec<u8>>) -> Result<usize, PortError> {
        let port = Arc::clone(&self.inner);
        let data = data.into();
        tokio::task::spawn_blocking(move || port.write(&data))
            .await
            .map_err(join_error)?
    }

    pub async fn full_write(
        &self,
        data: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> Result<(), PortError> {
        let port = Arc::clone(&self.inner);
        let data = data.into();
        tokio::task::spawn_blocking(move || port.full_write(&data, timeout))
            .await
            .map_err(join_error)?
    }

    pub async fn drain(&self) -> bool {
        let port = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || port.drain())
            .await
            .unwrap_or(false)
    }

    /// Close the port and wait until its reader thread has exited.
    pub async fn close(&self) {
        let port = Arc::clone(&self.inner);
        if let Err(e) = tokio::task::spawn_blocking(move || port.close()).await {
            tracing::warn!(error = %e, "Close task failed");
        }
    }
}
