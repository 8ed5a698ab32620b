//! Shared test utilities for port integration tests.

#![allow(dead_code)]

use duplex_port::port::{pipe, Listener, PipeReader, PipeWriter, PortSettings, StreamPort};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Listener that records every chunk it receives.
#[derive(Default)]
pub struct Recorder {
    chunks: Mutex<Vec<Vec<u8>>>,
    arrived: Condvar,
    /// Set once the test considers the port closed; any later delivery is a bug.
    sealed: AtomicBool,
    late_deliveries: Mutex<usize>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().clone()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.lock().iter().map(Vec::len).sum()
    }

    /// Block until at least `count` chunks arrived or `timeout` passed.
    pub fn wait_for_chunks(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut chunks = self.chunks.lock();
        while chunks.len() < count {
            if self.arrived.wait_until(&mut chunks, deadline).timed_out() {
                return chunks.len() >= count;
            }
        }
        true
    }

    /// Block until at least `bytes` bytes arrived or `timeout` passed.
    pub fn wait_for_bytes(&self, bytes: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut chunks = self.chunks.lock();
        while chunks.iter().map(Vec::len).sum::<usize>() < bytes {
            if self.arrived.wait_until(&mut chunks, deadline).timed_out() {
                return false;
            }
        }
        true
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn late_deliveries(&self) -> usize {
        *self.late_deliveries.lock()
    }
}

impl Listener for Recorder {
    fn data_received(&self, data: &[u8]) {
        if self.sealed.load(Ordering::SeqCst) {
            *self.late_deliveries.lock() += 1;
        }
        self.chunks.lock().push(data.to_vec());
        self.arrived.notify_all();
    }
}

/// A port whose input is fed by the returned writer and whose output is
/// drained by the returned reader.
pub struct Harness {
    pub port: StreamPort,
    pub feed: PipeWriter,
    pub sink: PipeReader,
}

pub fn harness(name: &str, settings: PortSettings) -> Harness {
    let (port_input, feed) = pipe();
    let (sink, port_output) = pipe();
    let port = StreamPort::open(name, port_input, port_output, settings)
        .expect("attach to in-memory pipes");
    Harness { port, feed, sink }
}

/// Poll `condition` until it holds or two seconds pass.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
