//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// In-memory transport for unit tests.
///
/// Clones share the same buffers, so a test can keep one handle while the
/// reader worker owns the other: inject sketch output with
/// [`push_incoming`](MockTransport::push_incoming) and inspect host
/// commands with [`take_written`](MockTransport::take_written).
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Default)]
struct Shared {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    fail_reads: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the next reads will return
    pub fn push_incoming(&self, data: &[u8]) {
        self.shared.lock().incoming.extend(data);
    }

    /// Queue a full line, newline included
    pub fn push_line(&self, line: &str) {
        let mut shared = self.shared.lock();
        shared.incoming.extend(line.as_bytes());
        shared.incoming.extend(b"\r\n");
    }

    /// Drain everything the host has written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.lock().written)
    }

    /// Make every subsequent read fail, simulating a yanked cable
    pub fn fail_reads(&self) {
        self.shared.lock().fail_reads = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut shared = self.shared.lock();
        if shared.fail_reads {
            return Err(Error::Other("simulated read failure".to_string()));
        }
        let n = shared.incoming.len().min(buffer.len());
        for slot in buffer.iter_mut().take(n) {
            *slot = shared.incoming.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.shared.lock().written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        let shared = self.shared.lock();
        if shared.fail_reads {
            return Err(Error::Other("simulated read failure".to_string()));
        }
        Ok(shared.incoming.len())
    }
}
