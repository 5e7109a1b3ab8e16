//! Serial connection to a running calibration sketch
//!
//! One worker thread per connection owns the transport exclusively; the
//! rest of the program talks to it through channels only. Events flow
//! out (parsed lines, connection loss), commands flow in and are written
//! by the worker between reads. There is no reconnection: a lost
//! connection stays lost until the operator reconnects.

mod reader;

use crate::error::{Error, Result};
use crate::protocol::DeviceMessage;
use crate::transport::{SerialTransport, Transport};
use crate::types::Telemetry;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Host-to-device commands: single characters, or a newline-terminated
/// number for the known mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Help,
    Status,
    LoadCellMode,
    ImuMode,
    Tare,
    StartLoadCellCalibration,
    StartImuCalibration,
    ResetImuOffsets,
    KnownMass(f64),
    SoftwareReset,
}

impl Command {
    pub fn wire_bytes(&self) -> Vec<u8> {
        match self {
            Command::Help => b"h".to_vec(),
            Command::Status => b"s".to_vec(),
            Command::LoadCellMode => b"l".to_vec(),
            Command::ImuMode => b"i".to_vec(),
            Command::Tare => b"t".to_vec(),
            Command::StartLoadCellCalibration => b"r".to_vec(),
            Command::StartImuCalibration => b"c".to_vec(),
            Command::ResetImuOffsets => b"x".to_vec(),
            Command::KnownMass(grams) => format!("{:.1}\n", grams).into_bytes(),
            Command::SoftwareReset => b"RESET\n".to_vec(),
        }
    }
}

/// Events emitted by the reader worker
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Message(DeviceMessage),
    ConnectionLost,
}

/// State mirrored out of the reader thread for display
#[derive(Debug, Default)]
pub struct LinkState {
    pub last_telemetry: Option<Telemetry>,
    pub lines_received: u64,
}

/// A live connection to the device
pub struct DeviceLink {
    events: Receiver<DeviceEvent>,
    commands: Sender<Command>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<LinkState>>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceLink {
    /// Open a serial port and start the reader worker
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let transport = SerialTransport::open(port, baud_rate)?;
        Self::connect(transport)
    }

    /// Start the reader worker over any transport
    pub fn connect<T: Transport + 'static>(transport: T) -> Result<Self> {
        let (event_tx, event_rx) = unbounded();
        let (cmd_tx, cmd_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(LinkState::default()));

        let worker_running = Arc::clone(&running);
        let worker_state = Arc::clone(&state);
        let handle = std::thread::Builder::new()
            .name("device-reader".to_string())
            .spawn(move || {
                reader::reader_loop(transport, worker_running, event_tx, cmd_rx, worker_state);
            })
            .map_err(|e| Error::Other(format!("Failed to spawn reader thread: {}", e)))?;

        Ok(Self {
            events: event_rx,
            commands: cmd_tx,
            running,
            state,
            handle: Some(handle),
        })
    }

    /// Incoming event stream
    pub fn events(&self) -> &Receiver<DeviceEvent> {
        &self.events
    }

    /// Queue a command for the worker to write
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Disconnected)
    }

    /// Latest telemetry seen on this connection, if any
    pub fn last_telemetry(&self) -> Option<Telemetry> {
        self.state.lock().last_telemetry
    }

    pub fn lines_received(&self) -> u64 {
        self.state.lock().lines_received
    }

    /// Stop the worker and block until it has joined
    pub fn disconnect(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn lines_become_parsed_events() {
        let mock = MockTransport::new();
        mock.push_line("=== Unified Calibration Sketch ===");
        mock.push_line("0.01,0.02,0.98,1.0,2.0,3.0,0.0,0.0,0.0");

        let link = DeviceLink::connect(mock).unwrap();

        let first = link.events().recv_timeout(RECV_TIMEOUT).unwrap();
        assert!(matches!(
            first,
            DeviceEvent::Message(DeviceMessage::Raw(_))
        ));

        let second = link.events().recv_timeout(RECV_TIMEOUT).unwrap();
        match second {
            DeviceEvent::Message(DeviceMessage::Telemetry(t)) => assert_eq!(t.az, 0.98),
            other => panic!("expected telemetry, got {:?}", other),
        }

        // Worker mirrors telemetry into shared state
        assert!(link.last_telemetry().is_some());
        assert_eq!(link.lines_received(), 2);
        link.disconnect();
    }

    #[test]
    fn commands_reach_the_wire() {
        let mock = MockTransport::new();
        let link = DeviceLink::connect(mock.clone()).unwrap();

        link.send(Command::Tare).unwrap();
        link.send(Command::KnownMass(100.0)).unwrap();

        // Give the worker a moment to drain the queue
        let expected = b"t100.0\n".to_vec();
        let deadline = std::time::Instant::now() + RECV_TIMEOUT;
        let mut written = Vec::new();
        while written.len() < expected.len() {
            written.extend(mock.take_written());
            assert!(std::time::Instant::now() < deadline, "commands never written");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(written, expected);
        link.disconnect();
    }

    #[test]
    fn read_failure_emits_connection_lost() {
        let mock = MockTransport::new();
        let link = DeviceLink::connect(mock.clone()).unwrap();
        mock.fail_reads();

        let event = link.events().recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(event, DeviceEvent::ConnectionLost);
        link.disconnect();
    }
}
