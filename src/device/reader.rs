//! Reader worker for a device connection
//!
//! Polls the transport for buffered bytes, assembles them into lines,
//! parses each line, and forwards the result. Outbound commands are
//! drained from the queue between reads so the single thread stays the
//! only owner of the port. Any transport error ends the worker with a
//! `ConnectionLost` event.

use super::{Command, DeviceEvent, LinkState};
use crate::protocol::{DeviceMessage, LineAssembler};
use crate::transport::Transport;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pause between polls when the receive buffer is empty
const IDLE_POLL: Duration = Duration::from_millis(2);

pub(super) fn reader_loop<T: Transport>(
    mut transport: T,
    running: Arc<AtomicBool>,
    events: Sender<DeviceEvent>,
    commands: Receiver<Command>,
    state: Arc<Mutex<LinkState>>,
) {
    log::debug!("Reader worker started");
    let mut assembler = LineAssembler::new();
    let mut buffer = [0u8; 256];

    while running.load(Ordering::Relaxed) {
        // Outbound first: the sketch reacts to single characters, so
        // latency here is what the operator perceives as button lag
        while let Ok(command) = commands.try_recv() {
            let bytes = command.wire_bytes();
            if let Err(e) = transport.write(&bytes).and_then(|_| transport.flush()) {
                log::error!("Write failed: {}", e);
                let _ = events.send(DeviceEvent::ConnectionLost);
                return;
            }
            log::debug!("TX {:?}", command);
        }

        let available = match transport.available() {
            Ok(n) => n,
            Err(e) => {
                log::error!("Serial connection lost: {}", e);
                let _ = events.send(DeviceEvent::ConnectionLost);
                return;
            }
        };

        if available == 0 {
            thread::sleep(IDLE_POLL);
            continue;
        }

        let n = match transport.read(&mut buffer) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Serial connection lost: {}", e);
                let _ = events.send(DeviceEvent::ConnectionLost);
                return;
            }
        };

        for line in assembler.push(&buffer[..n]) {
            let message = DeviceMessage::parse(&line);
            {
                let mut state = state.lock();
                state.lines_received += 1;
                if let DeviceMessage::Telemetry(t) = &message {
                    state.last_telemetry = Some(*t);
                }
            }
            if events.send(DeviceEvent::Message(message)).is_err() {
                // Receiver gone; nothing left to do
                return;
            }
        }
    }

    log::debug!("Reader worker stopped");
}
