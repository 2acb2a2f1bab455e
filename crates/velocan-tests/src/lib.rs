//! Integration tests for the velocan stack
//!
//! The tests in `tests/` drive a [`BikeConnection`] or a bare [`Sequencer`]
//! against a [`SimulatedBike`] attached to the mock transport. The simulated
//! bike answers reads from a table of raw payloads, acknowledges writes and
//! can be told to stay silent or reject specific parameters.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p velocan-tests
//! RUST_LOG=velocan_bus=debug cargo test -p velocan-tests -- --nocapture
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use velocan_bus::{FrameAssembler, MockTransportAdapter, Sequencer, TransportAdapter};
use velocan_core::{CanFrame, CanOperation, DeviceTarget, Node, Packet};

pub use velocan_bus::BikeConnection;

/// `(device, code, subcode)`
pub type Triple = (DeviceTarget, u8, u8);

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
struct BikeState {
    values: HashMap<Triple, Vec<u8>>,
    silent: HashSet<Triple>,
    rejected: HashSet<Triple>,
    /// Triples whose next write is refused with a multi-frame warning
    interrupted: HashSet<Triple>,
    writes: Vec<Packet>,
    reads: HashMap<Triple, usize>,
    assembler: FrameAssembler,
}

/// Device side of the bus, played by the mock transport's responder
#[derive(Clone, Default)]
pub struct SimulatedBike {
    state: Arc<Mutex<BikeState>>,
}

impl SimulatedBike {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, target: DeviceTarget, code: u8, subcode: u8, data: impl Into<Vec<u8>>) -> Self {
        self.state.lock().values.insert((target, code, subcode), data.into());
        self
    }

    /// Never answer requests for this parameter
    pub fn silence(&self, target: DeviceTarget, code: u8, subcode: u8) {
        self.state.lock().silent.insert((target, code, subcode));
    }

    /// Answer requests for this parameter with an error acknowledgement
    pub fn reject(&self, target: DeviceTarget, code: u8, subcode: u8) {
        self.state.lock().rejected.insert((target, code, subcode));
    }

    /// Refuse the next write of this parameter as an incomplete transfer
    pub fn interrupt_next_write(&self, target: DeviceTarget, code: u8, subcode: u8) {
        self.state.lock().interrupted.insert((target, code, subcode));
    }

    /// Current payload held by the device
    pub fn value(&self, target: DeviceTarget, code: u8, subcode: u8) -> Option<Vec<u8>> {
        self.state.lock().values.get(&(target, code, subcode)).cloned()
    }

    /// Completed writes received, in order
    pub fn writes(&self) -> Vec<Packet> {
        self.state.lock().writes.clone()
    }

    pub fn read_count(&self, target: DeviceTarget, code: u8, subcode: u8) -> usize {
        self.state.lock().reads.get(&(target, code, subcode)).copied().unwrap_or(0)
    }

    /// Install this bike as the responder of `mock`
    pub fn attach(&self, mock: &MockTransportAdapter) {
        let bike = self.clone();
        mock.set_responder(move |frame| bike.respond(frame));
    }

    fn respond(&self, frame: &CanFrame) -> Vec<CanFrame> {
        let mut state = self.state.lock();
        let Some(packet) = state.assembler.push(frame) else {
            return Vec::new();
        };
        let Some(device) = packet.target.device() else {
            return Vec::new();
        };
        let key = (device, packet.code, packet.subcode);

        if state.silent.contains(&key) {
            return Vec::new();
        }
        if state.rejected.contains(&key) {
            return reply(device, CanOperation::ErrorAck, &packet, Vec::new());
        }

        match packet.operation {
            CanOperation::ReadCmd => {
                *state.reads.entry(key).or_default() += 1;
                match state.values.get(&key) {
                    Some(data) => reply(device, CanOperation::WriteCmd, &packet, data.clone()),
                    None => Vec::new(),
                }
            }
            _ => {
                if state.interrupted.remove(&key) {
                    return reply(device, CanOperation::MultiframeWarning, &packet, Vec::new());
                }
                state.values.insert(key, packet.data.clone());
                state.writes.push(packet.clone());
                reply(device, CanOperation::NormalAck, &packet, Vec::new())
            }
        }
    }
}

fn reply(device: DeviceTarget, operation: CanOperation, request: &Packet, data: Vec<u8>) -> Vec<CanFrame> {
    let packet = Packet {
        source: Node::Device(device),
        target: Node::Tool,
        operation,
        code: request.code,
        subcode: request.subcode,
        data,
    };
    packet.into_frames().unwrap_or_default()
}

/// Feed inbound packets from `mock` to a standalone sequencer
pub fn forward_packets(mock: &MockTransportAdapter, sequencer: Sequencer) -> JoinHandle<()> {
    let mut inbound = mock.subscribe();
    tokio::spawn(async move {
        let mut assembler = FrameAssembler::new();
        loop {
            match inbound.recv().await {
                Ok(frame) => {
                    if let Some(packet) = assembler.push(&frame) {
                        if packet.source == Node::Device(sequencer.target()) {
                            sequencer.on_packet(&packet);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Printable ASCII payload of a text parameter
pub fn text(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Little-endian millivolt payload for one cell-voltage frame
pub fn cells(millivolts: &[u16]) -> Vec<u8> {
    millivolts.iter().flat_map(|mv| mv.to_le_bytes()).collect()
}
