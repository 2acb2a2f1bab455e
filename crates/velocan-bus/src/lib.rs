//! velocan-bus - Device communication for e-bike CAN networks
//!
//! Drives bulk reads and writes against the controller, display, battery and
//! torque sensor, keeps the last decoded value of every parameter group, and
//! notifies consumers when values change or an operation finishes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     BikeConnection                          │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ Sequencer   │  │ StateStore  │  │ EventNotifier       │  │
//! │  │ (per device)│  │ (values)    │  │ (updates, finished) │  │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────────┘  │
//! │         │                ▲                                  │
//! │         │         ┌──────┴───────┐                          │
//! │         │         │FrameAssembler│ ◄── listener task        │
//! │         │         └──────▲───────┘                          │
//! │         ▼                │                                  │
//! │                ┌─────────┴───────┐                          │
//! │                │TransportAdapter │                          │
//! │                └─────────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assembler;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod session;
pub mod store;
pub mod transport;

pub use assembler::FrameAssembler;
pub use config::{BusConfig, MockConfig, SessionConfig, TransportConfig};
pub use connection::BikeConnection;
pub use error::{BusError, ConfigError, RequestFailure, SessionError};
pub use events::{DataUpdate, EventNotifier, OperationSummary, ParameterFailure, UpdateFilter};
pub use session::{OperationHandle, Sequencer, SessionKind, SessionPhase, WorkItem};
pub use store::{DeviceSnapshot, DeviceStateStore, StoredValue};
pub use transport::{create_transport, MockTransportAdapter, TransportAdapter, TransportError};

// Re-export for convenience
pub use velocan_conv::{ParameterGroup, ParameterValue, Registry};
pub use velocan_core::{CanFrame, DeviceTarget};
