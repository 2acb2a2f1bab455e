//! velocan-conv - Frame codec and parameter registry for e-bike CAN devices
//!
//! Turns device payloads into typed values and back. The [`Registry`] knows
//! which (device, code, subcode) triples exist, whether they can be read or
//! written, and which codec handles them.
//!
//! # Quick Start
//!
//! ```rust
//! use velocan_conv::{ParameterValue, Registry};
//! use velocan_core::{CanOperation, DeviceTarget, Node, Packet};
//!
//! let registry = Registry::standard();
//! let descriptor = registry.lookup(DeviceTarget::Sensor, 0x31, 0x00).unwrap();
//!
//! let packet = Packet {
//!     source: Node::Device(DeviceTarget::Sensor),
//!     target: Node::Tool,
//!     operation: CanOperation::WriteCmd,
//!     code: 0x31,
//!     subcode: 0x00,
//!     data: vec![0x2C, 0x01, 72],
//! };
//! let ParameterValue::SensorRealtime(sensor) = descriptor.decode(&packet).unwrap() else {
//!     panic!("unexpected value");
//! };
//! assert_eq!(sensor.torque, 300);
//! assert_eq!(sensor.cadence, 72);
//! ```
//!
//! # Parameter Groups
//!
//! | Device | Code | Groups |
//! |--------|------|--------|
//! | controller, display, battery | 0x60 | identity strings, parameter blocks |
//! | controller | 0x32 | realtime data, speed parameters |
//! | display | 0x63 | realtime data, mileage, service data |
//! | controller, display | 0x62 | write-only commands |
//! | battery | 0x64 | capacity, state, cell voltages |
//! | sensor | 0x31 | torque and cadence |

pub mod decode;
pub mod encode;
pub mod error;
pub mod registry;
pub mod scale;
pub mod tables;
pub mod types;

// Re-export main types
pub use decode::decode;
pub use encode::{encode, encode_frames};
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use registry::{Access, ParameterDescriptor, ParameterId, PayloadLength, Registry};
pub use tables::{wheel_by_code, wheel_by_label, WheelDiameter, WHEEL_DIAMETERS};
pub use types::*;
