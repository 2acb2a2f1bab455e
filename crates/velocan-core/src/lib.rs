//! velocan-core - Core frame and device types for e-bike CAN communication
//!
//! This crate provides the wire-level vocabulary shared by the codec and the
//! bus layers: which node a frame comes from or goes to, what operation it
//! carries, and how logical packets map onto 8-byte CAN frames.
//!
//! # Identifier layout
//!
//! ```text
//!  28      24 23      19 18  16 15        8 7         0
//! ┌──────────┬──────────┬──────┬───────────┬───────────┐
//! │  source  │  target  │  op  │   code    │  subcode  │
//! └──────────┴──────────┴──────┴───────────┴───────────┘
//! ```

pub mod device;
pub mod error;
pub mod frame;
pub mod packet;

pub use device::{DeviceTarget, Node};
pub use error::{FrameError, FrameResult};
pub use frame::{CanFrame, CanOperation, MAX_FRAME_DATA};
pub use packet::{Packet, MAX_PACKET_DATA};
