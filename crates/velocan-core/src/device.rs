//! Device addressing on the e-bike CAN bus

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// A logical device whose parameters can be read or written.
///
/// Determines which registry partition and which state record a frame
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTarget {
    /// Motor controller (drive unit)
    Controller,
    /// Handlebar display (HMI)
    Display,
    /// Battery management system
    Battery,
    /// Torque/cadence sensor
    Sensor,
}

impl DeviceTarget {
    /// All devices, in the order they are usually polled
    pub const ALL: [DeviceTarget; 4] = [
        DeviceTarget::Controller,
        DeviceTarget::Display,
        DeviceTarget::Battery,
        DeviceTarget::Sensor,
    ];

    /// Bus node id of this device
    pub fn node_id(&self) -> u8 {
        match self {
            DeviceTarget::Sensor => 0x01,
            DeviceTarget::Controller => 0x02,
            DeviceTarget::Display => 0x03,
            DeviceTarget::Battery => 0x04,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceTarget::Controller => "controller",
            DeviceTarget::Display => "display",
            DeviceTarget::Battery => "battery",
            DeviceTarget::Sensor => "sensor",
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceTarget {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "controller" | "motor" => Ok(DeviceTarget::Controller),
            "display" | "hmi" => Ok(DeviceTarget::Display),
            "battery" | "bms" => Ok(DeviceTarget::Battery),
            "sensor" | "torque_sensor" => Ok(DeviceTarget::Sensor),
            other => Err(FrameError::UnknownDevice(other.to_string())),
        }
    }
}

/// Any addressable node: a device, the configuration tool, or broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Device(DeviceTarget),
    /// The configuration tool (this side of the link)
    Tool,
    /// All nodes
    Broadcast,
}

impl Node {
    pub const TOOL_ID: u8 = 0x05;
    pub const BROADCAST_ID: u8 = 0x1F;

    /// 5-bit node id used in the CAN identifier
    pub fn id(&self) -> u8 {
        match self {
            Node::Device(device) => device.node_id(),
            Node::Tool => Self::TOOL_ID,
            Node::Broadcast => Self::BROADCAST_ID,
        }
    }

    /// Parse a 5-bit node id
    pub fn from_id(id: u8) -> Result<Self, FrameError> {
        match id {
            0x01 => Ok(Node::Device(DeviceTarget::Sensor)),
            0x02 => Ok(Node::Device(DeviceTarget::Controller)),
            0x03 => Ok(Node::Device(DeviceTarget::Display)),
            0x04 => Ok(Node::Device(DeviceTarget::Battery)),
            Self::TOOL_ID => Ok(Node::Tool),
            Self::BROADCAST_ID => Ok(Node::Broadcast),
            other => Err(FrameError::UnknownNode(other)),
        }
    }

    pub fn device(&self) -> Option<DeviceTarget> {
        match self {
            Node::Device(device) => Some(*device),
            _ => None,
        }
    }
}

impl From<DeviceTarget> for Node {
    fn from(device: DeviceTarget) -> Self {
        Node::Device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        for device in DeviceTarget::ALL {
            let node = Node::from(device);
            assert_eq!(Node::from_id(node.id()).unwrap(), node);
        }
        assert_eq!(Node::from_id(0x05).unwrap(), Node::Tool);
        assert_eq!(Node::from_id(0x1F).unwrap(), Node::Broadcast);
        assert_eq!(Node::from_id(0x09), Err(FrameError::UnknownNode(0x09)));
    }

    #[test]
    fn test_device_from_str() {
        assert_eq!("Controller".parse::<DeviceTarget>().unwrap(), DeviceTarget::Controller);
        assert_eq!("bms".parse::<DeviceTarget>().unwrap(), DeviceTarget::Battery);
        assert!("gearbox".parse::<DeviceTarget>().is_err());
    }
}
