//! Single CAN frame and its 29-bit identifier

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceTarget, Node};
use crate::error::{FrameError, FrameResult};

/// Hardware limit for data bytes in one frame
pub const MAX_FRAME_DATA: usize = 8;

/// Operation carried in bits 16..18 of the identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanOperation {
    WriteCmd,
    ReadCmd,
    NormalAck,
    /// Negative acknowledgement: the device rejected the request
    ErrorAck,
    MultiframeStart,
    Multiframe,
    MultiframeEnd,
    /// Receiver lost part of a multi-frame transfer
    MultiframeWarning,
}

impl CanOperation {
    pub fn code(&self) -> u8 {
        match self {
            CanOperation::WriteCmd => 0,
            CanOperation::ReadCmd => 1,
            CanOperation::NormalAck => 2,
            CanOperation::ErrorAck => 3,
            CanOperation::MultiframeStart => 4,
            CanOperation::Multiframe => 5,
            CanOperation::MultiframeEnd => 6,
            CanOperation::MultiframeWarning => 7,
        }
    }

    pub fn from_code(code: u8) -> FrameResult<Self> {
        match code {
            0 => Ok(CanOperation::WriteCmd),
            1 => Ok(CanOperation::ReadCmd),
            2 => Ok(CanOperation::NormalAck),
            3 => Ok(CanOperation::ErrorAck),
            4 => Ok(CanOperation::MultiframeStart),
            5 => Ok(CanOperation::Multiframe),
            6 => Ok(CanOperation::MultiframeEnd),
            7 => Ok(CanOperation::MultiframeWarning),
            other => Err(FrameError::UnknownOperation(other)),
        }
    }

    /// Whether this operation is part of a multi-frame transfer
    pub fn is_multiframe(&self) -> bool {
        matches!(
            self,
            CanOperation::MultiframeStart
                | CanOperation::Multiframe
                | CanOperation::MultiframeEnd
                | CanOperation::MultiframeWarning
        )
    }
}

/// A single CAN frame exchanged with a device.
///
/// The data length never exceeds [`MAX_FRAME_DATA`]; the constructor enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanFrame {
    pub source: Node,
    pub target: Node,
    pub operation: CanOperation,
    /// Command code
    pub code: u8,
    /// Sub-command code
    pub subcode: u8,
    data: Vec<u8>,
}

impl CanFrame {
    pub fn new(
        source: Node,
        target: Node,
        operation: CanOperation,
        code: u8,
        subcode: u8,
        data: impl Into<Vec<u8>>,
    ) -> FrameResult<Self> {
        let data = data.into();
        if data.len() > MAX_FRAME_DATA {
            return Err(FrameError::DataTooLong(data.len()));
        }
        Ok(Self {
            source,
            target,
            operation,
            code,
            subcode,
            data,
        })
    }

    /// Read request from the tool to a device (no payload)
    pub fn read_request(device: DeviceTarget, code: u8, subcode: u8) -> Self {
        Self {
            source: Node::Tool,
            target: Node::Device(device),
            operation: CanOperation::ReadCmd,
            code,
            subcode,
            data: Vec::new(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The device this frame concerns: its sender if a device sent it,
    /// otherwise its addressee
    pub fn device(&self) -> Option<DeviceTarget> {
        self.source.device().or_else(|| self.target.device())
    }

    /// Pack the 29-bit extended identifier
    pub fn can_id(&self) -> u32 {
        ((self.source.id() as u32 & 0x1F) << 24)
            | ((self.target.id() as u32 & 0x1F) << 19)
            | ((self.operation.code() as u32 & 0x07) << 16)
            | ((self.code as u32) << 8)
            | self.subcode as u32
    }

    /// Build a frame from a raw identifier and data bytes
    pub fn from_raw(can_id: u32, data: &[u8]) -> FrameResult<Self> {
        if can_id > 0x1FFF_FFFF {
            return Err(FrameError::InvalidIdentifier(can_id));
        }
        let source = Node::from_id(((can_id >> 24) & 0x1F) as u8)?;
        let target = Node::from_id(((can_id >> 19) & 0x1F) as u8)?;
        let operation = CanOperation::from_code(((can_id >> 16) & 0x07) as u8)?;
        let code = ((can_id >> 8) & 0xFF) as u8;
        let subcode = (can_id & 0xFF) as u8;
        Self::new(source, target, operation, code, subcode, data)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X} {:?} {:02X}/{:02X} [{}]",
            self.can_id(),
            self.operation,
            self.code,
            self.subcode,
            hex::encode(&self.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_data_length_limit() {
        let frame = CanFrame::new(
            Node::Tool,
            Node::Device(DeviceTarget::Display),
            CanOperation::WriteCmd,
            0x62,
            0x00,
            vec![0u8; 9],
        );
        assert_eq!(frame, Err(FrameError::DataTooLong(9)));
    }

    #[test]
    fn test_can_id_layout() {
        let frame = CanFrame::read_request(DeviceTarget::Controller, 0x32, 0x03);
        // source 0x05, target 0x02, op 1
        assert_eq!(frame.can_id(), 0x0511_3203);

        let parsed = CanFrame::from_raw(frame.can_id(), &[]).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_from_raw_device_broadcast() {
        // Controller broadcasting realtime data to everyone
        let frame = CanFrame::from_raw(0x02F8_3200, &[1, 2, 3]).unwrap();
        assert_eq!(frame.source, Node::Device(DeviceTarget::Controller));
        assert_eq!(frame.target, Node::Broadcast);
        assert_eq!(frame.operation, CanOperation::WriteCmd);
        assert_eq!(frame.device(), Some(DeviceTarget::Controller));
        assert_eq!(frame.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_from_raw_rejects_wide_identifier() {
        assert_eq!(
            CanFrame::from_raw(0x2000_0000, &[]),
            Err(FrameError::InvalidIdentifier(0x2000_0000))
        );
    }
}
