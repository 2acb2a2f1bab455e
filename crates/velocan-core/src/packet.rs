//! Logical packets spanning one or more CAN frames
//!
//! Payloads up to 8 bytes travel in a single frame. Longer payloads use the
//! multi-frame sequence:
//!
//! ```text
//! MultiframeStart  [len]
//! Multiframe       [8 bytes]   (repeated)
//! MultiframeEnd    [1..=8 bytes]
//! ```

use serde::Serialize;

use crate::device::{DeviceTarget, Node};
use crate::error::{FrameError, FrameResult};
use crate::frame::{CanFrame, CanOperation, MAX_FRAME_DATA};

/// Largest payload a multi-frame transfer can announce
pub const MAX_PACKET_DATA: usize = u8::MAX as usize;

/// A complete logical message with a payload of any supported length
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub source: Node,
    pub target: Node,
    /// Operation of the carrying frame; `Multiframe` for reassembled payloads
    pub operation: CanOperation,
    pub code: u8,
    pub subcode: u8,
    pub data: Vec<u8>,
}

impl Packet {
    /// Write command from the tool to a device
    pub fn write(device: DeviceTarget, code: u8, subcode: u8, data: Vec<u8>) -> Self {
        Self {
            source: Node::Tool,
            target: Node::Device(device),
            operation: CanOperation::WriteCmd,
            code,
            subcode,
            data,
        }
    }

    pub fn from_frame(frame: &CanFrame) -> Self {
        Self {
            source: frame.source,
            target: frame.target,
            operation: frame.operation,
            code: frame.code,
            subcode: frame.subcode,
            data: frame.data().to_vec(),
        }
    }

    /// See [`CanFrame::device`]
    pub fn device(&self) -> Option<DeviceTarget> {
        self.source.device().or_else(|| self.target.device())
    }

    /// Split into the frames that carry this packet on the wire
    pub fn into_frames(self) -> FrameResult<Vec<CanFrame>> {
        if self.data.len() <= MAX_FRAME_DATA {
            let frame = CanFrame::new(
                self.source,
                self.target,
                self.operation,
                self.code,
                self.subcode,
                self.data,
            )?;
            return Ok(vec![frame]);
        }
        if self.data.len() > MAX_PACKET_DATA {
            return Err(FrameError::PayloadTooLong(self.data.len()));
        }

        let chunks: Vec<&[u8]> = self.data.chunks(MAX_FRAME_DATA).collect();
        let mut frames = Vec::with_capacity(chunks.len() + 1);
        frames.push(CanFrame::new(
            self.source,
            self.target,
            CanOperation::MultiframeStart,
            self.code,
            self.subcode,
            vec![self.data.len() as u8],
        )?);
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let operation = if i == last {
                CanOperation::MultiframeEnd
            } else {
                CanOperation::Multiframe
            };
            frames.push(CanFrame::new(
                self.source,
                self.target,
                operation,
                self.code,
                self.subcode,
                chunk,
            )?);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_packet_single_frame() {
        let packet = Packet::write(DeviceTarget::Display, 0x62, 0x00, vec![12, 30, 0]);
        let frames = packet.into_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].operation, CanOperation::WriteCmd);
        assert_eq!(frames[0].data(), &[12, 30, 0]);
    }

    #[test]
    fn test_long_packet_multiframe() {
        let data: Vec<u8> = (0..20).collect();
        let packet = Packet::write(DeviceTarget::Controller, 0x60, 0x11, data);
        let frames = packet.into_frames().unwrap();

        let ops: Vec<CanOperation> = frames.iter().map(|f| f.operation).collect();
        assert_eq!(
            ops,
            vec![
                CanOperation::MultiframeStart,
                CanOperation::Multiframe,
                CanOperation::Multiframe,
                CanOperation::MultiframeEnd,
            ]
        );
        assert_eq!(frames[0].data(), &[20]);
        assert_eq!(frames[3].data(), &[16, 17, 18, 19]);
        assert!(frames.iter().all(|f| f.code == 0x60 && f.subcode == 0x11));
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let packet = Packet::write(DeviceTarget::Display, 0x60, 0x05, vec![b'x'; 300]);
        assert_eq!(packet.into_frames(), Err(FrameError::PayloadTooLong(300)));
    }
}
