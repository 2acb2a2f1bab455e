//! Multi-frame reassembly
//!
//! A transfer is keyed by sender and command triple, so transfers from
//! different devices or for different parameters may interleave.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};
use velocan_core::{CanFrame, CanOperation, Node, Packet};

type TransferKey = (Node, u8, u8);

struct Transfer {
    expected: usize,
    buffer: BytesMut,
}

/// Turns inbound frames into complete [`Packet`]s
#[derive(Default)]
pub struct FrameAssembler {
    transfers: HashMap<TransferKey, Transfer>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame; returns a packet when one is complete.
    ///
    /// Single frames pass straight through. A warning frame aborts the
    /// matching transfer and is itself passed through so the sender's
    /// complaint reaches the session.
    pub fn push(&mut self, frame: &CanFrame) -> Option<Packet> {
        let key = (frame.source, frame.code, frame.subcode);
        match frame.operation {
            CanOperation::MultiframeStart => {
                let Some(&len) = frame.data().first() else {
                    debug!(%frame, "Multi-frame start without length");
                    return None;
                };
                if self.transfers.contains_key(&key) {
                    debug!(%frame, "Restarting multi-frame transfer");
                }
                self.transfers.insert(
                    key,
                    Transfer {
                        expected: len as usize,
                        buffer: BytesMut::with_capacity(len as usize),
                    },
                );
                None
            }
            CanOperation::Multiframe => {
                let transfer = self.transfers.get_mut(&key)?;
                transfer.buffer.put_slice(frame.data());
                if transfer.buffer.len() > transfer.expected {
                    warn!(%frame, expected = transfer.expected, "Multi-frame overflow, dropping transfer");
                    self.transfers.remove(&key);
                }
                None
            }
            CanOperation::MultiframeEnd => {
                let mut transfer = self.transfers.remove(&key)?;
                transfer.buffer.put_slice(frame.data());
                if transfer.buffer.len() != transfer.expected {
                    warn!(
                        %frame,
                        expected = transfer.expected,
                        received = transfer.buffer.len(),
                        "Multi-frame length mismatch, dropping transfer"
                    );
                    return None;
                }
                Some(Packet {
                    source: frame.source,
                    target: frame.target,
                    operation: CanOperation::Multiframe,
                    code: frame.code,
                    subcode: frame.subcode,
                    data: transfer.buffer.freeze().to_vec(),
                })
            }
            CanOperation::MultiframeWarning => {
                if self.transfers.remove(&key).is_some() {
                    debug!(%frame, "Multi-frame transfer aborted by warning");
                }
                Some(Packet::from_frame(frame))
            }
            _ => Some(Packet::from_frame(frame)),
        }
    }

    /// Drop all partial transfers
    pub fn reset(&mut self) {
        self.transfers.clear();
    }

    pub fn in_progress(&self) -> usize {
        self.transfers.len()
    }
}
