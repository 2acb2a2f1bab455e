//! Transport adapter trait

use async_trait::async_trait;
use tokio::sync::broadcast;
use velocan_core::CanFrame;

use super::TransportError;

/// Transport-agnostic interface to the CAN bus
///
/// Sending never waits for a reply. Replies and unsolicited device traffic
/// arrive on the [`subscribe`](TransportAdapter::subscribe) stream; frames of
/// different command codes may interleave in any order.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Put one frame on the bus
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Subscribe to inbound frames
    fn subscribe(&self) -> broadcast::Receiver<CanFrame>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;

    /// Attempt to reconnect if disconnected
    async fn reconnect(&self) -> Result<(), TransportError>;

    /// Close the link; later sends fail with `ConnectionClosed`
    async fn disconnect(&self);
}
