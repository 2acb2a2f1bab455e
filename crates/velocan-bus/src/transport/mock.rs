//! Mock transport adapter for testing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use velocan_core::CanFrame;

use super::{TransportAdapter, TransportError};
use crate::config::MockConfig;

/// Produces the device's reply frames for one outbound frame
pub type Responder = Box<dyn Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync>;

/// Mock transport adapter for testing
///
/// Every sent frame is logged. An optional responder plays the devices'
/// side: whatever it returns is delivered on the inbound stream.
pub struct MockTransportAdapter {
    config: MockConfig,
    connected: AtomicBool,
    incoming_tx: broadcast::Sender<CanFrame>,
    responder: RwLock<Option<Responder>>,
    sent: Mutex<Vec<CanFrame>>,
    /// Number of upcoming sends that fail with `SendFailed`
    failing_sends: AtomicUsize,
}

impl MockTransportAdapter {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(1024);
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            incoming_tx,
            responder: RwLock::new(None),
            sent: Mutex::new(Vec::new()),
            failing_sends: AtomicUsize::new(0),
        }
    }

    /// Install the device-side reply logic
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Box::new(responder));
    }

    /// Inject an incoming frame (simulates a device broadcasting on its own)
    pub fn inject_incoming(&self, frame: CanFrame) {
        let _ = self.incoming_tx.send(frame);
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Frames sent so far
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.take_failure() {
            return Err(TransportError::SendFailed("injected failure".to_string()));
        }

        // Simulate latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        tracing::debug!(%frame, "Mock transport: sent frame");
        self.sent.lock().push(frame.clone());

        let replies = match self.responder.read().as_ref() {
            Some(responder) => responder(frame),
            None => Vec::new(),
        };
        for reply in replies {
            let _ = self.incoming_tx.send(reply);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CanFrame> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velocan_core::{CanOperation, DeviceTarget, Node};

    #[tokio::test]
    async fn test_responder_replies_on_inbound_stream() {
        let mock = MockTransportAdapter::new(&MockConfig::default());
        mock.set_responder(|frame| {
            vec![CanFrame::new(
                frame.target,
                Node::Tool,
                CanOperation::NormalAck,
                frame.code,
                frame.subcode,
                vec![],
            )
            .unwrap()]
        });
        let mut rx = mock.subscribe();

        let request = CanFrame::read_request(DeviceTarget::Display, 0x63, 0x00);
        mock.send(&request).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.source, Node::Device(DeviceTarget::Display));
        assert_eq!(reply.operation, CanOperation::NormalAck);
        assert_eq!(mock.sent_frames(), vec![request]);
    }

    #[tokio::test]
    async fn test_injected_send_failures() {
        let mock = MockTransportAdapter::new(&MockConfig::default());
        mock.fail_next_sends(1);
        let request = CanFrame::read_request(DeviceTarget::Battery, 0x64, 0x00);

        assert!(matches!(
            mock.send(&request).await,
            Err(TransportError::SendFailed(_))
        ));
        assert!(mock.send(&request).await.is_ok());
        assert_eq!(mock.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_send() {
        let mock = MockTransportAdapter::new(&MockConfig::default());
        mock.disconnect().await;
        assert!(!mock.is_connected().await);
        let request = CanFrame::read_request(DeviceTarget::Battery, 0x64, 0x00);
        assert_eq!(mock.send(&request).await, Err(TransportError::ConnectionClosed));

        mock.reconnect().await.unwrap();
        assert!(mock.send(&request).await.is_ok());
    }
}
