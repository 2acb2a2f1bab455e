//! Consumer-facing connection to the bike's CAN bus
//!
//! Owns the transport, one [`Sequencer`] per device, the shared state store
//! and the event notifier. A single listener task reassembles inbound frames
//! and routes each packet to the sequencer of the device that sent it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use velocan_conv::{ClockTime, ParameterDescriptor, ParameterGroup, ParameterValue, Registry};
use velocan_core::{DeviceTarget, Packet};

use crate::assembler::FrameAssembler;
use crate::config::{BusConfig, SessionConfig};
use crate::error::{BusError, SessionError};
use crate::events::{DataUpdate, EventNotifier, OperationSummary, UpdateFilter};
use crate::session::{read_work, write_work, OperationHandle, SessionKind, SessionPhase, Sequencer, WorkItem};
use crate::store::{DeviceSnapshot, DeviceStateStore};
use crate::transport::{create_transport, TransportAdapter};

pub struct BikeConnection {
    transport: Arc<dyn TransportAdapter>,
    registry: &'static Registry,
    store: Arc<DeviceStateStore>,
    events: Arc<EventNotifier>,
    sequencers: Arc<HashMap<DeviceTarget, Sequencer>>,
    listener_handle: RwLock<Option<JoinHandle<()>>>,
}

impl BikeConnection {
    /// Connect over an existing transport. Must be called within a tokio runtime.
    pub fn new(transport: Arc<dyn TransportAdapter>, config: SessionConfig) -> Self {
        let store = Arc::new(DeviceStateStore::new());
        let events = Arc::new(EventNotifier::new());
        let sequencers = DeviceTarget::ALL
            .into_iter()
            .map(|target| {
                let sequencer = Sequencer::new(
                    target,
                    transport.clone(),
                    store.clone(),
                    events.clone(),
                    config.clone(),
                );
                (target, sequencer)
            })
            .collect();

        let connection = Self {
            transport,
            registry: Registry::standard(),
            store,
            events,
            sequencers: Arc::new(sequencers),
            listener_handle: RwLock::new(None),
        };
        connection.start_listener();
        info!(
            timeout_ms = config.request_timeout_ms,
            max_retries = config.max_retries,
            "Bike connection ready"
        );
        connection
    }

    /// Create the configured transport and connect over it
    pub async fn from_config(config: &BusConfig) -> Result<Self, BusError> {
        let transport = create_transport(&config.transport).await?;
        Ok(Self::new(transport, config.session.clone()))
    }

    fn start_listener(&self) {
        let mut inbound = self.transport.subscribe();
        let sequencers = self.sequencers.clone();

        let handle = tokio::spawn(async move {
            let mut assembler = FrameAssembler::new();
            loop {
                match inbound.recv().await {
                    Ok(frame) => {
                        debug!(%frame, "Inbound frame");
                        if let Some(packet) = assembler.push(&frame) {
                            route_packet(&sequencers, &packet);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Inbound frame listener lagged");
                        assembler.reset();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Inbound frame channel closed");
                        break;
                    }
                }
            }
        });

        *self.listener_handle.write() = Some(handle);
    }

    fn sequencer(&self, target: DeviceTarget) -> &Sequencer {
        &self.sequencers[&target]
    }

    // =========================================================================
    // Bulk operations
    // =========================================================================

    /// Read every readable parameter of `target`
    pub fn load_all(&self, target: DeviceTarget) -> Result<OperationHandle, SessionError> {
        let work = read_work(self.registry, target);
        self.sequencer(target).begin(SessionKind::Read, work)
    }

    /// Write every staged value of `target` back to the device
    pub fn save_all(&self, target: DeviceTarget) -> Result<OperationHandle, SessionError> {
        let work = write_work(self.registry, &self.store, target);
        self.sequencer(target).begin(SessionKind::Write, work)
    }

    pub fn phase(&self, target: DeviceTarget) -> SessionPhase {
        self.sequencer(target).phase()
    }

    // =========================================================================
    // Parameters and commands
    // =========================================================================

    pub fn snapshot(&self, target: DeviceTarget) -> DeviceSnapshot {
        self.store.snapshot(target)
    }

    /// Stage `value` for the next [`save_all`](Self::save_all).
    ///
    /// Only groups that can be read back and written are staged; commands go
    /// through [`execute`](Self::execute). The value is encoded up front so a
    /// bad value is rejected here rather than failing during the save.
    pub fn set_parameter(
        &self,
        target: DeviceTarget,
        group: ParameterGroup,
        value: ParameterValue,
    ) -> Result<(), BusError> {
        let descriptor = self.descriptor(target, group)?;
        if !(descriptor.access.is_readable() && descriptor.access.is_writable()) {
            return Err(SessionError::NotWritable { target, group }.into());
        }
        descriptor.encode(&value)?;

        let changed = self.store.apply(target, group, value);
        debug!(%target, %group, changed, "Staged parameter");
        if let Some(value) = self.store.get(target, group) {
            self.events.publish_update(&DataUpdate {
                target,
                group,
                value,
                changed,
            });
        }
        Ok(())
    }

    /// Send a single write, typically a write-only command
    pub fn execute(
        &self,
        target: DeviceTarget,
        group: ParameterGroup,
        value: ParameterValue,
    ) -> Result<OperationHandle, BusError> {
        let descriptor = self.descriptor(target, group)?;
        if !descriptor.access.is_writable() {
            return Err(SessionError::NotWritable { target, group }.into());
        }
        descriptor.encode(&value)?;

        let work = vec![WorkItem::write(&descriptor, &value)];
        Ok(self.sequencer(target).begin(SessionKind::Write, work)?)
    }

    /// Set the display's clock
    pub fn set_display_time(&self, time: ClockTime) -> Result<OperationHandle, BusError> {
        self.execute(
            DeviceTarget::Display,
            ParameterGroup::DisplayTime,
            ParameterValue::DisplayTime(time),
        )
    }

    /// Reset the display's service mileage counter
    pub fn clean_service_mileage(&self) -> Result<OperationHandle, BusError> {
        self.execute(
            DeviceTarget::Display,
            ParameterGroup::CleanServiceMileage,
            ParameterValue::Trigger,
        )
    }

    pub fn calibrate_position_sensor(&self) -> Result<OperationHandle, BusError> {
        self.execute(
            DeviceTarget::Controller,
            ParameterGroup::PositionSensorCalibration,
            ParameterValue::Trigger,
        )
    }

    fn descriptor(&self, target: DeviceTarget, group: ParameterGroup) -> Result<ParameterDescriptor, SessionError> {
        self.registry
            .for_group(target, group)
            .next()
            .copied()
            .ok_or(SessionError::UnknownParameter { target, group })
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// See [`EventNotifier::subscribe_updates`]
    pub fn subscribe_updates(
        &self,
        key: impl Into<String>,
        filter: UpdateFilter,
    ) -> mpsc::UnboundedReceiver<DataUpdate> {
        self.events.subscribe_updates(key, filter)
    }

    pub fn unsubscribe_updates(&self, key: &str) -> bool {
        self.events.unsubscribe_updates(key)
    }

    /// Single-shot completion of the next operation on `target`
    pub fn once_finished(&self, target: DeviceTarget) -> oneshot::Receiver<OperationSummary> {
        self.events.once_finished(target)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn store(&self) -> &Arc<DeviceStateStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventNotifier> {
        &self.events
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Bring the transport back up after [`disconnect`](Self::disconnect) and
    /// restart the inbound listener if it is not running
    pub async fn reconnect(&self) -> Result<(), BusError> {
        self.transport.reconnect().await?;
        let running = self
            .listener_handle
            .read()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !running {
            self.start_listener();
        }
        info!("Bike connection re-established");
        Ok(())
    }

    /// Tear down the connection.
    ///
    /// Running sessions are cancelled without firing completion, the listener
    /// stops, and the state store is cleared. Call [`reconnect`](Self::reconnect)
    /// to use the connection again.
    pub async fn disconnect(&self) {
        for sequencer in self.sequencers.values() {
            sequencer.cancel();
        }
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
        self.transport.disconnect().await;
        self.store.clear();
        info!("Bike connection closed");
    }
}

impl Drop for BikeConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
    }
}

fn route_packet(sequencers: &HashMap<DeviceTarget, Sequencer>, packet: &Packet) {
    let Some(source) = packet.source.device() else {
        // our own traffic echoed back, or a broadcast
        return;
    };
    match sequencers.get(&source) {
        Some(sequencer) => sequencer.on_packet(packet),
        None => debug!(device = %source, "No sequencer for device"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::MockTransportAdapter;
    use pretty_assertions::assert_eq;
    use velocan_conv::DisplayMileage;
    use velocan_core::{CanFrame, CanOperation, Node};

    fn connection() -> (Arc<MockTransportAdapter>, BikeConnection) {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let connection = BikeConnection::new(mock.clone(), SessionConfig::default());
        (mock, connection)
    }

    #[tokio::test]
    async fn test_unsolicited_broadcast_updates_store() {
        let (mock, connection) = connection();
        let mut updates = connection.subscribe_updates("ui", UpdateFilter::Device(DeviceTarget::Sensor));

        mock.inject_incoming(
            CanFrame::new(
                Node::Device(DeviceTarget::Sensor),
                Node::Broadcast,
                CanOperation::WriteCmd,
                0x31,
                0x00,
                vec![0x2C, 0x01, 70],
            )
            .unwrap(),
        );

        let update = updates.recv().await.unwrap();
        assert_eq!(update.group, ParameterGroup::SensorRealtime);
        assert_eq!(connection.phase(DeviceTarget::Sensor), SessionPhase::Idle);
        assert!(!connection.snapshot(DeviceTarget::Sensor).is_empty());
    }

    #[tokio::test]
    async fn test_set_parameter_rejects_read_only() {
        let (_mock, connection) = connection();
        let err = connection
            .set_parameter(
                DeviceTarget::Battery,
                ParameterGroup::Manufacturer,
                ParameterValue::Text("ACME".into()),
            )
            .unwrap_err();
        assert!(matches!(err, BusError::Session(SessionError::NotWritable { .. })));
    }

    #[tokio::test]
    async fn test_set_parameter_rejects_commands_and_unknown_groups() {
        let (_mock, connection) = connection();
        let err = connection
            .set_parameter(
                DeviceTarget::Display,
                ParameterGroup::CleanServiceMileage,
                ParameterValue::Trigger,
            )
            .unwrap_err();
        assert!(matches!(err, BusError::Session(SessionError::NotWritable { .. })));

        let err = connection
            .set_parameter(
                DeviceTarget::Sensor,
                ParameterGroup::DisplayMileage,
                ParameterValue::DisplayMileage(DisplayMileage::default()),
            )
            .unwrap_err();
        assert!(matches!(err, BusError::Session(SessionError::UnknownParameter { .. })));
    }

    #[tokio::test]
    async fn test_set_parameter_checks_value_kind() {
        let (_mock, connection) = connection();
        let err = connection
            .set_parameter(
                DeviceTarget::Display,
                ParameterGroup::DisplayMileage,
                ParameterValue::Text("12".into()),
            )
            .unwrap_err();
        assert!(matches!(err, BusError::Encode(_)));
        assert!(connection.snapshot(DeviceTarget::Display).is_empty());
    }

    #[tokio::test]
    async fn test_execute_sends_command() {
        let (mock, connection) = connection();
        mock.set_responder(|frame| {
            vec![CanFrame::new(frame.target, Node::Tool, CanOperation::NormalAck, frame.code, frame.subcode, vec![])
                .unwrap()]
        });

        let summary = connection.clean_service_mileage().unwrap().wait().await.unwrap();
        assert!(summary.is_success());

        let sent = mock.sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].code, sent[0].subcode), (0x62, 0x01));
        assert_eq!(sent[0].target, Node::Device(DeviceTarget::Display));
    }

    #[tokio::test]
    async fn test_reconnect_restarts_listener() {
        let (mock, connection) = connection();
        mock.set_responder(|frame| {
            vec![CanFrame::new(frame.target, Node::Tool, CanOperation::NormalAck, frame.code, frame.subcode, vec![])
                .unwrap()]
        });

        connection.disconnect().await;
        assert!(!connection.is_connected().await);

        connection.reconnect().await.unwrap();
        assert!(connection.is_connected().await);
        let summary = connection.clean_service_mileage().unwrap().wait().await.unwrap();
        assert!(summary.is_success());

        // a second reconnect keeps the running listener
        connection.reconnect().await.unwrap();
        let summary = connection.calibrate_position_sensor().unwrap().wait().await.unwrap();
        assert!(summary.is_success());
        assert_eq!(mock.sent_frames().len(), 2);
    }

    #[tokio::test]
    async fn test_save_all_with_nothing_staged() {
        let (mock, connection) = connection();
        let summary = connection.save_all(DeviceTarget::Display).unwrap().wait().await.unwrap();
        assert_eq!((summary.succeeded, summary.failed), (0, 0));
        assert!(mock.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let (mock, connection) = connection();
        connection
            .set_parameter(
                DeviceTarget::Display,
                ParameterGroup::DisplayMileage,
                ParameterValue::DisplayMileage(DisplayMileage::default()),
            )
            .unwrap();
        assert!(!connection.snapshot(DeviceTarget::Display).is_empty());

        connection.disconnect().await;
        assert!(connection.snapshot(DeviceTarget::Display).is_empty());
        assert!(!mock.is_connected().await);
    }
}
