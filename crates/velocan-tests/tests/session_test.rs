//! Sequencer behaviour against a simulated bike
//!
//! Time is paused, so timeouts and retries resolve without real waiting.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use velocan_bus::session::read_work;
use velocan_bus::{
    DeviceStateStore, EventNotifier, MockConfig, MockTransportAdapter, RequestFailure, Sequencer, SessionConfig,
    SessionError, SessionKind, SessionPhase, WorkItem,
};
use velocan_conv::Registry;
use velocan_core::{CanOperation, DeviceTarget};
use velocan_tests::{forward_packets, init_tracing, text, SimulatedBike};

const CONTROLLER: DeviceTarget = DeviceTarget::Controller;

struct Harness {
    mock: Arc<MockTransportAdapter>,
    events: Arc<EventNotifier>,
    store: Arc<DeviceStateStore>,
    sequencer: Sequencer,
}

fn harness(bike: &SimulatedBike, config: SessionConfig) -> Harness {
    init_tracing();
    let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
    bike.attach(&mock);
    let store = Arc::new(DeviceStateStore::new());
    let events = Arc::new(EventNotifier::new());
    let sequencer = Sequencer::new(CONTROLLER, mock.clone(), store.clone(), events.clone(), config);
    forward_packets(&mock, sequencer.clone());
    Harness {
        mock,
        events,
        store,
        sequencer,
    }
}

fn controller_bike() -> SimulatedBike {
    let mut param1 = vec![0u8; 64];
    param1[0] = 36;
    SimulatedBike::new()
        .with_value(CONTROLLER, 0x60, 0x00, text("HW1.2"))
        .with_value(CONTROLLER, 0x60, 0x01, text("SW3.4.1"))
        .with_value(CONTROLLER, 0x60, 0x02, text("MX-250"))
        .with_value(CONTROLLER, 0x60, 0x03, text("SN0001"))
        .with_value(CONTROLLER, 0x60, 0x04, text("C42"))
        .with_value(CONTROLLER, 0x60, 0x05, text("ACME"))
        .with_value(CONTROLLER, 0x32, 0x00, vec![0xE8, 0x03, 0x2C, 0x01, 3, 0, 0, 0])
        .with_value(CONTROLLER, 0x32, 0x01, vec![0; 8])
        .with_value(CONTROLLER, 0x32, 0x03, vec![0xC4, 0x09, 0xA0, 0x01, 0x2C, 0x08])
        .with_value(CONTROLLER, 0x60, 0x11, param1)
        .with_value(CONTROLLER, 0x60, 0x12, vec![0; 54])
}

fn first_ten_reads() -> Vec<WorkItem> {
    read_work(Registry::standard(), CONTROLLER).into_iter().take(10).collect()
}

fn requests_sent(mock: &MockTransportAdapter, code: u8, subcode: u8) -> usize {
    mock.sent_frames()
        .iter()
        .filter(|f| f.operation == CanOperation::ReadCmd && f.code == code && f.subcode == subcode)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_seven_succeed_three_exhaust_retries() -> anyhow::Result<()> {
    let bike = controller_bike();
    bike.silence(CONTROLLER, 0x60, 0x02);
    bike.silence(CONTROLLER, 0x32, 0x01);
    bike.silence(CONTROLLER, 0x60, 0x11);
    let h = harness(
        &bike,
        SessionConfig {
            request_timeout_ms: 200,
            max_retries: 3,
        },
    );

    let work = first_ten_reads();
    assert_eq!(work.len(), 10);

    let finished = h.events.once_finished(CONTROLLER);
    let handle = h.sequencer.begin(SessionKind::Read, work)?;
    let summary = handle.wait().await?;

    assert_eq!((summary.succeeded, summary.failed), (7, 3));
    assert!(summary
        .failures
        .iter()
        .all(|f| f.reason == RequestFailure::Timeout { attempts: 4 }));
    assert_eq!(finished.await?, summary);
    assert_eq!(h.sequencer.phase(), SessionPhase::Idle);

    // first attempt plus three resends
    assert_eq!(requests_sent(&h.mock, 0x60, 0x02), 4);
    assert_eq!(requests_sent(&h.mock, 0x60, 0x00), 1);

    // completion does not fire a second time
    let late = h.events.once_finished(CONTROLLER);
    assert!(tokio::time::timeout(Duration::from_secs(10), late).await.is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_begin_leaves_session_untouched() -> anyhow::Result<()> {
    let bike = controller_bike();
    bike.silence(CONTROLLER, 0x32, 0x00);
    let h = harness(&bike, SessionConfig::default());

    let handle = h.sequencer.begin(SessionKind::Read, first_ten_reads())?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.sequencer.pending_count(), 1);

    let err = h
        .sequencer
        .begin(SessionKind::Write, Vec::new())
        .expect_err("second begin must be rejected");
    assert_eq!(err, SessionError::AlreadyInProgress(CONTROLLER));
    assert_eq!(h.sequencer.pending_count(), 1);
    assert_eq!(h.sequencer.phase(), SessionPhase::Reading);

    let summary = handle.wait().await?;
    assert_eq!((summary.succeeded, summary.failed), (9, 1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_negative_ack_is_terminal() -> anyhow::Result<()> {
    let bike = controller_bike();
    bike.reject(CONTROLLER, 0x60, 0x03);
    let h = harness(&bike, SessionConfig::default());

    let summary = h.sequencer.begin(SessionKind::Read, first_ten_reads())?.wait().await?;
    assert_eq!((summary.succeeded, summary.failed), (9, 1));
    assert_eq!(summary.failures[0].reason, RequestFailure::NegativeAcknowledge);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(requests_sent(&h.mock, 0x60, 0x03), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_long_block_read_is_reassembled() -> anyhow::Result<()> {
    let bike = controller_bike();
    let h = harness(&bike, SessionConfig::default());

    let summary = h.sequencer.begin(SessionKind::Read, first_ten_reads())?.wait().await?;
    assert!(summary.is_success());

    let value = h
        .store
        .get(CONTROLLER, velocan_conv::ParameterGroup::ControllerParameter1)
        .expect("parameter block stored");
    let velocan_conv::ParameterValue::ControllerParameter1(block) = value else {
        panic!("unexpected value {:?}", value);
    };
    assert_eq!(block.system_voltage, 36);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_session() -> anyhow::Result<()> {
    let bike = controller_bike();
    bike.silence(CONTROLLER, 0x60, 0x00);
    let h = harness(&bike, SessionConfig::default());

    let finished = h.events.once_finished(CONTROLLER);
    let handle = h.sequencer.begin(SessionKind::Read, first_ten_reads())?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.sequencer.cancel());
    assert_eq!(handle.wait().await, Err(SessionError::Cancelled));
    assert!(finished.await.is_err());

    let sent = h.mock.sent_frames().len();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.mock.sent_frames().len(), sent);
    Ok(())
}
