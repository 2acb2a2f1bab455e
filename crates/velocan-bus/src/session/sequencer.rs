//! Per-device request sequencer
//!
//! Every request gets its own task: send the frames, then sleep until the
//! deadline. A reply resolves the request and aborts that task; a deadline
//! that passes first triggers a resend or, once the retry bound is reached,
//! a permanent failure. Attempt numbers guard against stale timers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use velocan_conv::{ParameterDescriptor, ParameterId, Registry};
use velocan_core::{CanFrame, CanOperation, DeviceTarget, Packet};

use super::{OperationHandle, SessionKind, SessionPhase, WorkItem};
use crate::config::SessionConfig;
use crate::error::{RequestFailure, SessionError};
use crate::events::{DataUpdate, EventNotifier, OperationSummary, ParameterFailure};
use crate::store::DeviceStateStore;
use crate::transport::TransportAdapter;

struct PendingRequest {
    descriptor: ParameterDescriptor,
    frames: Arc<Vec<CanFrame>>,
    /// Sends started so far, the first one included
    attempts: u32,
    timer: Option<JoinHandle<()>>,
}

struct ActiveOperation {
    id: Uuid,
    kind: SessionKind,
    pending: HashMap<ParameterId, PendingRequest>,
    succeeded: usize,
    failed: usize,
    failures: Vec<ParameterFailure>,
    done: Option<oneshot::Sender<OperationSummary>>,
    started: Instant,
}

impl ActiveOperation {
    fn record_failure(&mut self, descriptor: &ParameterDescriptor, reason: RequestFailure) {
        self.failed += 1;
        self.failures.push(ParameterFailure {
            id: descriptor.id,
            group: descriptor.group,
            reason,
        });
    }

    /// Settle one pending request; false if it was not pending
    fn resolve(&mut self, id: ParameterId, outcome: Result<(), RequestFailure>) -> bool {
        let Some(mut pending) = self.pending.remove(&id) else {
            return false;
        };
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(reason) => self.record_failure(&pending.descriptor, reason),
        }
        true
    }

    fn abort_timers(&mut self) {
        for pending in self.pending.values_mut() {
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
        }
    }
}

struct Inner {
    target: DeviceTarget,
    registry: &'static Registry,
    transport: Arc<dyn TransportAdapter>,
    store: Arc<DeviceStateStore>,
    events: Arc<EventNotifier>,
    config: SessionConfig,
    operation: Mutex<Option<ActiveOperation>>,
}

/// Runs bulk reads and writes for one device.
///
/// Cheap to clone; clones share the same session. Must be used from within
/// a tokio runtime.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

impl Sequencer {
    pub fn new(
        target: DeviceTarget,
        transport: Arc<dyn TransportAdapter>,
        store: Arc<DeviceStateStore>,
        events: Arc<EventNotifier>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                target,
                registry: Registry::standard(),
                transport,
                store,
                events,
                config,
                operation: Mutex::new(None),
            }),
        }
    }

    pub fn target(&self) -> DeviceTarget {
        self.inner.target
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner
            .operation
            .lock()
            .as_ref()
            .map(|op| op.kind.into())
            .unwrap_or_default()
    }

    /// Requests still awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner
            .operation
            .lock()
            .as_ref()
            .map(|op| op.pending.len())
            .unwrap_or(0)
    }

    /// Start a bulk operation.
    ///
    /// Fails with [`SessionError::AlreadyInProgress`] if one is running; the
    /// running operation is not touched. An empty work list completes at once.
    pub fn begin(&self, kind: SessionKind, work: Vec<WorkItem>) -> Result<OperationHandle, SessionError> {
        let inner = &self.inner;
        let mut slot = inner.operation.lock();
        if slot.is_some() {
            return Err(SessionError::AlreadyInProgress(inner.target));
        }

        let id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();
        let handle = OperationHandle::new(id, inner.target, kind, done_rx);
        let mut op = ActiveOperation {
            id,
            kind,
            pending: HashMap::new(),
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            done: Some(done_tx),
            started: Instant::now(),
        };

        for item in work {
            let descriptor = item.descriptor;
            match item.request {
                Ok(frames) => {
                    op.pending.insert(
                        descriptor.id,
                        PendingRequest {
                            descriptor,
                            frames: Arc::new(frames),
                            attempts: 0,
                            timer: None,
                        },
                    );
                }
                Err(reason) => op.record_failure(&descriptor, reason),
            }
        }

        info!(
            device = %inner.target,
            operation_id = %id,
            ?kind,
            requests = op.pending.len(),
            "Session started"
        );

        if op.pending.is_empty() {
            drop(slot);
            inner.finish(op);
            return Ok(handle);
        }

        for pending in op.pending.values_mut() {
            inner.start_attempt(id, pending);
        }
        *slot = Some(op);
        Ok(handle)
    }

    /// Handle a packet sent by this device.
    ///
    /// Data packets are decoded, stored and published whether or not a
    /// session is waiting for them. Packets that do not decode, or whose
    /// triple is unknown, are dropped.
    pub fn on_packet(&self, packet: &Packet) {
        let inner = &self.inner;
        let Some(descriptor) = inner.registry.lookup(inner.target, packet.code, packet.subcode) else {
            debug!(
                device = %inner.target,
                code = packet.code,
                subcode = packet.subcode,
                "No parameter for inbound packet"
            );
            return;
        };
        let id = descriptor.id;

        match packet.operation {
            CanOperation::ErrorAck => {
                warn!(%id, "Negative acknowledgement");
                inner.resolve_pending(id, None, Err(RequestFailure::NegativeAcknowledge));
            }
            CanOperation::NormalAck => {
                debug!(%id, "Write acknowledged");
                inner.resolve_pending(id, Some(SessionKind::Write), Ok(()));
            }
            CanOperation::MultiframeWarning => {
                debug!(%id, "Device reported incomplete transfer");
                inner.retry_now(id, "multi-frame transfer rejected by device");
            }
            CanOperation::ReadCmd => {}
            _ => {
                let value = match descriptor.decode(packet) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(%id, error = %e, data = %hex::encode(&packet.data), "Discarding packet");
                        return;
                    }
                };
                let changed = inner.store.apply(inner.target, descriptor.group, value);
                if let Some(value) = inner.store.get(inner.target, descriptor.group) {
                    inner.events.publish_update(&DataUpdate {
                        target: inner.target,
                        group: descriptor.group,
                        value,
                        changed,
                    });
                }
                inner.resolve_pending(id, Some(SessionKind::Read), Ok(()));
            }
        }
    }

    /// Abandon the running operation, if any.
    ///
    /// Retry timers are aborted, completion never fires, and the handle's
    /// `wait` returns [`SessionError::Cancelled`]. Single-shot waiters for
    /// this device are dropped.
    pub fn cancel(&self) -> bool {
        let op = self.inner.operation.lock().take();
        self.inner.events.abandon(self.inner.target);
        let Some(mut op) = op else {
            return false;
        };
        op.abort_timers();
        info!(
            device = %self.inner.target,
            operation_id = %op.id,
            pending = op.pending.len(),
            "Session cancelled"
        );
        true
    }
}

impl Inner {
    fn start_attempt(self: &Arc<Self>, op_id: Uuid, pending: &mut PendingRequest) {
        pending.attempts += 1;
        let attempt = pending.attempts;
        let id = pending.descriptor.id;
        let frames = Arc::clone(&pending.frames);
        let timeout = self.config.request_timeout();
        let inner = Arc::clone(self);

        if let Some(previous) = pending.timer.take() {
            previous.abort();
        }
        pending.timer = Some(tokio::spawn(async move {
            for frame in frames.iter() {
                if let Err(e) = inner.transport.send(frame).await {
                    debug!(%id, attempt, error = %e, "Send failed");
                    inner.attempt_failed(op_id, id, attempt, RequestFailure::Transport(e.to_string()));
                    return;
                }
            }
            tokio::time::sleep(timeout).await;
            inner.attempt_failed(op_id, id, attempt, RequestFailure::Timeout { attempts: attempt });
        }));
    }

    /// An attempt ended without a reply: resend, or fail once the bound is hit
    fn attempt_failed(self: &Arc<Self>, op_id: Uuid, id: ParameterId, attempt: u32, reason: RequestFailure) {
        let finished = {
            let mut slot = self.operation.lock();
            let Some(op) = slot.as_mut().filter(|op| op.id == op_id) else {
                return;
            };
            let Some(pending) = op.pending.get_mut(&id) else {
                return;
            };
            if pending.attempts != attempt {
                return;
            }

            if attempt <= self.config.max_retries {
                debug!(%id, attempt, %reason, "Resending request");
                self.start_attempt(op_id, pending);
                return;
            }

            warn!(%id, attempts = attempt, %reason, "Request failed");
            op.resolve(id, Err(reason));
            if !op.pending.is_empty() {
                return;
            }
            slot.take()
        };
        if let Some(op) = finished {
            self.finish(op);
        }
    }

    /// Count the current attempt of `id` as failed without waiting for its deadline
    fn retry_now(self: &Arc<Self>, id: ParameterId, why: &str) {
        let current = {
            let slot = self.operation.lock();
            slot.as_ref().and_then(|op| {
                op.pending
                    .get(&id)
                    .filter(|_| op.kind == SessionKind::Write)
                    .map(|pending| (op.id, pending.attempts))
            })
        };
        if let Some((op_id, attempt)) = current {
            self.attempt_failed(op_id, id, attempt, RequestFailure::Transport(why.to_string()));
        }
    }

    /// Resolve `id` if it is pending in an operation of `kind` (any kind if `None`)
    fn resolve_pending(&self, id: ParameterId, kind: Option<SessionKind>, outcome: Result<(), RequestFailure>) {
        let finished = {
            let mut slot = self.operation.lock();
            let Some(op) = slot.as_mut() else {
                return;
            };
            if kind.is_some_and(|kind| kind != op.kind) {
                return;
            }
            if !op.resolve(id, outcome) || !op.pending.is_empty() {
                return;
            }
            slot.take()
        };
        if let Some(op) = finished {
            self.finish(op);
        }
    }

    /// Emit completion for an operation that has left the slot
    fn finish(&self, mut op: ActiveOperation) {
        let summary = OperationSummary {
            operation_id: op.id,
            target: self.target,
            kind: op.kind,
            succeeded: op.succeeded,
            failed: op.failed,
            failures: std::mem::take(&mut op.failures),
        };
        info!(
            device = %self.target,
            operation_id = %op.id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = op.started.elapsed().as_millis() as u64,
            "Session finished"
        );
        if let Some(done) = op.done.take() {
            let _ = done.send(summary.clone());
        }
        self.events.publish_finished(&summary);
    }
}
