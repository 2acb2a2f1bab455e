//! Event notifier
//!
//! Two kinds of events:
//! - data updates, delivered to every persistent listener whose filter matches
//! - operation completion, delivered once to single-shot waiters

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;
use velocan_conv::{ParameterGroup, ParameterId, ParameterValue};
use velocan_core::DeviceTarget;

use crate::error::RequestFailure;
use crate::session::SessionKind;

/// A group's value was decoded and stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataUpdate {
    pub target: DeviceTarget,
    pub group: ParameterGroup,
    /// Stored value after merging
    pub value: ParameterValue,
    /// False when the frame repeated the stored value
    pub changed: bool,
}

/// Which updates a listener wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFilter {
    All,
    Device(DeviceTarget),
    Group(DeviceTarget, ParameterGroup),
}

impl UpdateFilter {
    pub fn matches(&self, update: &DataUpdate) -> bool {
        match *self {
            UpdateFilter::All => true,
            UpdateFilter::Device(target) => update.target == target,
            UpdateFilter::Group(target, group) => update.target == target && update.group == group,
        }
    }
}

/// One request that did not succeed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterFailure {
    pub id: ParameterId,
    pub group: ParameterGroup,
    pub reason: RequestFailure,
}

/// Outcome of one bulk operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub operation_id: Uuid,
    pub target: DeviceTarget,
    pub kind: SessionKind,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ParameterFailure>,
}

impl OperationSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

struct Listener {
    filter: UpdateFilter,
    tx: mpsc::UnboundedSender<DataUpdate>,
}

/// Publish/subscribe hub for data updates and operation completion
#[derive(Default)]
pub struct EventNotifier {
    listeners: RwLock<HashMap<String, Listener>>,
    waiters: Mutex<HashMap<DeviceTarget, Vec<oneshot::Sender<OperationSummary>>>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a persistent listener under `key`.
    ///
    /// Attaching again with the same key replaces the earlier registration;
    /// its receiver is closed, so each update is delivered once per key.
    pub fn subscribe_updates(
        &self,
        key: impl Into<String>,
        filter: UpdateFilter,
    ) -> mpsc::UnboundedReceiver<DataUpdate> {
        let key = key.into();
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .listeners
            .write()
            .insert(key.clone(), Listener { filter, tx })
            .is_some()
        {
            debug!(%key, "Replaced update listener");
        }
        rx
    }

    pub fn unsubscribe_updates(&self, key: &str) -> bool {
        self.listeners.write().remove(key).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn publish_update(&self, update: &DataUpdate) {
        let mut closed = Vec::new();
        {
            let listeners = self.listeners.read();
            for (key, listener) in listeners.iter() {
                if listener.filter.matches(update) && listener.tx.send(update.clone()).is_err() {
                    closed.push(key.clone());
                }
            }
        }
        if !closed.is_empty() {
            let mut listeners = self.listeners.write();
            for key in closed {
                // only drop if still the same dead registration
                if listeners.get(&key).is_some_and(|l| l.tx.is_closed()) {
                    listeners.remove(&key);
                    debug!(%key, "Removed closed update listener");
                }
            }
        }
    }

    /// Wait for the next operation on `target` to finish.
    ///
    /// Fires at most once. If the operation is cancelled the sender is
    /// dropped and the receiver reports an error.
    pub fn once_finished(&self, target: DeviceTarget) -> oneshot::Receiver<OperationSummary> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().entry(target).or_default().push(tx);
        rx
    }

    pub fn publish_finished(&self, summary: &OperationSummary) {
        let waiters = self.waiters.lock().remove(&summary.target).unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(summary.clone());
        }
    }

    /// Drop pending completion waiters for `target`
    pub fn abandon(&self, target: DeviceTarget) {
        self.waiters.lock().remove(&target);
    }
}
