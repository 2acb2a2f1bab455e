//! Request sequencing for bulk reads and writes
//!
//! One [`Sequencer`] per device. A session moves `Idle → Reading|Writing →
//! Idle`; while it is active a second `begin` is rejected.

mod sequencer;
mod work;

pub use sequencer::Sequencer;
pub use work::{read_work, write_work, WorkItem};

use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;
use velocan_core::DeviceTarget;

use crate::error::SessionError;
use crate::events::OperationSummary;

/// What a session does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Read,
    Write,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Reading,
    Writing,
}

impl From<SessionKind> for SessionPhase {
    fn from(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Read => SessionPhase::Reading,
            SessionKind::Write => SessionPhase::Writing,
        }
    }
}

/// Completion handle for one bulk operation
#[derive(Debug)]
pub struct OperationHandle {
    pub id: Uuid,
    pub target: DeviceTarget,
    pub kind: SessionKind,
    done: oneshot::Receiver<OperationSummary>,
}

impl OperationHandle {
    pub(crate) fn new(
        id: Uuid,
        target: DeviceTarget,
        kind: SessionKind,
        done: oneshot::Receiver<OperationSummary>,
    ) -> Self {
        Self {
            id,
            target,
            kind,
            done,
        }
    }

    /// Wait for the operation to finish
    ///
    /// Returns [`SessionError::Cancelled`] if the session was cancelled.
    pub async fn wait(self) -> Result<OperationSummary, SessionError> {
        self.done.await.map_err(|_| SessionError::Cancelled)
    }
}
