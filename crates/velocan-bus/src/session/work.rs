//! Work list construction

use tracing::warn;
use velocan_conv::{ParameterDescriptor, Registry};
use velocan_core::{CanFrame, DeviceTarget};

use crate::error::RequestFailure;
use crate::store::DeviceStateStore;

/// One request of a session.
///
/// `request` holds the frames to send, or the reason the request could not
/// be built; such items fail without being sent.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub descriptor: ParameterDescriptor,
    pub request: Result<Vec<CanFrame>, RequestFailure>,
}

impl WorkItem {
    pub fn read(descriptor: &ParameterDescriptor) -> Self {
        let id = descriptor.id;
        Self {
            descriptor: *descriptor,
            request: Ok(vec![CanFrame::read_request(id.target, id.code, id.subcode)]),
        }
    }

    pub fn write(descriptor: &ParameterDescriptor, value: &velocan_conv::ParameterValue) -> Self {
        let request = velocan_conv::encode_frames(descriptor, value)
            .map_err(|e| RequestFailure::Encode(e.to_string()));
        Self {
            descriptor: *descriptor,
            request,
        }
    }
}

/// Every readable parameter of `target`
pub fn read_work(registry: &Registry, target: DeviceTarget) -> Vec<WorkItem> {
    registry.readable(target).map(WorkItem::read).collect()
}

/// Every writable parameter of `target` that has a value in the store
pub fn write_work(registry: &Registry, store: &DeviceStateStore, target: DeviceTarget) -> Vec<WorkItem> {
    registry
        .writable(target)
        .filter_map(|descriptor| {
            let value = store.get(target, descriptor.group)?;
            let item = WorkItem::write(descriptor, &value);
            if let Err(reason) = &item.request {
                warn!(id = %descriptor.id, %reason, "Cannot encode stored value");
            }
            Some(item)
        })
        .collect()
}
