//! Transport layer for CAN communication
//!
//! This module provides transport adapters for exchanging frames with devices:
//! - Mock adapter for testing and offline development
//!
//! # Example
//!
//! ```ignore
//! use velocan_bus::transport::{create_transport, TransportAdapter};
//! use velocan_bus::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config).await?;
//! let mut inbound = transport.subscribe();
//! transport.send(&CanFrame::read_request(DeviceTarget::Display, 0x63, 0x01)).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

pub use adapter::TransportAdapter;
pub use error::TransportError;
pub use mock::MockTransportAdapter;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport adapter based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportAdapter>, TransportError> {
    match config {
        TransportConfig::Mock(cfg) => {
            let adapter = MockTransportAdapter::new(cfg);
            Ok(Arc::new(adapter))
        }
    }
}
