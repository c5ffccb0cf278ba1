//! Events published to the embedding daemon
//!
//! The coordinator broadcasts these over a `tokio::sync::broadcast` channel;
//! the MQTT publisher (or any other sink) subscribes and translates them.

use crate::device::IeeeAddress;

/// Coordinator events
#[derive(Debug, Clone)]
pub enum Event {
    /// A device joined (or rejoined) the network
    DeviceJoined { ieee: IeeeAddress, name: String },
    /// A device left the network
    DeviceLeft { ieee: IeeeAddress, name: String },
    /// Device interview completed successfully
    InterviewFinished { ieee: IeeeAddress, name: String },
    /// Device interview failed
    InterviewError {
        ieee: IeeeAddress,
        name: String,
        reason: String,
    },
    /// Device interview did not complete in time
    InterviewTimeout { ieee: IeeeAddress, name: String },
    /// One or more property values changed on an endpoint
    EndpointUpdated {
        ieee: IeeeAddress,
        name: String,
        endpoint_id: u8,
    },
    /// The device database was stored
    StatusUpdated {
        device_count: usize,
        permit_join: bool,
    },
    /// Permit-join state changed
    PermitJoinUpdated { enabled: bool },
}
