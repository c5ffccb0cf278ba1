//! Abstract radio adapter contract
//!
//! Concrete EZSP/ZNP drivers live in their own crates and own the serial
//! port; the coordinator only sees this trait plus a stream of
//! [`AdapterEvent`]s. Every request call submits work to the driver's I/O
//! task and returns immediately: `true` means accepted, `false` means the
//! driver refused the submission (the request is then aborted, no callback
//! will arrive).

use tokio::sync::mpsc;

use crate::device::{IeeeAddress, LogicalType};

/// Destination of a bind request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindDestination {
    /// Bind towards the coordinator itself (reporting)
    Coordinator,
    /// Bind to a group address
    Group(u16),
    /// Bind to another device endpoint
    Device {
        ieee: IeeeAddress,
        endpoint_id: u8,
    },
}

/// Destination of an extended (inter-PAN or group) data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedAddress {
    /// 16-bit short or group address (0xFFFF broadcasts)
    Short(u16),
    /// Full IEEE address
    Ieee(IeeeAddress),
}

/// Capability set the core requires from a radio driver
pub trait Adapter: Send + Sync {
    /// Driver kind, e.g. "ezsp" or "znp"
    fn kind(&self) -> &str;

    /// Firmware/stack version string
    fn version(&self) -> String;

    /// Coordinator IEEE address as reported by the radio (little-endian u64)
    fn ieee_address(&self) -> u64;

    fn data_request(
        &self,
        id: u8,
        network_address: u16,
        endpoint_id: u8,
        cluster_id: u16,
        data: &[u8],
    ) -> bool;

    #[allow(clippy::too_many_arguments)]
    fn extended_data_request(
        &self,
        id: u8,
        dst: ExtendedAddress,
        src_endpoint_id: u8,
        dst_pan_id: u16,
        dst_endpoint_id: u8,
        cluster_id: u16,
        data: &[u8],
        acknowledged: bool,
    ) -> bool;

    #[allow(clippy::too_many_arguments)]
    fn bind_request(
        &self,
        id: u8,
        network_address: u16,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        dst: &BindDestination,
        unbind: bool,
    ) -> bool;

    fn leave_request(&self, id: u8, network_address: u16, ieee: IeeeAddress) -> bool;

    fn lqi_request(&self, id: u8, network_address: u16) -> bool;

    fn node_descriptor_request(&self, id: u8, network_address: u16) -> bool;

    fn active_endpoints_request(&self, id: u8, network_address: u16) -> bool;

    fn simple_descriptor_request(&self, id: u8, network_address: u16, endpoint_id: u8) -> bool;

    fn set_permit_join(&self, enabled: bool) -> bool;

    fn set_inter_pan_channel(&self, channel: u8) -> bool;

    fn set_inter_pan_endpoint_id(&self, endpoint_id: u8) -> bool;

    fn reset_inter_pan(&self) -> bool;
}

/// Events from the radio driver, delivered in arrival order
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// The radio formed/joined its network and is ready for traffic
    CoordinatorReady,
    /// Permit-join state changed on the radio
    PermitJoinUpdated { enabled: bool },
    /// A previously submitted request completed; status 0 is success
    RequestFinished { id: u8, status: u8 },
    /// A device announced itself
    DeviceJoined {
        ieee: IeeeAddress,
        network_address: u16,
    },
    /// A device left the network
    DeviceLeft { ieee: IeeeAddress },
    /// ZDO node descriptor response
    NodeDescriptorReceived {
        network_address: u16,
        logical_type: LogicalType,
        manufacturer_code: u16,
    },
    /// ZDO active endpoints response (raw endpoint id list)
    ActiveEndpointsReceived {
        network_address: u16,
        endpoints: Vec<u8>,
    },
    /// ZDO simple descriptor response
    SimpleDescriptorReceived {
        network_address: u16,
        endpoint_id: u8,
        profile_id: u16,
        device_id: u16,
        in_clusters: Vec<u16>,
        out_clusters: Vec<u16>,
    },
    /// One record of a ZDO LQI (neighbor table) response
    NeighborRecordReceived {
        network_address: u16,
        neighbor_address: u16,
        link_quality: u8,
        first: bool,
    },
    /// An APS frame arrived for the coordinator
    MessageReceived {
        network_address: u16,
        endpoint_id: u8,
        cluster_id: u16,
        link_quality: u8,
        data: Vec<u8>,
    },
    /// An inter-PAN frame arrived (TouchLink)
    ExtendedMessageReceived {
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        link_quality: u8,
        data: Vec<u8>,
    },
}

/// Channel pair a driver uses to feed events into the coordinator
pub type AdapterEventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type AdapterEventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;
