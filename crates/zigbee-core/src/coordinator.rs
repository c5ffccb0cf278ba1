//! The coordinator event loop
//!
//! All device state lives here and is mutated by exactly one task. Adapter
//! events, API commands and timer callbacks arrive over channels and are
//! processed in arrival order; handlers never block and never await each
//! other. Work against the radio goes through the request queue: enqueue,
//! dispatch on the next tick, reconcile on the adapter's request-finished
//! callback.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use zcl::clusters::{basic_attrs, id as cluster, power_source, time_attrs};
use zcl::frame_control as fc;
use zcl::{data_type, status, GlobalCommand, ZclHeader};

use crate::adapter::{
    Adapter, AdapterEvent, AdapterEventReceiver, BindDestination, ExtendedAddress,
};
use crate::device::{Device, DeviceList, IeeeAddress, LogicalType, ZoneStatus};
use crate::events::Event;
use crate::ota::OtaServer;
use crate::persistence;
use crate::request::{RequestKind, RequestQueue, RequestStatus};
use crate::setup::{self, DeviceLibrary, Reporting};

/// Upper bound on a whole device interview
pub const DEVICE_INTERVIEW_TIMEOUT: Duration = Duration::from_secs(10);

/// Period of the neighbor (LQI) sweep over routers
pub const UPDATE_NEIGHBORS_INTERVAL: Duration = Duration::from_secs(300);

/// Debounce between an enqueue and the dispatching tick
const REQUEST_TICK_DELAY: Duration = Duration::from_millis(10);

/// Granularity of the endpoint poll scheduler
const POLL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Seconds between the Zigbee epoch (2000-01-01) and the POSIX epoch
const ZIGBEE_EPOCH_OFFSET: i64 = 946_684_800;

/// TUYA models that report a generic short code as the model name
const TUYA_MODELS: [&str; 14] = [
    "TS0001", "TS0002", "TS0004", "TS0011", "TS0012", "TS0013", "TS0014", "TS0201", "TS0202",
    "TS0203", "TS0204", "TS0205", "TS0207", "TS0601",
];

/// The short codes that are too ambiguous to keep; the manufacturer name
/// replaces them
const TUYA_SINGLE_MODELS: [&str; 6] = ["TS0001", "TS0011", "TS0201", "TS0202", "TS0207", "TS0601"];

/// Binding destination as given by the API
#[derive(Debug, Clone)]
pub enum BindingTarget {
    Group(u16),
    Device { name: String, endpoint_id: u8 },
}

/// API commands accepted by the coordinator task
pub enum Command {
    SetPermitJoin {
        enabled: bool,
    },
    SetDeviceName {
        device: String,
        name: String,
        store: bool,
    },
    RemoveDevice {
        device: String,
        force: bool,
    },
    UpdateDevice {
        device: String,
        reportings: bool,
    },
    UpdateReporting {
        device: String,
        endpoint_id: u8,
        reporting: String,
        min_interval: u16,
        max_interval: u16,
        value_change: u64,
    },
    BindingControl {
        device: String,
        endpoint_id: u8,
        cluster_id: u16,
        target: BindingTarget,
        unbind: bool,
    },
    GroupControl {
        device: String,
        endpoint_id: u8,
        group_id: u16,
        remove: bool,
    },
    RemoveAllGroups {
        device: String,
        endpoint_id: u8,
    },
    OtaUpgrade {
        device: String,
        endpoint_id: u8,
        file: PathBuf,
    },
    TouchLink {
        ieee: Option<IeeeAddress>,
        channel: u8,
        reset: bool,
    },
    DeviceAction {
        device: String,
        endpoint_id: u8,
        action: String,
        value: Value,
    },
    GroupAction {
        group_id: u16,
        action: String,
        value: Value,
    },
}

/// Timer callbacks routed back into the coordinator task
pub(crate) enum TimerEvent {
    RequestTick,
    InterviewTimeout {
        ieee: IeeeAddress,
        generation: u32,
    },
}

/// Outcome of one interview dispatch attempt
enum InterviewDispatch {
    /// A radio request is in flight; its completion re-drives the interview
    Sent,
    /// Nothing left to ask; the interview concluded
    Done,
    /// The dispatch failed and was reported
    Failed,
}

/// Cloneable front door to the coordinator task
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
}

impl CoordinatorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn send(&self, command: Command) {
        let _ = self.command_tx.send(command);
    }

    pub fn set_permit_join(&self, enabled: bool) {
        self.send(Command::SetPermitJoin { enabled });
    }

    pub fn remove_device(&self, device: impl Into<String>, force: bool) {
        self.send(Command::RemoveDevice {
            device: device.into(),
            force,
        });
    }

    pub fn device_action(
        &self,
        device: impl Into<String>,
        endpoint_id: u8,
        action: impl Into<String>,
        value: Value,
    ) {
        self.send(Command::DeviceAction {
            device: device.into(),
            endpoint_id,
            action: action.into(),
            value,
        });
    }

    pub fn ota_upgrade(&self, device: impl Into<String>, endpoint_id: u8, file: PathBuf) {
        self.send(Command::OtaUpgrade {
            device: device.into(),
            endpoint_id,
            file,
        });
    }
}

/// The coordinator core
pub struct Coordinator {
    adapter: Arc<dyn Adapter>,
    devices: DeviceList,
    library: DeviceLibrary,
    requests: RequestQueue,
    ota: OtaServer,
    database_path: PathBuf,
    properties_path: PathBuf,
    events: broadcast::Sender<Event>,
    command_rx: Option<mpsc::UnboundedReceiver<Command>>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: Option<mpsc::UnboundedReceiver<TimerEvent>>,
    tick_scheduled: bool,
    inter_pan_channel: u8,
    ready: bool,
}

impl Coordinator {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        library: DeviceLibrary,
        database_path: PathBuf,
        properties_path: PathBuf,
    ) -> (Self, CoordinatorHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let stored = persistence::load_database(&database_path);
        let mut devices = DeviceList::new();
        devices.permit_join = stored.permit_join;

        for record in &stored.devices {
            let mut device = record.restore();
            if device.interview_finished {
                library.setup_device(&mut device);
            }
            devices.insert(device);
        }

        let handle = CoordinatorHandle {
            command_tx,
            events: events.clone(),
        };

        let coordinator = Self {
            adapter,
            devices,
            library,
            requests: RequestQueue::new(),
            ota: OtaServer::default(),
            database_path,
            properties_path,
            events,
            command_rx: Some(command_rx),
            timer_tx,
            timer_rx: Some(timer_rx),
            tick_scheduled: false,
            inter_pan_channel: 0,
            ready: false,
        };

        (coordinator, handle)
    }

    /// Drive the event loop until the adapter event stream closes
    pub async fn run(mut self, mut adapter_events: AdapterEventReceiver) {
        let mut command_rx = self.command_rx.take().expect("run called twice");
        let mut timer_rx = self.timer_rx.take().expect("run called twice");

        let mut neighbors = tokio::time::interval(UPDATE_NEIGHBORS_INTERVAL);
        let mut polls = tokio::time::interval(POLL_CHECK_INTERVAL);
        neighbors.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        polls.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = adapter_events.recv() => match event {
                    Some(event) => self.handle_adapter_event(event),
                    None => {
                        tracing::info!("Adapter event stream closed, stopping");
                        break;
                    }
                },
                Some(command) = command_rx.recv() => self.handle_command(command),
                Some(timer) = timer_rx.recv() => self.handle_timer(timer),
                _ = neighbors.tick() => self.update_neighbors(),
                _ = polls.tick() => self.poll_devices(),
            }
        }
    }

    // ── Event plumbing ──────────────────────────────────────────────

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn store_database(&self) {
        if let Err(e) = persistence::store_database(&self.database_path, &self.devices) {
            tracing::warn!("Failed to store device database: {}", e);
            return;
        }

        self.emit(Event::StatusUpdated {
            device_count: self.devices.len(),
            permit_join: self.devices.permit_join,
        });
    }

    fn store_properties(&self) {
        if let Err(e) = persistence::store_properties(&self.properties_path, &self.devices) {
            tracing::warn!("Failed to store property snapshot: {}", e);
        }
    }

    fn schedule_tick(&mut self) {
        if self.tick_scheduled {
            return;
        }

        self.tick_scheduled = true;
        let tx = self.timer_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(REQUEST_TICK_DELAY).await;
            let _ = tx.send(TimerEvent::RequestTick);
        });
    }

    fn start_interview_timer(&mut self, ieee: IeeeAddress) {
        let Some(device) = self.devices.get_mut(ieee) else {
            return;
        };

        device.timer_generation = device.timer_generation.wrapping_add(1);
        device.timer_active = true;

        let generation = device.timer_generation;
        let tx = self.timer_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(DEVICE_INTERVIEW_TIMEOUT).await;
            let _ = tx.send(TimerEvent::InterviewTimeout { ieee, generation });
        });
    }

    pub(crate) fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::RequestTick => {
                self.tick_scheduled = false;
                self.handle_requests();
            }

            TimerEvent::InterviewTimeout { ieee, generation } => {
                let Some(device) = self.devices.get_mut(ieee) else {
                    return;
                };

                if !device.timer_active || device.timer_generation != generation {
                    return;
                }

                device.timer_active = false;
                let name = device.name.clone();

                tracing::warn!("Device {} interview timed out", name);
                self.emit(Event::InterviewTimeout { ieee, name });
            }
        }
    }

    // ── Request queue ───────────────────────────────────────────────

    fn enqueue(&mut self, kind: RequestKind) -> u8 {
        let name = self
            .devices
            .get(kind.ieee())
            .map(|device| device.name.clone())
            .unwrap_or_default();

        let id = self.requests.enqueue(kind, name);
        self.schedule_tick();
        id
    }

    fn enqueue_data(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        data: Vec<u8>,
        label: Option<String>,
    ) {
        self.enqueue(RequestKind::Data {
            ieee,
            endpoint_id,
            cluster_id,
            data,
            label,
        });
    }

    /// Dispatch every pending request, then prune completed ones
    pub(crate) fn handle_requests(&mut self) {
        for (id, kind, device_name) in self.requests.pending() {
            let dispatched = match &kind {
                RequestKind::Binding {
                    ieee,
                    endpoint_id,
                    cluster_id,
                    dst,
                    unbind,
                } => {
                    let submitted = self.devices.get(*ieee).is_some_and(|device| {
                        self.adapter.bind_request(
                            id,
                            device.network_address,
                            *ieee,
                            *endpoint_id,
                            *cluster_id,
                            dst,
                            *unbind,
                        )
                    });

                    if !submitted {
                        tracing::warn!(
                            "Device {} {} aborted",
                            device_name,
                            if *unbind { "unbinding" } else { "binding" }
                        );
                    }

                    submitted
                }

                RequestKind::Data {
                    ieee,
                    endpoint_id,
                    cluster_id,
                    data,
                    label,
                } => {
                    let submitted = self.devices.get(*ieee).is_some_and(|device| {
                        self.adapter.data_request(
                            id,
                            device.network_address,
                            *endpoint_id,
                            *cluster_id,
                            data,
                        )
                    });

                    if !submitted {
                        tracing::warn!(
                            "Device {} {} aborted",
                            device_name,
                            label.as_deref().unwrap_or("data request")
                        );
                    }

                    submitted
                }

                RequestKind::Remove { ieee } => {
                    let submitted = self.devices.get(*ieee).is_some_and(|device| {
                        self.adapter
                            .leave_request(id, device.network_address, *ieee)
                    });

                    if !submitted {
                        tracing::warn!("Device {} leave request aborted", device_name);
                    }

                    submitted
                }

                RequestKind::Lqi { ieee } => self.devices.get(*ieee).is_some_and(|device| {
                    self.adapter.lqi_request(id, device.network_address)
                }),

                RequestKind::Interview { ieee } => match self.interview_request(id, *ieee) {
                    InterviewDispatch::Sent => true,
                    InterviewDispatch::Done => {
                        // No radio call went out, so no callback will come;
                        // retire the entry here
                        self.requests.set_status(id, RequestStatus::Finished);
                        continue;
                    }
                    InterviewDispatch::Failed => false,
                },
            };

            self.requests.set_status(
                id,
                if dispatched {
                    RequestStatus::Sent
                } else {
                    RequestStatus::Aborted
                },
            );
        }

        self.requests.prune();
    }

    fn request_finished(&mut self, id: u8, request_status: u8) {
        let Some(request) = self.requests.get(id) else {
            return;
        };

        if request.status == RequestStatus::Finished {
            return;
        }

        let device_name = request.device_name.clone();
        let kind = request.kind.clone();

        match kind {
            RequestKind::Binding {
                endpoint_id,
                cluster_id,
                dst,
                unbind,
                ..
            } => {
                let verb = if unbind { "unbinding" } else { "binding" };

                if request_status != 0 {
                    tracing::warn!(
                        "Device {} endpoint {:#04X} cluster {:#06X} {} failed, status code: {:02X}",
                        device_name,
                        endpoint_id,
                        cluster_id,
                        verb,
                        request_status
                    );
                } else if dst != BindDestination::Coordinator {
                    tracing::info!("Device {} {} finished successfully", device_name, verb);
                }
            }

            RequestKind::Data { label, .. } => {
                let label = label.as_deref().unwrap_or("data request");

                if request_status != 0 {
                    tracing::warn!(
                        "Device {} {} failed, status code: {:02X}",
                        device_name,
                        label,
                        request_status
                    );
                } else if label != "data request" {
                    tracing::info!("Device {} {} finished successfully", device_name, label);
                }
            }

            RequestKind::Remove { ieee } => {
                if request_status != 0 {
                    tracing::warn!(
                        "Device {} leave request failed, status code: {:02X}",
                        device_name,
                        request_status
                    );
                } else if self.devices.get(ieee).is_some_and(|device| !device.removed) {
                    tracing::info!("Device {} removed", device_name);

                    if let Some(device) = self.devices.get_mut(ieee) {
                        device.removed = true;
                    }

                    self.devices.remove(ieee);
                    self.store_database();
                }
            }

            RequestKind::Lqi { .. } | RequestKind::Interview { .. } => {}
        }

        self.requests.set_status(id, RequestStatus::Finished);
    }

    // ── Adapter events ──────────────────────────────────────────────

    pub(crate) fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::CoordinatorReady => self.coordinator_ready(),
            AdapterEvent::PermitJoinUpdated { enabled } => self.permit_join_updated(enabled),
            AdapterEvent::RequestFinished { id, status } => self.request_finished(id, status),
            AdapterEvent::DeviceJoined {
                ieee,
                network_address,
            } => self.device_joined(ieee, network_address),
            AdapterEvent::DeviceLeft { ieee } => self.device_left(ieee),
            AdapterEvent::NodeDescriptorReceived {
                network_address,
                logical_type,
                manufacturer_code,
            } => self.node_descriptor_received(network_address, logical_type, manufacturer_code),
            AdapterEvent::ActiveEndpointsReceived {
                network_address,
                endpoints,
            } => self.active_endpoints_received(network_address, &endpoints),
            AdapterEvent::SimpleDescriptorReceived {
                network_address,
                endpoint_id,
                profile_id,
                device_id,
                in_clusters,
                out_clusters,
            } => self.simple_descriptor_received(
                network_address,
                endpoint_id,
                profile_id,
                device_id,
                in_clusters,
                out_clusters,
            ),
            AdapterEvent::NeighborRecordReceived {
                network_address,
                neighbor_address,
                link_quality,
                first,
            } => self.neighbor_record_received(network_address, neighbor_address, link_quality, first),
            AdapterEvent::MessageReceived {
                network_address,
                endpoint_id,
                cluster_id,
                link_quality,
                data,
            } => self.message_received(network_address, endpoint_id, cluster_id, link_quality, &data),
            AdapterEvent::ExtendedMessageReceived {
                ieee,
                endpoint_id,
                cluster_id,
                data,
                ..
            } => self.extended_message_received(ieee, endpoint_id, cluster_id, &data),
        }
    }

    fn coordinator_ready(&mut self) {
        // The radio reports its address little-endian; the registry keys on
        // the network-order form, same as joining devices announce
        let ieee = IeeeAddress(self.adapter.ieee_address().to_be_bytes());

        tracing::info!("Coordinator ready, address: {}", ieee);

        self.devices.evict_coordinator(ieee);

        let mut device = Device::new(ieee, 0x0000);
        device.name = "Coordinator".into();
        device.logical_type = LogicalType::Coordinator;
        device.interview_finished = true;
        device.descriptor_received = true;
        device.endpoints_received = true;
        self.devices.insert(device);

        self.devices.adapter_kind = self.adapter.kind().to_string();
        self.devices.adapter_version = self.adapter.version();
        self.ready = true;

        if !self.requests.is_empty() {
            self.schedule_tick();
        }

        self.adapter.set_permit_join(self.devices.permit_join);
        self.store_database();
    }

    fn permit_join_updated(&mut self, enabled: bool) {
        self.devices.permit_join = enabled;
        self.store_database();
        self.emit(Event::PermitJoinUpdated { enabled });
    }

    fn device_joined(&mut self, ieee: IeeeAddress, network_address: u16) {
        let created = !self.devices.contains(ieee);

        if created {
            tracing::info!(
                "Device {} joined network with address {:#06X}",
                ieee,
                network_address
            );
            self.devices.insert(Device::new(ieee, network_address));
        }

        let mut rekeyed = false;
        let (name, needs_interview) = {
            let device = self.devices.get_mut(ieee).expect("present");

            if device.removed {
                device.removed = false;
            }

            if !created {
                tracing::info!(
                    "Device {} rejoined network with address {:#06X}",
                    device.name,
                    network_address
                );
            }

            device.update_last_seen();

            if device.network_address != network_address {
                if !created {
                    tracing::info!("Device {} network address updated", device.name);
                }
                device.network_address = network_address;
                rekeyed = true;
            }

            (
                device.name.clone(),
                !device.interview_finished && !device.timer_active,
            )
        };

        if created || rekeyed {
            self.store_database();
        }

        if needs_interview {
            tracing::info!("Device {} interview started...", name);
            self.interview_device(ieee);
        }

        self.emit(Event::DeviceJoined { ieee, name });
    }

    fn device_left(&mut self, ieee: IeeeAddress) {
        let Some(device) = self.devices.get_mut(ieee) else {
            return;
        };

        if device.removed {
            return;
        }

        device.timer_active = false;
        device.removed = true;
        let name = device.name.clone();

        tracing::info!("Device {} left network", name);
        self.emit(Event::DeviceLeft { ieee, name });

        self.devices.remove(ieee);
        self.store_database();
    }

    fn node_descriptor_received(
        &mut self,
        network_address: u16,
        logical_type: LogicalType,
        manufacturer_code: u16,
    ) {
        let Some(ieee) = self.devices.ieee_by_network(network_address) else {
            return;
        };

        {
            let device = self.devices.get_mut(ieee).expect("present");

            tracing::info!(
                "Device {} node descriptor received, manufacturer code is {:#06X} and logical type is {:?}",
                device.name,
                manufacturer_code,
                logical_type
            );

            device.logical_type = logical_type;
            device.manufacturer_code = manufacturer_code;
            device.descriptor_received = true;
            device.update_last_seen();
        }

        self.interview_device(ieee);
    }

    fn active_endpoints_received(&mut self, network_address: u16, endpoints: &[u8]) {
        let Some(ieee) = self.devices.ieee_by_network(network_address) else {
            return;
        };

        {
            let device = self.devices.get_mut(ieee).expect("present");

            for endpoint_id in endpoints {
                device.endpoint(*endpoint_id);
            }

            tracing::info!(
                "Device {} active endpoints received: {:02X?}",
                device.name,
                endpoints
            );

            device.endpoints_received = true;
            device.update_last_seen();
        }

        self.interview_device(ieee);
    }

    fn simple_descriptor_received(
        &mut self,
        network_address: u16,
        endpoint_id: u8,
        profile_id: u16,
        device_id: u16,
        in_clusters: Vec<u16>,
        out_clusters: Vec<u16>,
    ) {
        let Some(ieee) = self.devices.ieee_by_network(network_address) else {
            return;
        };

        {
            let device = self.devices.get_mut(ieee).expect("present");

            // Some stacks answer with endpoint 0; fall back to the endpoint
            // the interview asked about
            let endpoint_id = if endpoint_id != 0 {
                endpoint_id
            } else {
                device.interview_endpoint_id
            };

            let name = device.name.clone();
            let endpoint = device.endpoint(endpoint_id);

            tracing::info!(
                "Device {} endpoint {:#04X} simple descriptor received",
                name,
                endpoint_id
            );

            endpoint.profile_id = profile_id;
            endpoint.device_id = device_id;
            endpoint.in_clusters = in_clusters;
            endpoint.out_clusters = out_clusters;
            endpoint.descriptor_received = true;

            device.update_last_seen();
        }

        self.interview_device(ieee);
    }

    fn neighbor_record_received(
        &mut self,
        network_address: u16,
        neighbor_address: u16,
        link_quality: u8,
        first: bool,
    ) {
        let Some(ieee) = self.devices.ieee_by_network(network_address) else {
            return;
        };

        let device = self.devices.get_mut(ieee).expect("present");

        if first {
            tracing::info!("Device {} neighbors list received", device.name);
            device.neighbors.clear();
        }

        device.neighbors.insert(neighbor_address, link_quality);
        device.update_last_seen();
    }

    fn extended_message_received(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        data: &[u8],
    ) {
        if cluster_id == cluster::TOUCHLINK && data.len() > 2 && data[2] == 0x01 {
            tracing::info!(
                "TouchLink scan response received from device {} at channel {}",
                ieee,
                self.inter_pan_channel
            );
            return;
        }

        tracing::warn!(
            "Unrecognized extended message received from {} endpoint {:#04X} cluster {:#06X} with payload: {:02X?}",
            ieee,
            endpoint_id,
            cluster_id,
            data
        );
    }

    // ── Message dispatch ────────────────────────────────────────────

    fn message_received(
        &mut self,
        network_address: u16,
        endpoint_id: u8,
        cluster_id: u16,
        link_quality: u8,
        data: &[u8],
    ) {
        let Some(ieee) = self.devices.ieee_by_network(network_address) else {
            tracing::debug!(
                "Message from unknown network address {:#06X} dropped",
                network_address
            );
            return;
        };

        let Ok((header, offset)) = ZclHeader::decode(data) else {
            tracing::warn!(
                "Malformed ZCL frame received from {:#06X}: {:02X?}",
                network_address,
                data
            );
            return;
        };

        let payload = &data[offset..];

        if let Some(device) = self.devices.get_mut(ieee) {
            device.endpoint(endpoint_id);
        }

        if header.frame_control & fc::CLUSTER_SPECIFIC != 0 {
            self.cluster_command_received(
                ieee,
                endpoint_id,
                cluster_id,
                header.transaction_id,
                header.command_id,
                payload,
            );
        } else {
            self.global_command_received(
                ieee,
                endpoint_id,
                cluster_id,
                header.transaction_id,
                header.command_id,
                payload,
            );
        }

        let Some(device) = self.devices.get_mut(ieee) else {
            return;
        };

        device.link_quality = link_quality;
        device.update_last_seen();
        let name = device.name.clone();

        let updated = device
            .endpoints
            .get_mut(&endpoint_id)
            .map(|endpoint| std::mem::take(&mut endpoint.updated))
            .unwrap_or(false);

        if updated {
            self.store_properties();
            self.emit(Event::EndpointUpdated {
                ieee,
                name,
                endpoint_id,
            });
        }

        let wants_default_response = (header.frame_control & fc::CLUSTER_SPECIFIC != 0
            || header.command_id == GlobalCommand::ReportAttributes as u8)
            && header.frame_control & fc::DISABLE_DEFAULT_RESPONSE == 0;

        if wants_default_response {
            let mut frame = ZclHeader::global(
                fc::SERVER_TO_CLIENT | fc::DISABLE_DEFAULT_RESPONSE,
                header.transaction_id,
                GlobalCommand::DefaultResponse,
            )
            .encode();
            frame.push(header.command_id);
            frame.push(status::SUCCESS);

            self.enqueue_data(ieee, endpoint_id, cluster_id, frame, None);
        }
    }

    fn global_command_received(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        transaction_id: u8,
        command_id: u8,
        payload: &[u8],
    ) {
        match command_id {
            id if id == GlobalCommand::ConfigureReportingResponse as u8
                || id == GlobalCommand::DefaultResponse as u8 => {}

            id if id == GlobalCommand::ReadAttributes as u8 => {
                self.read_attributes_received(ieee, endpoint_id, cluster_id, transaction_id, payload);
            }

            id if id == GlobalCommand::ReadAttributesResponse as u8
                || id == GlobalCommand::ReportAttributes as u8 => {
                let with_status = id == GlobalCommand::ReadAttributesResponse as u8;
                let mut cursor = payload;

                while cursor.len() > 2 {
                    let attribute_id = u16::from_le_bytes([cursor[0], cursor[1]]);

                    let (data_type, offset) = if with_status {
                        if cursor[2] != 0 {
                            cursor = &cursor[3..];
                            continue;
                        }

                        if cursor.len() < 4 {
                            return;
                        }

                        (cursor[3], 4usize)
                    } else {
                        (cursor[2], 3usize)
                    };

                    let Ok(advance) = zcl::data_size(data_type, &cursor[offset..]) else {
                        let device_name = self
                            .devices
                            .get(ieee)
                            .map(|d| d.name.clone())
                            .unwrap_or_default();
                        tracing::warn!(
                            "Unrecognized attribute {:#06X} data type {:#04X} received from device {} endpoint {:#04X} cluster {:#06X}",
                            attribute_id,
                            data_type,
                            device_name,
                            endpoint_id,
                            cluster_id
                        );
                        return;
                    };

                    let data =
                        cursor[offset + advance.skip..offset + advance.total()].to_vec();

                    self.parse_attribute(
                        ieee,
                        endpoint_id,
                        cluster_id,
                        attribute_id,
                        data_type,
                        &data,
                    );

                    cursor = &cursor[offset + advance.total()..];
                }
            }

            id if id == GlobalCommand::WriteAttributesResponse as u8 => {
                if cluster_id == cluster::IAS_ZONE && payload.first() == Some(&0) {
                    if let Some(device) = self.devices.get_mut(ieee) {
                        device.endpoint(endpoint_id).zone_status = ZoneStatus::Enroll;
                    }

                    self.interview_device(ieee);
                }
            }

            _ => {
                let device_name = self
                    .devices
                    .get(ieee)
                    .map(|d| d.name.clone())
                    .unwrap_or_default();
                tracing::warn!(
                    "Unrecognized command {:#04X} received from device {} endpoint {:#04X} cluster {:#06X} with payload: {:02X?}",
                    command_id,
                    device_name,
                    endpoint_id,
                    cluster_id,
                    payload
                );
            }
        }
    }

    /// Answer an incoming Read-Attributes; only the Time cluster is served,
    /// everything else gets UnsupportedAttribute per attribute
    fn read_attributes_received(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        transaction_id: u8,
        payload: &[u8],
    ) {
        let device_name = self
            .devices
            .get(ieee)
            .map(|d| d.name.clone())
            .unwrap_or_default();

        let mut response = ZclHeader::global(
            fc::SERVER_TO_CLIENT | fc::DISABLE_DEFAULT_RESPONSE,
            transaction_id,
            GlobalCommand::ReadAttributesResponse,
        )
        .encode();

        let now = chrono::Local::now();
        let utc = now.timestamp() - ZIGBEE_EPOCH_OFFSET;
        let offset = i64::from(now.offset().local_minus_utc());

        for chunk in payload.chunks_exact(2) {
            let attribute_id = u16::from_le_bytes([chunk[0], chunk[1]]);
            response.extend_from_slice(chunk);

            if cluster_id == cluster::TIME {
                match attribute_id {
                    time_attrs::UTC_TIME => {
                        tracing::info!("Device {} requested UTC time", device_name);
                        response.push(status::SUCCESS);
                        response.push(data_type::UTC_TIME);
                        response.extend_from_slice(&(utc as u32).to_le_bytes());
                        continue;
                    }

                    time_attrs::TIME_ZONE => {
                        tracing::info!("Device {} requested time zone", device_name);
                        response.push(status::SUCCESS);
                        response.push(data_type::SIGNED_32BIT);
                        response.extend_from_slice(&(offset as i32).to_le_bytes());
                        continue;
                    }

                    time_attrs::LOCAL_TIME => {
                        tracing::info!("Device {} requested local time", device_name);
                        response.push(status::SUCCESS);
                        response.push(data_type::UNSIGNED_32BIT);
                        response.extend_from_slice(&((utc + offset) as u32).to_le_bytes());
                        continue;
                    }

                    _ => {}
                }
            }

            tracing::warn!(
                "Device {} requested unrecognized attribute {:#06X} from cluster {:#06X}",
                device_name,
                attribute_id,
                cluster_id
            );
            response.push(status::UNSUPPORTED_ATTRIBUTE);
        }

        self.enqueue_data(ieee, endpoint_id, cluster_id, response, None);
    }

    fn cluster_command_received(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        transaction_id: u8,
        command_id: u8,
        payload: &[u8],
    ) {
        let Some(device) = self.devices.get(ieee) else {
            return;
        };

        if !device.interview_finished {
            return;
        }

        let device_name = device.name.clone();

        if cluster_id == cluster::GROUPS {
            self.group_response_received(&device_name, endpoint_id, command_id, payload);
            return;
        }

        if cluster_id == cluster::OTA_UPGRADE {
            if let Some(reply) = self.ota.handle_command(&device_name, command_id, payload) {
                let mut frame = ZclHeader::new(
                    fc::CLUSTER_SPECIFIC | fc::SERVER_TO_CLIENT | fc::DISABLE_DEFAULT_RESPONSE,
                    transaction_id,
                    reply.command_id,
                )
                .encode();
                frame.extend_from_slice(&reply.payload);

                self.enqueue_data(ieee, endpoint_id, cluster_id, frame, None);
            }
            return;
        }

        let Some(device) = self.devices.get_mut(ieee) else {
            return;
        };
        let Some(endpoint) = device.endpoints.get_mut(&endpoint_id) else {
            return;
        };

        let mut check = false;

        for property in &mut endpoint.properties {
            if property.cluster_id() != cluster_id {
                continue;
            }

            let before = property.value().clone();
            property.parse_command(command_id, payload);
            check = true;

            if *property.value() != before {
                endpoint.updated = true;
            }
        }

        if !check {
            tracing::warn!(
                "No property found for device {} endpoint {:#04X} cluster {:#06X} command {:#04X} with payload: {:02X?}",
                device_name,
                endpoint_id,
                cluster_id,
                command_id,
                payload
            );
        }
    }

    fn group_response_received(
        &mut self,
        device_name: &str,
        endpoint_id: u8,
        command_id: u8,
        payload: &[u8],
    ) {
        match command_id {
            0x00 | 0x03 => {
                if payload.len() < 3 {
                    return;
                }

                let response_status = payload[0];
                let group_id = u16::from_le_bytes([payload[1], payload[2]]);
                let verb = if command_id == 0x03 { "removed" } else { "added" };

                match response_status {
                    status::SUCCESS => tracing::info!(
                        "Device {} endpoint {:#04X} group {} successfully {}",
                        device_name,
                        endpoint_id,
                        group_id,
                        verb
                    ),
                    status::INSUFFICIENT_SPACE => tracing::warn!(
                        "Device {} endpoint {:#04X} group {} not added, no free space available",
                        device_name,
                        endpoint_id,
                        group_id
                    ),
                    status::DUPLICATE_EXISTS => tracing::warn!(
                        "Device {} endpoint {:#04X} group {} already exists",
                        device_name,
                        endpoint_id,
                        group_id
                    ),
                    status::NOT_FOUND => tracing::warn!(
                        "Device {} endpoint {:#04X} group {} not found",
                        device_name,
                        endpoint_id,
                        group_id
                    ),
                    other => tracing::warn!(
                        "Device {} endpoint {:#04X} group {} command status {:#04X} unrecognized",
                        device_name,
                        endpoint_id,
                        group_id,
                        other
                    ),
                }
            }

            _ => tracing::warn!(
                "Unrecognized group control command {:#04X} received from device {} with payload: {:02X?}",
                command_id,
                device_name,
                payload
            ),
        }
    }

    // ── Attribute decoding ──────────────────────────────────────────

    fn parse_attribute(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        attribute_id: u16,
        data_type: u8,
        data: &[u8],
    ) {
        if cluster_id == cluster::BASIC {
            self.parse_basic_attribute(ieee, attribute_id, data_type, data);
            return;
        }

        if cluster_id == cluster::IAS_ZONE
            && (attribute_id == 0x0000 || attribute_id == 0x0010)
        {
            self.parse_ias_attribute(ieee, endpoint_id, attribute_id, data_type, data);
            return;
        }

        let Some(device) = self.devices.get_mut(ieee) else {
            return;
        };

        if !device.interview_finished {
            return;
        }

        let device_name = device.name.clone();
        let Some(endpoint) = device.endpoints.get_mut(&endpoint_id) else {
            return;
        };

        let mut check = false;

        for property in &mut endpoint.properties {
            if property.cluster_id() != cluster_id {
                continue;
            }

            let before = property.value().clone();
            property.parse_attribute(attribute_id, data_type, data);
            check = true;

            if *property.value() != before {
                endpoint.updated = true;
            }
        }

        if !check {
            tracing::warn!(
                "No property found for device {} endpoint {:#04X} cluster {:#06X} attribute {:#06X} with data type {:#04X} and data {:02X?}",
                device_name,
                endpoint_id,
                cluster_id,
                attribute_id,
                data_type,
                data
            );
        }
    }

    fn parse_basic_attribute(
        &mut self,
        ieee: IeeeAddress,
        attribute_id: u16,
        data_type: u8,
        data: &[u8],
    ) {
        let mut lumi_early_finish = false;

        {
            let Some(device) = self.devices.get_mut(ieee) else {
                return;
            };

            match attribute_id {
                basic_attrs::APPLICATION_VERSION => {
                    if data_type != data_type::UNSIGNED_8BIT || data.is_empty() {
                        return;
                    }

                    device.firmware_version = data[0];
                }

                basic_attrs::MANUFACTURER_NAME => {
                    if data_type != data_type::CHARACTER_STRING {
                        return;
                    }

                    device.manufacturer_name =
                        String::from_utf8_lossy(data).trim().to_string();
                }

                basic_attrs::MODEL_IDENTIFIER => {
                    if data_type != data_type::CHARACTER_STRING {
                        return;
                    }

                    device.model_name = String::from_utf8_lossy(data).trim().to_string();

                    // Some LUMI sensors announce only the model name and
                    // never answer further Basic reads
                    if device.manufacturer_name.is_empty()
                        && device.model_name.starts_with("lumi.sensor")
                    {
                        device.power_source = power_source::BATTERY;
                        device.manufacturer_name = "LUMI".into();
                        lumi_early_finish = true;
                    }
                }

                basic_attrs::POWER_SOURCE => {
                    if (data_type != data_type::UNSIGNED_8BIT
                        && data_type != data_type::ENUM_8BIT)
                        || data.is_empty()
                    {
                        return;
                    }

                    device.power_source = data[0];
                }

                _ => {}
            }
        }

        if lumi_early_finish {
            self.interview_finished(ieee);
            return;
        }

        let identified = {
            let device = self.devices.get(ieee).expect("present");
            !device.interview_finished
                && !device.manufacturer_name.is_empty()
                && !device.model_name.is_empty()
                && (attribute_id == basic_attrs::MANUFACTURER_NAME
                    || attribute_id == basic_attrs::MODEL_IDENTIFIER)
        };

        if identified {
            let device = self.devices.get_mut(ieee).expect("present");

            if TUYA_MODELS.contains(&device.model_name.as_str()) {
                // The short code is ambiguous across whole product families;
                // the manufacturer name is the real discriminator
                if TUYA_SINGLE_MODELS.contains(&device.model_name.as_str()) {
                    device.model_name = device.manufacturer_name.clone();
                }

                device.manufacturer_name = "TUYA".into();
            }

            self.interview_device(ieee);
        }
    }

    fn parse_ias_attribute(
        &mut self,
        ieee: IeeeAddress,
        endpoint_id: u8,
        attribute_id: u16,
        data_type: u8,
        data: &[u8],
    ) {
        match attribute_id {
            0x0000 => {
                if data_type != data_type::ENUM_8BIT || data.is_empty() {
                    return;
                }

                if let Some(device) = self.devices.get_mut(ieee) {
                    device.endpoint(endpoint_id).zone_status = if data[0] != 0 {
                        ZoneStatus::Enrolled
                    } else {
                        ZoneStatus::Enroll
                    };
                }
            }

            0x0010 => {
                if data_type != data_type::IEEE_ADDRESS || data.len() != 8 {
                    return;
                }

                let ours = self.adapter.ieee_address().to_le_bytes();

                if let Some(device) = self.devices.get_mut(ieee) {
                    if data != &ours[..] {
                        device.endpoint(endpoint_id).zone_status = ZoneStatus::SetAddress;
                    }
                }

                self.interview_device(ieee);
            }

            _ => {}
        }
    }

    // ── Interview ───────────────────────────────────────────────────

    fn interview_device(&mut self, ieee: IeeeAddress) {
        let finished = self
            .devices
            .get(ieee)
            .map_or(true, |device| device.interview_finished);

        if finished {
            return;
        }

        // At most one outstanding interview per device
        if !self.requests.has_interview(ieee) {
            self.enqueue(RequestKind::Interview { ieee });
        }

        self.start_interview_timer(ieee);
    }

    fn interview_request(&mut self, id: u8, ieee: IeeeAddress) -> InterviewDispatch {
        struct IasPhase {
            endpoint_id: u8,
            zone_status: ZoneStatus,
        }

        let Some(device) = self.devices.get(ieee) else {
            return InterviewDispatch::Failed;
        };

        let device_name = device.name.clone();
        let network_address = device.network_address;
        let identified =
            !device.manufacturer_name.is_empty() && !device.model_name.is_empty();

        if !identified {
            if !device.descriptor_received {
                if self.adapter.node_descriptor_request(id, network_address) {
                    return InterviewDispatch::Sent;
                }

                self.interview_error(ieee, "node descriptor request failed");
                return InterviewDispatch::Failed;
            }

            if !device.endpoints_received {
                if self.adapter.active_endpoints_request(id, network_address) {
                    return InterviewDispatch::Sent;
                }

                self.interview_error(ieee, "active endpoints request failed");
                return InterviewDispatch::Failed;
            }

            if let Some(endpoint_id) = device
                .endpoints
                .values()
                .find(|endpoint| !endpoint.descriptor_received)
                .map(|endpoint| endpoint.id)
            {
                self.devices
                    .get_mut(ieee)
                    .expect("present")
                    .interview_endpoint_id = endpoint_id;

                if self
                    .adapter
                    .simple_descriptor_request(id, network_address, endpoint_id)
                {
                    return InterviewDispatch::Sent;
                }

                self.interview_error(
                    ieee,
                    &format!("endpoint {endpoint_id:#04X} simple descriptor request failed"),
                );
                return InterviewDispatch::Failed;
            }

            let basic_endpoint = device
                .endpoints
                .values()
                .find(|endpoint| endpoint.in_clusters.contains(&cluster::BASIC))
                .map(|endpoint| endpoint.id);

            if let Some(endpoint_id) = basic_endpoint {
                let request = attributes_request(
                    id,
                    &[
                        basic_attrs::APPLICATION_VERSION,
                        basic_attrs::MANUFACTURER_NAME,
                        basic_attrs::MODEL_IDENTIFIER,
                        basic_attrs::POWER_SOURCE,
                    ],
                    0,
                );

                if self
                    .adapter
                    .data_request(id, network_address, endpoint_id, cluster::BASIC, &request)
                {
                    return InterviewDispatch::Sent;
                }

                self.interview_error(ieee, "read basic attributes request failed");
                return InterviewDispatch::Failed;
            }

            self.interview_error(ieee, "device has empty manufacturer name or model name");
            return InterviewDispatch::Failed;
        }

        let ias_phases: Vec<IasPhase> = device
            .endpoints
            .values()
            .filter(|endpoint| endpoint.in_clusters.contains(&cluster::IAS_ZONE))
            .map(|endpoint| IasPhase {
                endpoint_id: endpoint.id,
                zone_status: endpoint.zone_status,
            })
            .collect();

        for phase in ias_phases {
            match phase.zone_status {
                ZoneStatus::Unknown => {
                    let request = attributes_request(id, &[0x0000, 0x0010], 0);

                    if self.adapter.data_request(
                        id,
                        network_address,
                        phase.endpoint_id,
                        cluster::IAS_ZONE,
                        &request,
                    ) {
                        return InterviewDispatch::Sent;
                    }

                    self.interview_error(ieee, "read current IAS zone status request failed");
                    return InterviewDispatch::Failed;
                }

                ZoneStatus::SetAddress => {
                    let mut request = ZclHeader::global(
                        fc::DISABLE_DEFAULT_RESPONSE,
                        id,
                        GlobalCommand::WriteAttributes,
                    )
                    .encode();
                    request.extend_from_slice(&0x0010u16.to_le_bytes());
                    request.push(data_type::IEEE_ADDRESS);
                    request.extend_from_slice(&self.adapter.ieee_address().to_le_bytes());

                    if self.adapter.data_request(
                        id,
                        network_address,
                        phase.endpoint_id,
                        cluster::IAS_ZONE,
                        &request,
                    ) {
                        return InterviewDispatch::Sent;
                    }

                    self.interview_error(ieee, "write IAS zone CIE address request failed");
                    return InterviewDispatch::Failed;
                }

                ZoneStatus::Enroll => {
                    // Zone enroll response: success, arbitrary zone id
                    let mut enroll =
                        ZclHeader::new(
                            fc::CLUSTER_SPECIFIC | fc::DISABLE_DEFAULT_RESPONSE,
                            id,
                            0x00,
                        )
                        .encode();
                    enroll.push(0x00);
                    enroll.push(0x42);

                    let readback = attributes_request(id, &[0x0000, 0x0010], 0);

                    if self.adapter.data_request(
                        id,
                        network_address,
                        phase.endpoint_id,
                        cluster::IAS_ZONE,
                        &enroll,
                    ) && self.adapter.data_request(
                        id,
                        network_address,
                        phase.endpoint_id,
                        cluster::IAS_ZONE,
                        &readback,
                    ) {
                        return InterviewDispatch::Sent;
                    }

                    self.interview_error(ieee, "enroll IAS zone request failed");
                    return InterviewDispatch::Failed;
                }

                ZoneStatus::Enrolled => {
                    tracing::info!(
                        "Device {} endpoint {:#04X} IAS zone enrolled",
                        device_name,
                        phase.endpoint_id
                    );
                }
            }
        }

        self.interview_finished(ieee);
        InterviewDispatch::Done
    }

    fn interview_finished(&mut self, ieee: IeeeAddress) {
        {
            let Some(device) = self.devices.get_mut(ieee) else {
                return;
            };

            tracing::info!(
                "Device {} manufacturer name is {:?} and model name is {:?}",
                device.name,
                device.manufacturer_name,
                device.model_name
            );
        }

        self.library
            .setup_device(self.devices.get_mut(ieee).expect("present"));

        let (name, description, reportings) = {
            let device = self.devices.get(ieee).expect("present");
            let reportings: Vec<(u8, Reporting)> = device
                .endpoints
                .values()
                .flat_map(|endpoint| {
                    endpoint
                        .reportings
                        .iter()
                        .map(|reporting| (endpoint.id, reporting.clone()))
                })
                .collect();

            (device.name.clone(), device.description.clone(), reportings)
        };

        if !description.is_empty() {
            tracing::info!("Device {} identified as {}", name, description);
        }

        for (endpoint_id, reporting) in reportings {
            self.configure_reporting(ieee, endpoint_id, &reporting);
        }

        tracing::info!("Device {} interview finished successfully", name);
        self.emit(Event::InterviewFinished { ieee, name });

        {
            let device = self.devices.get_mut(ieee).expect("present");
            device.timer_active = false;
            device.interview_finished = true;
        }

        self.store_database();
    }

    fn interview_error(&mut self, ieee: IeeeAddress, reason: &str) {
        let Some(device) = self.devices.get_mut(ieee) else {
            return;
        };

        // A fired timeout already surfaced the failure
        if !device.timer_active {
            return;
        }

        device.timer_active = false;
        let name = device.name.clone();

        tracing::warn!("Device {} interview error: {}", name, reason);
        self.emit(Event::InterviewError {
            ieee,
            name,
            reason: reason.to_string(),
        });
    }

    fn configure_reporting(&mut self, ieee: IeeeAddress, endpoint_id: u8, reporting: &Reporting) {
        self.enqueue(RequestKind::Binding {
            ieee,
            endpoint_id,
            cluster_id: reporting.cluster_id,
            dst: BindDestination::Coordinator,
            unbind: false,
        });

        let transaction_id = self.requests.current_id();
        let mut request = ZclHeader::global(
            0x00,
            transaction_id,
            GlobalCommand::ConfigureReporting,
        )
        .encode();

        for attribute_id in &reporting.attributes {
            request.push(0x00); // direction: reported
            request.extend_from_slice(&attribute_id.to_le_bytes());
            request.push(reporting.data_type);
            request.extend_from_slice(&reporting.min_interval.to_le_bytes());
            request.extend_from_slice(&reporting.max_interval.to_le_bytes());

            // The reportable-change field is sized by the attribute type
            let size = zcl::types::fixed_size(reporting.data_type).unwrap_or(0);
            request.extend_from_slice(&reporting.value_change.to_le_bytes()[..size]);
        }

        self.enqueue_data(
            ieee,
            endpoint_id,
            reporting.cluster_id,
            request,
            Some(format!("{} reporting configuration", reporting.name)),
        );
    }

    // ── Housekeeping ────────────────────────────────────────────────

    fn update_neighbors(&mut self) {
        if !self.ready {
            return;
        }

        let targets: Vec<IeeeAddress> = self
            .devices
            .iter()
            .filter(|device| device.logical_type != LogicalType::EndDevice && !device.removed)
            .map(|device| device.ieee)
            .collect();

        for ieee in targets {
            self.enqueue(RequestKind::Lqi { ieee });
        }
    }

    fn poll_devices(&mut self) {
        if !self.ready {
            return;
        }

        let now = Instant::now();
        let mut due: Vec<(IeeeAddress, u8, u16, Vec<u16>)> = Vec::new();

        for device in self.devices.iter_mut() {
            if !device.interview_finished || device.removed {
                continue;
            }

            let ieee = device.ieee;

            for endpoint in device.endpoints.values_mut() {
                for poll in &mut endpoint.polls {
                    let elapsed = poll
                        .last
                        .map_or(true, |last| now.duration_since(last) >= poll.period);

                    if elapsed {
                        poll.last = Some(now);
                        due.push((ieee, endpoint.id, poll.cluster_id, poll.attributes.clone()));
                    }
                }
            }
        }

        for (ieee, endpoint_id, cluster_id, attributes) in due {
            let transaction_id = self.requests.current_id();
            let request = attributes_request(transaction_id, &attributes, 0);
            self.enqueue_data(ieee, endpoint_id, cluster_id, request, None);
        }
    }

    // ── API commands ────────────────────────────────────────────────

    /// A device the API may drive: present, not removed, not the coordinator
    fn controllable(&self, name: &str) -> Option<IeeeAddress> {
        self.devices.by_name(name).and_then(|device| {
            (!device.removed && device.logical_type != LogicalType::Coordinator)
                .then_some(device.ieee)
        })
    }

    pub(crate) fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetPermitJoin { enabled } => {
                self.adapter.set_permit_join(enabled);
            }

            Command::SetDeviceName {
                device,
                name,
                store,
            } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                self.devices.get_mut(ieee).expect("present").name = name;

                if store {
                    self.store_database();
                }
            }

            Command::RemoveDevice { device, force } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                if !force {
                    self.enqueue(RequestKind::Remove { ieee });
                    return;
                }

                tracing::info!("Device {} removed (force)", device);
                self.devices.get_mut(ieee).expect("present").removed = true;
                self.devices.remove(ieee);
                self.store_database();
            }

            Command::UpdateDevice { device, reportings } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                self.library
                    .setup_device(self.devices.get_mut(ieee).expect("present"));

                if !reportings {
                    tracing::info!(
                        "Device {} configuration updated without reportings",
                        device
                    );
                    return;
                }

                let pairs: Vec<(u8, Reporting)> = self
                    .devices
                    .get(ieee)
                    .expect("present")
                    .endpoints
                    .values()
                    .flat_map(|endpoint| {
                        endpoint
                            .reportings
                            .iter()
                            .map(|reporting| (endpoint.id, reporting.clone()))
                    })
                    .collect();

                for (endpoint_id, reporting) in pairs {
                    self.configure_reporting(ieee, endpoint_id, &reporting);
                }

                tracing::info!("Device {} configuration updated", device);
            }

            Command::UpdateReporting {
                device,
                endpoint_id,
                reporting,
                min_interval,
                max_interval,
                value_change,
            } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                let mut pairs: Vec<(u8, Reporting)> = Vec::new();

                {
                    let target = self.devices.get_mut(ieee).expect("present");

                    for endpoint in target.endpoints.values_mut() {
                        if endpoint_id != 0 && endpoint.id != endpoint_id {
                            continue;
                        }

                        for entry in &mut endpoint.reportings {
                            if !reporting.is_empty() && entry.name != reporting {
                                continue;
                            }

                            if min_interval != 0 {
                                entry.min_interval = min_interval;
                            }

                            if max_interval != 0 {
                                entry.max_interval = max_interval;
                            }

                            if value_change != 0 {
                                entry.value_change = value_change;
                            }

                            pairs.push((endpoint.id, entry.clone()));
                        }
                    }
                }

                for (endpoint_id, reporting) in pairs {
                    self.configure_reporting(ieee, endpoint_id, &reporting);
                }
            }

            Command::BindingControl {
                device,
                endpoint_id,
                cluster_id,
                target,
                unbind,
            } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                let dst = match target {
                    BindingTarget::Group(group_id) => {
                        if group_id == 0 {
                            return;
                        }

                        BindDestination::Group(group_id)
                    }

                    BindingTarget::Device {
                        name,
                        endpoint_id: dst_endpoint_id,
                    } => {
                        let Some(dst_ieee) = self.controllable(&name) else {
                            return;
                        };

                        BindDestination::Device {
                            ieee: dst_ieee,
                            endpoint_id: dst_endpoint_id,
                        }
                    }
                };

                self.enqueue(RequestKind::Binding {
                    ieee,
                    endpoint_id,
                    cluster_id,
                    dst,
                    unbind,
                });
            }

            Command::GroupControl {
                device,
                endpoint_id,
                group_id,
                remove,
            } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                let transaction_id = self.requests.current_id();
                let mut frame = ZclHeader::new(
                    fc::CLUSTER_SPECIFIC,
                    transaction_id,
                    if remove { 0x03 } else { 0x00 },
                )
                .encode();
                frame.extend_from_slice(&group_id.to_le_bytes());

                if !remove {
                    frame.push(0x00); // empty group name
                }

                self.enqueue_data(
                    ieee,
                    if endpoint_id != 0 { endpoint_id } else { 1 },
                    cluster::GROUPS,
                    frame,
                    None,
                );
            }

            Command::RemoveAllGroups {
                device,
                endpoint_id,
            } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                let transaction_id = self.requests.current_id();
                let frame =
                    ZclHeader::new(fc::CLUSTER_SPECIFIC, transaction_id, 0x04).encode();

                self.enqueue_data(
                    ieee,
                    if endpoint_id != 0 { endpoint_id } else { 1 },
                    cluster::GROUPS,
                    frame,
                    Some("remove all groups request".into()),
                );
            }

            Command::OtaUpgrade {
                device,
                endpoint_id,
                file,
            } => {
                let Some(ieee) = self.controllable(&device) else {
                    return;
                };

                let Some(payload) = self.ota.start(&file) else {
                    tracing::warn!("OTA image {:?} is not usable", file);
                    return;
                };

                let transaction_id = self.requests.current_id();
                let mut frame = ZclHeader::new(
                    fc::CLUSTER_SPECIFIC | fc::SERVER_TO_CLIENT,
                    transaction_id,
                    0x00,
                )
                .encode();
                frame.extend_from_slice(&payload);

                self.enqueue_data(
                    ieee,
                    if endpoint_id != 0 { endpoint_id } else { 1 },
                    cluster::OTA_UPGRADE,
                    frame,
                    None,
                );
            }

            Command::TouchLink {
                ieee,
                channel,
                reset,
            } => self.touch_link_request(ieee, channel, reset),

            Command::DeviceAction {
                device,
                endpoint_id,
                action,
                value,
            } => self.device_action(&device, endpoint_id, &action, &value),

            Command::GroupAction {
                group_id,
                action,
                value,
            } => {
                let Some(action) = setup::action(&action) else {
                    return;
                };

                let transaction_id = self.requests.current_id();
                let Some(data) = action.request(transaction_id, &value) else {
                    return;
                };

                self.adapter.extended_data_request(
                    transaction_id,
                    ExtendedAddress::Short(group_id),
                    0xFF,
                    0x0000,
                    0x01,
                    action.cluster_id(),
                    &data,
                    true,
                );
            }
        }
    }

    fn device_action(&mut self, device_name: &str, endpoint_id: u8, action: &str, value: &Value) {
        let Some(ieee) = self.controllable(device_name) else {
            return;
        };

        struct Dispatch {
            endpoint_id: u8,
            cluster_id: u16,
            frame: Vec<u8>,
            poll: Option<(u16, u16)>,
        }

        let transaction_id = self.requests.current_id();
        let mut dispatches: Vec<Dispatch> = Vec::new();

        {
            let device = self.devices.get(ieee).expect("present");

            for endpoint in device.endpoints.values() {
                if endpoint_id != 0 && endpoint.id != endpoint_id {
                    continue;
                }

                if let Some(entry) = endpoint.actions.iter().find(|a| a.name() == action) {
                    if let Some(frame) = entry.request(transaction_id, value) {
                        dispatches.push(Dispatch {
                            endpoint_id: endpoint.id,
                            cluster_id: entry.cluster_id(),
                            frame,
                            poll: entry
                                .poll()
                                .then(|| (entry.attribute_id(), entry.manufacturer_code())),
                        });
                    }

                    break;
                }
            }
        }

        for dispatch in dispatches {
            let label = format!("{action} action");
            self.enqueue_data(
                ieee,
                dispatch.endpoint_id,
                dispatch.cluster_id,
                dispatch.frame,
                Some(label),
            );

            if let Some((attribute_id, manufacturer_code)) = dispatch.poll {
                let transaction_id = self.requests.current_id();
                let request =
                    attributes_request(transaction_id, &[attribute_id], manufacturer_code);
                self.enqueue_data(ieee, dispatch.endpoint_id, dispatch.cluster_id, request, None);
            }
        }
    }

    // ── TouchLink ───────────────────────────────────────────────────

    fn touch_link_request(&mut self, ieee: Option<IeeeAddress>, channel: u8, reset: bool) {
        if !self.adapter.set_inter_pan_endpoint_id(0x0C) {
            return;
        }

        if reset {
            if let Some(ieee) = ieee {
                self.touch_link_reset(ieee, channel);
            }
        } else {
            self.touch_link_scan();
        }

        self.adapter.reset_inter_pan();
    }

    fn touch_link_scan(&mut self) {
        let transaction_id = self.requests.current_id();
        let mut frame = ZclHeader::new(
            fc::CLUSTER_SPECIFIC | fc::DISABLE_DEFAULT_RESPONSE,
            transaction_id,
            0x00,
        )
        .encode();
        frame.extend_from_slice(&touch_link_payload(rand::random()));

        tracing::info!("TouchLink scan started...");

        for channel in 11..=26 {
            if !self.adapter.set_inter_pan_channel(channel) {
                return;
            }

            self.inter_pan_channel = channel;

            if !self.adapter.extended_data_request(
                transaction_id,
                ExtendedAddress::Short(0xFFFF),
                0xFE,
                0xFFFF,
                0x0C,
                cluster::TOUCHLINK,
                &frame,
                false,
            ) {
                tracing::warn!("TouchLink scan request failed");
                return;
            }
        }

        tracing::info!("TouchLink scan finished successfully");
    }

    fn touch_link_reset(&mut self, ieee: IeeeAddress, channel: u8) {
        let transaction: u32 = rand::random();
        let transaction_id = self.requests.current_id();

        if !self.adapter.set_inter_pan_channel(channel) {
            return;
        }

        self.inter_pan_channel = channel;

        let mut scan = ZclHeader::new(
            fc::CLUSTER_SPECIFIC | fc::DISABLE_DEFAULT_RESPONSE,
            transaction_id,
            0x00,
        )
        .encode();
        scan.extend_from_slice(&touch_link_payload(transaction));

        if !self.adapter.extended_data_request(
            transaction_id,
            ExtendedAddress::Short(0xFFFF),
            0xFE,
            0xFFFF,
            0x0C,
            cluster::TOUCHLINK,
            &scan,
            false,
        ) {
            tracing::warn!("TouchLink scan request failed");
            return;
        }

        let mut reset = ZclHeader::new(
            fc::CLUSTER_SPECIFIC | fc::DISABLE_DEFAULT_RESPONSE,
            transaction_id,
            0x07,
        )
        .encode();
        reset.extend_from_slice(&transaction.to_le_bytes());

        if !self.adapter.extended_data_request(
            transaction_id,
            ExtendedAddress::Ieee(ieee),
            0xFE,
            0xFFFF,
            0x0C,
            cluster::TOUCHLINK,
            &reset,
            false,
        ) {
            tracing::warn!("TouchLink reset request failed");
            return;
        }

        tracing::info!("TouchLink reset finished successfully");
    }
}

/// A Read-Attributes request frame
fn attributes_request(transaction_id: u8, attributes: &[u16], manufacturer_code: u16) -> Vec<u8> {
    let mut header = ZclHeader::global(0x00, transaction_id, GlobalCommand::ReadAttributes);

    if manufacturer_code != 0 {
        header = header.with_manufacturer_code(manufacturer_code);
    }

    let mut request = header.encode();

    for attribute_id in attributes {
        request.extend_from_slice(&attribute_id.to_le_bytes());
    }

    request
}

/// TouchLink scan payload: transaction id plus the fixed capability bytes
fn touch_link_payload(transaction: u32) -> [u8; 6] {
    let id = transaction.to_le_bytes();
    [id[0], id[1], id[2], id[3], 0x04, 0x12]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        NodeDescriptor {
            network_address: u16,
        },
        ActiveEndpoints {
            network_address: u16,
        },
        SimpleDescriptor {
            network_address: u16,
            endpoint_id: u8,
        },
        Data {
            id: u8,
            network_address: u16,
            endpoint_id: u8,
            cluster_id: u16,
            data: Vec<u8>,
        },
        Bind {
            network_address: u16,
            cluster_id: u16,
            unbind: bool,
        },
        Leave {
            id: u8,
            network_address: u16,
        },
        Lqi {
            network_address: u16,
        },
        PermitJoin(bool),
    }

    struct MockAdapter {
        ieee: u64,
        accept: AtomicBool,
        calls: Mutex<Vec<Call>>,
    }

    impl MockAdapter {
        fn new(ieee: u64) -> Self {
            Self {
                ieee,
                accept: AtomicBool::new(true),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn set_accept(&self, accept: bool) {
            self.accept.store(accept, Ordering::SeqCst);
        }

        fn accepts(&self) -> bool {
            self.accept.load(Ordering::SeqCst)
        }

        fn record(&self, call: Call) -> bool {
            self.calls.lock().unwrap().push(call);
            self.accepts()
        }

        fn take_calls(&self) -> Vec<Call> {
            std::mem::take(&mut self.calls.lock().unwrap())
        }
    }

    impl Adapter for MockAdapter {
        fn kind(&self) -> &str {
            "mock"
        }

        fn version(&self) -> String {
            "1.0.0".into()
        }

        fn ieee_address(&self) -> u64 {
            self.ieee
        }

        fn data_request(
            &self,
            id: u8,
            network_address: u16,
            endpoint_id: u8,
            cluster_id: u16,
            data: &[u8],
        ) -> bool {
            self.record(Call::Data {
                id,
                network_address,
                endpoint_id,
                cluster_id,
                data: data.to_vec(),
            })
        }

        fn extended_data_request(
            &self,
            _id: u8,
            _dst: ExtendedAddress,
            _src_endpoint_id: u8,
            _dst_pan_id: u16,
            _dst_endpoint_id: u8,
            _cluster_id: u16,
            _data: &[u8],
            _acknowledged: bool,
        ) -> bool {
            self.accepts()
        }

        fn bind_request(
            &self,
            _id: u8,
            network_address: u16,
            _ieee: IeeeAddress,
            _endpoint_id: u8,
            cluster_id: u16,
            _dst: &BindDestination,
            unbind: bool,
        ) -> bool {
            self.record(Call::Bind {
                network_address,
                cluster_id,
                unbind,
            })
        }

        fn leave_request(&self, id: u8, network_address: u16, _ieee: IeeeAddress) -> bool {
            self.record(Call::Leave {
                id,
                network_address,
            })
        }

        fn lqi_request(&self, _id: u8, network_address: u16) -> bool {
            self.record(Call::Lqi { network_address })
        }

        fn node_descriptor_request(&self, _id: u8, network_address: u16) -> bool {
            self.record(Call::NodeDescriptor { network_address })
        }

        fn active_endpoints_request(&self, _id: u8, network_address: u16) -> bool {
            self.record(Call::ActiveEndpoints { network_address })
        }

        fn simple_descriptor_request(
            &self,
            _id: u8,
            network_address: u16,
            endpoint_id: u8,
        ) -> bool {
            self.record(Call::SimpleDescriptor {
                network_address,
                endpoint_id,
            })
        }

        fn set_permit_join(&self, enabled: bool) -> bool {
            self.record(Call::PermitJoin(enabled))
        }

        fn set_inter_pan_channel(&self, _channel: u8) -> bool {
            self.accepts()
        }

        fn set_inter_pan_endpoint_id(&self, _endpoint_id: u8) -> bool {
            self.accepts()
        }

        fn reset_inter_pan(&self) -> bool {
            self.accepts()
        }
    }

    fn coordinator_with(adapter: Arc<MockAdapter>) -> (Coordinator, CoordinatorHandle) {
        let dir = std::env::temp_dir().join(format!("zigbee-core-test-{}", rand::random::<u32>()));
        Coordinator::new(
            adapter,
            DeviceLibrary::default(),
            dir.join("devices.json"),
            dir.join("properties.json"),
        )
    }

    fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn read_attributes_response(entries: &[(u16, u8, &[u8])]) -> Vec<u8> {
        let mut frame = ZclHeader::global(
            fc::SERVER_TO_CLIENT | fc::DISABLE_DEFAULT_RESPONSE,
            0x01,
            GlobalCommand::ReadAttributesResponse,
        )
        .encode();

        for (attribute_id, type_tag, data) in entries {
            frame.extend_from_slice(&attribute_id.to_le_bytes());
            frame.push(status::SUCCESS);
            frame.push(*type_tag);

            if *type_tag == data_type::CHARACTER_STRING || *type_tag == data_type::OCTET_STRING {
                frame.push(data.len() as u8);
            }

            frame.extend_from_slice(data);
        }

        frame
    }

    const COORDINATOR_IEEE: u64 = 0x0012_4B00_1234_5678;

    fn joined_device(
        coordinator: &mut Coordinator,
        ieee: IeeeAddress,
        network_address: u16,
    ) {
        coordinator.handle_adapter_event(AdapterEvent::CoordinatorReady);
        coordinator.handle_adapter_event(AdapterEvent::DeviceJoined {
            ieee,
            network_address,
        });
    }

    #[tokio::test]
    async fn test_interview_happy_path() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, handle) = coordinator_with(adapter.clone());
        let mut events = handle.subscribe();

        let ieee = IeeeAddress([0x00, 0x0D, 0x6F, 0x00, 0x0A, 0x0B, 0x0C, 0x0D]);
        joined_device(&mut coordinator, ieee, 0x1234);

        // The join itself persisted; measure the interview from here
        drain(&mut events);
        adapter.take_calls();

        coordinator.handle_requests();
        assert_eq!(
            adapter.take_calls(),
            vec![Call::NodeDescriptor {
                network_address: 0x1234
            }]
        );

        coordinator.handle_adapter_event(AdapterEvent::NodeDescriptorReceived {
            network_address: 0x1234,
            logical_type: LogicalType::EndDevice,
            manufacturer_code: 0x1037,
        });
        coordinator.handle_requests();
        assert_eq!(
            adapter.take_calls(),
            vec![Call::ActiveEndpoints {
                network_address: 0x1234
            }]
        );

        coordinator.handle_adapter_event(AdapterEvent::ActiveEndpointsReceived {
            network_address: 0x1234,
            endpoints: vec![0x01],
        });
        coordinator.handle_requests();
        assert_eq!(
            adapter.take_calls(),
            vec![Call::SimpleDescriptor {
                network_address: 0x1234,
                endpoint_id: 0x01
            }]
        );

        coordinator.handle_adapter_event(AdapterEvent::SimpleDescriptorReceived {
            network_address: 0x1234,
            endpoint_id: 0x01,
            profile_id: 0x0104,
            device_id: 0x0402,
            in_clusters: vec![cluster::BASIC, cluster::POWER_CONFIG, cluster::IAS_ZONE],
            out_clusters: vec![],
        });
        coordinator.handle_requests();

        // Basic identification read
        let calls = adapter.take_calls();
        assert!(matches!(
            calls.as_slice(),
            [Call::Data {
                cluster_id: cluster::BASIC,
                ..
            }]
        ));

        coordinator.handle_adapter_event(AdapterEvent::MessageReceived {
            network_address: 0x1234,
            endpoint_id: 0x01,
            cluster_id: cluster::BASIC,
            link_quality: 120,
            data: read_attributes_response(&[
                (0x0001, data_type::UNSIGNED_8BIT, &[5]),
                (0x0004, data_type::CHARACTER_STRING, b"Zen Within"),
                (0x0005, data_type::CHARACTER_STRING, b"Zen-01"),
                (0x0007, data_type::ENUM_8BIT, &[3]),
            ]),
        });
        coordinator.handle_requests();

        // Zone state read on the IAS endpoint
        let calls = adapter.take_calls();
        assert!(matches!(
            calls.as_slice(),
            [Call::Data {
                cluster_id: cluster::IAS_ZONE,
                ..
            }]
        ));

        coordinator.handle_adapter_event(AdapterEvent::MessageReceived {
            network_address: 0x1234,
            endpoint_id: 0x01,
            cluster_id: cluster::IAS_ZONE,
            link_quality: 120,
            data: read_attributes_response(&[
                (0x0000, data_type::ENUM_8BIT, &[1]),
                (
                    0x0010,
                    data_type::IEEE_ADDRESS,
                    &COORDINATOR_IEEE.to_le_bytes(),
                ),
            ]),
        });
        coordinator.handle_requests();

        let device = coordinator.devices.get(ieee).unwrap();
        assert!(device.interview_finished);
        assert_eq!(device.manufacturer_name, "Zen Within");
        assert_eq!(device.model_name, "Zen-01");
        assert_eq!(device.power_source, 3);
        assert_eq!(device.firmware_version, 5);
        assert_eq!(
            device.endpoints[&1].zone_status,
            ZoneStatus::Enrolled
        );

        let seen = drain(&mut events);
        assert!(seen
            .iter()
            .any(|event| matches!(event, Event::InterviewFinished { .. })));
        assert!(!seen
            .iter()
            .any(|event| matches!(event, Event::EndpointUpdated { .. })));

        // Persisted exactly once, in interview_finished
        let stores = seen
            .iter()
            .filter(|event| matches!(event, Event::StatusUpdated { .. }))
            .count();
        assert_eq!(stores, 1);
    }

    #[tokio::test]
    async fn test_remove_only_on_success() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, _handle) = coordinator_with(adapter.clone());

        let ieee = IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8]);
        joined_device(&mut coordinator, ieee, 0x4321);
        adapter.take_calls();

        let name = ieee.to_string();
        coordinator.handle_command(Command::RemoveDevice {
            device: name.clone(),
            force: false,
        });
        coordinator.handle_requests();

        let calls = adapter.take_calls();
        let leave_id = calls
            .iter()
            .find_map(|call| match call {
                Call::Leave { id, .. } => Some(*id),
                _ => None,
            })
            .expect("leave request dispatched");

        // Radio reported failure: the device stays
        coordinator.handle_adapter_event(AdapterEvent::RequestFinished {
            id: leave_id,
            status: 0xC2,
        });
        assert!(coordinator.devices.contains(ieee));

        // Re-delivery for a finished id is a no-op
        coordinator.handle_adapter_event(AdapterEvent::RequestFinished {
            id: leave_id,
            status: 0x00,
        });
        assert!(coordinator.devices.contains(ieee));

        // A fresh request that succeeds removes the device
        coordinator.handle_requests(); // prune the finished entry
        coordinator.handle_command(Command::RemoveDevice {
            device: name,
            force: false,
        });
        coordinator.handle_requests();

        let calls = adapter.take_calls();
        let leave_id = calls
            .iter()
            .find_map(|call| match call {
                Call::Leave { id, .. } => Some(*id),
                _ => None,
            })
            .expect("second leave request dispatched");

        coordinator.handle_adapter_event(AdapterEvent::RequestFinished {
            id: leave_id,
            status: 0x00,
        });
        assert!(!coordinator.devices.contains(ieee));
    }

    #[tokio::test]
    async fn test_adapter_refusal_aborts_request() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, _handle) = coordinator_with(adapter.clone());

        let ieee = IeeeAddress([2, 2, 2, 2, 2, 2, 2, 2]);
        joined_device(&mut coordinator, ieee, 0x2000);
        coordinator.handle_requests();
        adapter.take_calls();

        adapter.set_accept(false);
        coordinator.handle_command(Command::GroupControl {
            device: ieee.to_string(),
            endpoint_id: 1,
            group_id: 0x0010,
            remove: false,
        });
        coordinator.handle_requests();

        // Aborted and pruned: nothing left to dispatch
        adapter.set_accept(true);
        adapter.take_calls();
        coordinator.handle_requests();
        assert!(adapter.take_calls().is_empty());
    }

    #[tokio::test]
    async fn test_report_attributes_gets_default_response() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, _handle) = coordinator_with(adapter.clone());

        let ieee = IeeeAddress([3, 3, 3, 3, 3, 3, 3, 3]);
        joined_device(&mut coordinator, ieee, 0x3000);
        coordinator.handle_requests();
        adapter.take_calls();

        // Report-attributes without disable-default-response
        let mut frame = ZclHeader::global(
            fc::SERVER_TO_CLIENT,
            0x21,
            GlobalCommand::ReportAttributes,
        )
        .encode();
        frame.extend_from_slice(&0x0000u16.to_le_bytes());
        frame.push(data_type::BOOLEAN);
        frame.push(0x01);

        coordinator.handle_adapter_event(AdapterEvent::MessageReceived {
            network_address: 0x3000,
            endpoint_id: 0x01,
            cluster_id: cluster::ON_OFF,
            link_quality: 90,
            data: frame,
        });
        coordinator.handle_requests();

        let calls = adapter.take_calls();
        let response = calls
            .iter()
            .find_map(|call| match call {
                Call::Data {
                    cluster_id: cluster::ON_OFF,
                    data,
                    ..
                } => Some(data.clone()),
                _ => None,
            })
            .expect("default response dispatched");

        // Echoes the transaction id and the original command, status success
        assert_eq!(
            response,
            vec![
                fc::SERVER_TO_CLIENT | fc::DISABLE_DEFAULT_RESPONSE,
                0x21,
                GlobalCommand::DefaultResponse as u8,
                GlobalCommand::ReportAttributes as u8,
                status::SUCCESS,
            ]
        );
    }

    #[tokio::test]
    async fn test_tuya_model_rename() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, _handle) = coordinator_with(adapter.clone());

        let ieee = IeeeAddress([4, 4, 4, 4, 4, 4, 4, 4]);
        joined_device(&mut coordinator, ieee, 0x4000);

        coordinator.handle_adapter_event(AdapterEvent::MessageReceived {
            network_address: 0x4000,
            endpoint_id: 0x01,
            cluster_id: cluster::BASIC,
            link_quality: 80,
            data: read_attributes_response(&[
                (0x0004, data_type::CHARACTER_STRING, b"_TZE200_ztc6ggyl"),
                (0x0005, data_type::CHARACTER_STRING, b"TS0601"),
            ]),
        });

        let device = coordinator.devices.get(ieee).unwrap();
        assert_eq!(device.manufacturer_name, "TUYA");
        assert_eq!(device.model_name, "_TZE200_ztc6ggyl");
    }

    #[tokio::test]
    async fn test_interview_timeout_swallows_later_errors() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, handle) = coordinator_with(adapter.clone());
        let mut events = handle.subscribe();

        let ieee = IeeeAddress([5, 5, 5, 5, 5, 5, 5, 5]);
        joined_device(&mut coordinator, ieee, 0x5000);
        drain(&mut events);

        let generation = coordinator.devices.get(ieee).unwrap().timer_generation;
        coordinator.handle_timer(TimerEvent::InterviewTimeout { ieee, generation });

        let seen = drain(&mut events);
        assert!(seen
            .iter()
            .any(|event| matches!(event, Event::InterviewTimeout { .. })));

        // The timeout already surfaced the failure; later errors are silent
        coordinator.interview_error(ieee, "node descriptor request failed");
        assert!(drain(&mut events).is_empty());

        // A stale generation never fires
        coordinator.handle_timer(TimerEvent::InterviewTimeout {
            ieee,
            generation: generation.wrapping_sub(1),
        });
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_coordinator_entry_is_rebuilt() {
        let adapter = Arc::new(MockAdapter::new(COORDINATOR_IEEE));
        let (mut coordinator, _handle) = coordinator_with(adapter.clone());

        coordinator.handle_adapter_event(AdapterEvent::CoordinatorReady);

        let ieee = IeeeAddress(COORDINATOR_IEEE.to_be_bytes());
        let entry = coordinator.devices.get(ieee).expect("coordinator entry");
        assert_eq!(entry.logical_type, LogicalType::Coordinator);
        assert!(entry.interview_finished);

        let coordinators = coordinator
            .devices
            .iter()
            .filter(|device| device.logical_type == LogicalType::Coordinator)
            .count();
        assert_eq!(coordinators, 1);

        // Permit join state was pushed to the radio
        assert!(adapter
            .take_calls()
            .contains(&Call::PermitJoin(false)));
    }
}

