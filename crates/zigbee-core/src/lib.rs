//! Zigbee coordinator core
//!
//! This crate provides the device lifecycle, request scheduling and ZCL
//! decode pipeline of a Zigbee gateway daemon on top of an abstract radio
//! adapter. Vendor serial drivers implement the [`adapter::Adapter`] trait
//! and feed events in; the embedding daemon drives the [`Coordinator`] task
//! and consumes the broadcast [`events::Event`] stream.

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod events;
pub mod ota;
pub mod persistence;
pub mod property;
pub mod request;
pub mod setup;

pub use adapter::{Adapter, AdapterEvent};
pub use config::Config;
pub use coordinator::{Command, Coordinator, CoordinatorHandle};
pub use device::{Device, DeviceList, Endpoint, IeeeAddress, LogicalType, ZoneStatus};
pub use events::Event;
pub use setup::DeviceLibrary;
