//! ZCL (Zigbee Cluster Library) frame codec
//!
//! This crate implements the application-layer frame format shared by every
//! Zigbee cluster: the frame header, the data-type size table and the
//! well-known cluster, attribute and status constants. It is a pure codec
//! with no I/O and no device state.

pub mod clusters;
pub mod frame;
pub mod types;

pub use frame::{frame_control, GlobalCommand, ZclHeader};
pub use types::{data_size, data_type, status, Advance, ZclError};
