//! Signaling gateway transport

pub mod gateway;
pub mod protocol;

pub use gateway::{GatewayDevice, GatewayDeviceFactory, GatewayLeg};
pub use protocol::{ClientFrame, GatewayFrame};
