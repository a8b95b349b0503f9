//! Host inspection
//!
//! Detects which compute backend predictions can run on.

pub mod device;

pub use device::{select_device, AcceleratorRuntime, Backend, DeviceReport, StatusReporter, SystemRuntime};
