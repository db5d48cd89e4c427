//! USB devices visible to the guest
//!
//! - [`device`]: the capability interface every device implements
//! - [`passthrough`]: host devices forwarded through a [`common::HostBackend`]
//! - [`emulated`]: peripherals synthesized in software
//! - [`registry`]: allow-list matching and emulated fallbacks
//! - [`rusb_backend`]: the production host backend

pub mod device;
pub mod emulated;
pub mod passthrough;
pub mod registry;
pub mod rusb_backend;

pub use device::{DeviceCore, SharedDevice, UsbDevice, lock_device, share};
pub use emulated::{EmulatedDevice, PeripheralKind};
pub use passthrough::PassthroughDevice;
pub use registry::{ALLOW_LIST, DeviceMatchRule, DeviceRegistry, find_rule};
pub use rusb_backend::RusbBackend;
