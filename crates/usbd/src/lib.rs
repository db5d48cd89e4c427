//! Virtual USB host-controller engine
//!
//! Lets guest USB drivers enumerate, open and exchange data with USB
//! peripherals. Some devices are real host hardware passed through a
//! [`common::HostBackend`]; others are synthesized in software. Both kinds
//! look identical to the guest.
//!
//! # Example
//!
//! ```
//! use abi::{DeviceHandle, UsbdEvent};
//! use usbd::{PeripheralKind, UsbHandler, UsbdConfig};
//!
//! let mut config = UsbdConfig::default();
//! config.emulation.always_present = vec![PeripheralKind::SkylanderPortal];
//! config.timing.attach_delay_us = 0;
//!
//! let handler = UsbHandler::new(&config, None);
//! handler.initialize().unwrap();
//! handler.register_extra_ldd("portal", 0x1430, 0x0150, 0x0150).unwrap();
//!
//! assert_eq!(handler.get_event(), Some(UsbdEvent::attach(DeviceHandle(1))));
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod ldd;
pub mod pipes;
pub mod transfers;
pub mod usb;
pub mod worker;

pub use config::{BuzzMode, UsbdConfig, load_config};
pub use error::{CELL_EBUSY, CELL_EINVAL, Result, UsbdError};
pub use events::{EventQueue, GuestThread, ReceiveOutcome};
pub use handler::UsbHandler;
pub use ldd::{HandledDevices, LddRegistration, LddTable};
pub use pipes::{Pipe, PipeTable};
pub use transfers::{TransferPool, TransferSlot, TransferStatus, map_host_status, map_iso_packet_status};
pub use usb::{DeviceRegistry, EmulatedDevice, PeripheralKind, RusbBackend, SharedDevice, UsbDevice};
pub use worker::{PumpHandle, StopSignal, UsbdPump, spawn_usbd_pump};
