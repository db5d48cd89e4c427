//! USB device capability interface
//!
//! Every device the guest can see, whether it is a host device passed
//! through or a peripheral synthesized in software, implements
//! [`UsbDevice`]. The engine only ever holds `Arc<Mutex<dyn UsbDevice>>`
//! and never switches on the concrete type.

use crate::transfers::TransferSlot;
use abi::DeviceRequest;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Device shared between the registry, handled-device entries and pipes
pub type SharedDevice = Arc<Mutex<dyn UsbDevice>>;

/// Wrap a device for shared ownership
pub fn share<D: UsbDevice + 'static>(device: D) -> SharedDevice {
    Arc::new(Mutex::new(device))
}

/// Lock a shared device
///
/// A device whose previous holder panicked is still usable; its state is
/// plain data.
pub fn lock_device(device: &SharedDevice) -> MutexGuard<'_, dyn UsbDevice + 'static> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State common to every device variant
#[derive(Debug, Clone)]
pub struct DeviceCore {
    label: String,
    vendor_id: u16,
    product_id: u16,
    /// Guest device handle; 0 until an LDD claims the device
    assigned_number: u32,
    /// Device descriptor followed by the configuration descriptor tree
    descriptors: Vec<u8>,
}

impl DeviceCore {
    pub fn new(label: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            label: label.into(),
            vendor_id,
            product_id,
            assigned_number: 0,
            descriptors: Vec::new(),
        }
    }

    pub fn set_descriptors(&mut self, descriptors: Vec<u8>) {
        self.descriptors = descriptors;
    }

    pub fn descriptors(&self) -> &[u8] {
        &self.descriptors
    }
}

/// Operation set shared by passthrough and emulated devices
///
/// Transfer operations never block: a device either records a host
/// submission on the slot or schedules a software completion.
pub trait UsbDevice: Send {
    fn core(&self) -> &DeviceCore;

    fn core_mut(&mut self) -> &mut DeviceCore;

    /// Human-readable name used in logs
    fn label(&self) -> &str {
        &self.core().label
    }

    fn vendor_id(&self) -> u16 {
        self.core().vendor_id
    }

    fn product_id(&self) -> u16 {
        self.core().product_id
    }

    fn assigned_number(&self) -> u32 {
        self.core().assigned_number
    }

    /// Record the guest handle; refused once a number is assigned
    fn assign_number(&mut self, number: u32) -> bool {
        let core = self.core_mut();
        if core.assigned_number != 0 || number == 0 {
            return false;
        }
        core.assigned_number = number;
        true
    }

    fn descriptor_size(&self) -> u32 {
        self.core().descriptors.len() as u32
    }

    /// Copy as much of the descriptor tree as fits; returns bytes written
    fn write_descriptor(&self, out: &mut [u8]) -> usize {
        let descriptors = &self.core().descriptors;
        let len = descriptors.len().min(out.len());
        out[..len].copy_from_slice(&descriptors[..len]);
        len
    }

    /// Prepare the device for I/O
    fn open_device(&mut self) -> common::Result<()>;

    /// Populate the cached descriptor tree
    fn read_descriptors(&mut self);

    fn set_configuration(&mut self, config: u8);

    fn set_interface(&mut self, interface: u8);

    /// Control transfer on endpoint 0
    ///
    /// `data` holds OUT data, or is sized to the guest buffer for IN.
    fn control_transfer(&mut self, request: &DeviceRequest, data: &[u8], transfer: &mut TransferSlot);

    /// Interrupt transfer on a non-zero endpoint
    fn interrupt_transfer(&mut self, endpoint: u8, data: &[u8], transfer: &mut TransferSlot);

    /// Isochronous transfer described by `transfer.iso_request`
    fn isochronous_transfer(&mut self, endpoint: u8, transfer: &mut TransferSlot);
}
