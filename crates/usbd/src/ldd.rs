//! Logical device driver matching
//!
//! Guest drivers register the (vendor, product range) they handle. A scan
//! claims every registry device some registration matches and surfaces it to
//! the guest under a fresh device handle.

use crate::events::EventQueue;
use crate::usb::device::{SharedDevice, lock_device};
use crate::usb::registry::DeviceRegistry;
use abi::{DeviceHandle, UsbInternalDevice, UsbdEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Driver registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LddRegistration {
    pub name: String,
    pub vendor_id: u16,
    pub product_min: u16,
    pub product_max: u16,
}

impl LddRegistration {
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id
            && (self.product_min..=self.product_max).contains(&product_id)
    }
}

/// Append-only list of registrations
#[derive(Debug, Default)]
pub struct LddTable {
    entries: Vec<LddRegistration>,
}

impl LddTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration; returns the number of registrations
    pub fn add(&mut self, name: &str, vendor_id: u16, product_min: u16, product_max: u16) -> usize {
        self.entries.push(LddRegistration {
            name: name.to_string(),
            vendor_id,
            product_min,
            product_max,
        });
        self.entries.len()
    }

    pub fn entries(&self) -> &[LddRegistration] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Device surfaced to the guest
#[derive(Clone)]
pub struct HandledDevice {
    pub info: UsbInternalDevice,
    pub device: SharedDevice,
}

/// Guest device handle table
pub struct HandledDevices {
    entries: BTreeMap<DeviceHandle, HandledDevice>,
    next_number: u32,
}

impl Default for HandledDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl HandledDevices {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_number: 1,
        }
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&HandledDevice> {
        self.entries.get(&handle)
    }

    /// Summary records in handle order
    pub fn summaries(&self) -> impl Iterator<Item = UsbInternalDevice> + '_ {
        self.entries.values().map(|entry| entry.info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn insert(&mut self, info: UsbInternalDevice, device: SharedDevice) -> DeviceHandle {
        let handle = DeviceHandle(self.next_number);
        self.next_number += 1;
        self.entries.insert(handle, HandledDevice { info, device });
        handle
    }

    /// Handle the next claimed device will receive
    fn peek_next(&self) -> DeviceHandle {
        DeviceHandle(self.next_number)
    }
}

/// Claim every unassigned device a registration matches
///
/// Each claimed device is opened, gets its descriptors read, receives the
/// next handle and produces one attach event. A device that fails to open
/// stays unassigned and is retried against the next registration. Once the
/// next handle no longer fits the guest's 8-bit device number, nothing more
/// is claimed.
pub fn match_devices(
    registry: &DeviceRegistry,
    ldds: &LddTable,
    handled: &mut HandledDevices,
    events: &mut EventQueue,
) -> Vec<DeviceHandle> {
    let mut attached = Vec::new();

    for shared in registry.devices() {
        let mut device = lock_device(shared);
        if device.assigned_number() != 0 {
            continue;
        }

        for ldd in ldds.entries() {
            if !ldd.matches(device.vendor_id(), device.product_id()) {
                continue;
            }

            let Some(info) = UsbInternalDevice::for_handle(handled.peek_next()) else {
                warn!(
                    "Device handles exhausted, {} ({:04x}:{:04x}) left unclaimed",
                    device.label(),
                    device.vendor_id(),
                    device.product_id()
                );
                return attached;
            };

            if let Err(e) = device.open_device() {
                error!("Failed to open device {} for LDD {}: {}", device.label(), ldd.name, e);
                continue;
            }

            device.read_descriptors();

            let handle = handled.insert(info, Arc::clone(shared));
            device.assign_number(handle.0);

            info!(
                "Device {} ({:04x}:{:04x}) attached as handle {} by {}",
                device.label(),
                device.vendor_id(),
                device.product_id(),
                handle.0,
                ldd.name
            );
            events.add(UsbdEvent::attach(handle));
            attached.push(handle);
            break;
        }
    }

    attached
}
