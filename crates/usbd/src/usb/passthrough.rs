//! Host device passed through to the guest
//!
//! Every operation is forwarded to the [`HostBackend`]. Transfers are not
//! submitted here; the device records the host request on the slot and the
//! engine submits it once the slot is marked busy.

use crate::transfers::TransferSlot;
use crate::usb::device::{DeviceCore, UsbDevice};
use abi::DeviceRequest;
use common::{HostBackend, HostDeviceId, HostDeviceInfo, HostTransfer};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct PassthroughDevice {
    core: DeviceCore,
    host_id: HostDeviceId,
    backend: Arc<dyn HostBackend>,
    opened: bool,
}

impl PassthroughDevice {
    pub fn new(info: HostDeviceInfo, label: &str, backend: Arc<dyn HostBackend>) -> Self {
        Self {
            core: DeviceCore::new(label, info.vendor_id, info.product_id),
            host_id: info.id,
            backend,
            opened: false,
        }
    }

    pub fn host_id(&self) -> HostDeviceId {
        self.host_id
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }
}

impl UsbDevice for PassthroughDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn open_device(&mut self) -> common::Result<()> {
        if self.opened {
            return Ok(());
        }

        self.backend.open(self.host_id)?;
        self.opened = true;
        debug!("Opened host device {} ({})", self.host_id, self.label());
        Ok(())
    }

    fn read_descriptors(&mut self) {
        match self.backend.descriptors(self.host_id) {
            Ok(bytes) => self.core.set_descriptors(bytes),
            Err(e) => error!("Failed to read descriptors of {}: {}", self.host_id, e),
        }
    }

    fn set_configuration(&mut self, config: u8) {
        if let Err(e) = self.backend.set_configuration(self.host_id, config) {
            warn!(
                "set_configuration({}) failed on {}: {}",
                config, self.host_id, e
            );
        }
    }

    fn set_interface(&mut self, interface: u8) {
        if let Err(e) = self.backend.set_interface(self.host_id, interface) {
            warn!(
                "set_interface({}) failed on {}: {}",
                interface, self.host_id, e
            );
        }
    }

    fn control_transfer(&mut self, request: &DeviceRequest, data: &[u8], transfer: &mut TransferSlot) {
        let data = if request.is_device_to_host() {
            vec![0u8; (request.length as usize).max(data.len())]
        } else {
            data.to_vec()
        };

        transfer.submit_to_host(
            self.host_id,
            HostTransfer::Control {
                request: *request,
                data,
            },
        );
    }

    fn interrupt_transfer(&mut self, endpoint: u8, data: &[u8], transfer: &mut TransferSlot) {
        let data = if endpoint & 0x80 != 0 {
            vec![0u8; data.len()]
        } else {
            data.to_vec()
        };

        transfer.submit_to_host(self.host_id, HostTransfer::Interrupt { endpoint, data });
    }

    fn isochronous_transfer(&mut self, endpoint: u8, transfer: &mut TransferSlot) {
        let request = transfer.iso_request;
        let packet_lengths: Vec<u16> = request.packets[..request.packet_count()]
            .iter()
            .map(|len| len & 0xFFF)
            .collect();

        transfer.submit_to_host(
            self.host_id,
            HostTransfer::Isochronous {
                endpoint,
                data: vec![0u8; request.total_length()],
                packet_lengths,
            },
        );
    }
}
