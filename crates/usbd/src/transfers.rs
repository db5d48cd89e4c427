//! Transfer engine
//!
//! Owns the fixed pool of transfer slots and implements both completion
//! paths:
//!
//! - **Hardware**: a passthrough device records a host submission on the
//!   slot; the handler hands it to the backend and the backend's completion
//!   callback lands in [`TransferPool::complete_from_host`].
//! - **Software**: an emulated device marks the slot fake with an expected
//!   result, count and due time; the pump retires it through
//!   [`TransferPool::retire_due`].
//!
//! Both paths leave the slot in the same state, so the guest cannot tell
//! them apart.

use crate::error::{Result, UsbdError};
use crate::pipes::Pipe;
use crate::usb::device::lock_device;
use abi::{
    CompletionCode, DeviceRequest, IsoPacketStatus, IsoRequest, MAX_ISO_PACKETS, MAX_TRANSFERS,
    TransferId, pack_iso_packet,
};
use common::{HostCompletion, HostDeviceId, HostStatus, HostTransfer};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// One transfer slot
#[derive(Debug, Clone)]
pub struct TransferSlot {
    id: TransferId,
    pub busy: bool,
    /// Completed in software by the pump rather than by the host
    pub fake: bool,
    pub result: CompletionCode,
    pub count: u32,
    /// Data returned by the last device-to-host transfer
    pub buffer: Vec<u8>,
    pub iso_request: IsoRequest,
    pub expected_time: Option<Instant>,
    pub expected_result: CompletionCode,
    pub expected_count: u32,
    host_request: Option<(HostDeviceId, HostTransfer)>,
}

impl TransferSlot {
    fn new(id: TransferId) -> Self {
        Self {
            id,
            busy: false,
            fake: false,
            result: CompletionCode::NoError,
            count: 0,
            buffer: Vec::new(),
            iso_request: IsoRequest::default(),
            expected_time: None,
            expected_result: CompletionCode::NoError,
            expected_count: 0,
            host_request: None,
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Schedule a software completion `delay` from now
    pub fn complete_fake(&mut self, result: CompletionCode, count: u32, delay: Duration) {
        self.fake = true;
        self.expected_result = result;
        self.expected_count = count;
        self.expected_time = Some(Instant::now() + delay);
    }

    /// Ask the engine to hand `transfer` to the host backend
    pub fn submit_to_host(&mut self, device: HostDeviceId, transfer: HostTransfer) {
        self.host_request = Some((device, transfer));
    }

    /// Take the host submission recorded by the device, if any
    pub(crate) fn take_host_request(&mut self) -> Option<(HostDeviceId, HostTransfer)> {
        self.host_request.take()
    }

    fn is_due(&self, now: Instant) -> bool {
        self.expected_time.is_none_or(|due| due <= now)
    }
}

/// Guest-visible status of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    pub result: u32,
    pub count: u32,
}

/// Map a host transfer status to a guest completion code
pub fn map_host_status(status: HostStatus) -> CompletionCode {
    match status {
        HostStatus::Completed => CompletionCode::NoError,
        HostStatus::TimedOut => CompletionCode::TransactionError,
        HostStatus::Overflow => CompletionCode::Babble,
        HostStatus::Error
        | HostStatus::Cancelled
        | HostStatus::Stall
        | HostStatus::NoDevice
        | HostStatus::Unknown(_) => CompletionCode::Halted,
    }
}

/// Map a host isochronous packet status to a guest packet status
pub fn map_iso_packet_status(status: HostStatus) -> IsoPacketStatus {
    match status {
        HostStatus::Completed => IsoPacketStatus::NoError,
        HostStatus::TimedOut => IsoPacketStatus::TransactionError,
        HostStatus::Overflow => IsoPacketStatus::Babble,
        HostStatus::Error
        | HostStatus::Cancelled
        | HostStatus::Stall
        | HostStatus::NoDevice
        | HostStatus::Unknown(_) => IsoPacketStatus::MissedFrame,
    }
}

/// Fixed-capacity transfer slot pool with a round-robin cursor
#[derive(Debug)]
pub struct TransferPool {
    slots: Vec<TransferSlot>,
    cursor: u32,
    /// Fake transfers in submission order
    fake: Vec<TransferId>,
}

impl Default for TransferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferPool {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_TRANSFERS as u32)
                .map(|i| TransferSlot::new(TransferId(i)))
                .collect(),
            cursor: 0,
            fake: Vec::new(),
        }
    }

    /// Find the next free slot after the cursor
    ///
    /// Ids are handed out in strict round-robin order, skipping busy slots.
    /// When every slot is busy this keeps scanning; nothing can retire a
    /// slot while the caller holds the subsystem lock.
    pub fn allocate(&mut self) -> TransferId {
        let mut scanned = 0usize;
        loop {
            self.cursor += 1;
            if self.cursor as usize >= MAX_TRANSFERS {
                self.cursor = 0;
            }

            if !self.slots[self.cursor as usize].busy {
                return TransferId(self.cursor);
            }

            scanned += 1;
            if scanned == MAX_TRANSFERS {
                error!(
                    "All {} transfer slots are busy, allocation cannot make progress",
                    MAX_TRANSFERS
                );
            }
        }
    }

    pub fn slot(&self, id: TransferId) -> Option<&TransferSlot> {
        self.slots.get(id.index())
    }

    pub fn slot_mut(&mut self, id: TransferId) -> Option<&mut TransferSlot> {
        self.slots.get_mut(id.index())
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.busy).count()
    }

    pub fn fake_count(&self) -> usize {
        self.fake.len()
    }

    fn slot_checked(&mut self, id: TransferId) -> Result<&mut TransferSlot> {
        self.slots
            .get_mut(id.index())
            .ok_or_else(|| UsbdError::unknown_transfer(id))
    }

    /// Run a control or interrupt transfer on `pipe` using slot `id`
    ///
    /// Returns the host submission recorded by the device, if any.
    pub fn dispatch_data(
        &mut self,
        id: TransferId,
        pipe: &Pipe,
        data: &[u8],
        request: Option<&DeviceRequest>,
    ) -> Result<Option<(HostDeviceId, HostTransfer)>> {
        let slot = self.slot_checked(id)?;
        let mut device = lock_device(&pipe.device);

        if pipe.endpoint == 0 {
            let Some(request) = request else {
                error!("Tried to use control pipe without a device request");
                return Err(UsbdError::MissingRequest);
            };

            if request.is_set_configuration() {
                debug!(
                    "SET_CONFIGURATION({}) on {}, selecting interface 0",
                    request.value,
                    device.label()
                );
                device.set_configuration(request.value as u8);
                device.set_interface(0);
            }

            device.control_transfer(request, data, slot);
        } else {
            device.interrupt_transfer(pipe.endpoint, data, slot);
        }
        drop(device);

        Ok(self.mark_submitted(id))
    }

    /// Run an isochronous transfer on `pipe` using slot `id`
    pub fn dispatch_isochronous(
        &mut self,
        id: TransferId,
        pipe: &Pipe,
        request: &IsoRequest,
    ) -> Result<Option<(HostDeviceId, HostTransfer)>> {
        let slot = self.slot_checked(id)?;
        slot.iso_request = *request;
        lock_device(&pipe.device).isochronous_transfer(pipe.endpoint, slot);

        Ok(self.mark_submitted(id))
    }

    fn mark_submitted(&mut self, id: TransferId) -> Option<(HostDeviceId, HostTransfer)> {
        let slot = &mut self.slots[id.index()];
        slot.busy = true;
        let host = slot.take_host_request();
        if slot.fake {
            self.fake.push(id);
        }
        trace!(
            "Transfer {:#x} submitted (fake={}, host={})",
            id.0,
            slot.fake,
            host.is_some()
        );
        host
    }

    /// Turn a submission the host refused into an immediate halted completion
    pub fn fail_host_submission(&mut self, id: TransferId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.complete_fake(CompletionCode::Halted, 0, Duration::ZERO);
            self.fake.push(id);
        }
    }

    /// Apply a host completion to slot `id` and release it
    pub fn complete_from_host(&mut self, id: TransferId, completion: HostCompletion) -> bool {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return false;
        };

        if completion.status != HostStatus::Completed {
            error!("Transfer {:#x} error: {:?}", id.0, completion.status);
        }

        slot.result = map_host_status(completion.status);
        slot.count = completion.actual_length;
        if !completion.data.is_empty() {
            slot.buffer = completion.data;
        }

        for (index, packet) in completion
            .iso_packets
            .iter()
            .take(MAX_ISO_PACKETS)
            .enumerate()
        {
            slot.iso_request.packets[index] = pack_iso_packet(
                map_iso_packet_status(packet.status),
                packet.actual_length,
            );
        }

        slot.busy = false;
        true
    }

    /// Retire every fake transfer due at `now`, in submission order
    pub fn retire_due(&mut self, now: Instant) -> Vec<TransferId> {
        let mut retired = Vec::new();
        let slots = &mut self.slots;

        self.fake.retain(|id| {
            let slot = &mut slots[id.index()];
            if !slot.is_due(now) {
                return true;
            }

            slot.result = slot.expected_result;
            slot.count = slot.expected_count;
            slot.fake = false;
            slot.busy = false;
            slot.expected_time = None;
            retired.push(*id);
            false
        });

        retired
    }

    /// Guest-visible status of slot `id`
    pub fn status(&self, id: TransferId) -> Result<TransferStatus> {
        let slot = self
            .slot(id)
            .ok_or_else(|| UsbdError::unknown_transfer(id))?;
        Ok(TransferStatus {
            result: slot.result.as_raw(),
            count: slot.count,
        })
    }
}
