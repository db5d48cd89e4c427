//! Guest-visible USB type definitions
//!
//! This module defines the handles, status codes, event triples and
//! fixed-format records that guest USB drivers observe. Every numeric value in
//! here is part of the guest ABI and must not change.

use serde::{Deserialize, Serialize};

/// Number of transfer slots in the pool
pub const MAX_TRANSFERS: usize = 0x44;

/// Maximum number of packets in one isochronous request
pub const MAX_ISO_PACKETS: usize = 8;

/// Handle returned to the guest by a successful initialize
pub const USBD_HANDLE: u32 = 0x115B;

/// First pipe handle handed out; lower values are reserved
pub const PIPE_HANDLE_BASE: u32 = 0x10;

/// Guest device handle
///
/// Assigned when an LDD claims a device. Starts at 1 and is never reused
/// within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u32);

/// Pipe handle
///
/// Binds a device handle and an endpoint. Endpoint 0 is the control pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipeHandle(pub u32);

/// Transfer identifier (index into the transfer slot pool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransferId(pub u32);

impl TransferId {
    /// Slot index of this transfer
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kind of a usbd event (first element of the event triple)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum EventKind {
    /// A device was claimed by an LDD; arg2 carries the device handle
    Attach = 1,
    /// A device went away; arg2 carries the device handle
    Detach = 2,
    /// A transfer finished; arg2 carries the transfer id
    TransferComplete = 3,
    /// The subsystem is shutting down; the guest callback thread exits
    Terminate = 4,
}

impl EventKind {
    /// Parse a raw event kind
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            1 => Some(Self::Attach),
            2 => Some(Self::Detach),
            3 => Some(Self::TransferComplete),
            4 => Some(Self::Terminate),
            _ => None,
        }
    }
}

/// Event triple delivered to guest event receivers
///
/// Guest code may send arbitrary triples through the event port, so the
/// fields stay raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbdEvent {
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
}

impl UsbdEvent {
    pub const fn new(arg1: u64, arg2: u64, arg3: u64) -> Self {
        Self { arg1, arg2, arg3 }
    }

    /// Attach notification for a freshly assigned device handle
    pub const fn attach(handle: DeviceHandle) -> Self {
        Self::new(EventKind::Attach as u64, handle.0 as u64, 0)
    }

    /// Completion notification for a retired transfer slot
    pub const fn transfer_complete(id: TransferId) -> Self {
        Self::new(EventKind::TransferComplete as u64, id.0 as u64, 0)
    }

    /// Sentinel used to wake parked receivers on finalize
    pub const fn terminate() -> Self {
        Self::new(EventKind::Terminate as u64, 0, 0)
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_raw(self.arg1)
    }

    pub fn is_attach(&self) -> bool {
        self.kind() == Some(EventKind::Attach)
    }
}

impl From<(u64, u64, u64)> for UsbdEvent {
    fn from((arg1, arg2, arg3): (u64, u64, u64)) -> Self {
        Self::new(arg1, arg2, arg3)
    }
}

/// Transfer completion code reported by get-transfer-status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum CompletionCode {
    #[default]
    NoError = 0x000,
    MissedFrame = 0x010,
    TransactionError = 0x020,
    Babble = 0x040,
    DataBuffer = 0x080,
    Halted = 0x100,
}

impl CompletionCode {
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// Per-packet status stored in the top 4 bits of an isochronous packet word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IsoPacketStatus {
    NoError = 0x0,
    MissedFrame = 0x1,
    TransactionError = 0x2,
    Babble = 0x4,
    DataBuffer = 0x8,
}

/// Pack a packet status and actual length into one 16-bit packet word
///
/// Layout: `status[15:12] | length[11:0]`.
pub fn pack_iso_packet(status: IsoPacketStatus, actual_length: u32) -> u16 {
    (((status as u16) & 0xF) << 12) | ((actual_length & 0xFFF) as u16)
}

/// Split a packed isochronous packet word into (status bits, length)
pub fn unpack_iso_packet(word: u16) -> (u8, u16) {
    ((word >> 12) as u8, word & 0xFFF)
}

/// Control request submitted with a control-pipe transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceRequest {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength
    pub length: u16,
}

impl DeviceRequest {
    /// Size of the record in guest memory
    pub const GUEST_SIZE: usize = 8;

    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_CONFIGURATION: u8 = 0x09;

    /// Bit 7 of bmRequestType set means device-to-host
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    /// Standard device SET_CONFIGURATION, which claims the device's interfaces
    pub fn is_set_configuration(&self) -> bool {
        self.request_type == 0 && self.request == Self::SET_CONFIGURATION
    }
}

/// Isochronous request exchanged with the guest
///
/// On submission `packets` holds requested lengths; after completion each
/// entry holds a packed status/length word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IsoRequest {
    /// Guest address of the data buffer
    pub buffer_addr: u32,
    /// Starting frame number
    pub start_frame: u32,
    /// Number of valid entries in `packets`
    pub num_packets: u32,
    pub packets: [u16; MAX_ISO_PACKETS],
}

impl IsoRequest {
    /// Size of the record in guest memory
    pub const GUEST_SIZE: usize = 12 + 2 * MAX_ISO_PACKETS;

    /// Number of packets, clamped to the record capacity
    pub fn packet_count(&self) -> usize {
        (self.num_packets as usize).min(MAX_ISO_PACKETS)
    }

    /// Sum of the requested packet lengths
    pub fn total_length(&self) -> usize {
        self.packets[..self.packet_count()]
            .iter()
            .map(|len| (*len & 0xFFF) as usize)
            .sum()
    }
}

/// Device summary record returned by get-device-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsbInternalDevice {
    pub flags: u8,
    pub device_number: u8,
    pub kind: u8,
    pub max_packet_size: u8,
}

impl UsbInternalDevice {
    /// Size of the record in guest memory
    pub const GUEST_SIZE: usize = 4;

    /// Summary record for a newly handled device
    ///
    /// The record only has room for an 8-bit device number, so handles above
    /// 255 have no summary.
    pub fn for_handle(handle: DeviceHandle) -> Option<Self> {
        Some(Self {
            flags: 0x00,
            device_number: u8::try_from(handle.0).ok()?,
            kind: 0x02,
            max_packet_size: 0x40,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(UsbdEvent::attach(DeviceHandle(3)), UsbdEvent::new(1, 3, 0));
        assert_eq!(
            UsbdEvent::transfer_complete(TransferId(0x43)),
            UsbdEvent::new(3, 0x43, 0)
        );
        assert_eq!(UsbdEvent::terminate(), UsbdEvent::new(4, 0, 0));
        assert!(UsbdEvent::attach(DeviceHandle(1)).is_attach());
        assert_eq!(UsbdEvent::new(9, 0, 0).kind(), None);
    }

    #[test]
    fn test_completion_code_values() {
        assert_eq!(CompletionCode::NoError.as_raw(), 0);
        assert_eq!(CompletionCode::TransactionError.as_raw(), 0x20);
        assert_eq!(CompletionCode::Babble.as_raw(), 0x40);
        assert_eq!(CompletionCode::Halted.as_raw(), 0x100);
    }

    #[test]
    fn test_pack_iso_packet() {
        assert_eq!(pack_iso_packet(IsoPacketStatus::NoError, 10), 10);
        assert_eq!(pack_iso_packet(IsoPacketStatus::TransactionError, 0), 0x2000);
        assert_eq!(pack_iso_packet(IsoPacketStatus::MissedFrame, 5), 0x1005);
        // Length is truncated to 12 bits
        assert_eq!(pack_iso_packet(IsoPacketStatus::NoError, 0x1234), 0x0234);
        assert_eq!(unpack_iso_packet(0x1005), (1, 5));
    }

    #[test]
    fn test_set_configuration_detection() {
        let req = DeviceRequest {
            request_type: 0,
            request: 0x09,
            value: 1,
            ..Default::default()
        };
        assert!(req.is_set_configuration());

        let class_req = DeviceRequest {
            request_type: 0x21,
            request: 0x09,
            ..Default::default()
        };
        assert!(!class_req.is_set_configuration());
        assert!(!class_req.is_device_to_host());
    }

    #[test]
    fn test_iso_request_lengths() {
        let mut req = IsoRequest {
            num_packets: 3,
            ..Default::default()
        };
        req.packets[..3].copy_from_slice(&[10, 20, 30]);
        req.packets[3] = 99;
        assert_eq!(req.packet_count(), 3);
        assert_eq!(req.total_length(), 60);

        req.num_packets = 100;
        assert_eq!(req.packet_count(), MAX_ISO_PACKETS);
    }

    #[test]
    fn test_internal_device_record() {
        let rec = UsbInternalDevice::for_handle(DeviceHandle(2)).unwrap();
        assert_eq!(rec.device_number, 2);
        assert_eq!(rec.kind, 0x02);
        assert_eq!(rec.max_packet_size, 0x40);
    }

    #[test]
    fn test_internal_device_record_needs_8_bit_handle() {
        let last = UsbInternalDevice::for_handle(DeviceHandle(255)).unwrap();
        assert_eq!(last.device_number, 0xFF);
        assert_eq!(UsbInternalDevice::for_handle(DeviceHandle(256)), None);
        assert_eq!(UsbInternalDevice::for_handle(DeviceHandle(0x1_0001)), None);
    }
}
