//! Hardware access layer contract
//!
//! The engine never talks to host USB directly. Everything it needs from the
//! host (enumeration, opening, descriptor reads, configuration changes and
//! asynchronous transfers) goes through [`HostBackend`]. Completions are
//! reported by invoking the per-transfer callback from a thread owned by the
//! backend.

use abi::DeviceRequest;
use std::fmt;
use std::time::Duration;

/// Host-side device identity: (bus number, device address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostDeviceId {
    pub bus: u8,
    pub address: u8,
}

impl fmt::Display for HostDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

/// Enumerated host device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDeviceInfo {
    pub id: HostDeviceId,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Transfer status reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Completed,
    TimedOut,
    Overflow,
    Error,
    Cancelled,
    Stall,
    NoDevice,
    /// Any status the host reports that has no dedicated variant
    Unknown(i32),
}

/// Per-packet outcome of an isochronous transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostIsoPacket {
    pub status: HostStatus,
    pub actual_length: u32,
}

/// Transfer handed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTransfer {
    /// Control transfer on endpoint 0
    ///
    /// For device-to-host requests `data` is sized to the expected length.
    Control {
        request: DeviceRequest,
        data: Vec<u8>,
    },
    /// Interrupt transfer; the endpoint address carries the direction bit
    Interrupt { endpoint: u8, data: Vec<u8> },
    /// Isochronous transfer split into `packet_lengths.len()` packets
    Isochronous {
        endpoint: u8,
        data: Vec<u8>,
        packet_lengths: Vec<u16>,
    },
}

/// Completion reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCompletion {
    pub status: HostStatus,
    pub actual_length: u32,
    /// Data returned by device-to-host transfers
    pub data: Vec<u8>,
    /// Empty unless the transfer was isochronous
    pub iso_packets: Vec<HostIsoPacket>,
}

impl HostCompletion {
    /// Completion carrying only a status
    pub fn with_status(status: HostStatus) -> Self {
        Self {
            status,
            actual_length: 0,
            data: Vec::new(),
            iso_packets: Vec::new(),
        }
    }

    /// Successful completion returning `data`
    pub fn completed(data: Vec<u8>) -> Self {
        Self {
            status: HostStatus::Completed,
            actual_length: data.len() as u32,
            data,
            iso_packets: Vec::new(),
        }
    }
}

/// Callback invoked exactly once when a submitted transfer finishes
pub type CompletionCallback = Box<dyn FnOnce(HostCompletion) + Send + 'static>;

/// Hardware access layer
///
/// Implementations must be usable from the pump thread and from guest call
/// sites at the same time.
pub trait HostBackend: Send + Sync {
    /// List currently attached host devices
    fn enumerate(&self) -> crate::Result<Vec<HostDeviceInfo>>;

    /// Open a device for I/O
    fn open(&self, device: HostDeviceId) -> crate::Result<()>;

    /// Raw device descriptor followed by the full configuration descriptor
    fn descriptors(&self, device: HostDeviceId) -> crate::Result<Vec<u8>>;

    /// Select a configuration
    ///
    /// May return before the change reaches the device; transfers submitted
    /// afterwards still observe it.
    fn set_configuration(&self, device: HostDeviceId, config: u8) -> crate::Result<()>;

    /// Claim an interface, with the same ordering as `set_configuration`
    fn set_interface(&self, device: HostDeviceId, interface: u8) -> crate::Result<()>;

    /// Queue a transfer; `on_complete` runs on a backend-owned thread
    fn submit(
        &self,
        device: HostDeviceId,
        transfer: HostTransfer,
        on_complete: CompletionCallback,
    ) -> crate::Result<()>;

    /// Service pending asynchronous I/O, waiting at most `timeout`
    fn handle_events(&self, timeout: Duration) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_device_id_display() {
        let id = HostDeviceId { bus: 1, address: 12 };
        assert_eq!(id.to_string(), "001:012");
    }

    #[test]
    fn test_completed_sets_length() {
        let c = HostCompletion::completed(vec![1, 2, 3]);
        assert_eq!(c.status, HostStatus::Completed);
        assert_eq!(c.actual_length, 3);
        assert!(c.iso_packets.is_empty());
    }
}
