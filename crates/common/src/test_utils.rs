//! Test utilities for usbd
//!
//! Provides a scriptable [`HostBackend`] and helpers for building host device
//! descriptors, so the engine can be exercised without host USB access.
//!
//! # Example
//!
//! ```
//! use common::HostBackend;
//! use common::test_utils::MockHostBackend;
//!
//! let backend = MockHostBackend::new().with_device(0x1430, 0x0150);
//! let devices = backend.enumerate().unwrap();
//! assert_eq!(devices.len(), 1);
//! assert_eq!(devices[0].vendor_id, 0x1430);
//! ```

use crate::usb_types::{
    CompletionCallback, HostBackend, HostCompletion, HostDeviceId, HostDeviceInfo, HostTransfer,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Call recorded by [`MockHostBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open(HostDeviceId),
    Descriptors(HostDeviceId),
    SetConfiguration(HostDeviceId, u8),
    SetInterface(HostDeviceId, u8),
    Submit(HostDeviceId, HostTransfer),
}

/// Transfer accepted by the mock and waiting for a scripted completion
pub struct PendingSubmission {
    pub device: HostDeviceId,
    pub transfer: HostTransfer,
    callback: CompletionCallback,
}

impl PendingSubmission {
    /// Fire the completion callback
    pub fn complete(self, completion: HostCompletion) {
        (self.callback)(completion);
    }
}

#[derive(Default)]
struct MockState {
    devices: Vec<HostDeviceInfo>,
    failing_open: HashSet<HostDeviceId>,
    failing_enumerate: bool,
    rejecting_submit: bool,
    calls: Vec<MockCall>,
    pending: VecDeque<PendingSubmission>,
}

/// In-memory host backend
///
/// Submissions are parked until the test completes them explicitly, which
/// makes the hardware completion path deterministic.
#[derive(Default)]
pub struct MockHostBackend {
    state: Mutex<MockState>,
    event_polls: AtomicUsize,
}

impl MockHostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a host device; addresses are assigned in insertion order
    pub fn with_device(self, vendor_id: u16, product_id: u16) -> Self {
        {
            let mut state = self.lock();
            let address = state.devices.len() as u8 + 1;
            state.devices.push(HostDeviceInfo {
                id: HostDeviceId { bus: 1, address },
                vendor_id,
                product_id,
            });
        }
        self
    }

    /// Make `open` fail for the device at `address`
    pub fn with_failing_open(self, address: u8) -> Self {
        self.lock()
            .failing_open
            .insert(HostDeviceId { bus: 1, address });
        self
    }

    /// Make `enumerate` fail
    pub fn with_failing_enumeration(self) -> Self {
        self.lock().failing_enumerate = true;
        self
    }

    /// Make `submit` reject every transfer
    pub fn with_rejected_submissions(self) -> Self {
        self.lock().rejecting_submit = true;
        self
    }

    /// Calls recorded so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of submissions awaiting completion
    pub fn pending_submissions(&self) -> usize {
        self.lock().pending.len()
    }

    /// Remove the oldest pending submission
    ///
    /// The callback is not fired; call [`PendingSubmission::complete`]
    /// outside of any engine lock.
    pub fn take_submission(&self) -> Option<PendingSubmission> {
        self.lock().pending.pop_front()
    }

    /// Complete the oldest pending submission; false when none is pending
    pub fn complete_next(&self, completion: HostCompletion) -> bool {
        match self.take_submission() {
            Some(submission) => {
                submission.complete(completion);
                true
            }
            None => false,
        }
    }

    /// Number of `handle_events` calls
    pub fn event_polls(&self) -> usize {
        self.event_polls.load(Ordering::SeqCst)
    }
}

impl HostBackend for MockHostBackend {
    fn enumerate(&self) -> crate::Result<Vec<HostDeviceInfo>> {
        let state = self.lock();
        if state.failing_enumerate {
            return Err(crate::Error::BackendUnavailable(
                "mock enumeration failure".to_string(),
            ));
        }
        Ok(state.devices.clone())
    }

    fn open(&self, device: HostDeviceId) -> crate::Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Open(device));
        if state.failing_open.contains(&device) {
            return Err(crate::Error::Usb(format!("mock open failure on {}", device)));
        }
        Ok(())
    }

    fn descriptors(&self, device: HostDeviceId) -> crate::Result<Vec<u8>> {
        let mut state = self.lock();
        state.calls.push(MockCall::Descriptors(device));
        let info = state
            .devices
            .iter()
            .find(|d| d.id == device)
            .ok_or_else(|| crate::Error::UnknownDevice(device.to_string()))?;

        let mut bytes = create_mock_device_descriptor(info.vendor_id, info.product_id);
        bytes.extend(create_mock_config_descriptor());
        Ok(bytes)
    }

    fn set_configuration(&self, device: HostDeviceId, config: u8) -> crate::Result<()> {
        self.lock()
            .calls
            .push(MockCall::SetConfiguration(device, config));
        Ok(())
    }

    fn set_interface(&self, device: HostDeviceId, interface: u8) -> crate::Result<()> {
        self.lock()
            .calls
            .push(MockCall::SetInterface(device, interface));
        Ok(())
    }

    fn submit(
        &self,
        device: HostDeviceId,
        transfer: HostTransfer,
        on_complete: CompletionCallback,
    ) -> crate::Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Submit(device, transfer.clone()));
        if state.rejecting_submit {
            return Err(crate::Error::Usb("mock submit rejected".to_string()));
        }
        state.pending.push_back(PendingSubmission {
            device,
            transfer,
            callback: on_complete,
        });
        Ok(())
    }

    fn handle_events(&self, timeout: Duration) -> crate::Result<()> {
        self.event_polls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
        Ok(())
    }
}

/// Create a standard 18-byte device descriptor
pub fn create_mock_device_descriptor(vendor_id: u16, product_id: u16) -> Vec<u8> {
    let [vid_lo, vid_hi] = vendor_id.to_le_bytes();
    let [pid_lo, pid_hi] = product_id.to_le_bytes();
    vec![
        0x12, // bLength
        0x01, // bDescriptorType (Device)
        0x00, 0x02, // bcdUSB (2.00)
        0x00, // bDeviceClass
        0x00, // bDeviceSubClass
        0x00, // bDeviceProtocol
        0x40, // bMaxPacketSize0 (64 bytes)
        vid_lo, vid_hi, // idVendor
        pid_lo, pid_hi, // idProduct
        0x00, 0x01, // bcdDevice (1.00)
        0x01, // iManufacturer
        0x02, // iProduct
        0x00, // iSerialNumber
        0x01, // bNumConfigurations
    ]
}

/// Create a minimal configuration descriptor with one interrupt interface
pub fn create_mock_config_descriptor() -> Vec<u8> {
    vec![
        // Configuration descriptor
        0x09, // bLength
        0x02, // bDescriptorType (Configuration)
        0x19, 0x00, // wTotalLength (25 bytes)
        0x01, // bNumInterfaces
        0x01, // bConfigurationValue
        0x00, // iConfiguration
        0x80, // bmAttributes (Bus-powered)
        0x32, // bMaxPower (100mA)
        // Interface descriptor
        0x09, // bLength
        0x04, // bDescriptorType (Interface)
        0x00, // bInterfaceNumber
        0x00, // bAlternateSetting
        0x01, // bNumEndpoints
        0x03, // bInterfaceClass (HID)
        0x00, // bInterfaceSubClass
        0x00, // bInterfaceProtocol
        0x00, // iInterface
        // Endpoint descriptor
        0x07, // bLength
        0x05, // bDescriptorType (Endpoint)
        0x81, // bEndpointAddress (EP1 IN)
        0x03, // bmAttributes (Interrupt)
        0x20, 0x00, // wMaxPacketSize (32 bytes)
        0x01, // bInterval
    ]
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
