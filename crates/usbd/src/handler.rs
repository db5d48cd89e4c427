//! USB subsystem service object
//!
//! [`UsbHandler`] owns the whole subsystem state behind one mutex and
//! exposes the guest-facing operations. It is cheap to clone; every clone
//! refers to the same subsystem. Three kinds of callers share it:
//!
//! - guest call sites, through the operations below
//! - the background pump ([`crate::worker`])
//! - host completion callbacks running on the backend's I/O thread
//!
//! Lock order is the state lock, then a device's own lock. Host event
//! servicing runs without the state lock so completion callbacks can take
//! it.

use crate::config::{TimingSettings, UsbdConfig};
use crate::error::{Result, UsbdError};
use crate::events::{EventQueue, GuestThread, ReceiveOutcome};
use crate::ldd::{HandledDevices, LddTable, match_devices};
use crate::pipes::PipeTable;
use crate::transfers::{TransferPool, TransferStatus};
use crate::usb::device::lock_device;
use crate::usb::registry::DeviceRegistry;
use crate::usb::rusb_backend::RusbBackend;
use abi::{
    DeviceHandle, DeviceRequest, IsoRequest, PipeHandle, SavedState, TransferId, USBD_HANDLE,
    UsbInternalDevice, UsbdEvent, decode_saved_state, encode_saved_state,
};
use common::{CompletionCallback, HostBackend, HostDeviceId, HostTransfer, WakeSignal};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Name the promiscuous LDD registration redirects to a fixed device
const GUNCON3_LDD: &str = "guncon3";

/// Everything guarded by the subsystem lock
pub(crate) struct UsbdState {
    is_init: bool,
    registry: DeviceRegistry,
    ldds: LddTable,
    handled: HandledDevices,
    pipes: PipeTable,
    transfers: TransferPool,
    events: EventQueue,
}

impl UsbdState {
    fn new(registry: DeviceRegistry) -> Self {
        Self {
            is_init: false,
            registry,
            ldds: LddTable::new(),
            handled: HandledDevices::new(),
            pipes: PipeTable::new(),
            transfers: TransferPool::new(),
            events: EventQueue::new(),
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_init {
            Ok(())
        } else {
            Err(UsbdError::NotInitialized)
        }
    }
}

impl Drop for UsbdState {
    fn drop(&mut self) {
        // Device references go before the backend they may hold
        self.handled.clear();
        self.pipes.clear();
        self.registry.clear();
    }
}

struct Shared {
    state: Mutex<UsbdState>,
    backend: Option<Arc<dyn HostBackend>>,
    timing: TimingSettings,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, UsbdState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct UsbHandler {
    shared: Arc<Shared>,
}

impl UsbHandler {
    /// Build the subsystem, enumerating host devices through `backend`
    pub fn new(config: &UsbdConfig, backend: Option<Arc<dyn HostBackend>>) -> Self {
        let registry = DeviceRegistry::build(config, backend.as_ref());
        Self::from_registry(registry, backend, config.timing.clone())
    }

    /// Build the subsystem on the host's USB stack
    ///
    /// Falls back to emulated devices only when the host context cannot be
    /// created.
    pub fn with_host(config: &UsbdConfig) -> Self {
        let backend: Option<Arc<dyn HostBackend>> = if config.passthrough.enabled {
            match RusbBackend::new() {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    error!("Failed to initialize host USB: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self::new(config, backend)
    }

    /// Build the subsystem around an existing registry
    pub fn from_registry(
        registry: DeviceRegistry,
        backend: Option<Arc<dyn HostBackend>>,
        timing: TimingSettings,
    ) -> Self {
        info!("USB subsystem created with {} device(s)", registry.len());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(UsbdState::new(registry)),
                backend,
                timing,
            }),
        }
    }

    /// Rebuild the subsystem from saved state
    ///
    /// Only the initialized flag survives; devices are enumerated afresh and
    /// guest drivers register again.
    pub fn restore(bytes: &[u8], config: &UsbdConfig, backend: Option<Arc<dyn HostBackend>>) -> Result<Self> {
        let saved = decode_saved_state(bytes)?;
        let handler = Self::new(config, backend);
        handler.lock().is_init = saved.initialized;
        info!("USB subsystem restored (initialized={})", saved.initialized);
        Ok(handler)
    }

    /// Encode the state that survives a save/restore
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let initialized = self.lock().is_init;
        Ok(encode_saved_state(&SavedState::new(initialized))?)
    }

    fn lock(&self) -> MutexGuard<'_, UsbdState> {
        self.shared.lock()
    }

    fn lock_initialized(&self) -> Result<MutexGuard<'_, UsbdState>> {
        let state = self.lock();
        state.ensure_initialized()?;
        Ok(state)
    }

    pub fn timing(&self) -> &TimingSettings {
        &self.shared.timing
    }

    // Lifecycle

    /// Returns the subsystem handle
    pub fn initialize(&self) -> Result<u32> {
        let mut state = self.lock();
        if state.is_init {
            return Err(UsbdError::AlreadyInitialized);
        }
        state.is_init = true;
        info!("USB subsystem initialized");
        Ok(USBD_HANDLE)
    }

    /// Mark the subsystem uninitialized and wake every parked context
    pub fn finalize(&self) -> Result<()> {
        let mut state = self.lock();
        state.is_init = false;
        let woken = state.events.wake_all(UsbdEvent::terminate());
        info!("USB subsystem finalized, woke {} waiter(s)", woken);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_init
    }

    // Devices and drivers

    /// Summary records of handled devices in handle order, at most `max`
    pub fn get_device_list(&self, max: u32) -> Result<Vec<UsbInternalDevice>> {
        let state = self.lock_initialized()?;
        Ok(state.handled.summaries().take(max as usize).collect())
    }

    /// Promiscuous registration
    ///
    /// Only the light gun driver is honored; it is redirected to a fixed
    /// vendor/product registration.
    pub fn register_ldd(&self, name: &str) -> Result<()> {
        if name == GUNCON3_LDD {
            warn!("register_ldd({}) redirected to register_extra_ldd", name);
            self.register_extra_ldd(name, 0x0B9A, 0x0800, 0x0800)?;
        } else {
            warn!("register_ldd({}) is not supported", name);
        }
        Ok(())
    }

    /// Register a driver and claim matching devices
    ///
    /// Returns the number of registrations.
    pub fn register_extra_ldd(
        &self,
        name: &str,
        vendor_id: u16,
        product_min: u16,
        product_max: u16,
    ) -> Result<u32> {
        let mut state = self.lock_initialized()?;
        let count = Self::add_ldd_locked(&mut state, name, vendor_id, product_min, product_max);
        Self::check_devices_locked(&mut state);
        Ok(count as u32)
    }

    /// Append a registration without scanning
    pub fn add_ldd(&self, name: &str, vendor_id: u16, product_min: u16, product_max: u16) -> usize {
        Self::add_ldd_locked(&mut self.lock(), name, vendor_id, product_min, product_max)
    }

    /// Claim every unassigned device a registration matches
    pub fn check_devices_vs_ldds(&self) -> Vec<DeviceHandle> {
        Self::check_devices_locked(&mut self.lock())
    }

    fn add_ldd_locked(
        state: &mut UsbdState,
        name: &str,
        vendor_id: u16,
        product_min: u16,
        product_max: u16,
    ) -> usize {
        debug!(
            "Registering LDD {} for {:04x}:{:04x}-{:04x}",
            name, vendor_id, product_min, product_max
        );
        state.ldds.add(name, vendor_id, product_min, product_max)
    }

    fn check_devices_locked(state: &mut UsbdState) -> Vec<DeviceHandle> {
        let UsbdState {
            registry,
            ldds,
            handled,
            events,
            ..
        } = state;
        match_devices(registry, ldds, handled, events)
    }

    pub fn get_descriptor_size(&self, device: DeviceHandle) -> Result<u32> {
        let state = self.lock_initialized()?;
        let entry = state
            .handled
            .get(device)
            .ok_or_else(|| UsbdError::unknown_device(device))?;
        Ok(lock_device(&entry.device).descriptor_size())
    }

    /// Copy the descriptor tree into `out`; returns bytes written
    pub fn get_descriptor(&self, device: DeviceHandle, out: &mut [u8]) -> Result<usize> {
        let state = self.lock_initialized()?;
        let entry = state
            .handled
            .get(device)
            .ok_or_else(|| UsbdError::unknown_device(device))?;
        Ok(lock_device(&entry.device).write_descriptor(out))
    }

    // Pipes

    pub fn open_pipe(&self, device: DeviceHandle, endpoint: u8) -> Result<PipeHandle> {
        let mut state = self.lock_initialized()?;
        let shared = state
            .handled
            .get(device)
            .map(|entry| Arc::clone(&entry.device))
            .ok_or_else(|| UsbdError::unknown_device(device))?;

        let pipe = state.pipes.open(device, shared, endpoint);
        debug!(
            "Opened pipe {:#x} on device {} endpoint {:#04x}",
            pipe.0, device.0, endpoint
        );
        Ok(pipe)
    }

    pub fn open_default_pipe(&self, device: DeviceHandle) -> Result<PipeHandle> {
        self.open_pipe(device, 0)
    }

    pub fn close_pipe(&self, pipe: PipeHandle) -> Result<()> {
        let mut state = self.lock_initialized()?;
        if !state.pipes.close(pipe) {
            return Err(UsbdError::unknown_pipe(pipe));
        }
        debug!("Closed pipe {:#x}", pipe.0);
        Ok(())
    }

    pub fn is_pipe(&self, pipe: PipeHandle) -> bool {
        self.lock().pipes.is_pipe(pipe)
    }

    // Transfers

    /// Start a control or interrupt transfer on `pipe`
    ///
    /// `data` carries OUT data, or is sized to the guest buffer for IN
    /// transfers. Control pipes require `request`.
    pub fn transfer_data(
        &self,
        pipe: PipeHandle,
        data: &[u8],
        request: Option<&DeviceRequest>,
    ) -> Result<TransferId> {
        let mut state = self.lock_initialized()?;
        let pipe_entry = state
            .pipes
            .get(pipe)
            .cloned()
            .ok_or_else(|| UsbdError::unknown_pipe(pipe))?;

        let id = state.transfers.allocate();
        trace!(
            "transfer_data(pipe={:#x}, len={}, request={:?}) -> {:#x}",
            pipe.0,
            data.len(),
            request,
            id.0
        );

        let host = state.transfers.dispatch_data(id, &pipe_entry, data, request)?;
        self.submit_to_backend(&mut state, id, host);
        Ok(id)
    }

    /// Start an isochronous transfer on `pipe`
    pub fn isochronous_transfer_data(&self, pipe: PipeHandle, request: &IsoRequest) -> Result<TransferId> {
        let mut state = self.lock_initialized()?;
        let pipe_entry = state
            .pipes
            .get(pipe)
            .cloned()
            .ok_or_else(|| UsbdError::unknown_pipe(pipe))?;

        let id = state.transfers.allocate();
        debug!(
            "isochronous_transfer_data(pipe={:#x}, packets={}) -> {:#x}",
            pipe.0, request.num_packets, id.0
        );

        let host = state.transfers.dispatch_isochronous(id, &pipe_entry, request)?;
        self.submit_to_backend(&mut state, id, host);
        Ok(id)
    }

    fn submit_to_backend(
        &self,
        state: &mut UsbdState,
        id: TransferId,
        host: Option<(HostDeviceId, HostTransfer)>,
    ) {
        let Some((device, transfer)) = host else {
            return;
        };

        let Some(backend) = &self.shared.backend else {
            error!("Transfer {:#x} needs host USB but no backend is present", id.0);
            state.transfers.fail_host_submission(id);
            return;
        };

        if let Err(e) = backend.submit(device, transfer, self.completion_callback(id)) {
            error!("Failed to submit transfer {:#x} to {}: {}", id.0, device, e);
            state.transfers.fail_host_submission(id);
        }
    }

    /// Callback applying a host completion to slot `id`
    fn completion_callback(&self, id: TransferId) -> CompletionCallback {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Box::new(move |completion| {
            let Some(shared) = shared.upgrade() else {
                return;
            };

            let mut state = shared.lock();
            if !state.is_init {
                debug!("Dropping completion of {:#x}, subsystem not initialized", id.0);
                return;
            }

            if state.transfers.complete_from_host(id, completion) {
                trace!("Transfer {:#x} completed by host", id.0);
                state.events.add(UsbdEvent::transfer_complete(id));
            }
        })
    }

    pub fn get_transfer_status(&self, id: TransferId) -> Result<TransferStatus> {
        let state = self.lock_initialized()?;
        state.transfers.status(id)
    }

    /// Copy of the isochronous request with packed packet words, and the result
    pub fn get_isochronous_transfer_status(&self, id: TransferId) -> Result<(IsoRequest, u32)> {
        let state = self.lock_initialized()?;
        let slot = state
            .transfers
            .slot(id)
            .ok_or_else(|| UsbdError::unknown_transfer(id))?;
        Ok((slot.iso_request, slot.result.as_raw()))
    }

    /// Data returned by the last device-to-host transfer on slot `id`
    pub fn read_transfer_data(&self, id: TransferId) -> Result<Vec<u8>> {
        let state = self.lock_initialized()?;
        let slot = state
            .transfers
            .slot(id)
            .ok_or_else(|| UsbdError::unknown_transfer(id))?;
        let len = (slot.count as usize).min(slot.buffer.len());
        Ok(slot.buffer[..len].to_vec())
    }

    // Events

    /// Deliver an event to a parked context or queue it
    pub fn add_event(&self, event: UsbdEvent) {
        trace!("Adding event {:?}", event);
        self.lock().events.add(event);
    }

    /// Non-blocking pop of the oldest queued event
    pub fn get_event(&self) -> Option<UsbdEvent> {
        self.lock().events.pop()
    }

    /// Guest-originated event
    pub fn event_port_send(&self, arg1: u64, arg2: u64, arg3: u64) -> Result<()> {
        let mut state = self.lock_initialized()?;
        state.events.add(UsbdEvent::new(arg1, arg2, arg3));
        Ok(())
    }

    /// Wait for the next event on behalf of `thread`
    ///
    /// Returns at once when an event is queued; otherwise parks the context
    /// until an event is delivered to it or it is interrupted. A context
    /// that receives an attach event is held back for the configured attach
    /// delay.
    pub fn receive_event(&self, thread: &Arc<GuestThread>) -> Result<ReceiveOutcome> {
        {
            let mut state = self.lock_initialized()?;

            // Interrupts left over from an earlier call
            while let Some(signal) = thread.mailbox().try_take() {
                if let WakeSignal::Deliver(event) = signal {
                    drop(state);
                    return Ok(self.received(event));
                }
            }

            if let Some(event) = state.events.pop() {
                drop(state);
                return Ok(self.received(event));
            }

            trace!("Parking guest thread {}", thread.name());
            state.events.park(Arc::clone(thread));
        }

        loop {
            match thread.mailbox().wait() {
                Ok(WakeSignal::Deliver(event)) => return Ok(self.received(event)),
                Ok(WakeSignal::Interrupt) => {
                    if self.lock().events.remove_waiter(thread) {
                        debug!("Guest thread {} interrupted while parked", thread.name());
                        return Ok(ReceiveOutcome::Interrupted);
                    }
                    // An event was already handed over; collect it
                }
                Err(e) => {
                    warn!("Wake channel of {} failed: {}", thread.name(), e);
                    self.lock().events.remove_waiter(thread);
                    return Ok(ReceiveOutcome::Interrupted);
                }
            }
        }
    }

    fn received(&self, event: UsbdEvent) -> ReceiveOutcome {
        let delay = self.shared.timing.attach_delay();
        if event.is_attach() && !delay.is_zero() {
            std::thread::sleep(delay);
        }
        ReceiveOutcome::Received(event)
    }

    // Pump support and inspection

    /// Retire every fake transfer due at `now`; returns how many retired
    pub fn retire_due_fake_transfers(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let retired = state.transfers.retire_due(now);
        for id in &retired {
            trace!("Fake transfer {:#x} retired", id.0);
            state.events.add(UsbdEvent::transfer_complete(*id));
        }
        retired.len()
    }

    /// Let the backend run pending completions
    pub fn service_host_events(&self) -> common::Result<()> {
        match &self.shared.backend {
            Some(backend) => backend.handle_events(self.shared.timing.event_wait()),
            None => Ok(()),
        }
    }

    pub fn handled_count(&self) -> usize {
        self.lock().handled.len()
    }

    pub fn pending_events(&self) -> usize {
        self.lock().events.len()
    }

    pub fn parked_waiters(&self) -> usize {
        self.lock().events.parked_count()
    }

    pub fn busy_transfers(&self) -> usize {
        self.lock().transfers.busy_count()
    }

    /// One line per registry device
    pub fn describe_devices(&self) -> Vec<String> {
        self.lock().registry.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CELL_EBUSY, CELL_EINVAL};
    use crate::usb::emulated::PeripheralKind;
    use abi::{CompletionCode, MAX_TRANSFERS};
    use common::test_utils::MockHostBackend;
    use std::time::Duration;

    fn test_config(kinds: &[PeripheralKind]) -> UsbdConfig {
        let mut config = UsbdConfig::default();
        config.emulation.always_present = kinds.to_vec();
        config.timing.attach_delay_us = 0;
        config
    }

    fn portal_handler() -> UsbHandler {
        let handler = UsbHandler::new(&test_config(&[PeripheralKind::SkylanderPortal]), None);
        handler.initialize().unwrap();
        handler
    }

    #[test]
    fn test_initialize_twice() {
        let handler = portal_handler();
        let err = handler.initialize().unwrap_err();
        assert_eq!(err, UsbdError::AlreadyInitialized);
        assert_eq!(err.code(), CELL_EBUSY);
    }

    #[test]
    fn test_operations_require_init() {
        let handler = UsbHandler::new(&test_config(&[]), None);
        assert_eq!(
            handler.get_device_list(8).unwrap_err().code(),
            CELL_EINVAL
        );
        assert_eq!(
            handler.register_extra_ldd("x", 1, 0, 0),
            Err(UsbdError::NotInitialized)
        );
        assert_eq!(
            handler.event_port_send(1, 2, 3),
            Err(UsbdError::NotInitialized)
        );
    }

    #[test]
    fn test_register_and_list() {
        let handler = portal_handler();
        assert_eq!(handler.register_extra_ldd("portal", 0x1430, 0x0150, 0x0150), Ok(1));

        let list = handler.get_device_list(8).unwrap();
        assert_eq!(list, vec![UsbInternalDevice::for_handle(DeviceHandle(1)).unwrap()]);
        assert!(handler.get_device_list(0).unwrap().is_empty());
        assert_eq!(handler.get_event(), Some(UsbdEvent::attach(DeviceHandle(1))));
    }

    #[test]
    fn test_register_ldd_redirect() {
        let handler = portal_handler();
        handler.register_ldd("camera").unwrap();
        assert_eq!(handler.add_ldd("probe", 0, 0, 0), 1);

        handler.register_ldd("guncon3").unwrap();
        assert_eq!(handler.add_ldd("probe", 0, 0, 0), 3);
    }

    #[test]
    fn test_descriptor_copy() {
        let handler = portal_handler();
        handler.register_extra_ldd("portal", 0x1430, 0x0150, 0x0150).unwrap();

        let size = handler.get_descriptor_size(DeviceHandle(1)).unwrap() as usize;
        let mut out = vec![0u8; size];
        assert_eq!(handler.get_descriptor(DeviceHandle(1), &mut out).unwrap(), size);
        assert_eq!(&out[8..12], &[0x30, 0x14, 0x50, 0x01]);

        assert_eq!(
            handler.get_descriptor_size(DeviceHandle(9)),
            Err(UsbdError::UnknownDevice(9))
        );
    }

    #[test]
    fn test_pipe_lifecycle() {
        let handler = portal_handler();
        handler.register_extra_ldd("portal", 0x1430, 0x0150, 0x0150).unwrap();

        let control = handler.open_default_pipe(DeviceHandle(1)).unwrap();
        let interrupt = handler.open_pipe(DeviceHandle(1), 0x81).unwrap();
        assert_eq!(control, PipeHandle(0x10));
        assert_eq!(interrupt, PipeHandle(0x11));

        handler.close_pipe(control).unwrap();
        assert!(!handler.is_pipe(control));
        assert_eq!(handler.close_pipe(control), Err(UsbdError::UnknownPipe(0x10)));
        assert_eq!(
            handler.open_pipe(DeviceHandle(2), 0),
            Err(UsbdError::UnknownDevice(2))
        );
    }

    #[test]
    fn test_missing_request_consumes_id() {
        let handler = portal_handler();
        handler.register_extra_ldd("portal", 0x1430, 0x0150, 0x0150).unwrap();
        let control = handler.open_default_pipe(DeviceHandle(1)).unwrap();

        assert_eq!(
            handler.transfer_data(control, &[], None),
            Err(UsbdError::MissingRequest)
        );

        let interrupt = handler.open_pipe(DeviceHandle(1), 0x81).unwrap();
        assert_eq!(
            handler.transfer_data(interrupt, &[0; 32], None),
            Ok(TransferId(2))
        );
    }

    #[test]
    fn test_fake_transfer_completes() {
        let handler = portal_handler();
        handler.register_extra_ldd("portal", 0x1430, 0x0150, 0x0150).unwrap();
        handler.get_event();
        let pipe = handler.open_pipe(DeviceHandle(1), 0x81).unwrap();

        let id = handler.transfer_data(pipe, &[0; 32], None).unwrap();
        assert_eq!(handler.busy_transfers(), 1);

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(handler.retire_due_fake_transfers(later), 1);
        assert_eq!(handler.get_event(), Some(UsbdEvent::transfer_complete(id)));

        let status = handler.get_transfer_status(id).unwrap();
        assert_eq!(status.result, CompletionCode::NoError.as_raw());
        assert_eq!(status.count, 32);
        assert_eq!(handler.read_transfer_data(id).unwrap()[0], b'S');
    }

    #[test]
    fn test_unknown_transfer_id() {
        let handler = portal_handler();
        let id = TransferId(MAX_TRANSFERS as u32);
        assert_eq!(
            handler.get_transfer_status(id),
            Err(UsbdError::UnknownTransfer(id.0))
        );
        assert!(handler.get_isochronous_transfer_status(id).is_err());
    }

    #[test]
    fn test_rejected_submission_halts() {
        let backend: Arc<dyn HostBackend> =
            Arc::new(MockHostBackend::new().with_device(0x0E6F, 0x0241).with_rejected_submissions());
        let handler = UsbHandler::new(&test_config(&[]), Some(backend));
        handler.initialize().unwrap();
        handler.register_extra_ldd("lego", 0x0E6F, 0x0241, 0x0241).unwrap();
        let pipe = handler.open_pipe(DeviceHandle(1), 0x81).unwrap();

        let id = handler.transfer_data(pipe, &[0; 32], None).unwrap();
        assert_eq!(handler.retire_due_fake_transfers(Instant::now()), 1);
        assert_eq!(
            handler.get_transfer_status(id).unwrap().result,
            CompletionCode::Halted.as_raw()
        );
    }

    #[test]
    fn test_save_and_restore() {
        let handler = portal_handler();
        let bytes = handler.save_state().unwrap();

        let restored =
            UsbHandler::restore(&bytes, &test_config(&[PeripheralKind::SkylanderPortal]), None)
                .unwrap();
        assert!(restored.is_initialized());
        assert_eq!(restored.handled_count(), 0);

        assert!(matches!(
            UsbHandler::restore(&[0xFF], &test_config(&[]), None),
            Err(UsbdError::Snapshot(_))
        ));
    }

    #[test]
    fn test_queued_event_returned_without_parking() {
        let handler = portal_handler();
        handler.event_port_send(7, 8, 9).unwrap();

        let thread = GuestThread::new(1, "ppu");
        assert_eq!(
            handler.receive_event(&thread).unwrap(),
            ReceiveOutcome::Received(UsbdEvent::new(7, 8, 9))
        );
        assert_eq!(handler.parked_waiters(), 0);
    }
}
