//! Host backend on top of rusb
//!
//! Every opened device gets its own I/O lanes: one for endpoint 0 (control
//! transfers and configuration changes) and one per other endpoint, each a
//! thread fed through an async-channel. `submit` never blocks the caller,
//! completion callbacks always run off the submitting thread, and a slow
//! endpoint only holds up its own queue. rusb exposes no isochronous API;
//! isochronous submissions complete with every packet in error.

use common::{
    CompletionCallback, HostBackend, HostCompletion, HostDeviceId, HostDeviceInfo, HostIsoPacket,
    HostStatus, HostTransfer,
};
use rusb::{Context, DeviceHandle, UsbContext};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for control transfers and interrupt OUT writes
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Interrupt IN reads wait in slices this long so an idle endpoint notices
/// shutdown
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Timeout for descriptor reads during device setup
const DESCRIPTOR_TIMEOUT: Duration = Duration::from_secs(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map a rusb error to a host transfer status
pub fn map_rusb_error(err: rusb::Error) -> HostStatus {
    match err {
        rusb::Error::Timeout => HostStatus::TimedOut,
        rusb::Error::Overflow => HostStatus::Overflow,
        rusb::Error::Pipe => HostStatus::Stall,
        rusb::Error::NoDevice => HostStatus::NoDevice,
        rusb::Error::Interrupted => HostStatus::Cancelled,
        _ => HostStatus::Error,
    }
}

/// Queue a transfer is executed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lane {
    Control,
    Endpoint(u8),
}

impl Lane {
    fn for_transfer(transfer: &HostTransfer) -> Self {
        match transfer {
            HostTransfer::Control { .. } => Lane::Control,
            HostTransfer::Interrupt { endpoint, .. }
            | HostTransfer::Isochronous { endpoint, .. } => Lane::Endpoint(*endpoint),
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Control => write!(f, "ep00"),
            Lane::Endpoint(endpoint) => write!(f, "ep{:02x}", endpoint),
        }
    }
}

enum Command {
    Transfer {
        transfer: HostTransfer,
        on_complete: CompletionCallback,
    },
    SetConfiguration(u8),
    ClaimInterface(u8),
}

/// Count of configuration changes queued but not yet applied
///
/// Endpoint lanes wait here before each transfer, so a transfer submitted
/// after a configuration change runs against the new configuration.
#[derive(Default)]
struct SetupGate {
    pending: Mutex<usize>,
    applied: Condvar,
}

impl SetupGate {
    fn enter(&self) {
        *lock(&self.pending) += 1;
    }

    fn leave(&self) {
        let mut pending = lock(&self.pending);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.applied.notify_all();
        }
    }

    fn wait(&self) {
        let mut pending = lock(&self.pending);
        while *pending > 0 {
            pending = self
                .applied
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// An opened host device and its I/O lanes
struct OpenDevice {
    id: HostDeviceId,
    handle: Arc<DeviceHandle<Context>>,
    gate: Arc<SetupGate>,
    lanes: Mutex<HashMap<Lane, async_channel::Sender<Command>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl OpenDevice {
    fn new(id: HostDeviceId, handle: DeviceHandle<Context>) -> Self {
        Self {
            id,
            handle: Arc::new(handle),
            gate: Arc::new(SetupGate::default()),
            lanes: Mutex::new(HashMap::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Queue `command` on `lane`, starting the lane on first use
    fn send(&self, lane: Lane, command: Command) -> common::Result<()> {
        let mut lanes = lock(&self.lanes);
        let tx = match lanes.get(&lane) {
            Some(tx) => tx.clone(),
            None => {
                let tx = self.spawn_lane(lane)?;
                lanes.insert(lane, tx.clone());
                tx
            }
        };
        drop(lanes);

        tx.try_send(command)
            .map_err(|e| common::Error::Channel(e.to_string()))
    }

    fn spawn_lane(&self, lane: Lane) -> common::Result<async_channel::Sender<Command>> {
        let (tx, rx) = async_channel::unbounded();
        let worker = LaneWorker {
            device: self.id,
            lane,
            handle: Arc::clone(&self.handle),
            gate: Arc::clone(&self.gate),
            rx,
        };

        let thread = std::thread::Builder::new()
            .name(format!("usbd-io-{}-{}", self.id, lane))
            .spawn(move || worker.run())?;
        lock(&self.threads).push(thread);
        Ok(tx)
    }

    /// Close every lane and wait for the lane threads
    fn shutdown(&self) {
        for tx in lock(&self.lanes).drain().map(|(_, tx)| tx) {
            tx.close();
        }

        let threads = std::mem::take(&mut *lock(&self.threads));
        for thread in threads {
            // The last backend reference can be released by a completion
            // callback running on a lane thread
            if thread.thread().id() == std::thread::current().id() {
                continue;
            }
            if thread.join().is_err() {
                warn!("USB I/O lane on {} panicked", self.id);
            }
        }
    }
}

struct LaneWorker {
    device: HostDeviceId,
    lane: Lane,
    handle: Arc<DeviceHandle<Context>>,
    gate: Arc<SetupGate>,
    rx: async_channel::Receiver<Command>,
}

impl LaneWorker {
    fn run(self) {
        debug!("I/O lane {} on {} started", self.lane, self.device);

        while let Ok(command) = self.rx.recv_blocking() {
            match command {
                Command::Transfer {
                    transfer,
                    on_complete,
                } => {
                    if self.rx.is_closed() {
                        on_complete(HostCompletion::with_status(HostStatus::Cancelled));
                        continue;
                    }
                    if self.lane != Lane::Control {
                        self.gate.wait();
                    }
                    on_complete(self.execute(&transfer));
                }
                Command::SetConfiguration(config) => {
                    if let Err(e) = self.handle.set_active_configuration(config) {
                        warn!("set_configuration({}) failed on {}: {}", config, self.device, e);
                    }
                    self.gate.leave();
                }
                Command::ClaimInterface(interface) => {
                    if let Err(e) = self.handle.claim_interface(interface) {
                        warn!("claim_interface({}) failed on {}: {}", interface, self.device, e);
                    }
                    self.gate.leave();
                }
            }
        }

        debug!("I/O lane {} on {} stopped", self.lane, self.device);
    }

    /// Run one transfer synchronously
    fn execute(&self, transfer: &HostTransfer) -> HostCompletion {
        match transfer {
            HostTransfer::Control { request: setup, data } => {
                let result = if setup.is_device_to_host() {
                    let mut buffer = data.clone();
                    self.handle
                        .read_control(
                            setup.request_type,
                            setup.request,
                            setup.value,
                            setup.index,
                            &mut buffer,
                            TRANSFER_TIMEOUT,
                        )
                        .map(|len| {
                            buffer.truncate(len);
                            (buffer, len)
                        })
                } else {
                    self.handle
                        .write_control(
                            setup.request_type,
                            setup.request,
                            setup.value,
                            setup.index,
                            data,
                            TRANSFER_TIMEOUT,
                        )
                        .map(|len| (Vec::new(), len))
                };
                completion_from(self.device, result)
            }

            HostTransfer::Interrupt { endpoint, data } => {
                let result = if endpoint & 0x80 != 0 {
                    let mut buffer = data.clone();
                    self.read_interrupt(*endpoint, &mut buffer).map(|len| {
                        buffer.truncate(len);
                        (buffer, len)
                    })
                } else {
                    self.handle
                        .write_interrupt(*endpoint, data, TRANSFER_TIMEOUT)
                        .map(|len| (Vec::new(), len))
                };
                completion_from(self.device, result)
            }

            HostTransfer::Isochronous { packet_lengths, .. } => {
                warn!("Isochronous transfer on {} not supported by rusb", self.device);
                HostCompletion {
                    iso_packets: packet_lengths
                        .iter()
                        .map(|_| HostIsoPacket {
                            status: HostStatus::Error,
                            actual_length: 0,
                        })
                        .collect(),
                    ..HostCompletion::with_status(HostStatus::Error)
                }
            }
        }
    }

    /// Wait for interrupt IN data until it arrives or the lane closes
    ///
    /// Input devices can stay silent indefinitely, so a quiet endpoint is not
    /// an error. A closed lane reports the read as interrupted.
    fn read_interrupt(&self, endpoint: u8, buffer: &mut [u8]) -> rusb::Result<usize> {
        loop {
            match self.handle.read_interrupt(endpoint, buffer, INTERRUPT_POLL) {
                Err(rusb::Error::Timeout) if !self.rx.is_closed() => continue,
                Err(rusb::Error::Timeout) => return Err(rusb::Error::Interrupted),
                other => return other,
            }
        }
    }
}

/// Build a completion from (IN data, bytes transferred)
fn completion_from(device: HostDeviceId, result: rusb::Result<(Vec<u8>, usize)>) -> HostCompletion {
    match result {
        Ok((data, len)) => HostCompletion {
            status: HostStatus::Completed,
            actual_length: len as u32,
            data,
            iso_packets: Vec::new(),
        },
        Err(e) => {
            debug!("Transfer on {} failed: {}", device, e);
            HostCompletion::with_status(map_rusb_error(e))
        }
    }
}

pub struct RusbBackend {
    context: Context,
    devices: Mutex<HashMap<HostDeviceId, Arc<OpenDevice>>>,
}

impl RusbBackend {
    /// Create the rusb context
    pub fn new() -> common::Result<Self> {
        let context = Context::new().map_err(|e| common::Error::BackendUnavailable(e.to_string()))?;
        info!("rusb backend ready");

        Ok(Self {
            context,
            devices: Mutex::new(HashMap::new()),
        })
    }

    fn device(&self, device: HostDeviceId) -> common::Result<Arc<OpenDevice>> {
        lock(&self.devices)
            .get(&device)
            .cloned()
            .ok_or_else(|| common::Error::UnknownDevice(device.to_string()))
    }

    fn find_device(&self, device: HostDeviceId) -> common::Result<rusb::Device<Context>> {
        let list = self.context.devices().map_err(usb_error)?;
        list.iter()
            .find(|d| d.bus_number() == device.bus && d.address() == device.address)
            .ok_or_else(|| common::Error::UnknownDevice(device.to_string()))
    }

    /// Queue a configuration change on the device's control lane
    fn queue_setup(&self, device: HostDeviceId, command: Command) -> common::Result<()> {
        let open = self.device(device)?;
        open.gate.enter();
        open.send(Lane::Control, command).inspect_err(|_| open.gate.leave())
    }
}

fn usb_error(err: rusb::Error) -> common::Error {
    common::Error::Usb(err.to_string())
}

impl HostBackend for RusbBackend {
    fn enumerate(&self) -> common::Result<Vec<HostDeviceInfo>> {
        let list = self.context.devices().map_err(usb_error)?;
        let mut devices = Vec::new();

        for device in list.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping device without descriptor: {}", e);
                    continue;
                }
            };

            devices.push(HostDeviceInfo {
                id: HostDeviceId {
                    bus: device.bus_number(),
                    address: device.address(),
                },
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
            });
        }

        Ok(devices)
    }

    fn open(&self, device: HostDeviceId) -> common::Result<()> {
        if lock(&self.devices).contains_key(&device) {
            return Ok(());
        }

        let handle = self.find_device(device)?.open().map_err(usb_error)?;
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable on {}: {}", device, e);
        }

        lock(&self.devices).insert(device, Arc::new(OpenDevice::new(device, handle)));
        Ok(())
    }

    fn descriptors(&self, device: HostDeviceId) -> common::Result<Vec<u8>> {
        let open = self.device(device)?;
        let handle = &open.handle;

        let mut bytes = vec![0u8; 18];
        let len = handle
            .read_control(0x80, 0x06, 0x0100, 0, &mut bytes, DESCRIPTOR_TIMEOUT)
            .map_err(usb_error)?;
        bytes.truncate(len);

        let mut header = [0u8; 9];
        handle
            .read_control(0x80, 0x06, 0x0200, 0, &mut header, DESCRIPTOR_TIMEOUT)
            .map_err(usb_error)?;
        let total = u16::from_le_bytes([header[2], header[3]]) as usize;

        let mut config = vec![0u8; total];
        let len = handle
            .read_control(0x80, 0x06, 0x0200, 0, &mut config, DESCRIPTOR_TIMEOUT)
            .map_err(usb_error)?;
        config.truncate(len);

        bytes.extend(config);
        Ok(bytes)
    }

    fn set_configuration(&self, device: HostDeviceId, config: u8) -> common::Result<()> {
        self.queue_setup(device, Command::SetConfiguration(config))
    }

    fn set_interface(&self, device: HostDeviceId, interface: u8) -> common::Result<()> {
        self.queue_setup(device, Command::ClaimInterface(interface))
    }

    fn submit(
        &self,
        device: HostDeviceId,
        transfer: HostTransfer,
        on_complete: CompletionCallback,
    ) -> common::Result<()> {
        let lane = Lane::for_transfer(&transfer);
        self.device(device)?.send(
            lane,
            Command::Transfer {
                transfer,
                on_complete,
            },
        )
    }

    fn handle_events(&self, timeout: Duration) -> common::Result<()> {
        match self.context.handle_events(Some(timeout)) {
            Ok(()) | Err(rusb::Error::Interrupted) => Ok(()),
            Err(e) => Err(usb_error(e)),
        }
    }
}

impl Drop for RusbBackend {
    fn drop(&mut self) {
        let devices: Vec<_> = lock(&self.devices).drain().map(|(_, open)| open).collect();
        for open in devices {
            open.shutdown();
        }
    }
}
