//! Pipe table
//!
//! A pipe binds a guest handle to a (device, endpoint) pair. Handles are
//! issued from a monotonically increasing counter and never reused.

use crate::usb::device::SharedDevice;
use abi::{DeviceHandle, PIPE_HANDLE_BASE, PipeHandle};
use std::collections::BTreeMap;

/// Open pipe
#[derive(Clone)]
pub struct Pipe {
    pub device_handle: DeviceHandle,
    pub device: SharedDevice,
    pub endpoint: u8,
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("device_handle", &self.device_handle)
            .field("endpoint", &format_args!("{:#04x}", self.endpoint))
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct PipeTable {
    pipes: BTreeMap<PipeHandle, Pipe>,
    next: u32,
}

impl Default for PipeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeTable {
    pub fn new() -> Self {
        Self {
            pipes: BTreeMap::new(),
            next: PIPE_HANDLE_BASE,
        }
    }

    /// Register a pipe and return its fresh handle
    pub fn open(&mut self, device_handle: DeviceHandle, device: SharedDevice, endpoint: u8) -> PipeHandle {
        let handle = PipeHandle(self.next);
        self.next += 1;
        self.pipes.insert(
            handle,
            Pipe {
                device_handle,
                device,
                endpoint,
            },
        );
        handle
    }

    /// Remove a pipe; false if the handle was not open
    pub fn close(&mut self, handle: PipeHandle) -> bool {
        self.pipes.remove(&handle).is_some()
    }

    pub fn is_pipe(&self, handle: PipeHandle) -> bool {
        self.pipes.contains_key(&handle)
    }

    pub fn get(&self, handle: PipeHandle) -> Option<&Pipe> {
        self.pipes.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Drop every pipe; handles already issued stay retired
    pub fn clear(&mut self) {
        self.pipes.clear();
    }
}
