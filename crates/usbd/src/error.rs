//! Guest-facing error taxonomy
//!
//! Every failure the engine reports to the guest collapses to one of the
//! guest error codes below. Nothing in here is fatal to the process.

use abi::{DeviceHandle, PipeHandle, TransferId};
use thiserror::Error;

/// Guest code for an invalid argument or uninitialized subsystem
pub const CELL_EINVAL: u32 = 0x8001_0002;

/// Guest code for a resource already in use
pub const CELL_EBUSY: u32 = 0x8001_000A;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsbdError {
    #[error("USB subsystem is not initialized")]
    NotInitialized,

    #[error("USB subsystem is already initialized")]
    AlreadyInitialized,

    #[error("Unknown device handle {0:#x}")]
    UnknownDevice(u32),

    #[error("Unknown pipe handle {0:#x}")]
    UnknownPipe(u32),

    #[error("Unknown transfer id {0:#x}")]
    UnknownTransfer(u32),

    #[error("Control pipe used without a device request")]
    MissingRequest,

    #[error("Saved state rejected: {0}")]
    Snapshot(String),
}

impl UsbdError {
    /// Guest-visible error code
    pub fn code(&self) -> u32 {
        match self {
            UsbdError::AlreadyInitialized => CELL_EBUSY,
            _ => CELL_EINVAL,
        }
    }

    pub(crate) fn unknown_device(handle: DeviceHandle) -> Self {
        UsbdError::UnknownDevice(handle.0)
    }

    pub(crate) fn unknown_pipe(pipe: PipeHandle) -> Self {
        UsbdError::UnknownPipe(pipe.0)
    }

    pub(crate) fn unknown_transfer(id: TransferId) -> Self {
        UsbdError::UnknownTransfer(id.0)
    }
}

impl From<abi::AbiError> for UsbdError {
    fn from(err: abi::AbiError) -> Self {
        UsbdError::Snapshot(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UsbdError>;
