//! Common utilities for usbd
//!
//! This crate provides the pieces shared between the engine and its
//! collaborators: the hardware access layer contract, the wake mailbox used
//! to park guest contexts, error handling, logging setup, and test doubles.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use channel::{GuestMailbox, WakeSignal, create_guest_mailbox};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{
    CompletionCallback, HostBackend, HostCompletion, HostDeviceId, HostDeviceInfo, HostIsoPacket,
    HostStatus, HostTransfer,
};
