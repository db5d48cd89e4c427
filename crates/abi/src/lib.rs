//! Guest ABI for the virtual USB host controller
//!
//! This crate defines everything guest USB drivers can observe: handle types,
//! event triples, completion codes, isochronous packet packing, and the
//! fixed-format records exchanged through guest memory. It also owns the
//! encoding of the small piece of state that survives a save/restore.
//!
//! # Example
//!
//! ```
//! use abi::{CompletionCode, DeviceHandle, UsbdEvent, read_device_request};
//!
//! let attach = UsbdEvent::attach(DeviceHandle(1));
//! assert!(attach.is_attach());
//!
//! let req = read_device_request(&[0x00, 0x09, 0x00, 0x01, 0, 0, 0, 0]).unwrap();
//! assert!(req.is_set_configuration());
//! assert_eq!(CompletionCode::Halted.as_raw(), 0x100);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod version;

pub use codec::{
    SavedState, decode_saved_state, encode_saved_state, read_device_request, read_iso_request,
    write_device_list, write_iso_request,
};
pub use error::{AbiError, Result};
pub use types::{
    CompletionCode, DeviceHandle, DeviceRequest, EventKind, IsoPacketStatus, IsoRequest,
    MAX_ISO_PACKETS, MAX_TRANSFERS, PIPE_HANDLE_BASE, PipeHandle, TransferId, USBD_HANDLE,
    UsbInternalDevice, UsbdEvent, pack_iso_packet, unpack_iso_packet,
};
pub use version::{CURRENT_VERSION, StateVersion};
