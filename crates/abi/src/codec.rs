//! Guest memory encoding and saved-state serialization
//!
//! Guest records live in big-endian guest memory and are read and written
//! field by field with `byteorder`. The saved state that crosses a
//! snapshot boundary is serialized with postcard.
//!
//! # Record layouts
//!
//! ```text
//! DeviceRequest     [type:u8][request:u8][value:u16][index:u16][length:u16]
//! IsoRequest        [buffer:u32][start_frame:u32][num_packets:u32][packets:u16 x 8]
//! UsbInternalDevice [flags:u8][device_number:u8][kind:u8][max_packet_size:u8]
//! ```

use crate::error::{AbiError, Result};
use crate::types::{DeviceRequest, IsoRequest, MAX_ISO_PACKETS, UsbInternalDevice};
use crate::version::{CURRENT_VERSION, StateVersion};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// State persisted across a save/restore boundary
///
/// Only the initialized flag survives; devices, pipes and transfers are
/// rebuilt by enumeration after restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    pub version: StateVersion,
    pub initialized: bool,
}

impl SavedState {
    pub fn new(initialized: bool) -> Self {
        Self {
            version: CURRENT_VERSION,
            initialized,
        }
    }
}

fn ensure_len(available: usize, needed: usize) -> Result<()> {
    if available < needed {
        return Err(AbiError::BufferTooSmall { needed, available });
    }
    Ok(())
}

/// Read a control request from guest memory
pub fn read_device_request(bytes: &[u8]) -> Result<DeviceRequest> {
    ensure_len(bytes.len(), DeviceRequest::GUEST_SIZE)?;
    let mut rdr = Cursor::new(bytes);

    Ok(DeviceRequest {
        request_type: rdr.read_u8()?,
        request: rdr.read_u8()?,
        value: rdr.read_u16::<BigEndian>()?,
        index: rdr.read_u16::<BigEndian>()?,
        length: rdr.read_u16::<BigEndian>()?,
    })
}

/// Read an isochronous request from guest memory
pub fn read_iso_request(bytes: &[u8]) -> Result<IsoRequest> {
    ensure_len(bytes.len(), IsoRequest::GUEST_SIZE)?;
    let mut rdr = Cursor::new(bytes);

    let buffer_addr = rdr.read_u32::<BigEndian>()?;
    let start_frame = rdr.read_u32::<BigEndian>()?;
    let num_packets = rdr.read_u32::<BigEndian>()?;
    let mut packets = [0u16; MAX_ISO_PACKETS];
    rdr.read_u16_into::<BigEndian>(&mut packets)?;

    Ok(IsoRequest {
        buffer_addr,
        start_frame,
        num_packets,
        packets,
    })
}

/// Write an isochronous request (with packed packet words) into guest memory
pub fn write_iso_request(request: &IsoRequest, out: &mut [u8]) -> Result<()> {
    ensure_len(out.len(), IsoRequest::GUEST_SIZE)?;
    let mut wtr = Cursor::new(out);

    wtr.write_u32::<BigEndian>(request.buffer_addr)?;
    wtr.write_u32::<BigEndian>(request.start_frame)?;
    wtr.write_u32::<BigEndian>(request.num_packets)?;
    for packet in request.packets {
        wtr.write_u16::<BigEndian>(packet)?;
    }
    Ok(())
}

/// Write as many device summary records as fit; returns the count written
pub fn write_device_list(devices: &[UsbInternalDevice], out: &mut [u8]) -> usize {
    let count = devices.len().min(out.len() / UsbInternalDevice::GUEST_SIZE);

    for (device, chunk) in devices
        .iter()
        .zip(out.chunks_exact_mut(UsbInternalDevice::GUEST_SIZE))
        .take(count)
    {
        chunk.copy_from_slice(&[
            device.flags,
            device.device_number,
            device.kind,
            device.max_packet_size,
        ]);
    }

    count
}

/// Check that saved state was written by a compatible version
fn validate_version(version: &StateVersion) -> Result<()> {
    if !CURRENT_VERSION.is_compatible_with(version) {
        return Err(AbiError::IncompatibleVersion {
            major: version.major,
            minor: version.minor,
            expected_major: CURRENT_VERSION.major,
            expected_minor: CURRENT_VERSION.minor,
        });
    }
    Ok(())
}

/// Encode saved state using postcard
pub fn encode_saved_state(state: &SavedState) -> Result<Vec<u8>> {
    postcard::to_allocvec(state).map_err(AbiError::from)
}

/// Decode and version-check saved state
pub fn decode_saved_state(bytes: &[u8]) -> Result<SavedState> {
    let state: SavedState = postcard::from_bytes(bytes)?;
    validate_version(&state.version)?;
    Ok(state)
}
