//! Software-emulated peripherals
//!
//! Each peripheral serves a static HID descriptor tree and answers control
//! and interrupt traffic with fake completions retired by the pump.

use crate::transfers::TransferSlot;
use crate::usb::device::{DeviceCore, UsbDevice};
use abi::{CompletionCode, DeviceRequest, IsoPacketStatus, pack_iso_packet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

/// Completion latency of an emulated control transfer
const CONTROL_DELAY: Duration = Duration::from_micros(100);

/// Completion latency of an emulated interrupt transfer
const INTERRUPT_DELAY: Duration = Duration::from_millis(1);

/// HID class SET_REPORT (host-to-device, class, interface)
const HID_SET_REPORT_TYPE: u8 = 0x21;
const HID_SET_REPORT: u8 = 0x09;

const DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;
const DESCRIPTOR_TYPE_CONFIGURATION: u8 = 0x02;
const DEVICE_DESCRIPTOR_LEN: usize = 18;

/// Peripheral categories that can be emulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralKind {
    SkylanderPortal,
    GuitarHeroLive,
    Turntable,
    Buzz,
}

impl PeripheralKind {
    pub fn vendor_id(self) -> u16 {
        match self {
            PeripheralKind::SkylanderPortal => 0x1430,
            PeripheralKind::GuitarHeroLive | PeripheralKind::Turntable => 0x12BA,
            PeripheralKind::Buzz => 0x054C,
        }
    }

    pub fn product_id(self) -> u16 {
        match self {
            PeripheralKind::SkylanderPortal => 0x0150,
            PeripheralKind::GuitarHeroLive => 0x074B,
            PeripheralKind::Turntable => 0x0140,
            PeripheralKind::Buzz => 0x0002,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PeripheralKind::SkylanderPortal => "Emulated Skylanders Portal",
            PeripheralKind::GuitarHeroLive => "Emulated Guitar Hero Live Guitar",
            PeripheralKind::Turntable => "Emulated DJ Hero Turntable",
            PeripheralKind::Buzz => "Emulated Buzz! Buzzer",
        }
    }

    /// Size of the interrupt IN report
    fn report_len(self) -> usize {
        match self {
            PeripheralKind::SkylanderPortal => 32,
            PeripheralKind::GuitarHeroLive | PeripheralKind::Turntable => 27,
            PeripheralKind::Buzz => 5,
        }
    }

    /// Report sent when no input is pending
    fn idle_report(self) -> Vec<u8> {
        let mut report = vec![0u8; self.report_len()];
        match self {
            PeripheralKind::SkylanderPortal => {
                report[0] = b'S';
            }
            PeripheralKind::GuitarHeroLive | PeripheralKind::Turntable => {
                // Hat switch centered, sticks and whammy at rest
                report[2] = 0x0F;
                report[3..7].fill(0x80);
            }
            PeripheralKind::Buzz => {
                report[0] = 0x7F;
                report[1] = 0x7F;
                report[4] = 0xF0;
            }
        }
        report
    }

    /// Whether the peripheral has an interrupt OUT endpoint
    fn has_out_endpoint(self) -> bool {
        matches!(self, PeripheralKind::SkylanderPortal)
    }
}

/// Build device + configuration + interface + HID + endpoint descriptors
fn build_descriptors(kind: PeripheralKind) -> Vec<u8> {
    let [vid_lo, vid_hi] = kind.vendor_id().to_le_bytes();
    let [pid_lo, pid_hi] = kind.product_id().to_le_bytes();
    let num_endpoints: u8 = if kind.has_out_endpoint() { 2 } else { 1 };
    let total_len: u16 = 9 + 9 + 9 + 7 * num_endpoints as u16;
    let [total_lo, total_hi] = total_len.to_le_bytes();
    let report_len = kind.report_len() as u8;

    let mut bytes = vec![
        // Device
        0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40, vid_lo, vid_hi, pid_lo, pid_hi, 0x00,
        0x01, 0x01, 0x02, 0x00, 0x01,
        // Configuration
        0x09, 0x02, total_lo, total_hi, 0x01, 0x01, 0x00, 0x80, 0x32,
        // Interface (HID)
        0x09, 0x04, 0x00, 0x00, num_endpoints, 0x03, 0x00, 0x00, 0x00,
        // HID
        0x09, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, 0x1D, 0x00,
        // Endpoint 1 IN, interrupt
        0x07, 0x05, 0x81, 0x03, report_len, 0x00, 0x01,
    ];

    if kind.has_out_endpoint() {
        bytes.extend_from_slice(&[0x07, 0x05, 0x02, 0x03, report_len, 0x00, 0x01]);
    }

    bytes
}

pub struct EmulatedDevice {
    core: DeviceCore,
    kind: PeripheralKind,
    /// Portal replies waiting to be returned on the interrupt IN endpoint
    reports: VecDeque<Vec<u8>>,
    configuration: u8,
}

impl EmulatedDevice {
    pub fn new(kind: PeripheralKind) -> Self {
        Self::with_label(kind, kind.label().to_string())
    }

    /// Buzzer adapter serving players `first..=last` (zero based)
    ///
    /// The range only shows up in the label; adapters are otherwise
    /// identical on the bus.
    pub fn buzz(first: u8, last: u8) -> Self {
        let label = format!(
            "{} (players {}-{})",
            PeripheralKind::Buzz.label(),
            first + 1,
            last + 1
        );
        Self::with_label(PeripheralKind::Buzz, label)
    }

    fn with_label(kind: PeripheralKind, label: String) -> Self {
        let mut core = DeviceCore::new(label, kind.vendor_id(), kind.product_id());
        core.set_descriptors(build_descriptors(kind));
        Self {
            core,
            kind,
            reports: VecDeque::new(),
            configuration: 0,
        }
    }

    pub fn kind(&self) -> PeripheralKind {
        self.kind
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// GET_DESCRIPTOR reply for descriptor type `kind`, or None if unsupported
    fn descriptor_reply(&self, kind: u8, length: usize) -> Option<Vec<u8>> {
        let tree = self.core.descriptors();
        let bytes = match kind {
            DESCRIPTOR_TYPE_DEVICE => &tree[..DEVICE_DESCRIPTOR_LEN.min(tree.len())],
            DESCRIPTOR_TYPE_CONFIGURATION => tree.get(DEVICE_DESCRIPTOR_LEN..)?,
            _ => return None,
        };
        Some(bytes[..length.min(bytes.len())].to_vec())
    }

    /// Portal command sent through SET_REPORT; the reply echoes the command
    fn handle_portal_command(&mut self, command: &[u8]) {
        let Some(&opcode) = command.first() else {
            return;
        };

        let mut reply = vec![0u8; self.kind.report_len()];
        let len = command.len().min(reply.len());
        reply[..len].copy_from_slice(&command[..len]);
        trace!("Portal command {:?} queued reply", opcode as char);
        self.reports.push_back(reply);
    }
}

impl UsbDevice for EmulatedDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn open_device(&mut self) -> common::Result<()> {
        Ok(())
    }

    fn read_descriptors(&mut self) {
        self.core.set_descriptors(build_descriptors(self.kind));
    }

    fn set_configuration(&mut self, config: u8) {
        debug!("{}: configuration {}", self.label(), config);
        self.configuration = config;
    }

    fn set_interface(&mut self, _interface: u8) {}

    fn control_transfer(&mut self, request: &DeviceRequest, data: &[u8], transfer: &mut TransferSlot) {
        if request.is_device_to_host() {
            if request.request == DeviceRequest::GET_DESCRIPTOR {
                let kind = (request.value >> 8) as u8;
                match self.descriptor_reply(kind, request.length as usize) {
                    Some(reply) => {
                        let count = reply.len() as u32;
                        transfer.buffer = reply;
                        transfer.complete_fake(CompletionCode::NoError, count, CONTROL_DELAY);
                    }
                    None => {
                        debug!("{}: unsupported descriptor type {:#04x}", self.label(), kind);
                        transfer.buffer.clear();
                        transfer.complete_fake(CompletionCode::Halted, 0, CONTROL_DELAY);
                    }
                }
                return;
            }

            transfer.buffer = vec![0u8; request.length as usize];
            transfer.complete_fake(CompletionCode::NoError, request.length as u32, CONTROL_DELAY);
            return;
        }

        if self.kind == PeripheralKind::SkylanderPortal
            && request.request_type == HID_SET_REPORT_TYPE
            && request.request == HID_SET_REPORT
        {
            self.handle_portal_command(data);
        }

        transfer.complete_fake(CompletionCode::NoError, data.len() as u32, CONTROL_DELAY);
    }

    fn interrupt_transfer(&mut self, endpoint: u8, data: &[u8], transfer: &mut TransferSlot) {
        if endpoint & 0x80 == 0 {
            if self.kind == PeripheralKind::SkylanderPortal {
                self.handle_portal_command(data);
            }
            transfer.complete_fake(CompletionCode::NoError, data.len() as u32, INTERRUPT_DELAY);
            return;
        }

        let mut report = self
            .reports
            .pop_front()
            .unwrap_or_else(|| self.kind.idle_report());
        report.resize(data.len(), 0);
        transfer.buffer = report;
        transfer.complete_fake(CompletionCode::NoError, data.len() as u32, INTERRUPT_DELAY);
    }

    fn isochronous_transfer(&mut self, _endpoint: u8, transfer: &mut TransferSlot) {
        let count = transfer.iso_request.packet_count();
        for packet in &mut transfer.iso_request.packets[..count] {
            *packet = pack_iso_packet(IsoPacketStatus::MissedFrame, 0);
        }
        transfer.complete_fake(CompletionCode::Halted, 0, CONTROL_DELAY);
    }
}
