//! Device registry
//!
//! Built once when the subsystem is constructed: allow-listed host devices
//! are wrapped for passthrough, then emulated peripherals fill in for the
//! categories with no physical device attached.

use crate::config::{BuzzMode, UsbdConfig};
use crate::usb::device::{SharedDevice, UsbDevice, lock_device, share};
use crate::usb::emulated::{EmulatedDevice, PeripheralKind};
use crate::usb::passthrough::PassthroughDevice;
use common::HostBackend;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Allow-list entry: vendor id and inclusive product id range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMatchRule {
    pub vendor_id: u16,
    pub product_min: u16,
    pub product_max: u16,
    pub label: &'static str,
    /// Category that is no longer emulated once this device is found
    pub category: Option<PeripheralKind>,
}

impl DeviceMatchRule {
    const fn new(vendor_id: u16, product_min: u16, product_max: u16, label: &'static str) -> Self {
        Self {
            vendor_id,
            product_min,
            product_max,
            label,
            category: None,
        }
    }

    const fn replaces(mut self, kind: PeripheralKind) -> Self {
        self.category = Some(kind);
        self
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id
            && (self.product_min..=self.product_max).contains(&product_id)
    }
}

/// Host devices eligible for passthrough
pub const ALLOW_LIST: &[DeviceMatchRule] = &[
    DeviceMatchRule::new(0x1430, 0x0150, 0x0150, "Skylanders Portal")
        .replaces(PeripheralKind::SkylanderPortal),
    DeviceMatchRule::new(0x0E6F, 0x0241, 0x0241, "Lego Dimensions Portal"),
    DeviceMatchRule::new(0x0E6F, 0x0129, 0x0129, "Disney Infinity Portal"),
    DeviceMatchRule::new(0x1415, 0x0000, 0x0000, "Singstar Microphone"),
    DeviceMatchRule::new(0x12BA, 0x0100, 0x0100, "Guitar Hero Guitar"),
    DeviceMatchRule::new(0x12BA, 0x0120, 0x0120, "Guitar Hero Drums"),
    DeviceMatchRule::new(0x12BA, 0x074B, 0x074B, "Guitar Hero Live Guitar")
        .replaces(PeripheralKind::GuitarHeroLive),
    DeviceMatchRule::new(0x12BA, 0x0140, 0x0140, "DJ Hero Turntable")
        .replaces(PeripheralKind::Turntable),
    DeviceMatchRule::new(0x12BA, 0x0200, 0x020F, "Harmonix Guitar"),
    DeviceMatchRule::new(0x12BA, 0x0210, 0x021F, "Harmonix Drums"),
    DeviceMatchRule::new(0x12BA, 0x2330, 0x233F, "Harmonix Keyboard"),
    DeviceMatchRule::new(0x12BA, 0x2430, 0x243F, "Harmonix Button Guitar"),
    DeviceMatchRule::new(0x12BA, 0x2530, 0x253F, "Harmonix Real Guitar"),
    // Racing wheels
    DeviceMatchRule::new(0x046D, 0xC283, 0xC29B, "lgFF_c283_c29b"),
    DeviceMatchRule::new(0x044F, 0xB653, 0xB653, "Thrustmaster RGT FFB Pro"),
    DeviceMatchRule::new(0x044F, 0xB65A, 0xB65A, "Thrustmaster F430"),
    DeviceMatchRule::new(0x044F, 0xB65D, 0xB65D, "Thrustmaster FFB"),
    DeviceMatchRule::new(0x044F, 0xB65E, 0xB65E, "Thrustmaster TRS"),
    DeviceMatchRule::new(0x044F, 0xB660, 0xB660, "Thrustmaster T500 RS Gear Shift"),
    DeviceMatchRule::new(0x2833, 0x0001, 0x0001, "Oculus"),
    DeviceMatchRule::new(0x046D, 0xCA03, 0xCA03, "lgFF_ca03_ca03"),
    // Buzzers
    DeviceMatchRule::new(0x054C, 0x1000, 0x1040, "buzzer0"),
    DeviceMatchRule::new(0x054C, 0x0001, 0x0041, "buzzer1"),
    DeviceMatchRule::new(0x054C, 0x0042, 0x0042, "buzzer2"),
    DeviceMatchRule::new(0x046D, 0xC220, 0xC220, "buzzer9"),
    DeviceMatchRule::new(0x0B9A, 0x0800, 0x0800, "guncon3"),
    DeviceMatchRule::new(0x20D6, 0xCB17, 0xCB17, "uDraw GameTablet"),
];

/// First allow-list rule matching the ids
pub fn find_rule(vendor_id: u16, product_id: u16) -> Option<&'static DeviceMatchRule> {
    ALLOW_LIST
        .iter()
        .find(|rule| rule.matches(vendor_id, product_id))
}

/// Every device the subsystem can surface, in discovery order
pub struct DeviceRegistry {
    devices: Vec<SharedDevice>,
}

impl DeviceRegistry {
    /// Discover passthrough devices and add emulated fallbacks
    pub fn build(config: &UsbdConfig, backend: Option<&Arc<dyn HostBackend>>) -> Self {
        let mut devices = Vec::new();
        let mut found = HashSet::new();

        match backend {
            Some(backend) if config.passthrough.enabled => match backend.enumerate() {
                Ok(host_devices) => {
                    for info in host_devices {
                        let Some(rule) = find_rule(info.vendor_id, info.product_id) else {
                            continue;
                        };

                        info!("Found device: {} ({})", rule.label, info.id);
                        if let Some(kind) = rule.category {
                            found.insert(kind);
                        }
                        devices.push(share(PassthroughDevice::new(
                            info,
                            rule.label,
                            Arc::clone(backend),
                        )));
                    }
                }
                Err(e) => error!("Host USB enumeration failed, passthrough disabled: {}", e),
            },
            Some(_) => info!("Passthrough disabled by configuration"),
            None => warn!("No host USB backend, only emulated devices are available"),
        }

        for kind in &config.emulation.always_present {
            if *kind == PeripheralKind::Buzz || found.contains(kind) {
                continue;
            }
            info!("Adding {}", kind.label());
            devices.push(share(EmulatedDevice::new(*kind)));
        }

        if matches!(
            config.emulation.buzz,
            BuzzMode::OneController | BuzzMode::TwoControllers
        ) {
            let buzz = EmulatedDevice::buzz(0, 3);
            info!("Adding {}", buzz.label());
            devices.push(share(buzz));
        }
        if config.emulation.buzz == BuzzMode::TwoControllers {
            let buzz = EmulatedDevice::buzz(4, 6);
            info!("Adding {}", buzz.label());
            devices.push(share(buzz));
        }

        Self { devices }
    }

    /// Registry with a fixed device list
    pub fn from_devices(devices: Vec<SharedDevice>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[SharedDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// One line per device for diagnostics
    pub fn describe(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|device| {
                let device = lock_device(device);
                format!(
                    "{:04x}:{:04x} {} (handle {})",
                    device.vendor_id(),
                    device.product_id(),
                    device.label(),
                    device.assigned_number()
                )
            })
            .collect()
    }

    /// Release every device reference
    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
