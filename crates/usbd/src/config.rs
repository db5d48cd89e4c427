//! Subsystem configuration management

use crate::usb::emulated::PeripheralKind;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbdConfig {
    pub general: GeneralSettings,
    pub passthrough: PassthroughSettings,
    /// Software-emulated peripherals
    #[serde(default)]
    pub emulation: EmulationSettings,
    /// Pump and event timing
    #[serde(default)]
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassthroughSettings {
    /// Open the host USB context and pass allow-listed devices through
    pub enabled: bool,
}

/// Buzzer adapter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuzzMode {
    #[default]
    None,
    /// One adapter for players 1-4
    OneController,
    /// Two adapters for players 1-7
    TwoControllers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulationSettings {
    /// Peripheral categories that are emulated whenever no physical
    /// device of that category is attached
    #[serde(default = "EmulationSettings::default_always_present")]
    pub always_present: Vec<PeripheralKind>,
    #[serde(default)]
    pub buzz: BuzzMode,
}

impl Default for EmulationSettings {
    fn default() -> Self {
        Self {
            always_present: Self::default_always_present(),
            buzz: BuzzMode::None,
        }
    }
}

impl EmulationSettings {
    fn default_always_present() -> Vec<PeripheralKind> {
        vec![
            PeripheralKind::SkylanderPortal,
            PeripheralKind::GuitarHeroLive,
            PeripheralKind::Turntable,
        ]
    }
}

/// Timing knobs, all in microseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Extra sleep imposed on a guest context that receives an attach event
    #[serde(default = "TimingSettings::default_attach_delay")]
    pub attach_delay_us: u64,
    /// Pump sleep while at least one device is handled
    #[serde(default = "TimingSettings::default_busy_interval")]
    pub busy_interval_us: u64,
    /// Pump sleep while no device is handled
    #[serde(default = "TimingSettings::default_idle_interval")]
    pub idle_interval_us: u64,
    /// Upper bound on one host event-servicing call
    #[serde(default = "TimingSettings::default_event_wait")]
    pub event_wait_us: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            attach_delay_us: Self::default_attach_delay(),
            busy_interval_us: Self::default_busy_interval(),
            idle_interval_us: Self::default_idle_interval(),
            event_wait_us: Self::default_event_wait(),
        }
    }
}

impl TimingSettings {
    fn default_attach_delay() -> u64 {
        5_000
    }

    fn default_busy_interval() -> u64 {
        200
    }

    fn default_idle_interval() -> u64 {
        500_000
    }

    fn default_event_wait() -> u64 {
        200
    }

    pub fn attach_delay(&self) -> Duration {
        Duration::from_micros(self.attach_delay_us)
    }

    pub fn busy_interval(&self) -> Duration {
        Duration::from_micros(self.busy_interval_us)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_micros(self.idle_interval_us)
    }

    pub fn event_wait(&self) -> Duration {
        Duration::from_micros(self.event_wait_us)
    }
}

impl Default for UsbdConfig {
    fn default() -> Self {
        Self {
            general: GeneralSettings {
                log_level: "info".to_string(),
            },
            passthrough: PassthroughSettings { enabled: true },
            emulation: EmulationSettings::default(),
            timing: TimingSettings::default(),
        }
    }
}

impl UsbdConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/usbd/usbd.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: UsbdConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbd").join("usbd.toml")
        } else {
            PathBuf::from(".config/usbd/usbd.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.timing.idle_interval_us < self.timing.busy_interval_us {
            return Err(anyhow!(
                "idle_interval_us ({}) must not be shorter than busy_interval_us ({})",
                self.timing.idle_interval_us,
                self.timing.busy_interval_us
            ));
        }

        Ok(())
    }
}

/// Load a configuration file, expanding `~` in the path
pub fn load_config(path: &str) -> Result<UsbdConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    UsbdConfig::load(Some(path_buf))
}
