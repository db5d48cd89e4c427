//! usbd host runner
//!
//! Builds the USB subsystem on the host's USB stack, registers the drivers
//! given on the command line and logs every event the subsystem produces.

use abi::EventKind;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::setup_logging;
use std::time::Duration;
use tracing::{error, info};
use usbd::{GuestThread, ReceiveOutcome, UsbHandler, UsbdConfig, spawn_usbd_pump};

#[derive(Parser, Debug)]
#[command(name = "usbd-host")]
#[command(author, version, about = "Virtual USB host controller - run the USB subsystem against host devices")]
#[command(long_about = "
Runs the virtual USB host-controller engine against the host's USB stack.
Allow-listed host devices are passed through; emulated peripherals fill in
for the categories with no physical device attached.

EXAMPLES:
    # Show which devices the subsystem would expose
    usbd-host --list-devices

    # Register a driver for the Skylanders portal and watch events for 30s
    usbd-host --ldd 1430:0150 --duration 30

    # Match a product range
    usbd-host --ldd 12ba:0200-020f --log-level debug

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usbd/usbd.toml
    3. /etc/usbd/usbd.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List the devices the subsystem exposes and exit
    #[arg(long)]
    list_devices: bool,

    /// Register a driver for VID:PMIN[-PMAX] (hex); may be repeated
    #[arg(long, value_name = "VID:PMIN[-PMAX]")]
    ldd: Vec<String>,

    /// How long to run before finalizing, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    duration: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Parse `VID:PMIN[-PMAX]` with hexadecimal ids
fn parse_ldd_arg(arg: &str) -> Result<(u16, u16, u16)> {
    let (vendor, products) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected VID:PMIN[-PMAX], got '{}'", arg))?;

    let parse = |s: &str| {
        u16::from_str_radix(s.trim_start_matches("0x"), 16)
            .with_context(|| format!("Invalid hex id '{}' in '{}'", s, arg))
    };

    let vendor_id = parse(vendor)?;
    let (min, max) = match products.split_once('-') {
        Some((min, max)) => (parse(min)?, parse(max)?),
        None => {
            let id = parse(products)?;
            (id, id)
        }
    };

    if min > max {
        return Err(anyhow!("Empty product range in '{}'", arg));
    }

    Ok((vendor_id, min, max))
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = UsbdConfig::default();
        let path = UsbdConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        usbd::load_config(path).context("Failed to load configuration")?
    } else {
        UsbdConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usbd-host v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let ldds = args
        .ldd
        .iter()
        .map(|arg| parse_ldd_arg(arg))
        .collect::<Result<Vec<_>>>()?;

    let handler = UsbHandler::with_host(&config);

    if args.list_devices {
        let devices = handler.describe_devices();
        if devices.is_empty() {
            println!("No USB devices available.");
        } else {
            println!("{} USB device(s) available:\n", devices.len());
            for line in devices {
                println!("  {}", line);
            }
        }
        return Ok(());
    }

    run(handler, &ldds, Duration::from_secs(args.duration))
}

/// Initialize, register drivers, log events for `duration`, then finalize
fn run(handler: UsbHandler, ldds: &[(u16, u16, u16)], duration: Duration) -> Result<()> {
    let usbd_handle = handler
        .initialize()
        .map_err(|e| anyhow!("Failed to initialize USB subsystem: {}", e))?;
    info!("USB subsystem handle {:#x}", usbd_handle);

    let pump = spawn_usbd_pump(handler.clone()).context("Failed to spawn USB pump")?;

    let receiver = {
        let handler = handler.clone();
        std::thread::Builder::new()
            .name("usbd-events".to_string())
            .spawn(move || log_events(handler))
            .context("Failed to spawn event receiver")?
    };

    for (index, (vendor_id, product_min, product_max)) in ldds.iter().enumerate() {
        let name = format!("cli-{}", index);
        match handler.register_extra_ldd(&name, *vendor_id, *product_min, *product_max) {
            Ok(count) => info!(
                "Registered {} for {:04x}:{:04x}-{:04x} ({} total)",
                name, vendor_id, product_min, product_max, count
            ),
            Err(e) => error!("Failed to register {}: {}", name, e),
        }
    }

    info!("Running for {}s", duration.as_secs());
    std::thread::sleep(duration);

    info!("Shutting down USB subsystem...");
    if let Err(e) = handler.finalize() {
        error!("Error finalizing USB subsystem: {}", e);
    }
    if receiver.join().is_err() {
        error!("Event receiver thread panicked");
    }
    pump.stop();

    Ok(())
}

/// Log events until the subsystem terminates
fn log_events(handler: UsbHandler) {
    let thread = GuestThread::new(1, "usbd-events");

    loop {
        match handler.receive_event(&thread) {
            Ok(ReceiveOutcome::Received(event)) => match event.kind() {
                Some(EventKind::Terminate) => break,
                Some(EventKind::Attach) => info!("Device attached: handle {}", event.arg2),
                Some(kind) => info!("Event {:?}: {:#x}", kind, event.arg2),
                None => info!("Event {:?}", event),
            },
            Ok(ReceiveOutcome::Interrupted) => break,
            Err(e) => {
                error!("receive_event failed: {}", e);
                break;
            }
        }
    }
}
