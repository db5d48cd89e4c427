//! Background pump
//!
//! Dedicated thread that lets the host backend run completion callbacks and
//! retires fake transfers once they are due. It sleeps briefly while any
//! device is handled and much longer otherwise.

use crate::handler::UsbHandler;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stop flag the pump can wait on
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`; returns true once stopped
    pub fn wait(&self, timeout: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .condvar
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

pub struct UsbdPump {
    handler: UsbHandler,
    stop: Arc<StopSignal>,
}

impl UsbdPump {
    pub fn new(handler: UsbHandler, stop: Arc<StopSignal>) -> Self {
        Self { handler, stop }
    }

    /// One iteration without the sleep; returns the number of retired transfers
    pub fn step(&self) -> usize {
        if let Err(e) = self.handler.service_host_events() {
            warn!("Error handling host USB events: {}", e);
        }

        self.handler.retire_due_fake_transfers(Instant::now())
    }

    /// Run until stopped
    pub fn run(self) {
        info!("USB pump started");
        let timing = self.handler.timing().clone();

        loop {
            let retired = self.step();
            if retired > 0 {
                debug!("Retired {} fake transfer(s)", retired);
            }

            let interval = if self.handler.handled_count() > 0 {
                timing.busy_interval()
            } else {
                timing.idle_interval()
            };

            if self.stop.wait(interval) {
                break;
            }
        }

        info!("USB pump stopped");
    }
}

/// Running pump thread
pub struct PumpHandle {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Stop the pump and wait for the thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop.stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("USB pump thread panicked");
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the pump on a thread named `usbd-pump`
pub fn spawn_usbd_pump(handler: UsbHandler) -> std::io::Result<PumpHandle> {
    let stop = Arc::new(StopSignal::new());
    let pump = UsbdPump::new(handler, Arc::clone(&stop));

    let thread = std::thread::Builder::new()
        .name("usbd-pump".to_string())
        .spawn(move || pump.run())?;

    Ok(PumpHandle {
        stop,
        thread: Some(thread),
    })
}
