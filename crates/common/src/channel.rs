//! Wake mailbox for parked guest contexts
//!
//! A guest context blocked in receive-event waits on its own mailbox. The
//! engine resumes it either by writing an event triple straight into the
//! mailbox or by interrupting it when the emulator stops the context.

use abi::UsbdEvent;
use async_channel::{Receiver, Sender, TryRecvError, unbounded};

/// Signal that resumes a parked guest context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSignal {
    /// Event written directly into the context's resume state
    Deliver(UsbdEvent),
    /// The context was asked to stop while parked
    Interrupt,
}

/// Per-context resume mailbox
#[derive(Debug)]
pub struct GuestMailbox {
    tx: Sender<WakeSignal>,
    rx: Receiver<WakeSignal>,
}

impl GuestMailbox {
    /// Write an event into the resume state and wake the context
    pub fn deliver(&self, event: UsbdEvent) -> crate::Result<()> {
        self.tx
            .try_send(WakeSignal::Deliver(event))
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Ask a parked context to give up waiting
    pub fn interrupt(&self) -> crate::Result<()> {
        self.tx
            .try_send(WakeSignal::Interrupt)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Block until the next wake signal
    pub fn wait(&self) -> crate::Result<WakeSignal> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take a pending wake signal without blocking
    pub fn try_take(&self) -> Option<WakeSignal> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Number of signals not yet consumed
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Create an empty mailbox
pub fn create_guest_mailbox() -> GuestMailbox {
    let (tx, rx) = unbounded();
    GuestMailbox { tx, rx }
}
