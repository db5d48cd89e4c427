//! Event queue and parked guest contexts
//!
//! An event is either handed straight to the oldest parked context or, when
//! nobody is waiting, appended to the FIFO. It is never both.

use abi::UsbdEvent;
use common::{GuestMailbox, create_guest_mailbox};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{trace, warn};

/// Guest execution context that may block in receive-event
#[derive(Debug)]
pub struct GuestThread {
    id: u64,
    name: String,
    mailbox: GuestMailbox,
}

impl GuestThread {
    pub fn new(id: u64, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            mailbox: create_guest_mailbox(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn mailbox(&self) -> &GuestMailbox {
        &self.mailbox
    }

    /// Ask the context to stop waiting
    ///
    /// A context parked in receive-event returns with no event.
    pub fn interrupt(&self) {
        if let Err(e) = self.mailbox.interrupt() {
            warn!("Failed to interrupt guest thread {}: {}", self.name, e);
        }
    }
}

/// Outcome of a receive-event call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Received(UsbdEvent),
    /// The context was stopped while parked and got no event
    Interrupted,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<UsbdEvent>,
    waiters: VecDeque<Arc<GuestThread>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to the oldest waiter, or enqueue when there is none
    pub fn add(&mut self, event: UsbdEvent) {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.mailbox().deliver(event) {
                Ok(()) => {
                    trace!("Event {:?} delivered to {}", event, waiter.name());
                    return;
                }
                Err(e) => warn!("Dropping unreachable waiter {}: {}", waiter.name(), e),
            }
        }

        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<UsbdEvent> {
        self.queue.pop_front()
    }

    /// Append a context to the wait list
    pub fn park(&mut self, thread: Arc<GuestThread>) {
        self.waiters.push_back(thread);
    }

    /// Remove a context from the wait list; false if it was not there
    ///
    /// Contexts are matched by identity. Guest ids are not required to be
    /// unique.
    pub fn remove_waiter(&mut self, thread: &Arc<GuestThread>) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| !Arc::ptr_eq(w, thread));
        self.waiters.len() != before
    }

    /// Resume every waiter with `event` and empty the wait list
    pub fn wake_all(&mut self, event: UsbdEvent) -> usize {
        let mut woken = 0;
        for waiter in self.waiters.drain(..) {
            if waiter.mailbox().deliver(event).is_ok() {
                woken += 1;
            }
        }
        woken
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn parked_count(&self) -> usize {
        self.waiters.len()
    }
}
