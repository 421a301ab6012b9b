//! Link state and the callback-to-loop event cell.
//!
//! The WiFi driver reports link changes from its own task. Rather than
//! touching endpoint state there, the callback drops the newest event into a
//! [`LinkInbox`] and the control loop takes it at the top of the next tick.

use core::sync::atomic::{AtomicU8, Ordering};

/// Process-wide connectivity state. Written only by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    ProvisioningMode,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected = 1,
    Disconnected = 2,
}

impl LinkEvent {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(LinkEvent::Connected),
            2 => Some(LinkEvent::Disconnected),
            _ => None,
        }
    }
}

const EMPTY: u8 = 0;

/// Single-slot "latest event" cell. A newer event overwrites an unread one;
/// only the most recent link change matters to the loop.
pub struct LinkInbox {
    slot: AtomicU8,
}

impl LinkInbox {
    pub const fn new() -> Self {
        Self {
            slot: AtomicU8::new(EMPTY),
        }
    }

    /// Called from the driver callback.
    pub fn push(&self, event: LinkEvent) {
        self.slot.store(event as u8, Ordering::Release);
    }

    /// Check and clear the pending event (called from the control loop).
    pub fn take(&self) -> Option<LinkEvent> {
        LinkEvent::from_u8(self.slot.swap(EMPTY, Ordering::AcqRel))
    }
}

impl Default for LinkInbox {
    fn default() -> Self {
        Self::new()
    }
}
