//! Presence/lock session controller.
//!
//! Turns the reader's noisy per-tick answers into a clean two-state session:
//!
//!   Idle --select ok--> Locked(uid) --select fails--> Idle
//!
//! Each transition drives the relay and the indicator, then triggers exactly
//! one report. Repeated successful selects while locked are silent, as are
//! repeated failures while idle.

use crate::hal::{Color, Indicator, PresenceSource, Relay};
use crate::identity::CardUid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Locked { uid: CardUid, since_ms: u64 },
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    None,
    Entered(CardUid),
    /// The card left after being held for `held_ms`.
    Exited { uid: CardUid, held_ms: u64 },
}

/// Owns the session. Never persisted: every boot starts `Idle`.
#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, SessionState::Locked { .. })
    }

    /// Indicator color matching the current state.
    pub fn color(&self) -> Color {
        if self.is_locked() {
            Color::Active
        } else {
            Color::Idle
        }
    }

    /// Per-tick decision. Talks to the reader and updates the session, but
    /// performs no actuation.
    pub fn step<P: PresenceSource>(&mut self, source: &mut P, now_ms: u64) -> Transition {
        // Cheap wake-up first; the select is only worth doing when a card
        // may be there or one is locked and needs confirming.
        let signal = source.wakeup();
        if !self.is_locked() && !signal.maybe_present() {
            return Transition::None;
        }

        let locked = match &self.state {
            SessionState::Locked { uid, since_ms } => Some((uid.clone(), *since_ms)),
            SessionState::Idle => None,
        };
        let result = source.select(locked.as_ref().map(|(uid, _)| uid));

        let transition = match (locked, result) {
            (None, Ok(uid)) => {
                log::info!("session: locked tag={}", uid);
                self.state = SessionState::Locked {
                    uid: uid.clone(),
                    since_ms: now_ms,
                };
                Transition::Entered(uid)
            }
            (Some((uid, since_ms)), Err(reason)) => {
                let held_ms = now_ms.saturating_sub(since_ms);
                log::info!(
                    "session: unlocked tag={} after {}ms ({})",
                    uid,
                    held_ms,
                    reason
                );
                self.state = SessionState::Idle;
                source.clear_selection();
                Transition::Exited { uid, held_ms }
            }
            (None, Err(_)) => {
                // Drop anything a failed select left half-read.
                source.clear_selection();
                Transition::None
            }
            (Some(_), Ok(_)) => Transition::None,
        };

        source.halt();
        transition
    }

    /// Apply a transition's actuation. Relay before indicator, and both
    /// before the caller attempts any report.
    pub fn actuate<R: Relay, I: Indicator>(transition: &Transition, relay: &mut R, indicator: &mut I) {
        match transition {
            Transition::Entered(_) => {
                relay.set_relay(true);
                indicator.set_indicator(Color::Active);
            }
            Transition::Exited { .. } => {
                relay.set_relay(false);
                indicator.set_indicator(Color::Idle);
            }
            Transition::None => {}
        }
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}
