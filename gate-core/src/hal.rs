//! Boundaries to the hardware and network collaborators.
//!
//! The firmware implements these with the MFRC522 reader, GPIO outputs,
//! esp-radio and the flash partition; the host tests implement them with
//! scripted fakes.

use thiserror::Error;

use crate::credentials::{CredentialFetchError, CredentialSet};
use crate::identity::CardUid;

/// Result of the cheap wake-up poll that precedes a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    None,
    /// Several cards answered. Still means "a card may be present".
    Collision,
    Present,
}

impl PresenceSignal {
    pub fn maybe_present(&self) -> bool {
        !matches!(self, PresenceSignal::None)
    }
}

/// Anti-collision/select failure. Treated exactly like "no card".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("no card answered")]
    NoCard,
    #[error("collision")]
    Collision,
    #[error("timeout")]
    Timeout,
    #[error("crc error")]
    Crc,
    #[error("transceiver error")]
    Transceiver,
}

/// The RFID reader.
pub trait PresenceSource {
    fn wakeup(&mut self) -> PresenceSignal;

    /// Select `prior` if given (confirming a locked card is still there),
    /// otherwise any card in the field.
    fn select(&mut self, prior: Option<&CardUid>) -> Result<CardUid, SelectError>;

    /// Put the selected card to sleep until the next wake-up.
    fn halt(&mut self);

    /// Discard any partially read UID left behind by a failed select.
    fn clear_selection(&mut self);
}

/// Colors of the status light used by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Off,
    /// No session (red).
    Idle,
    /// Session open (green).
    Active,
}

pub trait Relay {
    fn set_relay(&mut self, on: bool);
}

pub trait Indicator {
    fn set_indicator(&mut self, color: Color);
}

/// Station status as reported by the WiFi driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStatus {
    Connected,
    Connecting,
    Disconnected,
}

/// The WiFi radio plus the soft-AP configuration portal.
pub trait WifiTransport {
    fn status(&mut self) -> WifiStatus;

    /// Start joining a network. Returns immediately; progress is observed
    /// through [`WifiTransport::status`].
    fn connect(&mut self, ssid: &str, pass: &str);

    /// Bring up the soft-AP and the configuration page.
    fn start_access_point(&mut self, portal_name: &str);

    /// Service the portal. Returns the credentials a human submitted once the
    /// station has joined with them.
    fn poll_portal(&mut self) -> Option<CredentialSet>;

    fn stop_access_point(&mut self);
}

/// Persisted credential cache. I/O failures read as "nothing cached".
pub trait CredentialStore {
    fn load(&mut self) -> Option<CredentialSet>;
    fn save(&mut self, set: &CredentialSet);
}

/// Remote source of credential sets. One bounded attempt per call.
pub trait CredentialApi {
    fn fetch_credentials(&mut self) -> Result<CredentialSet, CredentialFetchError>;
}
