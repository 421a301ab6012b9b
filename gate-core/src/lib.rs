//! Gate endpoint core - hardware-independent logic for an RFID gate.
//!
//! The endpoint detects a proximity card, drives a relay and a tri-color
//! indicator off a debounced locked/unlocked session, and reports every
//! transition to a remote server through a token-gated HTTP protocol.
//!
//! Architecture:
//! - `session`: per-tick card presence debouncing and actuation
//! - `arbiter`: WiFi credential reconciliation and connect-or-provision loop
//! - `reporter` / `api`: access token fetch and event submission
//! - `store`: A/B double-buffered flash cache for WiFi credentials
//! - `portal` / `dhcp`: setup page and address pool on the soft-AP
//! - `endpoint`: the single cooperative control loop tying it together
//!
//! Everything that touches hardware is a trait in `hal`, implemented by the
//! firmware crate on the device and by fakes in the host tests.

#![no_std]

extern crate alloc;

pub mod api;
pub mod arbiter;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod dhcp;
pub mod endpoint;
pub mod hal;
pub mod http;
pub mod identity;
pub mod link;
pub mod portal;
pub mod presence;
pub mod reporter;
pub mod session;
pub mod sntp;
pub mod store;

pub use api::ApiClient;
pub use arbiter::{Arbiter, ArbiterConfig, ArbiterError, Phase};
pub use clock::{Clock, NetworkTime, WallClock};
pub use config::Config;
pub use credentials::{Credential, CredentialFetchError, CredentialSet, CredentialSource};
pub use endpoint::{Endpoint, Parts};
pub use identity::{CardUid, DeviceId};
pub use link::{LinkEvent, LinkInbox, LinkState};
pub use reporter::{ReportError, ReportEvent, Reporter, ScanType};
pub use session::{SessionController, SessionState, Transition};
pub use store::SlotStore;
