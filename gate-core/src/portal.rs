//! Configuration portal served on the soft-AP in provisioning mode.

use alloc::string::String;
use alloc::vec;
use core::fmt::Write as FmtWrite;

use crate::credentials::{Credential, CredentialSet};

/// Decode the portal's `application/x-www-form-urlencoded` submission.
/// Needs a non-empty `ssid`; `pass` may be empty for open networks.
pub fn parse_portal_form(body: &str) -> Option<CredentialSet> {
    let mut ssid = None;
    let mut pass = String::new();

    for (key, value) in form_urlencoded::parse(body.trim().as_bytes()) {
        match key.as_ref() {
            "ssid" => ssid = Some(value.into_owned()),
            "pass" => pass = value.into_owned(),
            _ => {}
        }
    }

    let ssid = ssid.filter(|s| !s.trim().is_empty())?;
    Some(CredentialSet::new(vec![Credential { ssid, pass }]))
}

/// HTML form page for `device`. `notice` is shown above the form, e.g. after
/// a failed join.
pub fn portal_page(device: &str, notice: Option<&str>) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<h1>Gate setup</h1>\
         <p>Device: {}</p>",
        device
    );
    if let Some(notice) = notice {
        let _ = write!(body, "<p><b>{}</b></p>", notice);
    }
    body.push_str(
        "<form action=/save method=post>\
         <p>SSID <input name=ssid></p>\
         <p>Password <input name=pass type=password></p>\
         <button>Connect</button></form>",
    );
    body
}

/// Result of checking on a submitted network.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPoll {
    /// Nothing submitted, or the station is still joining.
    Waiting,
    /// The station is up on the submitted network.
    Joined(CredentialSet),
    /// The join timed out; the form is shown again with a notice.
    Failed,
}

/// Tracks a portal submission from the form to a joined station.
///
/// The soft-AP stays up while a submission is joining so a failure can be
/// shown on the page. Once the station has joined, [`PortalJoin::joined`]
/// is the network to keep when the AP is dropped.
#[derive(Debug)]
pub struct PortalJoin {
    timeout_ms: u64,
    pending: Option<(CredentialSet, u64)>,
    joined: Option<Credential>,
    notice: Option<String>,
}

impl PortalJoin {
    pub const fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            pending: None,
            joined: None,
            notice: None,
        }
    }

    /// Accept a submission and return the network to join.
    pub fn submit(&mut self, set: CredentialSet, now_ms: u64) -> Option<Credential> {
        let candidate = set.get(0)?.clone();
        self.pending = Some((set, now_ms));
        self.notice = None;
        Some(candidate)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn poll(&mut self, station_up: bool, now_ms: u64) -> JoinPoll {
        let Some(started) = self.pending.as_ref().map(|(_, at)| *at) else {
            return JoinPoll::Waiting;
        };
        if station_up {
            return match self.pending.take() {
                Some((set, _)) => {
                    self.joined = set.get(0).cloned();
                    JoinPoll::Joined(set)
                }
                None => JoinPoll::Waiting,
            };
        }
        if now_ms.saturating_sub(started) < self.timeout_ms {
            return JoinPoll::Waiting;
        }
        if let Some((set, _)) = self.pending.take() {
            let ssid = set.get(0).map(|c| c.ssid.as_str()).unwrap_or("");
            log::warn!("portal: could not join {}", ssid);
            self.notice = Some(alloc::format!("Could not join {}", ssid));
        }
        JoinPoll::Failed
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn joined(&self) -> Option<&Credential> {
        self.joined.as_ref()
    }
}
