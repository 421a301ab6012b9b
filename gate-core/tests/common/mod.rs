//! Scripted fakes for the collaborator traits, shared by the host tests.
//!
//! Fakes that take part in ordering checks write into a shared [`Journal`].

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use gate_core::clock::{Clock, NetworkTime};
use gate_core::credentials::{Credential, CredentialFetchError, CredentialSet};
use gate_core::hal::{
    Color, CredentialApi, CredentialStore, Indicator, PresenceSignal, PresenceSource, Relay,
    SelectError, WifiStatus, WifiTransport,
};
use gate_core::http::{HttpClient, HttpError, Method, Request, Response};
use gate_core::identity::CardUid;
use gate_core::link::{LinkEvent, LinkInbox};

pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.borrow().clone()
}

pub fn set(pairs: &[(&str, &str)]) -> CredentialSet {
    CredentialSet::new(pairs.iter().map(|(s, p)| Credential::new(s, p)).collect())
}

pub fn uid(bytes: &[u8]) -> CardUid {
    CardUid::from_bytes(bytes).unwrap()
}

// ============================================================================
// Reader
// ============================================================================

/// A card field. `card` is whatever sits on the antenna right now.
#[derive(Default)]
pub struct FakeReader {
    pub card: Option<CardUid>,
    /// Wake-up answers with a collision even with no card selected.
    pub collision: bool,
    /// Errors returned by the next selects, ahead of the field contents.
    pub select_failures: VecDeque<SelectError>,
    pub wakeups: usize,
    pub selects: Vec<Option<CardUid>>,
    pub halts: usize,
    pub clears: usize,
}

impl FakeReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceSource for FakeReader {
    fn wakeup(&mut self) -> PresenceSignal {
        self.wakeups += 1;
        if self.collision {
            PresenceSignal::Collision
        } else if self.card.is_some() {
            PresenceSignal::Present
        } else {
            PresenceSignal::None
        }
    }

    fn select(&mut self, prior: Option<&CardUid>) -> Result<CardUid, SelectError> {
        self.selects.push(prior.cloned());
        if let Some(err) = self.select_failures.pop_front() {
            return Err(err);
        }
        match (&self.card, prior) {
            (Some(card), Some(prior)) if card == prior => Ok(card.clone()),
            (Some(_), Some(_)) => Err(SelectError::NoCard),
            (Some(card), None) => Ok(card.clone()),
            (None, _) => Err(SelectError::NoCard),
        }
    }

    fn halt(&mut self) {
        self.halts += 1;
    }

    fn clear_selection(&mut self) {
        self.clears += 1;
    }
}

// ============================================================================
// Outputs
// ============================================================================

pub struct FakeRelay {
    pub on: bool,
    journal: Journal,
}

impl FakeRelay {
    pub fn new(journal: &Journal) -> Self {
        Self {
            on: false,
            journal: journal.clone(),
        }
    }
}

impl Relay for FakeRelay {
    fn set_relay(&mut self, on: bool) {
        self.on = on;
        self.journal
            .borrow_mut()
            .push(format!("relay {}", if on { "on" } else { "off" }));
    }
}

pub struct FakeIndicator {
    pub color: Color,
    journal: Journal,
}

impl FakeIndicator {
    pub fn new(journal: &Journal) -> Self {
        Self {
            color: Color::Off,
            journal: journal.clone(),
        }
    }
}

impl Indicator for FakeIndicator {
    fn set_indicator(&mut self, color: Color) {
        self.color = color;
        self.journal.borrow_mut().push(format!("indicator {:?}", color));
    }
}

// ============================================================================
// WiFi
// ============================================================================

/// Joins instantly when the network is in `reachable`, otherwise stays
/// `Connecting` forever.
pub struct FakeWifi {
    pub status: WifiStatus,
    pub reachable: Vec<Credential>,
    pub attempts: Vec<String>,
    pub ap_started: Vec<String>,
    pub ap_stopped: usize,
    /// Delivered by `poll_portal` once `portal_polls` reaches `deliver_after`.
    pub submission: Option<CredentialSet>,
    pub deliver_after: usize,
    pub portal_polls: usize,
    /// Receives a `Disconnected` on every connect, as the driver reports
    /// the station being stopped for reconfiguration.
    pub driver_events: Option<&'static LinkInbox>,
}

impl FakeWifi {
    pub fn new(status: WifiStatus) -> Self {
        Self {
            status,
            reachable: Vec::new(),
            attempts: Vec::new(),
            ap_started: Vec::new(),
            ap_stopped: 0,
            submission: None,
            deliver_after: 1,
            portal_polls: 0,
            driver_events: None,
        }
    }

    pub fn reachable(mut self, ssid: &str, pass: &str) -> Self {
        self.reachable.push(Credential::new(ssid, pass));
        self
    }
}

impl WifiTransport for FakeWifi {
    fn status(&mut self) -> WifiStatus {
        self.status
    }

    fn connect(&mut self, ssid: &str, pass: &str) {
        self.attempts.push(ssid.to_string());
        if let Some(inbox) = self.driver_events {
            inbox.push(LinkEvent::Disconnected);
        }
        let known = self
            .reachable
            .iter()
            .any(|c| c.ssid == ssid && c.pass == pass);
        self.status = if known {
            WifiStatus::Connected
        } else {
            WifiStatus::Connecting
        };
    }

    fn start_access_point(&mut self, portal_name: &str) {
        self.ap_started.push(portal_name.to_string());
        self.status = WifiStatus::Disconnected;
    }

    fn poll_portal(&mut self) -> Option<CredentialSet> {
        self.portal_polls += 1;
        if self.portal_polls < self.deliver_after {
            return None;
        }
        let submitted = self.submission.take();
        if submitted.is_some() {
            self.status = WifiStatus::Connected;
        }
        submitted
    }

    fn stop_access_point(&mut self) {
        self.ap_stopped += 1;
    }
}

// ============================================================================
// Credential store and API
// ============================================================================

#[derive(Default)]
pub struct FakeStore {
    pub current: Option<CredentialSet>,
    pub saved: Vec<CredentialSet>,
    pub loads: usize,
}

impl FakeStore {
    pub fn with(set: CredentialSet) -> Self {
        Self {
            current: Some(set),
            ..Self::default()
        }
    }
}

impl CredentialStore for FakeStore {
    fn load(&mut self) -> Option<CredentialSet> {
        self.loads += 1;
        self.current.clone()
    }

    fn save(&mut self, set: &CredentialSet) {
        self.saved.push(set.clone());
        self.current = Some(set.clone());
    }
}

pub struct FakeCredentialApi {
    pub response: Result<CredentialSet, CredentialFetchError>,
    pub calls: usize,
}

impl FakeCredentialApi {
    pub fn returning(set: CredentialSet) -> Self {
        Self {
            response: Ok(set),
            calls: 0,
        }
    }

    pub fn failing(err: CredentialFetchError) -> Self {
        Self {
            response: Err(err),
            calls: 0,
        }
    }
}

impl CredentialApi for FakeCredentialApi {
    fn fetch_credentials(&mut self) -> Result<CredentialSet, CredentialFetchError> {
        self.calls += 1;
        self.response.clone()
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

/// Answers by path. Unrouted paths get a 404.
pub struct FakeHttp {
    pub routes: Vec<(String, Result<Response, HttpError>)>,
    pub sent: Vec<SentRequest>,
    journal: Journal,
}

impl FakeHttp {
    pub fn new(journal: &Journal) -> Self {
        Self {
            routes: Vec::new(),
            sent: Vec::new(),
            journal: journal.clone(),
        }
    }

    pub fn route(mut self, path: &str, status: u16, body: &str) -> Self {
        self.routes.push((path.to_string(), Ok(response(status, body))));
        self
    }

    pub fn route_dated(mut self, path: &str, status: u16, body: &str, date: &str) -> Self {
        let mut resp = response(status, body);
        resp.date = Some(date.to_string());
        self.routes.push((path.to_string(), Ok(resp)));
        self
    }

    pub fn route_err(mut self, path: &str, err: HttpError) -> Self {
        self.routes.push((path.to_string(), Err(err)));
        self
    }

    pub fn bodies_for(&self, path: &str) -> Vec<String> {
        self.sent
            .iter()
            .filter(|r| r.path == path)
            .filter_map(|r| r.body.clone())
            .collect()
    }
}

pub fn response(status: u16, body: &str) -> Response {
    Response {
        status,
        date: None,
        body: body.to_string(),
    }
}

impl HttpClient for FakeHttp {
    fn send(&mut self, request: &Request<'_>) -> Result<Response, HttpError> {
        self.journal
            .borrow_mut()
            .push(format!("http {} {}", request.method.as_str(), request.path));
        self.sent.push(SentRequest {
            method: request.method,
            path: request.path.to_string(),
            body: request.body.map(String::from),
        });
        self.routes
            .iter()
            .find(|(path, _)| path == request.path)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| Ok(response(404, "")))
    }
}

// ============================================================================
// Clock
// ============================================================================

#[derive(Default)]
pub struct FakeClock {
    pub now: u64,
    pub sleeps: usize,
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.sleeps += 1;
        self.now += ms;
    }
}

/// Time server answering with a fixed instant, or not at all.
#[derive(Default)]
pub struct FakeTime {
    pub epoch_secs: Option<i64>,
    pub queries: usize,
}

impl NetworkTime for FakeTime {
    fn query_epoch_secs(&mut self) -> Option<i64> {
        self.queries += 1;
        self.epoch_secs
    }
}
