//! The endpoint's single control loop.
//!
//! One `tick()` is: drain the link inbox, reconnect if the link is down,
//! run one session step, actuate, report. Every (re)connect also resets the
//! wall clock from NTP when the time server answers. Everything runs on the caller's
//! thread; the only concurrent writer is the WiFi driver callback, and it
//! only touches the [`LinkInbox`].

use crate::api::ApiClient;
use crate::arbiter::{Arbiter, ArbiterConfig, ArbiterError};
use crate::clock::{Clock, NetworkTime, WallClock};
use crate::config::Config;
use crate::hal::{Color, CredentialStore, Indicator, PresenceSource, Relay, WifiStatus, WifiTransport};
use crate::http::HttpClient;
use crate::identity::DeviceId;
use crate::link::{LinkEvent, LinkInbox, LinkState};
use crate::reporter::{ReportEvent, Reporter, ScanType};
use crate::session::{SessionController, Transition};

/// Hardware and network pieces the endpoint drives.
pub struct Parts<P, R, I, W, S, H, C, T> {
    pub reader: P,
    pub relay: R,
    pub indicator: I,
    pub wifi: W,
    pub store: S,
    pub http: H,
    pub clock: C,
    pub time: T,
}

pub struct Endpoint<P, R, I, W, S, H, C, T> {
    reader: P,
    relay: R,
    indicator: I,
    wifi: W,
    store: S,
    api: ApiClient<H>,
    clock: C,
    time: T,
    inbox: &'static LinkInbox,
    arbiter: Arbiter,
    session: SessionController,
    reporter: Reporter,
    wall: WallClock,
    device_id: DeviceId,
}

impl<P, R, I, W, S, H, C, T> Endpoint<P, R, I, W, S, H, C, T>
where
    P: PresenceSource,
    R: Relay,
    I: Indicator,
    W: WifiTransport,
    S: CredentialStore,
    H: HttpClient,
    C: Clock,
    T: NetworkTime,
{
    pub fn new(
        parts: Parts<P, R, I, W, S, H, C, T>,
        config: &Config,
        arbiter: ArbiterConfig,
        device_id: DeviceId,
        inbox: &'static LinkInbox,
    ) -> Self {
        Self {
            reader: parts.reader,
            relay: parts.relay,
            indicator: parts.indicator,
            wifi: parts.wifi,
            store: parts.store,
            api: ApiClient::new(parts.http, config),
            clock: parts.clock,
            time: parts.time,
            inbox,
            arbiter: Arbiter::new(arbiter),
            session: SessionController::new(),
            reporter: Reporter::new(),
            wall: WallClock::new(config.utc_offset_secs),
            device_id,
        }
    }

    /// Outputs to a known state, then block until the link is up.
    pub fn boot(&mut self) -> Result<(), ArbiterError> {
        log::info!("endpoint: booting as {}", self.device_id);
        self.relay.set_relay(false);
        self.indicator.set_indicator(Color::Off);
        self.connect()?;
        self.indicator.set_indicator(Color::Idle);
        Ok(())
    }

    /// One iteration of the control loop.
    pub fn tick(&mut self) -> Result<Transition, ArbiterError> {
        if let Some(event) = self.inbox.take() {
            self.arbiter.on_link_event(event);
        }
        // Catch drops the driver callback missed.
        if self.arbiter.link_state() == LinkState::Connected
            && self.wifi.status() == WifiStatus::Disconnected
        {
            self.arbiter.on_link_event(LinkEvent::Disconnected);
        }

        if self.arbiter.link_state() != LinkState::Connected {
            self.indicator.set_indicator(Color::Off);
            self.connect()?;
            self.indicator.set_indicator(self.session.color());
        }

        let now_ms = self.clock.now_ms();
        let transition = self.session.step(&mut self.reader, now_ms);
        SessionController::actuate(&transition, &mut self.relay, &mut self.indicator);
        self.report(&transition, now_ms);
        Ok(transition)
    }

    fn connect(&mut self) -> Result<(), ArbiterError> {
        self.arbiter
            .resolve_and_connect(&mut self.wifi, &mut self.store, &mut self.api, &mut self.clock)?;
        // Events queued while candidates were tried describe links that no
        // longer exist.
        if let Some(stale) = self.inbox.take() {
            log::debug!("endpoint: dropping {:?} queued during resolve", stale);
        }
        self.arbiter.refresh(&mut self.store, &mut self.api);
        self.sync_network_time();
        self.sync_wall_clock();
        Ok(())
    }

    /// One NTP query per (re)connect. Without an answer the clock keeps
    /// following the server's `Date` header.
    fn sync_network_time(&mut self) {
        match self.time.query_epoch_secs() {
            Some(epoch_secs) => {
                let now_ms = self.clock.now_ms();
                self.wall.sync_from_ntp(epoch_secs, now_ms);
            }
            None => log::debug!("clock: no NTP answer"),
        }
    }

    fn report(&mut self, transition: &Transition, now_ms: u64) {
        let (uid, scan_type) = match transition {
            Transition::Entered(uid) => (uid, ScanType::Entry),
            Transition::Exited { uid, .. } => (uid, ScanType::Exit),
            Transition::None => return,
        };
        let event = ReportEvent {
            device_id: self.device_id.clone(),
            tag_uid: uid.clone(),
            timestamp: self.wall.scan_time(now_ms),
            scan_type,
        };
        // Failures are logged and counted by the reporter; the session has
        // already moved on.
        let _ = self
            .reporter
            .report(self.arbiter.link_state(), &mut self.api, &event);
        self.sync_wall_clock();
    }

    fn sync_wall_clock(&mut self) {
        if let Some(date) = self.api.take_server_date() {
            let now_ms = self.clock.now_ms();
            self.wall.sync_from_http_date(&date, now_ms);
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.arbiter.link_state()
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn wall_clock(&self) -> &WallClock {
        &self.wall
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn reader_mut(&mut self) -> &mut P {
        &mut self.reader
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn wifi_mut(&mut self) -> &mut W {
        &mut self.wifi
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn http(&self) -> &H {
        self.api.http()
    }

    pub fn http_mut(&mut self) -> &mut H {
        self.api.http_mut()
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn time_mut(&mut self) -> &mut T {
        &mut self.time
    }
}
