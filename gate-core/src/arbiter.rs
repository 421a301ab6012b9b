//! Connectivity provisioning arbiter.
//!
//! Keeps the endpoint in exactly one of: connected, connecting, or serving
//! the provisioning portal. On boot and after every link drop it:
//!
//! 1. fetches a fresh credential set if a link is already up (one attempt)
//! 2. loads the cached set from flash
//! 3. reconciles them, writing flash only when the fetched set differs
//! 4. tries each network of the active set once, 10 s each, in order
//! 5. falls back to the soft-AP portal for 60 s, then gives up
//!
//! Giving up is the only fatal outcome; the caller restarts the device.
//!
//! The waits are a state machine polled against a monotonic clock
//! ([`Arbiter::poll`]) rather than sleeps, so a fake clock drives them in
//! tests. [`Arbiter::resolve_and_connect`] is the blocking wrapper the
//! control loop uses.

use thiserror::Error;

use crate::clock::Clock;
use crate::credentials::{CredentialSet, CredentialSource};
use crate::hal::{CredentialApi, CredentialStore, WifiStatus, WifiTransport};
use crate::link::{LinkEvent, LinkState};

pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const PROVISIONING_TIMEOUT_MS: u64 = 60_000;
pub const POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    pub portal_name: &'static str,
    pub connect_timeout_ms: u64,
    pub provisioning_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Persist a fetched set when nothing was cached yet. With `false`, flash
    /// is only written when a cached and a fetched set both exist and differ.
    pub persist_uncached_fetch: bool,
}

impl ArbiterConfig {
    pub fn new(portal_name: &'static str) -> Self {
        Self {
            portal_name,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            provisioning_timeout_ms: PROVISIONING_TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            persist_uncached_fetch: true,
        }
    }
}

/// Where the decision procedure currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in progress; `begin` has not run since the last drop.
    Idle,
    /// Waiting on network `index` of the active set.
    Connecting { index: usize, started_ms: u64 },
    Provisioning { started_ms: u64 },
    Connected,
    /// Portal timed out. Terminal until restart.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbiterError {
    #[error("no credentials supplied within {0}ms of provisioning")]
    ProvisioningTimeout(u64),
}

/// Decide which credential set is active and whether flash needs a write.
///
/// Returns `None` when neither set is usable.
pub fn reconcile<S: CredentialStore>(
    fetched: Option<CredentialSet>,
    cached: Option<CredentialSet>,
    store: &mut S,
    persist_uncached_fetch: bool,
) -> Option<(CredentialSet, CredentialSource)> {
    match (fetched, cached) {
        (Some(fetched), Some(cached)) => {
            if fetched != cached {
                store.save(&fetched);
                log::info!("wifi: credentials updated in flash ({} networks)", fetched.len());
            } else {
                log::info!("wifi: credentials unchanged");
            }
            Some((fetched, CredentialSource::Fetched))
        }
        (Some(fetched), None) => {
            if persist_uncached_fetch {
                store.save(&fetched);
                log::info!("wifi: cached fetched credentials ({} networks)", fetched.len());
            }
            Some((fetched, CredentialSource::Fetched))
        }
        (None, Some(cached)) => Some((cached, CredentialSource::Cached)),
        (None, None) => None,
    }
}

pub struct Arbiter {
    config: ArbiterConfig,
    phase: Phase,
    link: LinkState,
    active: CredentialSet,
    source: CredentialSource,
}

impl Arbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            link: LinkState::Disconnected,
            active: CredentialSet::default(),
            source: CredentialSource::None,
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn active(&self) -> &CredentialSet {
        &self.active
    }

    /// The loop must run [`Arbiter::resolve_and_connect`] before relying on
    /// the link.
    pub fn needs_resolve(&self) -> bool {
        self.link == LinkState::Disconnected
    }

    /// Apply a driver notification taken from the link inbox.
    pub fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Disconnected => {
                if self.link == LinkState::Connected {
                    log::warn!("wifi: link lost");
                    self.link = LinkState::Disconnected;
                    self.phase = Phase::Idle;
                }
            }
            // Join progress is observed through the transport status.
            LinkEvent::Connected => {}
        }
    }

    /// Steps 1-4: gather candidates and start the first join (or the portal).
    pub fn begin<W, S, A>(&mut self, wifi: &mut W, store: &mut S, api: &mut A, now_ms: u64)
    where
        W: WifiTransport,
        S: CredentialStore,
        A: CredentialApi,
    {
        let fetched = if wifi.status() == WifiStatus::Connected {
            fetch_usable(api)
        } else {
            None
        };

        let cached = store.load().filter(|set| {
            if !set.is_usable() {
                log::warn!("wifi: cached credential set is empty");
            }
            set.is_usable()
        });

        match reconcile(fetched, cached, store, self.config.persist_uncached_fetch) {
            Some((set, source)) => {
                log::info!("wifi: using {:?} credentials ({} networks)", source, set.len());
                self.active = set;
                self.source = source;
                self.start_attempt(0, wifi, now_ms);
            }
            None => {
                log::warn!("wifi: no credentials available");
                self.active = CredentialSet::default();
                self.source = CredentialSource::None;
                self.enter_provisioning(wifi, now_ms);
            }
        }
    }

    /// Advance the current wait. Returns the phase after this poll.
    pub fn poll<W, S>(&mut self, wifi: &mut W, store: &mut S, now_ms: u64) -> &Phase
    where
        W: WifiTransport,
        S: CredentialStore,
    {
        match self.phase {
            Phase::Connecting { index, started_ms } => {
                if wifi.status() == WifiStatus::Connected {
                    let ssid = self.active.get(index).map(|c| c.ssid.as_str()).unwrap_or("");
                    log::info!("wifi: connected to {}", ssid);
                    self.link = LinkState::Connected;
                    self.phase = Phase::Connected;
                } else if now_ms.saturating_sub(started_ms) >= self.config.connect_timeout_ms {
                    log::warn!(
                        "wifi: network {}/{} timed out",
                        index + 1,
                        self.active.len()
                    );
                    let next = index + 1;
                    if next < self.active.len() {
                        self.start_attempt(next, wifi, now_ms);
                    } else {
                        log::warn!("wifi: all {} networks failed", self.active.len());
                        self.enter_provisioning(wifi, now_ms);
                    }
                }
            }
            Phase::Provisioning { started_ms } => {
                if let Some(set) = wifi.poll_portal().filter(CredentialSet::is_usable) {
                    log::info!("wifi: provisioned {} network(s) via portal", set.len());
                    wifi.stop_access_point();
                    store.save(&set);
                    self.active = set;
                    self.source = CredentialSource::Provisioned;
                    self.link = LinkState::Connected;
                    self.phase = Phase::Connected;
                } else if now_ms.saturating_sub(started_ms) >= self.config.provisioning_timeout_ms {
                    log::error!("wifi: provisioning timed out");
                    self.phase = Phase::Failed;
                }
            }
            Phase::Idle | Phase::Connected | Phase::Failed => {}
        }
        &self.phase
    }

    /// Run the full decision procedure, blocking until connected.
    pub fn resolve_and_connect<W, S, A, C>(
        &mut self,
        wifi: &mut W,
        store: &mut S,
        api: &mut A,
        clock: &mut C,
    ) -> Result<(), ArbiterError>
    where
        W: WifiTransport,
        S: CredentialStore,
        A: CredentialApi,
        C: Clock,
    {
        self.begin(wifi, store, api, clock.now_ms());
        loop {
            let now_ms = clock.now_ms();
            match self.poll(wifi, store, now_ms) {
                Phase::Connected => return Ok(()),
                Phase::Failed => {
                    return Err(ArbiterError::ProvisioningTimeout(
                        self.config.provisioning_timeout_ms,
                    ))
                }
                _ => clock.sleep_ms(self.config.poll_interval_ms),
            }
        }
    }

    /// With the link up, pull the server's list and persist it if it changed.
    /// Does not reconnect; the new set is used from the next resolve.
    ///
    /// Skipped when the active set was already fetched by this resolve, so a
    /// resolve never makes more than one credential request.
    pub fn refresh<S, A>(&mut self, store: &mut S, api: &mut A)
    where
        S: CredentialStore,
        A: CredentialApi,
    {
        if self.link != LinkState::Connected || self.source == CredentialSource::Fetched {
            return;
        }
        let Some(fetched) = fetch_usable(api) else {
            return;
        };
        let cached = store.load();
        if let Some((set, source)) =
            reconcile(Some(fetched), cached, store, self.config.persist_uncached_fetch)
        {
            self.active = set;
            self.source = source;
        }
    }

    fn start_attempt<W: WifiTransport>(&mut self, index: usize, wifi: &mut W, now_ms: u64) {
        let Some(credential) = self.active.get(index) else {
            self.enter_provisioning(wifi, now_ms);
            return;
        };
        log::info!(
            "wifi: connecting to {} ({}/{})",
            credential.ssid,
            index + 1,
            self.active.len()
        );
        wifi.connect(&credential.ssid, &credential.pass);
        self.link = LinkState::Connecting;
        self.phase = Phase::Connecting {
            index,
            started_ms: now_ms,
        };
    }

    fn enter_provisioning<W: WifiTransport>(&mut self, wifi: &mut W, now_ms: u64) {
        log::warn!("wifi: starting provisioning portal {}", self.config.portal_name);
        wifi.start_access_point(self.config.portal_name);
        self.link = LinkState::ProvisioningMode;
        self.phase = Phase::Provisioning { started_ms: now_ms };
    }
}

fn fetch_usable<A: CredentialApi>(api: &mut A) -> Option<CredentialSet> {
    match api.fetch_credentials() {
        Ok(set) if set.is_usable() => {
            log::info!("wifi: fetched {} networks from server", set.len());
            Some(set)
        }
        Ok(_) => {
            log::warn!("wifi: server returned an empty credential list");
            None
        }
        Err(e) => {
            log::warn!("wifi: credential fetch failed: {}", e);
            None
        }
    }
}
