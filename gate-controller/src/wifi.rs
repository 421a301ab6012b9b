//! esp-radio station control and the soft-AP provisioning portal.

use alloc::format;
use alloc::string::ToString;
use esp_radio::wifi::event::{self, EventExt};
use esp_radio::wifi::{AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, WifiController};

use gate_core::credentials::{Credential, CredentialSet};
use gate_core::hal::{WifiStatus, WifiTransport};
use gate_core::identity::DeviceId;
use gate_core::link::{LinkEvent, LinkInbox};
use gate_core::portal::{parse_portal_form, portal_page, JoinPoll, PortalJoin};

use crate::net::{now_ms, SharedNet};

/// How long a portal submission may take to join before the form is shown
/// again with an error.
const PORTAL_JOIN_TIMEOUT_MS: u64 = 10_000;

/// Forward driver link events into `inbox`. The handlers run on the radio
/// task and touch nothing else.
pub fn route_link_events(inbox: &'static LinkInbox) {
    event::StaConnected::update_handler(move |_| inbox.push(LinkEvent::Connected));
    event::StaDisconnected::update_handler(move |_| inbox.push(LinkEvent::Disconnected));
}

struct Portal {
    ap: AccessPointConfig,
    join: PortalJoin,
}

fn client_config(credential: &Credential) -> ClientConfig {
    ClientConfig::default()
        .with_ssid(credential.ssid.clone())
        .with_password(credential.pass.clone())
}

pub struct EspWifi {
    controller: WifiController<'static>,
    net: SharedNet,
    device_id: DeviceId,
    joining: bool,
    portal: Option<Portal>,
}

impl EspWifi {
    pub fn new(controller: WifiController<'static>, net: SharedNet, device_id: DeviceId) -> Self {
        Self {
            controller,
            net,
            device_id,
            joining: false,
            portal: None,
        }
    }

    fn is_associated(&mut self) -> bool {
        self.controller.is_connected().unwrap_or(false)
    }

    /// Ensure WiFi is stopped before (re)configuring to avoid ESP-IDF errors.
    fn reconfigure(&mut self, mode: &ModeConfig) {
        let _ = self.controller.stop();
        if let Err(e) = self.controller.set_config(mode) {
            log::error!("wifi: set_config failed: {:?}", e);
        }
        if let Err(e) = self.controller.start() {
            log::error!("wifi: start failed: {:?}", e);
        }
    }

    fn join(&mut self) {
        if let Err(e) = self.controller.connect() {
            log::error!("wifi: connect failed: {:?}", e);
        }
        self.net.borrow_mut().reset_dhcp();
        self.joining = true;
    }

    fn check_pending_join(&mut self) -> Option<CredentialSet> {
        if !self.portal.as_ref()?.join.is_pending() {
            return None;
        }
        let station_up = self.is_associated() && self.net.borrow().is_configured();
        match self.portal.as_mut()?.join.poll(station_up, now_ms()) {
            JoinPoll::Joined(set) => Some(set),
            JoinPoll::Failed => {
                let _ = self.controller.disconnect();
                self.joining = false;
                None
            }
            JoinPoll::Waiting => None,
        }
    }

    /// Switch from AP+STA to station only, keeping the joined network.
    fn drop_access_point(&mut self, credential: &Credential) {
        let mode = ModeConfig::Client(client_config(credential));
        match self.controller.set_config(&mode) {
            Ok(()) if self.is_associated() => return,
            Ok(()) => log::warn!("wifi: station lost while dropping the AP"),
            Err(e) => log::warn!("wifi: could not drop the AP in place: {:?}", e),
        }
        self.reconfigure(&mode);
        self.join();
    }

    fn serve(&mut self) -> Option<CredentialSet> {
        let portal = self.portal.as_ref()?;
        let notice = portal.join.notice().map(ToString::to_string);
        let device = self.device_id.as_str();
        let mut submitted = None;

        self.net.borrow_mut().serve_portal(|request| match (request.method, request.path) {
            ("POST", "/save") => match parse_portal_form(request.body) {
                Some(set) => {
                    let ssid = set.get(0).map(|c| c.ssid.clone()).unwrap_or_default();
                    submitted = Some(set);
                    ("200 OK", format!("<p>Joining {}...</p>", ssid))
                }
                None => (
                    "400 Bad Request",
                    portal_page(device, Some("Network name is required")),
                ),
            },
            ("GET", _) => ("200 OK", portal_page(device, notice.as_deref())),
            _ => ("404 Not Found", "<p>Not Found</p>".to_string()),
        });
        submitted
    }
}

impl WifiTransport for EspWifi {
    fn status(&mut self) -> WifiStatus {
        self.net.borrow_mut().poll();
        if self.is_associated() {
            // Only usable once DHCP has handed out an address.
            if self.net.borrow().is_configured() {
                self.joining = false;
                WifiStatus::Connected
            } else {
                WifiStatus::Connecting
            }
        } else if self.joining {
            WifiStatus::Connecting
        } else {
            WifiStatus::Disconnected
        }
    }

    fn connect(&mut self, ssid: &str, pass: &str) {
        log::info!("wifi: connecting to {}", ssid);
        self.reconfigure(&ModeConfig::Client(client_config(&Credential::new(ssid, pass))));
        self.join();
    }

    fn start_access_point(&mut self, portal_name: &str) {
        log::info!("wifi: starting soft-AP {}", portal_name);
        let ap = AccessPointConfig::default()
            .with_ssid(portal_name.to_string())
            .with_auth_method(AuthMethod::None);
        self.reconfigure(&ModeConfig::AccessPoint(ap.clone()));
        self.joining = false;
        self.net.borrow_mut().open_portal();
        self.portal = Some(Portal {
            ap,
            join: PortalJoin::new(PORTAL_JOIN_TIMEOUT_MS),
        });
    }

    fn poll_portal(&mut self) -> Option<CredentialSet> {
        self.net.borrow_mut().poll();
        if let Some(set) = self.check_pending_join() {
            return Some(set);
        }

        let set = self.serve()?;
        let portal = self.portal.as_mut()?;
        let credential = portal.join.submit(set, now_ms())?;
        let ap = portal.ap.clone();
        log::info!("portal: trying {}", credential.ssid);

        // Keep the AP up so the page can report a failed join.
        self.reconfigure(&ModeConfig::ApSta(client_config(&credential), ap));
        self.join();
        None
    }

    fn stop_access_point(&mut self) {
        self.net.borrow_mut().close_portal();
        let joined = self
            .portal
            .take()
            .and_then(|portal| portal.join.joined().cloned());
        match joined {
            Some(credential) => self.drop_access_point(&credential),
            None => {
                let _ = self.controller.stop();
            }
        }
        log::info!("wifi: portal closed");
    }
}
