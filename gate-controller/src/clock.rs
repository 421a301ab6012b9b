//! Monotonic time for the core, backed by the esp-hal system timer, and
//! network time from an SNTP server.

use esp_hal::delay::Delay;
use smoltcp::wire::Ipv4Address;

use gate_core::clock::{Clock, NetworkTime};
use gate_core::{http, Config};

use crate::net::{now_ms, SharedNet};

const SLICE_MS: u64 = 10;

/// Sleeping keeps the network polled and the watchdog fed, so the arbiter's
/// blocking waits never starve either.
pub struct EspClock {
    net: SharedNet,
    delay: Delay,
}

impl EspClock {
    pub fn new(net: SharedNet) -> Self {
        Self {
            net,
            delay: Delay::new(),
        }
    }
}

impl Clock for EspClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }

    fn sleep_ms(&mut self, ms: u64) {
        let deadline = now_ms().saturating_add(ms);
        loop {
            self.net.borrow_mut().poll();
            crate::feed_watchdog();
            let now = now_ms();
            if now >= deadline {
                break;
            }
            self.delay.delay_millis((deadline - now).min(SLICE_MS) as u32);
        }
    }
}

/// SNTP over the station stack, addressed to the configured server.
pub struct NetTime {
    net: SharedNet,
    server: Option<Ipv4Address>,
}

impl NetTime {
    pub fn new(net: SharedNet, config: &Config) -> Self {
        let server = http::parse_ipv4(config.ntp_server)
            .map(|o| Ipv4Address::new(o[0], o[1], o[2], o[3]));
        if server.is_none() {
            log::error!("sntp: invalid server address: {}", config.ntp_server);
        }
        Self { net, server }
    }
}

impl NetworkTime for NetTime {
    fn query_epoch_secs(&mut self) -> Option<i64> {
        let server = self.server?;
        self.net.borrow_mut().sntp_query(server)
    }
}
