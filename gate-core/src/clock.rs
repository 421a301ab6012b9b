//! Monotonic time for bounded waits and wall-clock time for event stamps.

use alloc::string::String;
use chrono::{DateTime, FixedOffset, Utc};
use core::fmt::Write as FmtWrite;

/// Monotonic milliseconds since boot plus a blocking pause.
///
/// Every bounded wait in the endpoint is a loop of `now_ms()` checks and
/// `sleep_ms()` pauses, so a fake clock makes the waits deterministic.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&mut self, ms: u64);
}

/// One query to a network time server.
pub trait NetworkTime {
    /// Current Unix seconds, or `None` when the server did not answer in
    /// time. A single attempt; callers decide when to ask again.
    fn query_epoch_secs(&mut self) -> Option<i64>;
}

/// Format sent as `scan_time`.
pub const SCAN_TIME_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

/// Local wall-clock time anchored to a UTC instant learned from the network.
///
/// NTP is the primary source. The server's HTTP `Date` header only sets the
/// clock while NTP has never answered. Until the first sync `scan_time()`
/// is empty rather than blocking.
#[derive(Debug, Clone)]
pub struct WallClock {
    offset: Option<FixedOffset>,
    anchor: Option<Anchor>,
    from_ntp: bool,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    epoch_secs: i64,
    at_ms: u64,
}

impl WallClock {
    /// `utc_offset_secs` is the fixed local offset (e.g. `28800` for UTC+8).
    pub fn new(utc_offset_secs: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_secs);
        if offset.is_none() {
            log::warn!("clock: utc offset {}s out of range, using UTC", utc_offset_secs);
        }
        Self {
            offset,
            anchor: None,
            from_ntp: false,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn is_ntp_synced(&self) -> bool {
        self.from_ntp
    }

    /// Anchor to an NTP answer. Later `Date` headers are ignored.
    pub fn sync_from_ntp(&mut self, epoch_secs: i64, now_ms: u64) {
        if !self.from_ntp {
            log::info!("clock: NTP time acquired");
        }
        self.from_ntp = true;
        self.sync(epoch_secs, now_ms);
    }

    /// Anchor to `epoch_secs` (UTC) observed at monotonic time `now_ms`.
    pub fn sync(&mut self, epoch_secs: i64, now_ms: u64) {
        if self.anchor.is_none() {
            log::info!("clock: synced to epoch {}", epoch_secs);
        }
        self.anchor = Some(Anchor {
            epoch_secs,
            at_ms: now_ms,
        });
    }

    /// Sync from an RFC 2822 HTTP `Date` header. Returns whether the clock
    /// was set, which it never is once NTP has answered.
    pub fn sync_from_http_date(&mut self, date: &str, now_ms: u64) -> bool {
        if self.from_ntp {
            return false;
        }
        match DateTime::parse_from_rfc2822(date.trim()) {
            Ok(parsed) => {
                self.sync(parsed.timestamp(), now_ms);
                true
            }
            Err(_) => {
                log::debug!("clock: unparseable Date header {:?}", date);
                false
            }
        }
    }

    /// Local time at monotonic instant `now_ms`, if synced.
    pub fn local_time(&self, now_ms: u64) -> Option<DateTime<FixedOffset>> {
        let anchor = self.anchor?;
        let elapsed_secs = (now_ms.saturating_sub(anchor.at_ms) / 1000) as i64;
        let utc = DateTime::<Utc>::from_timestamp(anchor.epoch_secs + elapsed_secs, 0)?;
        let offset = self.offset.or_else(|| FixedOffset::east_opt(0))?;
        Some(utc.with_timezone(&offset))
    }

    /// `MM-DD-YYYY HH:MM:SS` local time, or an empty string while unsynced.
    pub fn scan_time(&self, now_ms: u64) -> String {
        let mut out = String::new();
        if let Some(local) = self.local_time(now_ms) {
            let _ = write!(out, "{}", local.format(SCAN_TIME_FORMAT));
        }
        out
    }
}
