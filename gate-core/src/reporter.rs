//! Authenticated event reporting.
//!
//! Every session transition becomes one [`ReportEvent`]. Delivery is a fresh
//! token fetch followed by one event post; nothing is queued or retried, and
//! nothing is sent while the link is down.

use alloc::string::String;
use serde::Serialize;
use thiserror::Error;

use crate::http::HttpError;
use crate::identity::{CardUid, DeviceId};
use crate::link::LinkState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Entry,
    Exit,
}

/// One session transition, built once and consumed by a single `report`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    pub device_id: DeviceId,
    pub tag_uid: CardUid,
    /// `MM-DD-YYYY HH:MM:SS`, empty while the wall clock is unsynced.
    pub timestamp: String,
    pub scan_type: ScanType,
}

/// Short-lived token authorizing exactly one event post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("link not connected, event dropped")]
    Offline,
    #[error("token request failed: {0}")]
    TokenTransport(HttpError),
    #[error("token request rejected with status {0}")]
    TokenStatus(u16),
    #[error("token response malformed")]
    TokenMalformed,
    #[error("event post failed: {0}")]
    SendTransport(HttpError),
    #[error("event post rejected with status {0}")]
    SendStatus(u16),
    #[error("event could not be encoded")]
    SendMalformed,
}

/// The two server calls a report needs.
pub trait ReportApi {
    fn fetch_token(&mut self, device_id: &DeviceId) -> Result<AccessToken, ReportError>;

    /// Post the event; returns the (success) status code.
    fn send_event(&mut self, token: &AccessToken, event: &ReportEvent) -> Result<u16, ReportError>;
}

/// Gates and sequences report delivery.
#[derive(Debug, Default)]
pub struct Reporter {
    sent: u32,
    dropped: u32,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event`: skip when offline, otherwise token then post.
    pub fn report<A: ReportApi>(
        &mut self,
        link: LinkState,
        api: &mut A,
        event: &ReportEvent,
    ) -> Result<(), ReportError> {
        let result = Self::deliver(link, api, event);
        match &result {
            Ok(()) => {
                self.sent = self.sent.wrapping_add(1);
                log::info!(
                    "report: {:?} tag={} delivered",
                    event.scan_type,
                    event.tag_uid
                );
            }
            Err(e) => {
                self.dropped = self.dropped.wrapping_add(1);
                log::warn!("report: {:?} tag={} dropped: {}", event.scan_type, event.tag_uid, e);
            }
        }
        result
    }

    fn deliver<A: ReportApi>(
        link: LinkState,
        api: &mut A,
        event: &ReportEvent,
    ) -> Result<(), ReportError> {
        if link != LinkState::Connected {
            return Err(ReportError::Offline);
        }
        let token = api.fetch_token(&event.device_id)?;
        api.send_event(&token, event)?;
        Ok(())
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
