//! Client for the gate server's JSON API.
//!
//! Three calls share one transport:
//! - `GET <credentials_path>`: WiFi credential list for the arbiter
//! - `POST /api/request-token`: per-event access token
//! - `POST /api/send-data`: the scan event itself
//!
//! The `Date` header of every response is kept so the endpoint can sync its
//! wall clock without a separate time service.

use alloc::string::String;
use serde::{Deserialize, Serialize};

use crate::config::{Config, EVENT_PATH, TOKEN_PATH};
use crate::credentials::{CredentialFetchError, CredentialSet};
use crate::hal::CredentialApi;
use crate::http::{HttpClient, Request, Response};
use crate::identity::DeviceId;
use crate::reporter::{AccessToken, ReportApi, ReportError, ReportEvent, ScanType};

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_key: &'a str,
    client_secret: &'a str,
    serial_no: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct EventRequest<'a> {
    client_key: &'a str,
    client_secret: &'a str,
    receiver_serial_no: &'a str,
    receiver_token: &'a str,
    tag_serial_no: &'a str,
    scan_time: &'a str,
    scan_type: ScanType,
}

pub struct ApiClient<H> {
    http: H,
    client_key: &'static str,
    client_secret: &'static str,
    credentials_path: &'static str,
    server_date: Option<String>,
}

impl<H: HttpClient> ApiClient<H> {
    pub fn new(http: H, config: &Config) -> Self {
        Self {
            http,
            client_key: config.client_key,
            client_secret: config.client_secret,
            credentials_path: config.credentials_path,
            server_date: None,
        }
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn http_mut(&mut self) -> &mut H {
        &mut self.http
    }

    /// Most recent `Date` header seen, cleared on read.
    pub fn take_server_date(&mut self) -> Option<String> {
        self.server_date.take()
    }

    fn send(&mut self, request: &Request<'_>) -> Result<Response, crate::http::HttpError> {
        let response = self.http.send(request)?;
        if let Some(date) = &response.date {
            self.server_date = Some(date.clone());
        }
        Ok(response)
    }
}

impl<H: HttpClient> CredentialApi for ApiClient<H> {
    fn fetch_credentials(&mut self) -> Result<CredentialSet, CredentialFetchError> {
        let path = self.credentials_path;
        let response = self.send(&Request::get(path))?;
        if response.status != 200 {
            return Err(CredentialFetchError::Status(response.status));
        }
        CredentialSet::from_json(&response.body)
    }
}

impl<H: HttpClient> ReportApi for ApiClient<H> {
    fn fetch_token(&mut self, device_id: &DeviceId) -> Result<AccessToken, ReportError> {
        let body = serde_json::to_string(&TokenRequest {
            client_key: self.client_key,
            client_secret: self.client_secret,
            serial_no: device_id.as_str(),
        })
        .map_err(|_| ReportError::TokenMalformed)?;

        let response = self
            .send(&Request::post_json(TOKEN_PATH, &body))
            .map_err(ReportError::TokenTransport)?;
        if !response.is_success() {
            return Err(ReportError::TokenStatus(response.status));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&response.body).map_err(|_| ReportError::TokenMalformed)?;
        if parsed.token.is_empty() {
            return Err(ReportError::TokenMalformed);
        }
        Ok(AccessToken(parsed.token))
    }

    fn send_event(&mut self, token: &AccessToken, event: &ReportEvent) -> Result<u16, ReportError> {
        let tag = event.tag_uid.to_hex();
        let body = serde_json::to_string(&EventRequest {
            client_key: self.client_key,
            client_secret: self.client_secret,
            receiver_serial_no: event.device_id.as_str(),
            receiver_token: &token.0,
            tag_serial_no: &tag,
            scan_time: &event.timestamp,
            scan_type: event.scan_type,
        })
        .map_err(|_| ReportError::SendMalformed)?;

        let response = self
            .send(&Request::post_json(EVENT_PATH, &body))
            .map_err(ReportError::SendTransport)?;
        log::info!("api: send-data {} {}", response.status, response.body.trim());
        if !response.is_success() {
            return Err(ReportError::SendStatus(response.status));
        }
        Ok(response.status)
    }
}
