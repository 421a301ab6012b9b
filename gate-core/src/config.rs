//! Endpoint configuration, embedded at compile time.
//!
//! Values come from `GATE_*` environment variables at build time (see
//! `build.rs`). Anything unset falls back to a development default.

/// Server and provisioning settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reporting/credential server, as a dotted IPv4 address.
    pub server_host: &'static str,
    pub server_port: u16,
    pub client_key: &'static str,
    pub client_secret: &'static str,
    /// Path of the WiFi credential list on the server.
    pub credentials_path: &'static str,
    /// SSID of the soft-AP opened in provisioning mode.
    pub portal_name: &'static str,
    pub utc_offset_secs: i32,
    /// SNTP server, as a dotted IPv4 address.
    pub ntp_server: &'static str,
}

pub const TOKEN_PATH: &str = "/api/request-token";
pub const EVENT_PATH: &str = "/api/send-data";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UTC_OFFSET_SECS: i32 = 8 * 3600;

impl Config {
    /// Get the compile-time configuration.
    pub fn from_build_env() -> Self {
        Self {
            server_host: option_env!("GATE_SERVER_HOST").unwrap_or("192.168.1.1"),
            server_port: match option_env!("GATE_SERVER_PORT") {
                Some(s) => parse_port(s),
                None => DEFAULT_PORT,
            },
            client_key: option_env!("GATE_CLIENT_KEY").unwrap_or(""),
            client_secret: option_env!("GATE_CLIENT_SECRET").unwrap_or(""),
            credentials_path: option_env!("GATE_CREDENTIALS_PATH").unwrap_or("/api/wifi-credentials"),
            portal_name: option_env!("GATE_PORTAL_NAME").unwrap_or("ESP32-Gate-Setup"),
            utc_offset_secs: match option_env!("GATE_UTC_OFFSET_SECS") {
                Some(s) => parse_offset(s),
                None => DEFAULT_UTC_OFFSET_SECS,
            },
            ntp_server: option_env!("GATE_NTP_SERVER").unwrap_or("162.159.200.1"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_build_env()
    }
}

/// Parse port at compile time (const fn compatible). Non-digits are skipped;
/// an empty or zero result falls back to the default port.
pub const fn parse_port(s: &str) -> u16 {
    let bytes = s.as_bytes();
    let mut result: u16 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if digit >= b'0' && digit <= b'9' {
            result = result.wrapping_mul(10).wrapping_add((digit - b'0') as u16);
        }
        i += 1;
    }
    if result == 0 {
        DEFAULT_PORT
    } else {
        result
    }
}

/// Parse a signed offset in seconds, e.g. `"28800"` or `"-18000"`.
/// Garbage digits are skipped like in [`parse_port`].
pub const fn parse_offset(s: &str) -> i32 {
    let bytes = s.as_bytes();
    let mut result: i32 = 0;
    let mut negative = false;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'-' && i == 0 {
            negative = true;
        } else if c >= b'0' && c <= b'9' {
            result = result.wrapping_mul(10).wrapping_add((c - b'0') as i32);
        }
        i += 1;
    }
    if negative {
        -result
    } else {
        result
    }
}
