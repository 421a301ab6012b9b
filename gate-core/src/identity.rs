//! Card and device identifiers and their wire renderings.

use alloc::string::String;
use core::fmt::{self, Write as FmtWrite};
use heapless::Vec;

/// Longest ISO 14443A UID (triple size).
pub const MAX_UID_LEN: usize = 10;

/// Identifier of the card that opened a session. Compared byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardUid(Vec<u8, MAX_UID_LEN>);

impl CardUid {
    /// Returns `None` for an empty or over-long UID.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Vec::from_slice(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Contiguous uppercase hex, e.g. `"04A1B2C3"`. A fresh value per call.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in self.0.iter() {
            let _ = write!(out, "{:02X}", byte);
        }
        out
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Stable device serial derived once at boot from the factory MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String);

impl DeviceId {
    /// The efuse MAC is read as a little-endian 48-bit word and printed as
    /// 12 lowercase hex digits, so `[0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc]`
    /// becomes `"ccbbaa286f24"`.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut word = [0u8; 8];
        word[..6].copy_from_slice(&mac);
        let value = u64::from_le_bytes(word);
        let mut out = String::with_capacity(12);
        let _ = write!(out, "{:012x}", value);
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
