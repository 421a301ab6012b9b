//! WiFi credential sets and their JSON representation.
//!
//! The remote credential API and the flash cache both carry the same
//! document: a JSON array of `{"ssid": ..., "pass": ...}` objects. Array order
//! is connection priority.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One network the endpoint may join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub ssid: String,
    pub pass: String,
}

impl Credential {
    pub fn new(ssid: &str, pass: &str) -> Self {
        Self {
            ssid: ssid.into(),
            pass: pass.into(),
        }
    }
}

/// Ordered list of networks; index 0 is tried first.
///
/// Equality is positional: the same pairs in a different order are a
/// different set, and a reordered fetch is persisted like any other change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet(Vec<Credential>);

impl CredentialSet {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self(credentials)
    }

    /// Parse the JSON array served by the credential API.
    pub fn from_json(json: &str) -> Result<Self, CredentialFetchError> {
        serde_json::from_str(json.trim()).map_err(|_| CredentialFetchError::Malformed)
    }

    pub fn to_json(&self) -> String {
        // A Vec of string pairs always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("[]"))
    }

    /// A set is only worth connecting to (or persisting) if it names a network.
    pub fn is_usable(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.0.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Credential> {
        self.0.iter()
    }
}

impl From<Vec<Credential>> for CredentialSet {
    fn from(credentials: Vec<Credential>) -> Self {
        Self(credentials)
    }
}

impl<'a> IntoIterator for &'a CredentialSet {
    type Item = &'a Credential;
    type IntoIter = core::slice::Iter<'a, Credential>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Where the active credential set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cached,
    Fetched,
    /// Supplied by a human through the provisioning portal.
    Provisioned,
    None,
}

/// Why a credential fetch produced nothing. Never fatal: the arbiter falls
/// back to the cached set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialFetchError {
    #[error("no active link to fetch over")]
    Offline,
    #[error("transport failed: {0}")]
    Transport(#[from] crate::http::HttpError),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed credential document")]
    Malformed,
}
