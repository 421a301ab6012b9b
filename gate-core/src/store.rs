//! WiFi credential cache with flash persistence.
//!
//! The cache uses A/B double-buffering for atomic updates. A power loss
//! during a write never corrupts the cache: the previous valid slot remains
//! intact.
//!
//! Each slot holds:
//!   [4 bytes: magic] [4 bytes: sequence] [4 bytes: CRC32]
//!   [4 bytes: payload_len] [payload_len bytes: credential JSON]
//!
//! On write: always write to the slot with the lower sequence number.
//! On read: use the slot with the higher sequence number that has a valid CRC
//! and parses.

use alloc::vec;
use alloc::vec::Vec;
use embedded_storage::Storage;

use crate::credentials::CredentialSet;
use crate::hal::CredentialStore;

const STORAGE_MAGIC: u32 = 0x4741_5445; // "GATE"
const HEADER_LEN: usize = 16;

/// Where the two slots live in the flash partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub slot_a: u32,
    pub slot_b: u32,
    pub slot_size: usize,
}

impl SlotLayout {
    /// Two 4KB slots in the 8KB region reserved after the app partition.
    pub const DEFAULT: SlotLayout = SlotLayout {
        slot_a: 0x3D_0000,
        slot_b: 0x3D_1000,
        slot_size: 0x1000,
    };

    fn max_payload(&self) -> usize {
        self.slot_size - HEADER_LEN
    }
}

/// Compute CRC32 for data validation (same algorithm as Python binascii.crc32).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// Encode one slot image for `set` at `sequence`. `None` if it doesn't fit.
pub fn encode_slot(set: &CredentialSet, sequence: u32, slot_size: usize) -> Option<Vec<u8>> {
    let payload = set.to_json();
    let payload = payload.as_bytes();
    let total = HEADER_LEN + payload.len();
    if total > slot_size {
        return None;
    }

    let mut buf = vec![0u8; total];
    buf[0..4].copy_from_slice(&STORAGE_MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&sequence.to_le_bytes());
    // CRC at 8..12, filled after the data portion
    buf[12..16].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    buf[16..].copy_from_slice(payload);

    let data_crc = crc32(&buf[12..]);
    buf[8..12].copy_from_slice(&data_crc.to_le_bytes());
    Some(buf)
}

/// Credential cache over any `embedded-storage` flash.
pub struct SlotStore<F> {
    flash: F,
    layout: SlotLayout,
    sequence: u32,
}

impl<F: Storage> SlotStore<F> {
    pub fn new(flash: F, layout: SlotLayout) -> Self {
        Self {
            flash,
            layout,
            sequence: 0,
        }
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Read just the sequence number from a slot header (magic + seq).
    fn read_slot_sequence(&mut self, offset: u32) -> Option<u32> {
        let mut header = [0u8; 8];
        self.flash.read(offset, &mut header).ok()?;

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != STORAGE_MAGIC {
            return None;
        }
        Some(u32::from_le_bytes([header[4], header[5], header[6], header[7]]))
    }

    /// Read and validate a single slot, returning (sequence, set) if valid.
    fn read_slot(&mut self, offset: u32) -> Option<(u32, CredentialSet)> {
        let mut header = [0u8; HEADER_LEN];
        self.flash.read(offset, &mut header).ok()?;

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != STORAGE_MAGIC {
            return None;
        }
        let sequence = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let stored_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let payload_len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
        if payload_len > self.layout.max_payload() {
            return None;
        }

        let mut buf = vec![0u8; 4 + payload_len];
        buf[..4].copy_from_slice(&header[12..16]);
        self.flash.read(offset + HEADER_LEN as u32, &mut buf[4..]).ok()?;

        let data_crc = crc32(&buf);
        if data_crc != stored_crc {
            log::warn!(
                "storage: slot at 0x{:X} CRC mismatch (stored={:08X}, computed={:08X})",
                offset,
                stored_crc,
                data_crc
            );
            return None;
        }

        let json = core::str::from_utf8(&buf[4..]).ok()?;
        match CredentialSet::from_json(json) {
            Ok(set) => Some((sequence, set)),
            Err(_) => {
                log::warn!("storage: slot at 0x{:X} holds unparseable credentials", offset);
                None
            }
        }
    }
}

impl<F: Storage> CredentialStore for SlotStore<F> {
    /// Reads both slots and uses the one with the higher valid sequence number.
    fn load(&mut self) -> Option<CredentialSet> {
        let slot_a = self.read_slot(self.layout.slot_a);
        let slot_b = self.read_slot(self.layout.slot_b);

        let chosen = match (slot_a, slot_b) {
            (Some(a), Some(b)) => {
                if b.0 > a.0 {
                    log::info!("storage: using slot B (seq={})", b.0);
                    b
                } else {
                    log::info!("storage: using slot A (seq={})", a.0);
                    a
                }
            }
            (Some(a), None) => {
                log::info!("storage: using slot A (seq={}), slot B invalid", a.0);
                a
            }
            (None, Some(b)) => {
                log::info!("storage: using slot B (seq={}), slot A invalid", b.0);
                b
            }
            (None, None) => {
                log::info!("storage: no cached credentials in flash");
                return None;
            }
        };

        self.sequence = chosen.0;
        log::info!("storage: loaded {} networks from flash", chosen.1.len());
        Some(chosen.1)
    }

    /// Writes to the slot with the lower sequence number (the older one).
    fn save(&mut self, set: &CredentialSet) {
        let slot_a_seq = self.read_slot_sequence(self.layout.slot_a);
        let slot_b_seq = self.read_slot_sequence(self.layout.slot_b);

        // If both are None (fresh device), start with slot A
        let (target, slot_name) = match (slot_a_seq, slot_b_seq) {
            (Some(a), Some(b)) if b < a => (self.layout.slot_b, "B"),
            (Some(_), Some(_)) => (self.layout.slot_a, "A"),
            (None, Some(_)) => (self.layout.slot_a, "A"),
            (Some(_), None) => (self.layout.slot_b, "B"),
            (None, None) => (self.layout.slot_a, "A"),
        };

        let newest = slot_a_seq.max(slot_b_seq).unwrap_or(0).max(self.sequence);
        let sequence = newest.saturating_add(1);

        let Some(buf) = encode_slot(set, sequence, self.layout.slot_size) else {
            log::error!(
                "storage: {} networks do not fit in a {} byte slot",
                set.len(),
                self.layout.slot_size
            );
            return;
        };

        match self.flash.write(target, &buf) {
            Ok(()) => {
                self.sequence = sequence;
                log::info!(
                    "storage: saved {} networks to slot {} (seq={})",
                    set.len(),
                    slot_name,
                    sequence
                );
            }
            Err(_) => {
                log::error!("storage: flash write to slot {} failed", slot_name);
            }
        }
    }
}
