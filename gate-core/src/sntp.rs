//! SNTP (RFC 4330) client packets.
//!
//! The wall clock is set from a single unicast query: the firmware sends
//! [`request`] over UDP to port [`PORT`] and hands the reply to
//! [`parse_reply`]. Only the server's transmit timestamp is used; the round
//! trip on a LAN is well under the one-second resolution of `scan_time`.

use thiserror::Error;

pub const PORT: u16 = 123;
pub const PACKET_LEN: usize = 48;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_TO_UNIX_SECS: i64 = 2_208_988_800;
/// Seconds in one NTP era (2^32).
const ERA_SECS: i64 = 1 << 32;

/// LI = 0, version 3, mode 3 (client).
const CLIENT_HEADER: u8 = 0b00_011_011;
const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;
const LEAP_UNSYNCHRONIZED: u8 = 3;
const TRANSMIT_OFFSET: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SntpError {
    #[error("reply too short")]
    Truncated,

    #[error("not a server reply (mode {0})")]
    Mode(u8),

    #[error("server not synchronized")]
    Unsynchronized,

    #[error("server sent no time")]
    NoTime,
}

/// A client query. Everything but the header byte is zero.
pub fn request() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Unix seconds from a server reply.
pub fn parse_reply(packet: &[u8]) -> Result<i64, SntpError> {
    if packet.len() < PACKET_LEN {
        return Err(SntpError::Truncated);
    }
    let header = packet[0];
    let mode = header & 0b111;
    if mode != MODE_SERVER && mode != MODE_BROADCAST {
        return Err(SntpError::Mode(mode));
    }
    // Stratum 0 is a kiss-o'-death.
    if header >> 6 == LEAP_UNSYNCHRONIZED || packet[1] == 0 {
        return Err(SntpError::Unsynchronized);
    }

    let t = &packet[TRANSMIT_OFFSET..TRANSMIT_OFFSET + 4];
    let ntp_secs = u32::from_be_bytes([t[0], t[1], t[2], t[3]]) as i64;
    if ntp_secs == 0 {
        return Err(SntpError::NoTime);
    }
    // Era 1 starts in 2036; small values are past the wrap, not 1900.
    let ntp_secs = if ntp_secs < (1 << 31) {
        ntp_secs + ERA_SECS
    } else {
        ntp_secs
    };
    Ok(ntp_secs - NTP_TO_UNIX_SECS)
}
