//! Minimal DHCPv4 server for the provisioning soft-AP.
//!
//! Phones and laptops joining the portal network expect an address before
//! they will open the setup page. The server hands out a small pool in the
//! AP's /24 and names the AP itself as router and DNS server. Only
//! DISCOVER, REQUEST and RELEASE are acted on; everything else is ignored.

use alloc::vec::Vec;
use heapless::Vec as BoundedVec;
use thiserror::Error;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

/// Clients the pool serves at once.
pub const MAX_LEASES: usize = 8;
const LEASE_SECS: u32 = 3600;

const OP_REQUEST: u8 = 1;
const OP_REPLY: u8 = 2;
const HTYPE_ETHERNET: u8 = 1;
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
/// Fixed BOOTP header up to and including the magic cookie.
const HEADER_LEN: usize = 240;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => MessageType::Discover,
            2 => MessageType::Offer,
            3 => MessageType::Request,
            4 => MessageType::Decline,
            5 => MessageType::Ack,
            6 => MessageType::Nak,
            7 => MessageType::Release,
            8 => MessageType::Inform,
            _ => return None,
        })
    }

    fn as_u8(self) -> u8 {
        match self {
            MessageType::Discover => 1,
            MessageType::Offer => 2,
            MessageType::Request => 3,
            MessageType::Decline => 4,
            MessageType::Ack => 5,
            MessageType::Nak => 6,
            MessageType::Release => 7,
            MessageType::Inform => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DhcpError {
    #[error("packet too short")]
    Truncated,

    #[error("not a client request")]
    NotRequest,

    #[error("unsupported hardware type")]
    Hardware,

    #[error("missing magic cookie")]
    Cookie,

    #[error("missing message type")]
    NoMessageType,
}

/// The parts of a client message the server acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub kind: MessageType,
    pub xid: u32,
    pub flags: u16,
    pub ciaddr: [u8; 4],
    pub chaddr: [u8; 6],
    pub requested: Option<[u8; 4]>,
    pub server_id: Option<[u8; 4]>,
}

pub fn parse_client_message(packet: &[u8]) -> Result<ClientMessage, DhcpError> {
    if packet.len() < HEADER_LEN {
        return Err(DhcpError::Truncated);
    }
    if packet[0] != OP_REQUEST {
        return Err(DhcpError::NotRequest);
    }
    if packet[1] != HTYPE_ETHERNET || packet[2] != 6 {
        return Err(DhcpError::Hardware);
    }
    if packet[236..240] != MAGIC_COOKIE {
        return Err(DhcpError::Cookie);
    }

    let mut kind = None;
    let mut requested = None;
    let mut server_id = None;
    let mut options = &packet[HEADER_LEN..];
    while let Some((&code, rest)) = options.split_first() {
        match code {
            OPT_PAD => {
                options = rest;
                continue;
            }
            OPT_END => break,
            _ => {}
        }
        let Some((&len, rest)) = rest.split_first() else {
            break;
        };
        let len = len as usize;
        if rest.len() < len {
            break;
        }
        let (value, rest) = rest.split_at(len);
        match (code, value) {
            (OPT_MESSAGE_TYPE, [v]) => kind = MessageType::from_u8(*v),
            (OPT_REQUESTED_IP, &[a, b, c, d]) => requested = Some([a, b, c, d]),
            (OPT_SERVER_ID, &[a, b, c, d]) => server_id = Some([a, b, c, d]),
            _ => {}
        }
        options = rest;
    }

    let mut chaddr = [0u8; 6];
    chaddr.copy_from_slice(&packet[28..34]);
    Ok(ClientMessage {
        kind: kind.ok_or(DhcpError::NoMessageType)?,
        xid: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
        flags: u16::from_be_bytes([packet[10], packet[11]]),
        ciaddr: [packet[12], packet[13], packet[14], packet[15]],
        chaddr,
        requested,
        server_id,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lease {
    chaddr: [u8; 6],
    host: u8,
}

/// Address pool and reply builder for one /24 served from `.1`.
#[derive(Debug)]
pub struct DhcpServer {
    server: [u8; 4],
    leases: BoundedVec<Lease, MAX_LEASES>,
}

impl DhcpServer {
    /// `server` is the AP's own address; leases start at the next host.
    pub fn new(server: [u8; 4]) -> Self {
        Self {
            server,
            leases: BoundedVec::new(),
        }
    }

    fn addr(&self, host: u8) -> [u8; 4] {
        [self.server[0], self.server[1], self.server[2], host]
    }

    fn lease_for(&self, chaddr: &[u8; 6]) -> Option<u8> {
        self.leases.iter().find(|l| l.chaddr == *chaddr).map(|l| l.host)
    }

    fn allocate(&mut self, chaddr: [u8; 6]) -> Option<u8> {
        if let Some(host) = self.lease_for(&chaddr) {
            return Some(host);
        }
        let first = self.server[3].wrapping_add(1);
        let host = (0..MAX_LEASES as u8)
            .map(|i| first.wrapping_add(i))
            .find(|h| !self.leases.iter().any(|l| l.host == *h))?;
        self.leases.push(Lease { chaddr, host }).ok()?;
        Some(host)
    }

    /// Address currently leased to `chaddr`.
    pub fn leased(&self, chaddr: &[u8; 6]) -> Option<[u8; 4]> {
        self.lease_for(chaddr).map(|h| self.addr(h))
    }

    /// Handle one datagram from a client. Returns the reply to broadcast to
    /// [`CLIENT_PORT`], if any.
    pub fn handle(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        let msg = match parse_client_message(packet) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("dhcpd: ignoring packet: {}", e);
                return None;
            }
        };

        match msg.kind {
            MessageType::Discover => {
                let Some(host) = self.allocate(msg.chaddr) else {
                    log::warn!("dhcpd: pool exhausted");
                    return None;
                };
                Some(self.reply(&msg, MessageType::Offer, self.addr(host)))
            }
            MessageType::Request => {
                if msg.server_id.is_some_and(|id| id != self.server) {
                    // The client chose another server.
                    self.release(&msg.chaddr);
                    return None;
                }
                let Some(host) = self.allocate(msg.chaddr) else {
                    return Some(self.reply(&msg, MessageType::Nak, [0; 4]));
                };
                let addr = self.addr(host);
                let wanted = msg.requested.or(Some(msg.ciaddr).filter(|a| *a != [0; 4]));
                if wanted.is_some_and(|w| w != addr) {
                    return Some(self.reply(&msg, MessageType::Nak, [0; 4]));
                }
                log::info!(
                    "dhcpd: {}.{}.{}.{} leased",
                    addr[0],
                    addr[1],
                    addr[2],
                    addr[3]
                );
                Some(self.reply(&msg, MessageType::Ack, addr))
            }
            MessageType::Release | MessageType::Decline => {
                self.release(&msg.chaddr);
                None
            }
            _ => None,
        }
    }

    fn release(&mut self, chaddr: &[u8; 6]) {
        self.leases.retain(|l| l.chaddr != *chaddr);
    }

    fn reply(&self, msg: &ClientMessage, kind: MessageType, yiaddr: [u8; 4]) -> Vec<u8> {
        let mut out = alloc::vec![0u8; HEADER_LEN];
        out[0] = OP_REPLY;
        out[1] = HTYPE_ETHERNET;
        out[2] = 6;
        out[4..8].copy_from_slice(&msg.xid.to_be_bytes());
        out[10..12].copy_from_slice(&msg.flags.to_be_bytes());
        out[16..20].copy_from_slice(&yiaddr);
        out[20..24].copy_from_slice(&self.server);
        out[28..34].copy_from_slice(&msg.chaddr);
        out[236..240].copy_from_slice(&MAGIC_COOKIE);

        out.extend_from_slice(&[OPT_MESSAGE_TYPE, 1, kind.as_u8()]);
        out.extend_from_slice(&[OPT_SERVER_ID, 4]);
        out.extend_from_slice(&self.server);
        if kind != MessageType::Nak {
            out.extend_from_slice(&[OPT_LEASE_TIME, 4]);
            out.extend_from_slice(&LEASE_SECS.to_be_bytes());
            out.extend_from_slice(&[OPT_SUBNET_MASK, 4, 255, 255, 255, 0]);
            out.extend_from_slice(&[OPT_ROUTER, 4]);
            out.extend_from_slice(&self.server);
            out.extend_from_slice(&[OPT_DNS, 4]);
            out.extend_from_slice(&self.server);
        }
        out.push(OPT_END);
        out
    }
}
