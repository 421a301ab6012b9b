//! Tests for the soft-AP DHCP server.

use gate_core::dhcp::{parse_client_message, DhcpError, DhcpServer, MessageType, MAX_LEASES};
use pretty_assertions::assert_eq;

const SERVER: [u8; 4] = [192, 168, 4, 1];
const PHONE: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
const LAPTOP: [u8; 6] = [0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee];

/// A client message with `options` after the magic cookie.
fn client(chaddr: [u8; 6], options: &[u8]) -> Vec<u8> {
    let mut p = vec![0u8; 240];
    p[0] = 1;
    p[1] = 1;
    p[2] = 6;
    p[4..8].copy_from_slice(&0x1234_5678u32.to_be_bytes());
    p[10] = 0x80;
    p[28..34].copy_from_slice(&chaddr);
    p[236..240].copy_from_slice(&[99, 130, 83, 99]);
    p.extend_from_slice(options);
    p.push(255);
    p
}

fn discover(chaddr: [u8; 6]) -> Vec<u8> {
    client(chaddr, &[53, 1, 1])
}

fn request(chaddr: [u8; 6], addr: [u8; 4], server: [u8; 4]) -> Vec<u8> {
    let mut opts = vec![53, 1, 3, 50, 4];
    opts.extend_from_slice(&addr);
    opts.extend_from_slice(&[54, 4]);
    opts.extend_from_slice(&server);
    client(chaddr, &opts)
}

/// Value of option `code` in a reply.
fn option(reply: &[u8], code: u8) -> Option<Vec<u8>> {
    let mut i = 240;
    while i < reply.len() {
        match reply[i] {
            0 => i += 1,
            255 => return None,
            c => {
                let len = reply[i + 1] as usize;
                if c == code {
                    return Some(reply[i + 2..i + 2 + len].to_vec());
                }
                i += 2 + len;
            }
        }
    }
    None
}

fn yiaddr(reply: &[u8]) -> [u8; 4] {
    [reply[16], reply[17], reply[18], reply[19]]
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_discover() {
    let msg = parse_client_message(&discover(PHONE)).unwrap();
    assert_eq!(msg.kind, MessageType::Discover);
    assert_eq!(msg.xid, 0x1234_5678);
    assert_eq!(msg.flags, 0x8000);
    assert_eq!(msg.chaddr, PHONE);
    assert_eq!(msg.requested, None);
}

#[test]
fn test_parse_skips_pad_and_unknown_options() {
    let msg = parse_client_message(&client(PHONE, &[0, 0, 12, 3, b'f', b'o', b'o', 53, 1, 7])).unwrap();
    assert_eq!(msg.kind, MessageType::Release);
}

#[test]
fn test_parse_rejects() {
    assert_eq!(parse_client_message(&[1, 1, 6]), Err(DhcpError::Truncated));

    let mut reply = discover(PHONE);
    reply[0] = 2;
    assert_eq!(parse_client_message(&reply), Err(DhcpError::NotRequest));

    let mut bad_cookie = discover(PHONE);
    bad_cookie[236] = 0;
    assert_eq!(parse_client_message(&bad_cookie), Err(DhcpError::Cookie));

    assert_eq!(
        parse_client_message(&client(PHONE, &[])),
        Err(DhcpError::NoMessageType)
    );
}

#[test]
fn test_parse_truncated_option_stops_cleanly() {
    assert_eq!(
        parse_client_message(&client(PHONE, &[53, 1, 1, 50, 4, 192])).map(|m| m.requested),
        Ok(None)
    );
}

// ============================================================================
// Leases
// ============================================================================

#[test]
fn test_discover_then_request_leases_first_host() {
    let mut server = DhcpServer::new(SERVER);

    let offer = server.handle(&discover(PHONE)).unwrap();
    assert_eq!(offer[0], 2);
    assert_eq!(&offer[4..8], &0x1234_5678u32.to_be_bytes());
    assert_eq!(&offer[28..34], &PHONE);
    assert_eq!(yiaddr(&offer), [192, 168, 4, 2]);
    assert_eq!(option(&offer, 53), Some(vec![2]));
    assert_eq!(option(&offer, 54), Some(SERVER.to_vec()));
    assert_eq!(option(&offer, 1), Some(vec![255, 255, 255, 0]));
    assert_eq!(option(&offer, 3), Some(SERVER.to_vec()));
    assert_eq!(option(&offer, 51), Some(3600u32.to_be_bytes().to_vec()));

    let ack = server.handle(&request(PHONE, [192, 168, 4, 2], SERVER)).unwrap();
    assert_eq!(option(&ack, 53), Some(vec![5]));
    assert_eq!(yiaddr(&ack), [192, 168, 4, 2]);
    assert_eq!(server.leased(&PHONE), Some([192, 168, 4, 2]));
}

#[test]
fn test_each_client_gets_its_own_address() {
    let mut server = DhcpServer::new(SERVER);
    let phone = server.handle(&discover(PHONE)).unwrap();
    let laptop = server.handle(&discover(LAPTOP)).unwrap();
    let again = server.handle(&discover(PHONE)).unwrap();

    assert_eq!(yiaddr(&phone), [192, 168, 4, 2]);
    assert_eq!(yiaddr(&laptop), [192, 168, 4, 3]);
    assert_eq!(yiaddr(&again), [192, 168, 4, 2]);
}

#[test]
fn test_request_for_other_address_is_refused() {
    let mut server = DhcpServer::new(SERVER);
    server.handle(&discover(PHONE));

    let nak = server.handle(&request(PHONE, [10, 0, 0, 7], SERVER)).unwrap();
    assert_eq!(option(&nak, 53), Some(vec![6]));
    assert_eq!(yiaddr(&nak), [0, 0, 0, 0]);
    assert_eq!(option(&nak, 51), None);
}

#[test]
fn test_request_to_other_server_drops_offer() {
    let mut server = DhcpServer::new(SERVER);
    server.handle(&discover(PHONE));

    assert_eq!(server.handle(&request(PHONE, [10, 0, 0, 7], [10, 0, 0, 1])), None);
    assert_eq!(server.leased(&PHONE), None);
}

#[test]
fn test_release_frees_address() {
    let mut server = DhcpServer::new(SERVER);
    server.handle(&discover(PHONE));

    assert_eq!(server.handle(&client(PHONE, &[53, 1, 7])), None);
    assert_eq!(server.leased(&PHONE), None);
    let offer = server.handle(&discover(LAPTOP)).unwrap();
    assert_eq!(yiaddr(&offer), [192, 168, 4, 2]);
}

#[test]
fn test_exhausted_pool_stays_silent() {
    let mut server = DhcpServer::new(SERVER);
    for i in 0..MAX_LEASES as u8 {
        assert!(server.handle(&discover([0x02, 0, 0, 0, 0, i])).is_some());
    }
    assert_eq!(server.handle(&discover(PHONE)), None);
    let nak = server.handle(&request(PHONE, [192, 168, 4, 2], SERVER)).unwrap();
    assert_eq!(option(&nak, 53), Some(vec![6]));
}

#[test]
fn test_garbage_is_ignored() {
    let mut server = DhcpServer::new(SERVER);
    assert_eq!(server.handle(b"hello"), None);
    assert_eq!(server.handle(&client(PHONE, &[53, 1, 8])), None);
}
