//! smoltcp stacks for the station and soft-AP interfaces.
//!
//! The station stack runs a DHCP client and carries the API calls
//! ([`NetHttp`]). The soft-AP stack has a fixed address and only exists
//! while the portal is open, to lease addresses to setup clients and serve
//! the provisioning page.
//!
//! The stacks are shared by the WiFi transport, the HTTP and SNTP clients
//! and the clock (which keeps them polled during waits), hence [`SharedNet`].

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Write as FmtWrite;
use esp_hal::delay::Delay;
use esp_radio::wifi::WifiDevice;
use smoltcp::iface::{Config as IfaceConfig, Interface, SocketHandle, SocketSet};
use smoltcp::socket::dhcpv4::{Event as DhcpEvent, Socket as DhcpSocket};
use smoltcp::socket::tcp::{Socket as TcpSocket, SocketBuffer, State as TcpState};
use smoltcp::socket::udp::{PacketBuffer, PacketMetadata, Socket as UdpSocket};
use smoltcp::time::Instant as SmoltcpInstant;
use smoltcp::wire::{EthernetAddress, HardwareAddress, IpAddress, IpCidr, IpEndpoint, Ipv4Address};

use gate_core::dhcp::{self, DhcpServer};
use gate_core::sntp;
use gate_core::http::{self, HttpClient, HttpError, Request, Response};
use gate_core::Config;

pub type SharedNet = Rc<RefCell<Net>>;

/// Address of the endpoint on its own soft-AP.
pub const PORTAL_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 4, 1);
const PORTAL_PORT: u16 = 80;

const CONNECT_TIMEOUT_MS: u64 = 5_000;
const RESPONSE_TIMEOUT_MS: u64 = 5_000;
const MAX_RESPONSE: usize = 4096;
const LOCAL_PORT_FIRST: u16 = 49152;
const SNTP_LOCAL_PORT: u16 = 48123;
const SNTP_TIMEOUT_MS: u64 = 2_000;

pub fn now_ms() -> u64 {
    esp_hal::time::Instant::now().duration_since_epoch().as_millis()
}

fn smoltcp_now() -> SmoltcpInstant {
    SmoltcpInstant::from_millis(now_ms() as i64)
}

/// One interface with its device and sockets.
struct Stack {
    iface: Interface,
    device: WifiDevice<'static>,
    sockets: SocketSet<'static>,
}

impl Stack {
    fn new(mut device: WifiDevice<'static>, mac: [u8; 6]) -> Self {
        let hw_addr = HardwareAddress::Ethernet(EthernetAddress(mac));
        let iface = Interface::new(IfaceConfig::new(hw_addr), &mut device, smoltcp_now());
        Self {
            iface,
            device,
            sockets: SocketSet::new(Vec::new()),
        }
    }

    fn poll(&mut self) {
        self.iface
            .poll(smoltcp_now(), &mut self.device, &mut self.sockets);
    }

    /// Properly close and remove a socket to avoid leaving TCP connections half-open.
    fn close_and_remove(&mut self, handle: SocketHandle) {
        let socket = self.sockets.get_mut::<TcpSocket>(handle);
        socket.close();
        self.sockets.remove(handle);
    }
}

/// A request received by the portal server.
pub struct PortalRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: &'a str,
}

pub struct Net {
    sta: Stack,
    dhcp: SocketHandle,
    ip_configured: bool,
    ap: Stack,
    portal: Option<SocketHandle>,
    dhcpd: Option<(SocketHandle, DhcpServer)>,
}

impl Net {
    pub fn new(sta: WifiDevice<'static>, ap: WifiDevice<'static>) -> Self {
        let mut sta = Stack::new(sta, esp_radio::wifi::sta_mac());
        let dhcp = sta.sockets.add(DhcpSocket::new());

        let mut ap = Stack::new(ap, esp_radio::wifi::ap_mac());
        ap.iface.update_ip_addrs(|addrs| {
            addrs.push(IpCidr::new(IpAddress::Ipv4(PORTAL_ADDR), 24)).ok();
        });

        Self {
            sta,
            dhcp,
            ip_configured: false,
            ap,
            portal: None,
            dhcpd: None,
        }
    }

    /// Service both interfaces once. Cheap; called from every wait loop.
    pub fn poll(&mut self) {
        self.sta.poll();
        self.handle_dhcp();
        if self.portal.is_some() {
            self.ap.poll();
            self.serve_dhcp();
        }
    }

    pub fn is_configured(&self) -> bool {
        self.ip_configured
    }

    /// Forget the station lease before joining another network.
    pub fn reset_dhcp(&mut self) {
        self.sta.iface.update_ip_addrs(|addrs| addrs.clear());
        self.sta.sockets.get_mut::<DhcpSocket>(self.dhcp).reset();
        self.ip_configured = false;
    }

    fn handle_dhcp(&mut self) {
        let dhcp_socket = self.sta.sockets.get_mut::<DhcpSocket>(self.dhcp);
        let Some(event) = dhcp_socket.poll() else {
            return;
        };
        match event {
            DhcpEvent::Configured(dhcp_config) => {
                let addr = dhcp_config.address;
                self.sta.iface.update_ip_addrs(|addrs| {
                    addrs.clear();
                    addrs.push(IpCidr::Ipv4(addr)).ok();
                });
                if let Some(router) = dhcp_config.router {
                    self.sta.iface.routes_mut().add_default_ipv4_route(router).ok();
                }
                log::info!("dhcp: IP={}", addr);
                self.ip_configured = true;
            }
            DhcpEvent::Deconfigured => {
                log::warn!("dhcp: deconfigured");
                self.sta.iface.update_ip_addrs(|addrs| addrs.clear());
                self.ip_configured = false;
            }
        }
    }

    pub fn open_portal(&mut self) {
        if self.portal.is_some() {
            return;
        }
        let rx = SocketBuffer::new(vec![0u8; 1024]);
        let tx = SocketBuffer::new(vec![0u8; 2048]);
        let mut socket = TcpSocket::new(rx, tx);
        socket.listen(PORTAL_PORT).ok();
        self.portal = Some(self.ap.sockets.add(socket));
        log::info!("portal: listening on http://{}/", PORTAL_ADDR);

        let rx = PacketBuffer::new(vec![PacketMetadata::EMPTY; 4], vec![0u8; 1536]);
        let tx = PacketBuffer::new(vec![PacketMetadata::EMPTY; 4], vec![0u8; 1536]);
        let mut socket = UdpSocket::new(rx, tx);
        if let Err(e) = socket.bind(dhcp::SERVER_PORT) {
            log::error!("dhcpd: bind failed: {:?}", e);
            return;
        }
        let handle = self.ap.sockets.add(socket);
        self.dhcpd = Some((handle, DhcpServer::new(PORTAL_ADDR.octets())));
    }

    pub fn close_portal(&mut self) {
        if let Some(handle) = self.portal.take() {
            self.ap.close_and_remove(handle);
        }
        if let Some((handle, _)) = self.dhcpd.take() {
            self.ap.sockets.get_mut::<UdpSocket>(handle).close();
            self.ap.sockets.remove(handle);
        }
    }

    /// Answer queued DHCP requests from setup clients. Replies are broadcast
    /// since the client has no address yet.
    fn serve_dhcp(&mut self) {
        let Some((handle, server)) = self.dhcpd.as_mut() else {
            return;
        };
        let socket = self.ap.sockets.get_mut::<UdpSocket>(*handle);
        let to = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::BROADCAST), dhcp::CLIENT_PORT);
        let mut buf = [0u8; 576];
        let mut replied = false;
        while let Ok((len, _)) = socket.recv_slice(&mut buf) {
            if let Some(reply) = server.handle(&buf[..len]) {
                match socket.send_slice(&reply, to) {
                    Ok(()) => replied = true,
                    Err(e) => log::warn!("dhcpd: send failed: {:?}", e),
                }
            }
        }
        if replied {
            self.ap.poll();
        }
    }

    /// Answer at most one portal request. `handler` returns the status line
    /// and the HTML body.
    pub fn serve_portal<F>(&mut self, handler: F)
    where
        F: FnOnce(&PortalRequest<'_>) -> (&'static str, String),
    {
        let Some(handle) = self.portal else {
            return;
        };
        self.ap.poll();
        let socket = self.ap.sockets.get_mut::<TcpSocket>(handle);

        // Handle socket state machine for immediate reuse
        match socket.state() {
            TcpState::Closed => {
                socket.listen(PORTAL_PORT).ok();
                return;
            }
            TcpState::CloseWait => {
                socket.close();
                return;
            }
            TcpState::TimeWait | TcpState::LastAck | TcpState::Closing => {
                socket.abort();
                return;
            }
            TcpState::Listen | TcpState::SynReceived | TcpState::SynSent => return,
            TcpState::Established | TcpState::FinWait1 | TcpState::FinWait2 => {}
        }

        if !socket.can_recv() {
            return;
        }
        let mut buf = [0u8; 1024];
        let len = match socket.recv_slice(&mut buf) {
            Ok(n) if n > 0 => n,
            _ => return,
        };
        let Ok(raw) = core::str::from_utf8(&buf[..len]) else {
            return;
        };

        let line = raw.lines().next().unwrap_or("");
        let mut parts = line.split_whitespace();
        let request = PortalRequest {
            method: parts.next().unwrap_or(""),
            path: parts.next().unwrap_or(""),
            body: raw.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or(""),
        };

        let (status, body) = handler(&request);
        let response = html_response(status, &body);
        socket.send_slice(response.as_bytes()).ok();
        socket.close();
    }

    /// One SNTP query to `server` over the station stack. Unix seconds, or
    /// `None` without a lease, a reply or a usable reply.
    pub fn sntp_query(&mut self, server: Ipv4Address) -> Option<i64> {
        if !self.ip_configured {
            return None;
        }
        let rx = PacketBuffer::new(vec![PacketMetadata::EMPTY; 2], vec![0u8; 256]);
        let tx = PacketBuffer::new(vec![PacketMetadata::EMPTY; 2], vec![0u8; 256]);
        let mut socket = UdpSocket::new(rx, tx);
        if let Err(e) = socket.bind(SNTP_LOCAL_PORT) {
            log::warn!("sntp: bind failed: {:?}", e);
            return None;
        }
        let handle = self.sta.sockets.add(socket);
        let result = self.sntp_on(handle, server);
        self.sta.sockets.get_mut::<UdpSocket>(handle).close();
        self.sta.sockets.remove(handle);
        result
    }

    fn sntp_on(&mut self, handle: SocketHandle, server: Ipv4Address) -> Option<i64> {
        let delay = Delay::new();
        let remote = IpEndpoint::new(IpAddress::Ipv4(server), sntp::PORT);
        if let Err(e) = self
            .sta
            .sockets
            .get_mut::<UdpSocket>(handle)
            .send_slice(&sntp::request(), remote)
        {
            log::warn!("sntp: send failed: {:?}", e);
            return None;
        }

        let mut buf = [0u8; 256];
        let deadline = now_ms() + SNTP_TIMEOUT_MS;
        loop {
            self.sta.poll();
            let socket = self.sta.sockets.get_mut::<UdpSocket>(handle);
            while let Ok((len, meta)) = socket.recv_slice(&mut buf) {
                if meta.endpoint != remote {
                    continue;
                }
                return match sntp::parse_reply(&buf[..len]) {
                    Ok(secs) => Some(secs),
                    Err(e) => {
                        log::warn!("sntp: {} from {}", e, server);
                        None
                    }
                };
            }
            if now_ms() > deadline {
                log::warn!("sntp: no reply from {}", server);
                return None;
            }
            crate::feed_watchdog();
            delay.delay_millis(10);
        }
    }

    /// One request/response over a fresh TCP socket on the station stack.
    fn exchange(
        &mut self,
        remote: (IpAddress, u16),
        local_port: u16,
        wire: &[u8],
    ) -> Result<Vec<u8>, HttpError> {
        let rx = SocketBuffer::new(vec![0u8; 2048]);
        let tx = SocketBuffer::new(vec![0u8; wire.len().max(512)]);
        let handle = self.sta.sockets.add(TcpSocket::new(rx, tx));
        let result = self.exchange_on(handle, remote, local_port, wire);
        self.sta.close_and_remove(handle);
        self.sta.poll();
        result
    }

    fn exchange_on(
        &mut self,
        handle: SocketHandle,
        remote: (IpAddress, u16),
        local_port: u16,
        wire: &[u8],
    ) -> Result<Vec<u8>, HttpError> {
        let delay = Delay::new();
        {
            let socket = self.sta.sockets.get_mut::<TcpSocket>(handle);
            if socket.connect(self.sta.iface.context(), remote, local_port).is_err() {
                return Err(HttpError::Connect);
            }
        }

        // Poll until connected or timeout
        let deadline = now_ms() + CONNECT_TIMEOUT_MS;
        loop {
            self.sta.poll();
            let socket = self.sta.sockets.get_mut::<TcpSocket>(handle);
            if socket.may_send() {
                break;
            }
            if now_ms() > deadline || socket.state() == TcpState::Closed {
                return Err(HttpError::Connect);
            }
            crate::feed_watchdog();
            delay.delay_millis(10);
        }

        // Send, possibly over several polls if the request outgrows the buffer
        let mut sent = 0;
        let deadline = now_ms() + RESPONSE_TIMEOUT_MS;
        while sent < wire.len() {
            let socket = self.sta.sockets.get_mut::<TcpSocket>(handle);
            match socket.send_slice(&wire[sent..]) {
                Ok(n) => sent += n,
                Err(_) => return Err(HttpError::Send),
            }
            self.sta.poll();
            if now_ms() > deadline {
                return Err(HttpError::Timeout);
            }
        }

        // Poll until a complete response arrives or the server closes
        let mut data = Vec::new();
        let deadline = now_ms() + RESPONSE_TIMEOUT_MS;
        loop {
            self.sta.poll();
            let socket = self.sta.sockets.get_mut::<TcpSocket>(handle);

            while socket.can_recv() {
                let received = socket.recv(|chunk| {
                    let take = chunk.len().min(MAX_RESPONSE.saturating_sub(data.len()));
                    data.extend_from_slice(&chunk[..take]);
                    (chunk.len(), take)
                });
                if !matches!(received, Ok(n) if n > 0) {
                    break;
                }
            }

            if http::is_complete(&data) {
                return Ok(data);
            }
            if !socket.may_recv() {
                // Server closed, we have what we'll get
                if data.is_empty() {
                    return Err(HttpError::Closed);
                }
                return Ok(data);
            }
            if now_ms() > deadline {
                return Err(HttpError::Timeout);
            }
            crate::feed_watchdog();
            delay.delay_millis(10);
        }
    }
}

fn html_response(status: &str, body: &str) -> String {
    let mut r = String::with_capacity(body.len() + 128);
    let _ = write!(
        r,
        "HTTP/1.1 {}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    r
}

/// [`HttpClient`] over the station stack, addressed to the configured server.
pub struct NetHttp {
    net: SharedNet,
    host: &'static str,
    remote: Option<Ipv4Address>,
    port: u16,
    next_local_port: u16,
}

impl NetHttp {
    pub fn new(net: SharedNet, config: &Config) -> Self {
        let remote = http::parse_ipv4(config.server_host)
            .map(|o| Ipv4Address::new(o[0], o[1], o[2], o[3]));
        if remote.is_none() {
            log::error!("http: invalid server address: {}", config.server_host);
        }
        Self {
            net,
            host: config.server_host,
            remote,
            port: config.server_port,
            next_local_port: LOCAL_PORT_FIRST,
        }
    }

    /// Rotate the source port so a new request never lands on a
    /// connection the server still holds in TIME_WAIT.
    fn local_port(&mut self) -> u16 {
        let port = self.next_local_port;
        self.next_local_port = if port == u16::MAX {
            LOCAL_PORT_FIRST
        } else {
            port + 1
        };
        port
    }
}

impl HttpClient for NetHttp {
    fn send(&mut self, request: &Request<'_>) -> Result<Response, HttpError> {
        let remote = self
            .remote
            .ok_or_else(|| HttpError::InvalidAddress(String::from(self.host)))?;
        let local_port = self.local_port();
        let wire = request.encode(self.host);

        crate::heap_debug::warn_if_low(8, "http:send");
        let mut net = self.net.borrow_mut();
        if !net.is_configured() {
            return Err(HttpError::Connect);
        }
        let raw = net.exchange(
            (IpAddress::Ipv4(remote), self.port),
            local_port,
            wire.as_bytes(),
        )?;
        http::parse_response(&raw)
    }
}
