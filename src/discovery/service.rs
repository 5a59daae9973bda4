//! mDNS and SSDP multicast listeners (§4.4).
//!
//! Grounded on `original_source/src/engine/discovery.py`'s
//! `DiscoveryListener._listen_mdns` / `_listen_ssdp`: raw UDP sockets
//! joined to the multicast group, best-effort substring/line scanning of
//! the payload rather than a structured parser. A full mDNS responder
//! crate would resolve structured records; this reproduces the
//! original's cheaper regex-over-raw-bytes behavior on a plain
//! `tokio::net::UdpSocket` instead.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::registry::DeviceRegistry;

const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MDNS_PORT: u16 = 5353;
const SSDP_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;
const SOCKET_READ_TIMEOUT: Duration = Duration::from_secs(1);

fn bind_multicast(group: Ipv4Addr, port: u16) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Best-effort `<name>.local` substring search over a raw mDNS datagram.
/// No DNS message parsing: matches the original's regex-over-bytes
/// approach rather than decoding the resource records.
fn extract_mdns_hostname(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    let bytes = text.as_bytes();
    let mut best: Option<&str> = None;
    for (i, _) in text.match_indices(".local") {
        let end = i + ".local".len();
        let mut start = i;
        while start > 0 {
            let c = bytes[start - 1];
            if c.is_ascii_alphanumeric() || c == b'-' || c == b'_' {
                start -= 1;
            } else {
                break;
            }
        }
        if start < i {
            best = Some(&text[start..end]);
            break;
        }
    }
    best.map(|s| s.to_string())
}

/// Parse the `SERVER:` header line out of an SSDP datagram (case-sensitive,
/// one line), matching `original_source/src/engine/discovery.py`.
fn extract_ssdp_server(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("SERVER:") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Runs the mDNS listener until `running` is cleared. On each datagram,
/// fills `hostname` (if empty) and appends `"mDNS"` to `services` for the
/// Device currently owning the source IPv4.
pub async fn run_mdns_listener(registry: DeviceRegistry, running: Arc<AtomicBool>) {
    let socket = match bind_multicast(MDNS_GROUP, MDNS_PORT) {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, "failed to bind mDNS multicast socket");
            return;
        }
    };

    let mut buf = [0u8; 2048];
    while running.load(Ordering::Relaxed) {
        let recv = tokio::time::timeout(SOCKET_READ_TIMEOUT, socket.recv_from(&mut buf)).await;
        let Ok(Ok((n, SocketAddr::V4(from)))) = recv else {
            continue;
        };
        if let Some(hostname) = extract_mdns_hostname(&buf[..n]) {
            let source_ip = from.ip().to_string();
            registry.with_device_by_ip_mut(&source_ip, |d| {
                if d.hostname.is_empty() {
                    d.hostname = hostname;
                }
                d.add_service("mDNS");
            });
        }
    }
}

/// Runs the SSDP listener until `running` is cleared, appending any
/// `SERVER:` header value to the owning Device's `services`.
pub async fn run_ssdp_listener(registry: DeviceRegistry, running: Arc<AtomicBool>) {
    let socket = match bind_multicast(SSDP_GROUP, SSDP_PORT) {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, "failed to bind SSDP multicast socket");
            return;
        }
    };

    let mut buf = [0u8; 2048];
    while running.load(Ordering::Relaxed) {
        let recv = tokio::time::timeout(SOCKET_READ_TIMEOUT, socket.recv_from(&mut buf)).await;
        let Ok(Ok((n, SocketAddr::V4(from)))) = recv else {
            continue;
        };
        if let Some(server) = extract_ssdp_server(&buf[..n]) {
            let source_ip = from.ip().to_string();
            registry.with_device_by_ip_mut(&source_ip, |d| d.add_service(server.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mdns_local_hostname() {
        let payload = b"\x00\x00garbage-before kitchen-speaker.local more-garbage";
        assert_eq!(
            extract_mdns_hostname(payload).as_deref(),
            Some("kitchen-speaker.local")
        );
    }

    #[test]
    fn returns_none_when_no_local_suffix() {
        assert_eq!(extract_mdns_hostname(b"no hostname here"), None);
    }

    #[test]
    fn extracts_ssdp_server_header() {
        let payload = b"HTTP/1.1 200 OK\r\nSERVER: Linux/3.14 UPnP/1.0 MyDevice/2.0\r\n\r\n";
        assert_eq!(
            extract_ssdp_server(payload).as_deref(),
            Some("Linux/3.14 UPnP/1.0 MyDevice/2.0")
        );
    }

    #[test]
    fn ssdp_header_match_is_case_sensitive() {
        let payload = b"server: lowercase-should-not-match\r\n";
        assert_eq!(extract_ssdp_server(payload), None);
    }
}
