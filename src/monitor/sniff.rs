//! Sniffer and accounting loop (§4.5.4): per-frame byte accounting, IPv6
//! address learning, active ICMP/ICMPv6 rejection for blocked devices, and
//! SNI/DNS metadata extraction.
//!
//! Grounded on `original_source/src/engine/monitor.py`'s `_process_packet`,
//! which performs exactly these four steps on every captured frame.

use std::net::Ipv6Addr;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use tracing::debug;

use crate::icmp;
use crate::monitor::spoof::{FrameSender, LinkContext};
use crate::monitor::{should_block, TargetSet};
use crate::registry::DeviceRegistry;
use crate::sni;

const DOMAIN_LOG_LIMIT_DEFAULT: usize = 20;

/// Process a single captured link-layer frame. Pulled out of the capture
/// loop itself so it is unit-testable without a live datalink channel.
pub async fn process_frame(
    raw: &[u8],
    registry: &DeviceRegistry,
    targets: &TargetSet,
    sender: &FrameSender,
    ctx: &LinkContext,
    domain_log_limit: usize,
    now_hhmm: &str,
) {
    let Some(eth) = EthernetPacket::new(raw) else {
        return;
    };

    let src_mac = eth.get_source().to_string();
    let dst_mac = eth.get_destination().to_string();
    let frame_len = raw.len() as u64;

    // Step 1: accounting.
    if registry.lookup_by_mac(&src_mac).is_some() {
        registry.with_device_mut(&src_mac, |d| d.total_up += frame_len);
    }
    if registry.lookup_by_mac(&dst_mac).is_some() {
        registry.with_device_mut(&dst_mac, |d| d.total_down += frame_len);
    }

    match eth.get_ethertype() {
        EtherTypes::Ipv4 => {
            if let Some(ipv4) = Ipv4Packet::new(eth.payload()) {
                handle_ipv4(&ipv4, &src_mac, registry, targets, sender, ctx, domain_log_limit).await;
            }
        }
        EtherTypes::Ipv6 => {
            if let Some(ipv6) = Ipv6Packet::new(eth.payload()) {
                handle_ipv6(&ipv6, &src_mac, registry, targets, sender, ctx, now_hhmm).await;
            }
        }
        _ => {}
    }
}

async fn handle_ipv4(
    ipv4: &Ipv4Packet<'_>,
    src_mac: &str,
    registry: &DeviceRegistry,
    targets: &TargetSet,
    sender: &FrameSender,
    ctx: &LinkContext,
    domain_log_limit: usize,
) {
    let blocked = is_blocked_mac(registry, targets, src_mac).await;

    // Step 3: active rejection for blocked sources.
    if blocked {
        let unreachable = icmp::icmpv4_dest_unreachable(
            ctx.host_mac,
            src_mac.parse().unwrap_or(MacAddr::zero()),
            ipv4.get_destination(),
            ipv4.get_source(),
            ipv4.packet(),
        );
        sender.send(&unreachable).await;
    }

    // Step 4: metadata extraction.
    match ipv4.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => {
            if let Some(tcp) = TcpPacket::new(ipv4.payload()) {
                if tcp.get_destination() == 443 && sni::looks_like_client_hello(tcp.payload()) {
                    if let Some(hostname) = sni::extract_sni(tcp.payload()) {
                        record_domain(registry, src_mac, hostname, domain_log_limit);
                    }
                }
            }
        }
        IpNextHeaderProtocols::Udp => {
            if let Some(udp) = UdpPacket::new(ipv4.payload()) {
                if udp.get_destination() == 53 {
                    if let Some(qname) = sni::extract_dns_qname(udp.payload()) {
                        let qname = qname.trim_end_matches('.').to_string();
                        record_domain(registry, src_mac, qname, domain_log_limit);
                    }
                }
            }
        }
        _ => {}
    }
}

async fn handle_ipv6(
    ipv6: &Ipv6Packet<'_>,
    src_mac: &str,
    registry: &DeviceRegistry,
    targets: &TargetSet,
    sender: &FrameSender,
    ctx: &LinkContext,
    now_hhmm: &str,
) {
    // Step 2: IPv6 address learning.
    if registry.lookup_by_mac(src_mac).is_some() {
        targets.record_ipv6(src_mac, ipv6.get_source()).await;
        registry.with_device_mut(src_mac, |d| d.ipv6 = Some(ipv6.get_source().to_string()));
    }

    let blocked = is_blocked_mac(registry, targets, src_mac).await;

    if blocked {
        let unreachable = icmp::icmpv6_dest_unreachable(
            ctx.host_mac,
            src_mac.parse().unwrap_or(MacAddr::zero()),
            ipv6.get_destination(),
            ipv6.get_source(),
            ipv6.packet(),
        );
        sender.send(&unreachable).await;
    }

    // IPv6 loophole fix: a blocked device's Neighbor Solicitation to the
    // solicited-node multicast group gets an immediate unsolicited NA.
    if blocked && ipv6.get_next_header() == IpNextHeaderProtocols::Icmpv6 {
        if let Some(solicited) = parse_neighbor_solicitation(ipv6.payload()) {
            let na = icmp::icmpv6_neighbor_advertisement(
                ctx.host_mac,
                MacAddr::broadcast(),
                solicited,
                ipv6.get_source(),
                solicited,
                crate::link::BOGUS_MAC_BLOCK_REPLY,
            );
            sender.send(&na).await;
            debug!(%solicited, now_hhmm, "Closed IPv6 loophole for blocked device");
        }
    }
}

/// Minimal Neighbor Solicitation parse: type 135, target address at byte
/// offset 8 within the ICMPv6 body. Returns `None` for anything else.
fn parse_neighbor_solicitation(icmpv6_body: &[u8]) -> Option<Ipv6Addr> {
    if icmpv6_body.len() < 24 || icmpv6_body[0] != 135 {
        return None;
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&icmpv6_body[8..24]);
    Some(Ipv6Addr::from(octets))
}

async fn is_blocked_mac(registry: &DeviceRegistry, targets: &TargetSet, mac: &str) -> bool {
    let Some(device) = registry.lookup_by_mac(mac) else {
        return false;
    };
    let now_hhmm = crate::clock::local_hhmm();
    should_block(&device, targets.kill_switch(), &now_hhmm)
}

fn record_domain(registry: &DeviceRegistry, mac: &str, domain: String, cap: usize) {
    if domain.is_empty() {
        return;
    }
    registry.with_device_mut(mac, |d| d.record_domain(domain, cap));
}

pub const DEFAULT_DOMAIN_LOG_LIMIT: usize = DOMAIN_LOG_LIMIT_DEFAULT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_neighbor_solicitation_target() {
        let mut body = vec![0u8; 24];
        body[0] = 135;
        let target: Ipv6Addr = "fe80::1".parse().unwrap();
        body[8..24].copy_from_slice(&target.octets());
        assert_eq!(parse_neighbor_solicitation(&body), Some(target));
    }

    #[test]
    fn rejects_wrong_icmpv6_type() {
        let mut body = vec![0u8; 24];
        body[0] = 136; // Neighbor Advertisement, not Solicitation
        assert_eq!(parse_neighbor_solicitation(&body), None);
    }

    #[test]
    fn record_domain_ignores_empty_string() {
        let registry = DeviceRegistry::new();
        registry.add_or_update("10.0.0.5", "aa:bb:cc:dd:ee:01", None, 0.0);
        record_domain(&registry, "aa:bb:cc:dd:ee:01", String::new(), DEFAULT_DOMAIN_LOG_LIMIT);
        let d = registry.lookup_by_mac("aa:bb:cc:dd:ee:01").unwrap();
        assert!(d.domains.is_empty());
    }

    #[test]
    fn record_domain_updates_device_domains() {
        let registry = DeviceRegistry::new();
        registry.add_or_update("10.0.0.5", "aa:bb:cc:dd:ee:01", None, 0.0);
        record_domain(
            &registry,
            "aa:bb:cc:dd:ee:01",
            "example.com".to_string(),
            DEFAULT_DOMAIN_LOG_LIMIT,
        );
        let d = registry.lookup_by_mac("aa:bb:cc:dd:ee:01").unwrap();
        assert_eq!(d.last_sni, "example.com");
    }
}
