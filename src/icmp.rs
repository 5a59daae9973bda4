//! ICMPv4/ICMPv6 Destination-Unreachable rejection frames and ICMPv6
//! Neighbor Advertisement frames for the "IPv6 loophole" fix (§4.5.2,
//! §4.5.4).
//!
//! Built the same way as [`crate::link`]'s ARP frames: a fixed buffer and
//! `pnet`'s `Mutable*Packet` views, rather than a full IP stack — this
//! crate only ever originates these three frame shapes.

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::icmp::{self, IcmpCode, IcmpTypes, MutableIcmpPacket};
use pnet::packet::icmpv6::{self, Icmpv6Code, Icmpv6Types, MutableIcmpv6Packet};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::MutablePacket;
use pnet::util::MacAddr;

const ETH_HDR: usize = 14;
const IPV4_HDR: usize = 20;
const IPV6_HDR: usize = 40;
const ICMP_DEST_UNREACHABLE_CODE_V4: u8 = 13; // communication administratively prohibited
const ICMPV6_DEST_UNREACHABLE_CODE_V6: u8 = 1; // communication with destination administratively prohibited

/// Build an Ethernet/IPv4/ICMP "destination unreachable, administratively
/// prohibited" (type 3, code 13) frame quoting `offending_ipv4_packet` as
/// payload, addressed back to the frame's original source.
pub fn icmpv4_dest_unreachable(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    reply_src_ip: Ipv4Addr,
    reply_dst_ip: Ipv4Addr,
    offending_ipv4_packet: &[u8],
) -> Vec<u8> {
    // RFC 792: include the original IP header plus at least 8 bytes of its
    // payload; cap the quote to keep frames small.
    let quote_len = offending_ipv4_packet.len().min(IPV4_HDR + 8);
    let quote = &offending_ipv4_packet[..quote_len];

    let icmp_len = 8 + quote_len; // type/code/checksum/unused(4) + quote
    let ip_total_len = IPV4_HDR + icmp_len;
    let mut buffer = vec![0u8; ETH_HDR + ip_total_len];

    {
        let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
        eth.set_destination(eth_dst);
        eth.set_source(eth_src);
        eth.set_ethertype(EtherTypes::Ipv4);

        let mut ip = MutableIpv4Packet::new(eth.payload_mut()).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(ip_total_len as u16);
        ip.set_ttl(64);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(reply_src_ip);
        ip.set_destination(reply_dst_ip);
        let cksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(cksum);

        let mut icmp_packet = MutableIcmpPacket::new(ip.payload_mut()).unwrap();
        icmp_packet.set_icmp_type(IcmpTypes::DestinationUnreachable);
        icmp_packet.set_icmp_code(IcmpCode(ICMP_DEST_UNREACHABLE_CODE_V4));
        icmp_packet.payload_mut()[4..4 + quote_len].copy_from_slice(quote);
        let cksum = icmp::checksum(&icmp_packet.to_immutable());
        icmp_packet.set_checksum(cksum);
    }
    buffer
}

/// Build an Ethernet/IPv6/ICMPv6 "destination unreachable, administratively
/// prohibited" (type 1, code 1) frame quoting `offending_ipv6_packet`.
pub fn icmpv6_dest_unreachable(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    reply_src_ip: Ipv6Addr,
    reply_dst_ip: Ipv6Addr,
    offending_ipv6_packet: &[u8],
) -> Vec<u8> {
    let quote_len = offending_ipv6_packet.len().min(IPV6_HDR + 8);
    let quote = &offending_ipv6_packet[..quote_len];

    let icmp_len = 8 + quote_len;
    let mut buffer = vec![0u8; ETH_HDR + IPV6_HDR + icmp_len];

    {
        let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
        eth.set_destination(eth_dst);
        eth.set_source(eth_src);
        eth.set_ethertype(EtherTypes::Ipv6);

        let mut ip = MutableIpv6Packet::new(eth.payload_mut()).unwrap();
        ip.set_version(6);
        ip.set_payload_length(icmp_len as u16);
        ip.set_next_header(IpNextHeaderProtocols::Icmpv6);
        ip.set_hop_limit(64);
        ip.set_source(reply_src_ip);
        ip.set_destination(reply_dst_ip);

        let mut icmpv6_packet = MutableIcmpv6Packet::new(ip.payload_mut()).unwrap();
        icmpv6_packet.set_icmpv6_type(Icmpv6Types::DestinationUnreachable);
        icmpv6_packet.set_icmpv6_code(Icmpv6Code::new(ICMPV6_DEST_UNREACHABLE_CODE_V6));
        icmpv6_packet.payload_mut()[4..4 + quote_len].copy_from_slice(quote);
        let cksum = icmpv6::checksum(&icmpv6_packet.to_immutable(), &reply_src_ip, &reply_dst_ip);
        icmpv6_packet.set_checksum(cksum);
    }
    buffer
}

/// Flags byte for an unsolicited Neighbor Advertisement: Router=0,
/// Solicited=1, Override=1 per §4.5.2 item 4 ("R=S=O=1" — this crate never
/// originates router NAs, so R is left clear; S and O are set, matching the
/// original's unsolicited-but-confirmed advertisement intent).
const NA_FLAGS_SOLICITED_OVERRIDE: u8 = 0b0110_0000;
const ICMPV6_OPTION_TARGET_LL_ADDR: u8 = 2;
const NDP_NA_FIXED_LEN: usize = 20; // type/code/cksum(4) + flags/reserved(4) + target(16)
const NDP_OPTION_LEN: usize = 8; // type/len(2) + mac(6)

/// IPv6 all-nodes multicast address (`ff02::1`). The unspecified address
/// `::` must never appear as a packet destination (RFC 4291 §2.5.2); an
/// unsolicited Neighbor Advertisement meant for every listener on the link
/// targets this address instead.
pub const ALL_NODES_MULTICAST: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Build an unsolicited Neighbor Advertisement for `target_ip`, carrying a
/// target-link-layer-address option of `spoofed_mac`. Used both for the
/// block burst's IPv6 poisoning and for closing the IPv6 loophole when a
/// blocked device's Neighbor Solicitation is observed.
pub fn icmpv6_neighbor_advertisement(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    reply_src_ip: Ipv6Addr,
    reply_dst_ip: Ipv6Addr,
    target_ip: Ipv6Addr,
    spoofed_mac: MacAddr,
) -> Vec<u8> {
    let icmp_len = NDP_NA_FIXED_LEN + NDP_OPTION_LEN;
    let mut buffer = vec![0u8; ETH_HDR + IPV6_HDR + icmp_len];

    {
        let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
        eth.set_destination(eth_dst);
        eth.set_source(eth_src);
        eth.set_ethertype(EtherTypes::Ipv6);

        let mut ip = MutableIpv6Packet::new(eth.payload_mut()).unwrap();
        ip.set_version(6);
        ip.set_payload_length(icmp_len as u16);
        ip.set_next_header(IpNextHeaderProtocols::Icmpv6);
        ip.set_hop_limit(255); // NDP requires hop limit 255
        ip.set_source(reply_src_ip);
        ip.set_destination(reply_dst_ip);

        let payload = ip.payload_mut();
        let mut icmpv6_packet = MutableIcmpv6Packet::new(&mut payload[..icmp_len]).unwrap();
        icmpv6_packet.set_icmpv6_type(Icmpv6Types::NeighborAdvert);
        icmpv6_packet.set_icmpv6_code(Icmpv6Code::new(0));

        let body = icmpv6_packet.payload_mut();
        body[0] = NA_FLAGS_SOLICITED_OVERRIDE;
        body[4..20].copy_from_slice(&target_ip.octets());
        body[20] = ICMPV6_OPTION_TARGET_LL_ADDR;
        body[21] = 1; // option length in units of 8 octets
        body[22..28].copy_from_slice(&spoofed_mac.octets());

        let cksum = icmpv6::checksum(&icmpv6_packet.to_immutable(), &reply_src_ip, &reply_dst_ip);
        icmpv6_packet.set_checksum(cksum);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::EthernetPacket;
    use pnet::packet::ipv6::Ipv6Packet;
    use pnet::packet::Packet;

    #[test]
    fn neighbor_advertisement_carries_target_and_option() {
        let frame = icmpv6_neighbor_advertisement(
            MacAddr(1, 2, 3, 4, 5, 6),
            MacAddr::broadcast(),
            Ipv6Addr::LOCALHOST,
            Ipv6Addr::UNSPECIFIED,
            "fe80::1".parse().unwrap(),
            MacAddr(0, 0, 0, 0, 0, 1),
        );
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv6);
        let ip = Ipv6Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_next_header(), IpNextHeaderProtocols::Icmpv6);
        let body = ip.payload();
        assert_eq!(body[0], Icmpv6Types::NeighborAdvert.0);
        // target address octets live at offset 4 in the ICMPv6 body.
        assert_eq!(&body[4..20], &Ipv6Addr::from([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]).octets());
    }

    #[test]
    fn icmpv4_unreachable_sets_type_and_code() {
        let offending = vec![0x45u8; 28];
        let frame = icmpv4_dest_unreachable(
            MacAddr(1, 2, 3, 4, 5, 6),
            MacAddr(7, 8, 9, 10, 11, 12),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 50),
            &offending,
        );
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv4);
    }
}
