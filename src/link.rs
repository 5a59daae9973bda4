//! Raw Ethernet/ARP/NDP/ICMP frame construction and the datalink channel
//! wrapper used to send and receive them.
//!
//! Grounded on the `pnet`-based scanner in the example pack's
//! `other_examples/..._rahul-biswakarma-exia..._scanner-mod.rs`, which
//! builds Ethernet+ARP frames in a fixed buffer via `MutableEthernetPacket`
//! / `MutableArpPacket` and sends them over a `datalink::channel`.

use std::net::Ipv4Addr;

use anyhow::{anyhow, Context, Result};
use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::{MutablePacket, Packet};
use pnet::util::MacAddr;

pub const BOGUS_MAC_BLOCK_REPLY: MacAddr = MacAddr(0, 0, 0, 0, 0, 1);
pub const BOGUS_MAC_IP_CONFLICT: MacAddr = MacAddr(0, 0, 0, 0, 0, 2);

const ETHERNET_HEADER_LEN: usize = 14;
const ARP_PACKET_LEN: usize = 28;
const ARP_FRAME_LEN: usize = ETHERNET_HEADER_LEN + ARP_PACKET_LEN;

/// Open a raw Ethernet datalink channel on `iface`.
pub fn open_channel(iface: &NetworkInterface) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)> {
    match datalink::channel(iface, Default::default()) {
        Ok(Channel::Ethernet(tx, rx)) => Ok((tx, rx)),
        Ok(_) => Err(anyhow!("unsupported datalink channel type on {}", iface.name)),
        Err(e) => Err(e).with_context(|| format!("opening datalink channel on {}", iface.name)),
    }
}

/// Build a raw Ethernet+ARP frame. `op` is `ArpOperations::Request` or
/// `::Reply`. `eth_dst` is the Ethernet frame's destination (may differ
/// from `arp_dst_mac`, e.g. broadcast requests with an unknown target MAC).
pub fn build_arp_frame(
    op: pnet::packet::arp::ArpOperation,
    eth_src: MacAddr,
    eth_dst: MacAddr,
    arp_src_mac: MacAddr,
    arp_src_ip: Ipv4Addr,
    arp_dst_mac: MacAddr,
    arp_dst_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut buffer = vec![0u8; ARP_FRAME_LEN];
    {
        let mut eth = MutableEthernetPacket::new(&mut buffer).expect("buffer sized for ethernet header");
        eth.set_destination(eth_dst);
        eth.set_source(eth_src);
        eth.set_ethertype(EtherTypes::Arp);

        let mut arp = MutableArpPacket::new(eth.payload_mut()).expect("buffer sized for arp packet");
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(op);
        arp.set_sender_hw_addr(arp_src_mac);
        arp.set_sender_proto_addr(arp_src_ip);
        arp.set_target_hw_addr(arp_dst_mac);
        arp.set_target_proto_addr(arp_dst_ip);
    }
    buffer
}

/// An ARP reply claiming `claimed_ip` belongs to `claimed_mac`, addressed to
/// `to_mac`/`to_ip`. Used for both the normal intercept and the block burst
/// (with a bogus `claimed_mac`).
pub fn arp_reply(
    eth_src: MacAddr,
    claimed_mac: MacAddr,
    claimed_ip: Ipv4Addr,
    to_mac: MacAddr,
    to_ip: Ipv4Addr,
) -> Vec<u8> {
    build_arp_frame(
        ArpOperations::Reply,
        eth_src,
        to_mac,
        claimed_mac,
        claimed_ip,
        to_mac,
        to_ip,
    )
}

/// Gratuitous ARP: a broadcast reply announcing `ip` belongs to `mac`,
/// used for the block burst's "IP conflict" packet and for who-has
/// broadcasts during an active sweep.
pub fn gratuitous_arp(eth_src: MacAddr, mac: MacAddr, ip: Ipv4Addr) -> Vec<u8> {
    build_arp_frame(
        ArpOperations::Reply,
        eth_src,
        MacAddr::broadcast(),
        mac,
        ip,
        MacAddr::broadcast(),
        ip,
    )
}

/// Unicast or broadcast ARP request ("who has `target_ip`? tell
/// `sender_ip`").
pub fn arp_request(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    sender_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    build_arp_frame(
        ArpOperations::Request,
        eth_src,
        eth_dst,
        eth_src,
        sender_ip,
        MacAddr::zero(),
        target_ip,
    )
}

/// Parsed view of an inbound ARP frame, borrowed from the raw bytes.
pub struct ParsedArp {
    pub operation: pnet::packet::arp::ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

/// Parse an Ethernet frame and, if it carries ARP, return the decoded
/// fields. Returns `None` for any non-ARP or malformed frame.
pub fn parse_arp_frame(raw: &[u8]) -> Option<ParsedArp> {
    let eth = EthernetPacket::new(raw)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    Some(ParsedArp {
        operation: arp.get_operation(),
        sender_mac: arp.get_sender_hw_addr(),
        sender_ip: arp.get_sender_proto_addr(),
        target_ip: arp.get_target_proto_addr(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arp_reply_roundtrips_through_parser() {
        let eth_src = MacAddr(1, 2, 3, 4, 5, 6);
        let claimed_mac = MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
        let to_mac = MacAddr(0x11, 0x22, 0x33, 0x44, 0x55, 0x66);
        let frame = arp_reply(
            eth_src,
            claimed_mac,
            Ipv4Addr::new(192, 168, 1, 1),
            to_mac,
            Ipv4Addr::new(192, 168, 1, 50),
        );
        let parsed = parse_arp_frame(&frame).expect("valid arp frame");
        assert_eq!(parsed.operation, ArpOperations::Reply);
        assert_eq!(parsed.sender_mac, claimed_mac);
        assert_eq!(parsed.sender_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(parsed.target_ip, Ipv4Addr::new(192, 168, 1, 50));
    }

    #[test]
    fn gratuitous_arp_targets_broadcast() {
        let frame = gratuitous_arp(
            MacAddr(1, 2, 3, 4, 5, 6),
            super::BOGUS_MAC_IP_CONFLICT,
            Ipv4Addr::new(10, 0, 0, 5),
        );
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
    }

    #[test]
    fn parse_rejects_non_arp_ethertype() {
        let mut buffer = vec![0u8; ARP_FRAME_LEN];
        let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
        eth.set_ethertype(EtherTypes::Ipv4);
        assert!(parse_arp_frame(&buffer).is_none());
    }
}
