//! Discovery Engine: passive ARP listener, active ARP sweeper, and the
//! mDNS/SSDP multicast listeners (§4.4).

pub mod arp;
pub mod service;

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use pnet::datalink::NetworkInterface;

/// Compute the IPv4 subnet (`address`/`netmask`) of `iface`'s first IPv4
/// address. Falls back to `192.168.1.0/24` on any resolution failure, per
/// §4.4's active-sweeper fallback.
pub fn subnet_for_interface(iface: &NetworkInterface) -> Ipv4Network {
    for ip_network in &iface.ips {
        if let std::net::IpAddr::V4(addr) = ip_network.ip() {
            if let Ok(net) = Ipv4Network::new(addr, ip_network.prefix()) {
                return net;
            }
        }
    }
    Ipv4Network::new(Ipv4Addr::new(192, 168, 1, 0), 24).expect("static fallback subnet is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_subnet_is_192_168_1_0_24() {
        let iface = NetworkInterface {
            name: "test0".to_string(),
            description: String::new(),
            index: 0,
            mac: None,
            ips: vec![],
            flags: 0,
        };
        let net = subnet_for_interface(&iface);
        assert_eq!(net.to_string(), "192.168.1.0/24");
    }
}
