//! Passive ARP listener and active ARP sweeper (§4.4).
//!
//! Both loops are grounded on the `pnet`-based scanner in
//! `other_examples/..._rahul-biswakarma-exia..._scanner-mod.rs`: a
//! `datalink::channel` opened once, ARP frames built in a fixed buffer,
//! and replies matched by polling `rx.next()`. Raw frame visibility
//! (rather than shelling out to `ping` and reading `/proc/net/arp`) is
//! needed here so the Monitor engine shares the same link-layer truth.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pnet::datalink::{DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::util::MacAddr;
use tokio::sync::Mutex;
use tracing::debug;

use crate::link;
use crate::oui::VendorOracle;
use crate::registry::DeviceRegistry;

const ACTIVE_SWEEP_BATCH_TIMEOUT: Duration = Duration::from_secs(2);

fn observe(registry: &DeviceRegistry, oracle: &VendorOracle, ip: Ipv4Addr, mac: MacAddr) {
    let mac = mac.to_string();
    let vendor = oracle.lookup(&mac);
    let device = registry.add_or_update(&ip.to_string(), &mac, Some(&vendor), now_secs());
    let (category, confidence) = crate::classifier::classify(&crate::classifier::ClassifyInput {
        vendor: &device.vendor,
        hostname: &device.hostname,
        services: &device.services,
    });
    registry.with_device_mut(&mac, |d| {
        d.category = category;
        d.confidence = confidence;
    });
}

/// Runs the passive ARP listener until `running` is cleared: every ARP
/// request or reply with a non-zero sender IP is fed to the Registry, and
/// newly-created Devices are classified immediately.
pub fn run_passive_listener(
    mut rx: Box<dyn DataLinkReceiver>,
    registry: DeviceRegistry,
    vendor_oracle: VendorOracle,
    running: Arc<AtomicBool>,
) {
    // pnet's blocking receiver does not have an async equivalent; run it on
    // a dedicated thread rather than blocking the async executor.
    std::thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            match rx.next() {
                Ok(raw) => {
                    if let Some(parsed) = link::parse_arp_frame(raw) {
                        if parsed.sender_ip != Ipv4Addr::UNSPECIFIED {
                            observe(&registry, &vendor_oracle, parsed.sender_ip, parsed.sender_mac);
                        }
                    }
                }
                Err(e) => debug!(error = %e, "passive ARP listener read error"),
            }
        }
    });
}

/// Runs a single active ARP sweep: broadcasts a who-has request for every
/// address in the interface's subnet, then gathers replies for up to
/// `ACTIVE_SWEEP_BATCH_TIMEOUT`.
pub async fn sweep_once(
    iface: &NetworkInterface,
    sender: Arc<Mutex<Box<dyn DataLinkSender>>>,
    receiver: Arc<Mutex<Box<dyn DataLinkReceiver>>>,
    registry: &DeviceRegistry,
    vendor_oracle: &VendorOracle,
    host_mac: MacAddr,
    host_ip: Ipv4Addr,
) {
    let subnet = super::subnet_for_interface(iface);
    {
        let mut tx = sender.lock().await;
        for target_ip in subnet.iter() {
            if target_ip == host_ip {
                continue;
            }
            let frame = link::arp_request(host_mac, MacAddr::broadcast(), host_ip, target_ip);
            let _ = tx.send_to(&frame, None);
        }
    }

    let deadline = Instant::now() + ACTIVE_SWEEP_BATCH_TIMEOUT;
    let mut rx = receiver.lock().await;
    while Instant::now() < deadline {
        if let Ok(raw) = rx.next() {
            if let Some(parsed) = link::parse_arp_frame(raw) {
                if parsed.operation == pnet::packet::arp::ArpOperations::Reply {
                    observe(registry, vendor_oracle, parsed.sender_ip, parsed.sender_mac);
                }
            }
        }
    }
}

/// Drives [`sweep_once`] on a cadence that is re-read from
/// `cadence_secs` before every tick, so a live `update_settings` call
/// takes effect on the sweeper's very next cycle rather than only at
/// engine restart. The Coordinator keeps this floored to `>= 1s`.
#[allow(clippy::too_many_arguments)]
pub async fn run_active_sweeper(
    iface: NetworkInterface,
    sender: Arc<Mutex<Box<dyn DataLinkSender>>>,
    receiver: Arc<Mutex<Box<dyn DataLinkReceiver>>>,
    registry: DeviceRegistry,
    vendor_oracle: VendorOracle,
    host_mac: MacAddr,
    host_ip: Ipv4Addr,
    cadence_secs: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        let cadence = Duration::from_secs(cadence_secs.load(Ordering::Relaxed).max(1));
        tokio::time::sleep(cadence).await;
        sweep_once(&iface, sender.clone(), receiver.clone(), &registry, &vendor_oracle, host_mac, host_ip).await;
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
