//! Spoofing cadence loop, block bursts, normal intercept, and unblock
//! restoration (§4.5.2, §4.5.3).
//!
//! Grounded on `original_source/src/engine/monitor.py`'s `_spoof_with_mac`
//! / `_spoof_block_with_mac` / `_restore`: the exact packet sequences and
//! cadence (500 ms tick, 2 s normal-intercept gating, ten 100 ms
//! restoration rounds) are reproduced; where the original had a known bug
//! (`_spoof_block_v6` used the same address for both NA source and target),
//! this implementation keeps them distinct per the corrected behavior.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use pnet::datalink::DataLinkSender;
use pnet::util::MacAddr;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::icmp;
use crate::link::{self, BOGUS_MAC_BLOCK_REPLY, BOGUS_MAC_IP_CONFLICT};
use crate::monitor::{resolve_target_macs, should_block, TargetSet};
use crate::registry::DeviceRegistry;

const SPOOF_TICK: Duration = Duration::from_millis(500);
const NORMAL_INTERCEPT_INTERVAL: Duration = Duration::from_secs(2);
const ARP_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(1);
const ARP_RESOLUTION_WINDOW_SECS: f64 = 600.0; // 10 minutes
const RESTORE_ROUNDS: usize = 10;
const RESTORE_INTERVAL: Duration = Duration::from_millis(100);

/// Link-layer facts the spoof loop needs and cannot infer itself.
#[derive(Clone)]
pub struct LinkContext {
    pub host_mac: MacAddr,
    pub host_ip: Ipv4Addr,
    pub gateway_ip: Ipv4Addr,
    pub gateway_mac: MacAddr,
}

/// Thread-safe handle to the raw Ethernet sender shared by every
/// component that injects frames (spoof loop, sniff loop's rejection
/// path, active sweeper).
#[derive(Clone)]
pub struct FrameSender(Arc<Mutex<Box<dyn DataLinkSender>>>);

impl FrameSender {
    pub fn new(tx: Box<dyn DataLinkSender>) -> Self {
        Self(Arc::new(Mutex::new(tx)))
    }

    pub async fn send(&self, frame: &[u8]) {
        let mut tx = self.0.lock().await;
        match tx.send_to(frame, None) {
            Some(Ok(())) => {}
            Some(Err(e)) => warn!(error = %e, "Failed to send link-layer frame"),
            None => warn!("Datalink sender has no configured destination"),
        }
    }
}

/// Runs the 500 ms spoofing cadence loop until `running` is cleared.
/// Spawned as an independent task by the Coordinator.
pub async fn run_spoof_loop(
    registry: DeviceRegistry,
    targets: TargetSet,
    sender: FrameSender,
    ctx: LinkContext,
    running: Arc<std::sync::atomic::AtomicBool>,
) {
    let mut ticker = interval(SPOOF_TICK);
    let mut last_normal_intercept: HashMap<Ipv4Addr, std::time::Instant> = HashMap::new();

    while running.load(std::sync::atomic::Ordering::Relaxed) {
        ticker.tick().await;
        let now = now_secs();
        let now_hhmm = crate::clock::local_hhmm();

        for target_ip in targets.snapshot().await {
            let macs = resolve_candidate_macs(&registry, &sender, &ctx, target_ip, now).await;
            for mac in macs {
                let Some(device) = registry.lookup_by_mac(&mac) else {
                    continue;
                };
                let Ok(target_mac) = mac.parse::<MacAddr>() else {
                    continue;
                };

                if should_block(&device, targets.kill_switch(), &now_hhmm) {
                    send_block_burst(&sender, &ctx, target_ip, target_mac, &targets, &mac).await;
                } else {
                    let due = last_normal_intercept
                        .get(&target_ip)
                        .map(|t| t.elapsed() >= NORMAL_INTERCEPT_INTERVAL)
                        .unwrap_or(true);
                    if due {
                        send_normal_intercept(&sender, &ctx, target_ip, target_mac).await;
                        last_normal_intercept.insert(target_ip, std::time::Instant::now());
                    }
                }
            }
        }
    }
}

/// §4.5.2 step 2: Registry lookup within the 10-minute window, falling back
/// to a synchronous unicast ARP who-has with a 1 s timeout.
async fn resolve_candidate_macs(
    registry: &DeviceRegistry,
    sender: &FrameSender,
    ctx: &LinkContext,
    target_ip: Ipv4Addr,
    now: f64,
) -> Vec<String> {
    let macs = resolve_target_macs(registry, target_ip, now, ARP_RESOLUTION_WINDOW_SECS);
    if !macs.is_empty() {
        return macs;
    }

    let frame = link::arp_request(ctx.host_mac, MacAddr::broadcast(), ctx.host_ip, target_ip);
    sender.send(&frame).await;
    // The actual reply is observed and fed into the Registry by the
    // passive ARP listener (§4.4); this call just issues the probe and
    // gives it its 1 s budget to land before the next tick moves on.
    tokio::time::sleep(ARP_RESOLUTION_TIMEOUT).await;
    resolve_target_macs(registry, target_ip, now_secs(), ARP_RESOLUTION_WINDOW_SECS)
}

/// Normal intercept (§4.5.2): two ARP replies claiming the gateway's and
/// the target's identities respectively, both sourced from the host's real
/// MAC so the host's own IP forwarding keeps the link alive.
async fn send_normal_intercept(
    sender: &FrameSender,
    ctx: &LinkContext,
    target_ip: Ipv4Addr,
    target_mac: MacAddr,
) {
    let to_target = link::arp_reply(ctx.host_mac, ctx.host_mac, ctx.gateway_ip, target_mac, target_ip);
    let to_gateway = link::arp_reply(ctx.host_mac, ctx.host_mac, target_ip, ctx.gateway_mac, ctx.gateway_ip);
    sender.send(&to_target).await;
    sender.send(&to_gateway).await;
}

/// Block burst (§4.5.2): four packets every tick, poisoning both
/// directions with a bogus MAC, broadcasting an IP-conflict gratuitous
/// ARP, and — if a global IPv6 has been observed for this MAC — an
/// unsolicited Neighbor Advertisement poisoning the v6 path too.
async fn send_block_burst(
    sender: &FrameSender,
    ctx: &LinkContext,
    target_ip: Ipv4Addr,
    target_mac: MacAddr,
    targets: &TargetSet,
    mac_str: &str,
) {
    let to_target = link::arp_reply(
        ctx.host_mac,
        BOGUS_MAC_BLOCK_REPLY,
        ctx.gateway_ip,
        target_mac,
        target_ip,
    );
    let to_gateway = link::arp_reply(
        ctx.host_mac,
        BOGUS_MAC_BLOCK_REPLY,
        target_ip,
        ctx.gateway_mac,
        ctx.gateway_ip,
    );
    let conflict = link::gratuitous_arp(ctx.host_mac, BOGUS_MAC_IP_CONFLICT, target_ip);

    sender.send(&to_target).await;
    sender.send(&to_gateway).await;
    sender.send(&conflict).await;

    if let Some(v6) = targets.ipv6_for_mac(mac_str).await {
        let na = icmp::icmpv6_neighbor_advertisement(
            ctx.host_mac,
            MacAddr::broadcast(),
            v6,
            icmp::ALL_NODES_MULTICAST,
            v6,
            BOGUS_MAC_BLOCK_REPLY,
        );
        sender.send(&na).await;
    }
}

/// §4.5.3: ten rounds at 100 ms intervals of correct ARP replies, run on a
/// detached background task so the caller (the control surface's unblock
/// call) never stalls.
pub fn spawn_restoration_burst(sender: FrameSender, ctx: LinkContext, target_ip: Ipv4Addr, target_mac: MacAddr) {
    tokio::spawn(async move {
        for round in 0..RESTORE_ROUNDS {
            let to_target =
                link::arp_reply(ctx.host_mac, ctx.gateway_mac, ctx.gateway_ip, target_mac, target_ip);
            let to_gateway =
                link::arp_reply(ctx.host_mac, target_mac, target_ip, ctx.gateway_mac, ctx.gateway_ip);
            sender.send(&to_target).await;
            sender.send(&to_gateway).await;
            debug!(round, %target_ip, "Restoration burst round sent");
            tokio::time::sleep(RESTORE_INTERVAL).await;
        }
    });
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
