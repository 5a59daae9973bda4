//! Monitor / Enforcer: target set, global kill switch, and the blocking
//! predicate shared by the spoof and sniff loops (§4.5.1).
//!
//! Grounded on `original_source/src/engine/monitor.py`'s `BandwidthMonitor`
//! — `targets: set()`, `ipv6_targets: dict`, `global_kill_switch: bool` are
//! reproduced as the `TargetSet` below, guarded by a `tokio::sync::Mutex`
//! so every cooperating task shares one consistent view of the target set.

pub mod spoof;
pub mod sniff;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::device::Device;
use crate::registry::DeviceRegistry;

/// The set of IPv4 addresses currently under active interception, plus any
/// IPv6 addresses observed for their owning MACs.
#[derive(Default)]
struct TargetState {
    targets: std::collections::HashSet<Ipv4Addr>,
    ipv6_targets: HashMap<String, std::net::Ipv6Addr>,
}

/// Shared enforcement state: the target set and the global kill switch.
/// Cheaply cloneable; every cooperating task (spoof loop, sniff loop, and
/// the external control surface) holds a handle.
#[derive(Clone)]
pub struct TargetSet {
    state: Arc<Mutex<TargetState>>,
    kill_switch: Arc<AtomicBool>,
}

impl Default for TargetSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSet {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TargetState::default())),
            kill_switch: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_kill_switch(&self, on: bool) {
        self.kill_switch.store(on, Ordering::Relaxed);
    }

    pub fn kill_switch(&self) -> bool {
        self.kill_switch.load(Ordering::Relaxed)
    }

    /// Add `ip` to the target set unless it is the host's own IP or the
    /// gateway's (§4.5.1: neither is ever a valid target).
    pub async fn add_target(&self, ip: Ipv4Addr, host_ip: Ipv4Addr, gateway_ip: Ipv4Addr) -> bool {
        if ip == host_ip || ip == gateway_ip {
            return false;
        }
        self.state.lock().await.targets.insert(ip);
        true
    }

    /// Remove `ip` from the target set and drop any IPv6 address recorded
    /// for `mac`, the MAC that owned it — `ipv6_targets` is keyed by MAC, so
    /// the caller (which already resolved `mac` from the Registry to block
    /// or unblock it) passes it through rather than this module re-deriving
    /// an IP→MAC mapping it has no other use for.
    pub async fn remove_target(&self, ip: Ipv4Addr, mac: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.targets.remove(&ip);
        state.ipv6_targets.remove(mac);
        removed
    }

    /// Shortest possible lock hold: copy the target set out for the
    /// caller's tick.
    pub async fn snapshot(&self) -> Vec<Ipv4Addr> {
        self.state.lock().await.targets.iter().copied().collect()
    }

    pub async fn record_ipv6(&self, mac: &str, addr: std::net::Ipv6Addr) {
        self.state
            .lock()
            .await
            .ipv6_targets
            .insert(mac.to_string(), addr);
    }

    pub async fn ipv6_for_mac(&self, mac: &str) -> Option<std::net::Ipv6Addr> {
        self.state.lock().await.ipv6_targets.get(mac).copied()
    }

    pub async fn is_target(&self, ip: Ipv4Addr) -> bool {
        self.state.lock().await.targets.contains(&ip)
    }
}

/// §4.5.1: a Device requires blocking when the kill switch is on, its own
/// `is_blocked` flag is on, or "now" falls inside its schedule window.
pub fn should_block(device: &Device, kill_switch_on: bool, now_hhmm: &str) -> bool {
    kill_switch_on || device.is_blocked || device.in_schedule_window(now_hhmm)
}

/// §4.5.2 step 2: resolve candidate MACs for `target_ip` from the Registry,
/// restricted to devices seen within `window_secs`.
pub fn resolve_target_macs(registry: &DeviceRegistry, target_ip: Ipv4Addr, now: f64, window_secs: f64) -> Vec<String> {
    registry
        .all_devices()
        .into_iter()
        .filter(|d| d.ip == target_ip.to_string() && now - d.last_seen < window_secs)
        .map(|d| d.mac)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_block_on_kill_switch_alone() {
        let d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        assert!(should_block(&d, true, "12:00"));
    }

    #[test]
    fn should_block_on_is_blocked_flag() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        d.is_blocked = true;
        assert!(should_block(&d, false, "12:00"));
    }

    #[test]
    fn should_not_block_unblocked_device_no_schedule_no_kill_switch() {
        let d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        assert!(!should_block(&d, false, "12:00"));
    }

    #[test]
    fn should_block_inside_schedule_window() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        d.schedule_start = "20:00".into();
        d.schedule_end = "22:00".into();
        assert!(should_block(&d, false, "21:00"));
        assert!(!should_block(&d, false, "23:00"));
    }

    #[tokio::test]
    async fn host_and_gateway_ip_are_never_added_as_targets() {
        let set = TargetSet::new();
        let host = Ipv4Addr::new(192, 168, 1, 2);
        let gw = Ipv4Addr::new(192, 168, 1, 1);
        assert!(!set.add_target(host, host, gw).await);
        assert!(!set.add_target(gw, host, gw).await);
        assert!(set.snapshot().await.is_empty());

        let victim = Ipv4Addr::new(192, 168, 1, 50);
        assert!(set.add_target(victim, host, gw).await);
        assert_eq!(set.snapshot().await, vec![victim]);
    }

    #[tokio::test]
    async fn remove_target_also_drops_its_ipv6_entry() {
        let set = TargetSet::new();
        let host = Ipv4Addr::new(192, 168, 1, 2);
        let gw = Ipv4Addr::new(192, 168, 1, 1);
        let victim = Ipv4Addr::new(192, 168, 1, 50);
        let mac = "aa:bb:cc:dd:ee:ff";
        let v6: std::net::Ipv6Addr = "fe80::1".parse().unwrap();

        assert!(set.add_target(victim, host, gw).await);
        set.record_ipv6(mac, v6).await;
        assert_eq!(set.ipv6_for_mac(mac).await, Some(v6));

        assert!(set.remove_target(victim, mac).await);
        assert!(set.snapshot().await.is_empty());
        assert_eq!(set.ipv6_for_mac(mac).await, None);
    }
}
