//! The Device Registry: the single authoritative, concurrency-safe table
//! of known hosts keyed by MAC address.
//!
//! Grounded on `original_source/src/device_store.py`'s `DeviceStore`, with
//! the conflict-arbitration algorithm reproduced exactly (§4.2). Internal
//! locking uses `dashmap::DashMap`'s sharded locking rather than a single
//! `Mutex<HashMap<..>>`, so concurrent callers from Discovery, Monitor and
//! the external control surface never block each other on unrelated MACs.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::device::Device;
use crate::oui::{PRIVATE_RANDOM, UNKNOWN};

/// How long a MAC's claim on an IP is honored against a competing claim.
const CONFLICT_ARBITRATION_WINDOW_SECS: f64 = 30.0;

/// Authoritative Device table. Cheaply cloneable (the map is
/// reference-counted internally by `DashMap`'s sharded locking), so every
/// engine holds its own handle rather than a reference into a shared owner.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: std::sync::Arc<DashMap<String, Device>>,
    paranoid_mode: std::sync::Arc<AtomicBool>,
    prev_totals: std::sync::Arc<DashMap<String, (u64, u64)>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: std::sync::Arc::new(DashMap::new()),
            paranoid_mode: std::sync::Arc::new(AtomicBool::new(false)),
            prev_totals: std::sync::Arc::new(DashMap::new()),
        }
    }

    /// Roll one second's worth of accounting into each Device's bounded
    /// rate history (§3 addendum): the delta since the previous call
    /// becomes one `history_up`/`history_down` sample.
    pub fn roll_bandwidth_history(&self) {
        for mut entry in self.devices.iter_mut() {
            let mac = entry.key().clone();
            let (prev_up, prev_down) = self.prev_totals.get(&mac).map(|v| *v).unwrap_or((0, 0));
            let up_delta = entry.total_up.saturating_sub(prev_up) as f64;
            let down_delta = entry.total_down.saturating_sub(prev_down) as f64;
            entry.push_history(up_delta, down_delta);
            self.prev_totals.insert(mac, (entry.total_up, entry.total_down));
        }
    }

    /// Settings hook: when paranoid mode is on, every newly-created Device
    /// starts out blocked (§4.2 step 2).
    pub fn set_paranoid_mode(&self, enabled: bool) {
        self.paranoid_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn paranoid_mode(&self) -> bool {
        self.paranoid_mode.load(Ordering::Relaxed)
    }

    /// Atomically create-or-refresh the Device owning `mac`, resolving any
    /// competing claim on `ip` per the 30-second conflict-arbitration
    /// window. Returns the updated Device (a clone; the registry remains
    /// the sole owner of the live record).
    pub fn add_or_update(&self, ip: &str, mac: &str, vendor: Option<&str>, now: f64) -> Device {
        if !ip.is_empty() {
            self.arbitrate_ip_conflict(ip, mac, now);
        }

        let mut entry = self
            .devices
            .entry(mac.to_string())
            .or_insert_with(|| {
                let mut d = Device::new(mac, now);
                if self.paranoid_mode() {
                    d.is_blocked = true;
                }
                d
            });

        let ip_allowed = ip.is_empty() || entry.ip.is_empty() || entry.ip == ip || {
            // Arbitration above already cleared any stale competing owner;
            // if nobody else now holds `ip`, this MAC may claim it.
            !self.ip_claimed_by_other(ip, mac)
        };

        if ip_allowed && !ip.is_empty() {
            entry.ip = ip.to_string();
            entry.last_known_ip = ip.to_string();
        }
        entry.last_seen = now;

        if let Some(v) = vendor {
            if !v.is_empty() && (entry.vendor == UNKNOWN || entry.vendor == PRIVATE_RANDOM) {
                entry.vendor = v.to_string();
            }
        }

        entry.clone()
    }

    /// Step 1 of `add_or_update`: if a different MAC currently claims `ip`
    /// and was seen within the arbitration window, the incoming claim is
    /// denied outright (nothing is mutated). Otherwise the stale owner's
    /// `ip` is cleared, keeping its `last_known_ip`.
    fn arbitrate_ip_conflict(&self, ip: &str, mac: &str, now: f64) {
        let mut stale_owner = None;
        for entry in self.devices.iter() {
            if entry.ip == ip && entry.key() != mac {
                if now - entry.last_seen < CONFLICT_ARBITRATION_WINDOW_SECS {
                    return;
                }
                stale_owner = Some(entry.key().clone());
                break;
            }
        }
        if let Some(owner_mac) = stale_owner {
            if let Some(mut owner) = self.devices.get_mut(&owner_mac) {
                debug!(ip, stale_mac = %owner_mac, "Clearing stale IP claim");
                owner.ip.clear();
            }
        }
    }

    fn ip_claimed_by_other(&self, ip: &str, mac: &str) -> bool {
        self.devices
            .iter()
            .any(|e| e.ip == ip && e.key() != mac)
    }

    /// Clear `ip` (retaining `last_known_ip`) on every Device whose
    /// `last_seen` is older than `now - threshold`.
    pub fn mark_stale(&self, threshold_secs: f64, now: f64) {
        for mut entry in self.devices.iter_mut() {
            if !entry.ip.is_empty() && now - entry.last_seen > threshold_secs {
                entry.ip.clear();
            }
        }
    }

    /// Shallow copy of the MAC->Device map for lock-free iteration by
    /// callers such as the control surface or a UI tick.
    pub fn snapshot(&self) -> std::collections::HashMap<String, Device> {
        self.devices
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn lookup_by_mac(&self, mac: &str) -> Option<Device> {
        self.devices.get(mac).map(|e| e.value().clone())
    }

    pub fn all_devices(&self) -> Vec<Device> {
        self.devices.iter().map(|e| e.value().clone()).collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Find the (at most one, per the §3 invariant) Device currently
    /// holding `ip`.
    pub fn find_by_ip(&self, ip: &str) -> Option<Device> {
        if ip.is_empty() {
            return None;
        }
        self.devices
            .iter()
            .find(|e| e.ip == ip)
            .map(|e| e.value().clone())
    }

    /// Apply `f` to the Device owning `mac`, if present. Used by engines
    /// that need a read-modify-write without exposing the internal lock.
    pub fn with_device_mut<F: FnOnce(&mut Device)>(&self, mac: &str, f: F) {
        if let Some(mut entry) = self.devices.get_mut(mac) {
            f(&mut entry);
        }
    }

    /// Apply `f` to the (at most one) Device currently holding `ip`.
    pub fn with_device_by_ip_mut<F: FnOnce(&mut Device)>(&self, ip: &str, f: F) {
        if ip.is_empty() {
            return;
        }
        if let Some(mut entry) = self.devices.iter_mut().find(|e| e.ip == ip) {
            f(&mut entry);
        }
    }

    /// Serialize the full map to `path` as JSON, keyed by MAC.
    pub fn save(&self, path: &str) -> Result<()> {
        let map = self.snapshot();
        let json = serde_json::to_string_pretty(&map).context("serializing device registry")?;
        std::fs::write(path, json).with_context(|| format!("writing registry file {path}"))?;
        Ok(())
    }

    /// Load the map from `path`. Tolerant: individual malformed entries
    /// are skipped with a warning rather than failing the whole load.
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry file {path}"))?;
        let raw_map: std::collections::HashMap<String, serde_json::Value> =
            serde_json::from_str(&raw).context("parsing registry JSON")?;

        let registry = Self::new();
        for (mac, value) in raw_map {
            match serde_json::from_value::<Device>(value) {
                Ok(device) => {
                    registry.devices.insert(mac, device);
                }
                Err(e) => {
                    warn!(mac, error = %e, "Skipping malformed registry entry");
                }
            }
        }
        Ok(registry)
    }

    /// Same as [`Self::load`] but degrades to an empty registry rather
    /// than failing, matching the Coordinator's "missing state file is
    /// not fatal at startup" expectation.
    pub fn load_or_empty(path: &str) -> Self {
        match Self::load(path) {
            Ok(r) => r,
            Err(e) => {
                warn!(path, error = %e, "Failed to load device registry, starting empty");
                Self::new()
            }
        }
    }
}
