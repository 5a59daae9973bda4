//! The Device record: one entry per observed link-layer address.

use serde::{Deserialize, Serialize};

/// Ceiling for the `services` list (§3 invariant).
pub const MAX_SERVICES: usize = 10;
/// Default ceiling for the `domains` list; overridable via Settings'
/// `domain_log_limit`.
pub const DEFAULT_MAX_DOMAINS: usize = 20;
/// How many per-second rate samples to retain in `history_up`/`history_down`.
pub const MAX_HISTORY: usize = 60;

/// Closed classification enumeration produced by the Classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceCategory {
    #[default]
    #[serde(rename = "Unknown")]
    Unknown,
    #[serde(rename = "Mobile")]
    Mobile,
    #[serde(rename = "PC/Laptop")]
    Pc,
    #[serde(rename = "Router")]
    Router,
    #[serde(rename = "IoT/Smart Home")]
    Iot,
    #[serde(rename = "Media")]
    Media,
    #[serde(rename = "Server")]
    Server,
    #[serde(rename = "Printer")]
    Printer,
}

/// One observed host, keyed externally by `mac`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub last_known_ip: String,
    #[serde(default)]
    pub ipv6: Option<String>,
    #[serde(default = "unknown_vendor")]
    pub vendor: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub category: DeviceCategory,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub os_guess: String,
    #[serde(default)]
    pub open_ports: Vec<u16>,
    #[serde(default)]
    pub total_up: u64,
    #[serde(default)]
    pub total_down: u64,
    #[serde(default)]
    pub history_up: Vec<f64>,
    #[serde(default)]
    pub history_down: Vec<f64>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub last_sni: String,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub schedule_start: String,
    #[serde(default)]
    pub schedule_end: String,
    #[serde(default)]
    pub last_seen: f64,
}

fn unknown_vendor() -> String {
    crate::oui::UNKNOWN.to_string()
}

impl Device {
    /// Construct a freshly-discovered Device for `mac`, with no IP yet
    /// assigned (the Registry fills `ip`/`last_known_ip` after conflict
    /// arbitration).
    pub fn new(mac: impl Into<String>, now: f64) -> Self {
        Self {
            mac: mac.into(),
            ip: String::new(),
            last_known_ip: String::new(),
            ipv6: None,
            vendor: unknown_vendor(),
            hostname: String::new(),
            services: Vec::new(),
            category: DeviceCategory::Unknown,
            confidence: 0,
            os_guess: String::new(),
            open_ports: Vec::new(),
            total_up: 0,
            total_down: 0,
            history_up: Vec::new(),
            history_down: Vec::new(),
            domains: Vec::new(),
            last_sni: String::new(),
            is_blocked: false,
            schedule_start: String::new(),
            schedule_end: String::new(),
            last_seen: now,
        }
    }

    /// Append to a bounded, order-preserving, duplicate-free list, dropping
    /// the oldest entry on overflow. Used for both `services` and `domains`.
    fn push_bounded(list: &mut Vec<String>, value: String, cap: usize) {
        if value.is_empty() || list.iter().any(|v| v == &value) {
            return;
        }
        list.push(value);
        if list.len() > cap {
            list.remove(0);
        }
    }

    pub fn add_service(&mut self, service: impl Into<String>) {
        Self::push_bounded(&mut self.services, service.into(), MAX_SERVICES);
    }

    /// Record a seen domain (SNI or DNS QNAME), updating `last_sni` and the
    /// bounded `domains` list. `cap` comes from Settings' `domain_log_limit`.
    pub fn record_domain(&mut self, domain: impl Into<String>, cap: usize) {
        let domain = domain.into();
        if domain.is_empty() {
            return;
        }
        self.last_sni = domain.clone();
        Self::push_bounded(&mut self.domains, domain, cap);
    }

    /// Roll a one-second accounting sample into the bounded rate history.
    pub fn push_history(&mut self, up_bytes_per_sec: f64, down_bytes_per_sec: f64) {
        self.history_up.push(up_bytes_per_sec);
        if self.history_up.len() > MAX_HISTORY {
            self.history_up.remove(0);
        }
        self.history_down.push(down_bytes_per_sec);
        if self.history_down.len() > MAX_HISTORY {
            self.history_down.remove(0);
        }
    }

    /// Evaluate the schedule window (spec §4.5.1 item 3) against a `"HH:MM"`
    /// wall-clock string. Empty start/end means "no schedule" (never
    /// blocks on this basis).
    pub fn in_schedule_window(&self, now_hhmm: &str) -> bool {
        if self.schedule_start.is_empty() || self.schedule_end.is_empty() {
            return false;
        }
        let (start, end) = (self.schedule_start.as_str(), self.schedule_end.as_str());
        if start < end {
            start <= now_hhmm && now_hhmm < end
        } else {
            // Overnight wrap: e.g. 22:00-06:00.
            now_hhmm >= start || now_hhmm < end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_services_drop_oldest_and_dedupe() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        for i in 0..12 {
            d.add_service(format!("svc{i}"));
        }
        assert_eq!(d.services.len(), MAX_SERVICES);
        assert_eq!(d.services.first().unwrap(), "svc2");
        assert_eq!(d.services.last().unwrap(), "svc11");

        d.add_service("svc11");
        assert_eq!(d.services.len(), MAX_SERVICES, "duplicate must be rejected");
    }

    #[test]
    fn record_domain_updates_last_sni_and_caps() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        for i in 0..25 {
            d.record_domain(format!("host{i}.example.com"), DEFAULT_MAX_DOMAINS);
        }
        assert_eq!(d.domains.len(), DEFAULT_MAX_DOMAINS);
        assert_eq!(d.last_sni, "host24.example.com");
        assert_eq!(d.domains.first().unwrap(), "host5.example.com");
    }

    #[test]
    fn schedule_simple_window() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        d.schedule_start = "14:00".into();
        d.schedule_end = "16:00".into();
        assert!(!d.in_schedule_window("13:59"));
        assert!(d.in_schedule_window("14:00"));
        assert!(d.in_schedule_window("15:59"));
        assert!(!d.in_schedule_window("16:00"));
    }

    #[test]
    fn schedule_overnight_window() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        d.schedule_start = "22:00".into();
        d.schedule_end = "06:00".into();
        assert!(d.in_schedule_window("23:00"));
        assert!(d.in_schedule_window("05:00"));
        assert!(!d.in_schedule_window("12:00"));
        assert!(d.in_schedule_window("22:00"));
        assert!(!d.in_schedule_window("06:00"));
    }

    #[test]
    fn empty_schedule_never_blocks() {
        let d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        assert!(!d.in_schedule_window("12:00"));
    }

    #[test]
    fn history_rolls_over_cap() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff", 0.0);
        for i in 0..70 {
            d.push_history(i as f64, i as f64 * 2.0);
        }
        assert_eq!(d.history_up.len(), MAX_HISTORY);
        assert_eq!(d.history_down.len(), MAX_HISTORY);
        assert_eq!(*d.history_up.last().unwrap(), 69.0);
    }

    #[test]
    fn serde_roundtrip_with_missing_keys_uses_defaults() {
        let json = r#"{"mac":"aa:bb:cc:dd:ee:ff"}"#;
        let d: Device = serde_json::from_str(json).expect("tolerant deserialize");
        assert_eq!(d.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(d.vendor, "Unknown");
        assert_eq!(d.total_up, 0);
        assert!(d.services.is_empty());
    }

    #[test]
    fn category_serializes_to_original_vocabulary() {
        let s = serde_json::to_string(&DeviceCategory::Pc).unwrap();
        assert_eq!(s, "\"PC/Laptop\"");
        let s = serde_json::to_string(&DeviceCategory::Iot).unwrap();
        assert_eq!(s, "\"IoT/Smart Home\"");
    }
}
