//! Settings: the read-mostly, serializable configuration object (§6).
//!
//! A `serde` struct with `Default`, loaded from a TOML file on disk and
//! overridable by CLI flags. Default constants match the original
//! Python settings manager's values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_scan_interval() -> u64 {
    30
}

fn default_domain_log_limit() -> usize {
    20
}

/// Recognized Settings keys (§6). `interface = None` means autodetect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    #[serde(default)]
    pub paranoid_mode: bool,
    #[serde(default = "default_domain_log_limit")]
    pub domain_log_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface: None,
            scan_interval: default_scan_interval(),
            paranoid_mode: false,
            domain_log_limit: default_domain_log_limit(),
        }
    }
}

impl Settings {
    /// Active ARP sweep period, floored to 1 second per §4.4.
    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_interval.max(1))
    }

    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing settings file {path}"))
    }

    /// Degrades to defaults on any load failure — a missing settings file
    /// at first run is normal, not an error.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(path, error = %e, "Failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let toml = toml::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, toml).with_context(|| format!("writing settings file {path}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_original_constants() {
        let s = Settings::default();
        assert_eq!(s.scan_interval, 30);
        assert!(!s.paranoid_mode);
        assert_eq!(s.domain_log_limit, 20);
        assert!(s.interface.is_none());
    }

    #[test]
    fn scan_interval_floors_to_one_second() {
        let s = Settings {
            scan_interval: 0,
            ..Settings::default()
        };
        assert_eq!(s.scan_interval(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn load_missing_file_degrades_to_default() {
        let s = Settings::load_or_default("/nonexistent/path/settings.toml");
        assert_eq!(s.scan_interval, 30);
    }

    #[test]
    fn roundtrips_through_toml() {
        let s = Settings {
            interface: Some("eth0".to_string()),
            scan_interval: 45,
            paranoid_mode: true,
            domain_log_limit: 10,
        };
        let toml = toml::to_string(&s).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.interface.as_deref(), Some("eth0"));
        assert_eq!(parsed.scan_interval, 45);
        assert!(parsed.paranoid_mode);
    }
}
