//! MAC address vendor lookup (OUI — Organizationally Unique Identifier).
//!
//! Unlike a compile-time embedded database, the OUI table here is ingested
//! at startup from a plain-text file (`PREFIX6:vendor` per line, as built by
//! stripping separators from an IEEE `oui.txt` MA-L dump). The oracle is a
//! pure function once loaded: the same MAC always yields the same label.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Label returned for MACs with the locally-administered bit set.
pub const PRIVATE_RANDOM: &str = "Private/Random";

/// Label returned when no OUI entry matches.
pub const UNKNOWN: &str = "Unknown";

/// Parse a hex character to its nibble value.
fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Extract the 3-byte OUI prefix from a MAC address string.
///
/// Accepts colon-separated, dash-separated, or bare hex input — only the
/// first 6 hex digits encountered are consulted.
fn extract_oui_bytes(mac: &str) -> Option<[u8; 3]> {
    let mut buf = [0u8; 6];
    let mut count = 0usize;
    for b in mac.bytes() {
        if b.is_ascii_hexdigit() {
            if count == 6 {
                break;
            }
            buf[count] = b;
            count += 1;
        }
    }
    if count < 6 {
        return None;
    }
    Some([
        (hex_nibble(buf[0])? << 4) | hex_nibble(buf[1])?,
        (hex_nibble(buf[2])? << 4) | hex_nibble(buf[3])?,
        (hex_nibble(buf[4])? << 4) | hex_nibble(buf[5])?,
    ])
}

/// Returns `true` if the locally-administered (second-least-significant) bit
/// of the first octet is set — i.e. the MAC is very likely randomized by the
/// OS rather than assigned by a manufacturer.
fn is_locally_administered(first_octet: u8) -> bool {
    first_octet & 0b0000_0010 != 0
}

/// Parses the `PREFIX6:vendor` text format into a prefix→vendor map.
///
/// Malformed lines are skipped with a debug log line; the format is
/// tolerant by design, since the file is external build output, not a
/// format this crate controls.
fn parse_oui_text(raw: &str) -> HashMap<[u8; 3], String> {
    let mut map = HashMap::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((hex, vendor)) = line.split_once(':') else {
            debug!(lineno, "OUI line missing ':' separator, skipping");
            continue;
        };
        let Some(prefix) = extract_oui_bytes(hex) else {
            debug!(lineno, hex, "OUI line has malformed prefix, skipping");
            continue;
        };
        let vendor = vendor.trim();
        if vendor.is_empty() {
            continue;
        }
        map.insert(prefix, vendor.to_string());
    }
    map
}

/// Vendor Oracle: maps a link-layer address to a human-readable vendor
/// label. Pure and thread-safe once built — the underlying table is never
/// mutated after [`VendorOracle::load`].
#[derive(Clone)]
pub struct VendorOracle {
    table: Arc<HashMap<[u8; 3], String>>,
}

impl VendorOracle {
    /// Build an oracle with an empty table (every lookup falls back to
    /// `"Unknown"` unless the private-MAC bit is set).
    pub fn empty() -> Self {
        Self {
            table: Arc::new(HashMap::new()),
        }
    }

    /// Ingest the OUI table from a text file at startup. A missing or
    /// unreadable file is not fatal: the oracle degrades to `empty()` and
    /// logs a warning, matching the "vendor lookup never fails" contract.
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading OUI database at {path}"))?;
        let table = parse_oui_text(&raw);
        debug!(entries = table.len(), path, "Loaded OUI database");
        Ok(Self {
            table: Arc::new(table),
        })
    }

    /// Same as [`Self::load`] but never fails — a load error degrades to an
    /// empty table with a warning, which is the behavior the Coordinator
    /// wants at startup (an unreadable OUI file should not stop the engine).
    pub fn load_or_empty(path: &str) -> Self {
        match Self::load(path) {
            Ok(oracle) => oracle,
            Err(e) => {
                warn!(path, error = %e, "Failed to load OUI database, vendor lookups will report Unknown");
                Self::empty()
            }
        }
    }

    /// Resolve a vendor label for a MAC address.
    ///
    /// Second-least-significant bit of the first octet set → `"Private/Random"`
    /// without consulting the table. Otherwise a table hit returns the vendor
    /// name; a miss returns `"Unknown"`.
    pub fn lookup(&self, mac: &str) -> String {
        let Some(prefix) = extract_oui_bytes(mac) else {
            return UNKNOWN.to_string();
        };
        if is_locally_administered(prefix[0]) {
            return PRIVATE_RANDOM.to_string();
        }
        self.table
            .get(&prefix)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_entries() {
        let raw = "D83C69:Giga-Byte Technology\nB4E842:Samsung Electronics\n";
        let map = parse_oui_text(raw);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get(&[0xD8, 0x3C, 0x69]).map(String::as_str),
            Some("Giga-Byte Technology")
        );
    }

    #[test]
    fn skips_malformed_lines() {
        let raw = "not-a-valid-line\nD83C69:Giga-Byte Technology\n:novendorname\n";
        let map = parse_oui_text(raw);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn private_random_bit_detected_without_lookup() {
        let oracle = VendorOracle {
            table: Arc::new(parse_oui_text("021122:Should Not Match")),
        };
        // 02:11:22 has the locally-administered bit set on the first octet.
        assert_eq!(oracle.lookup("02:11:22:33:44:55"), PRIVATE_RANDOM);
    }

    #[test]
    fn known_vendor_lookup() {
        let oracle = VendorOracle {
            table: Arc::new(parse_oui_text("D83C69:Giga-Byte Technology\n")),
        };
        assert_eq!(oracle.lookup("d8:3c:69:ab:cd:ef"), "Giga-Byte Technology");
    }

    #[test]
    fn unknown_vendor_lookup() {
        let oracle = VendorOracle::empty();
        assert_eq!(oracle.lookup("00:11:22:33:44:55"), UNKNOWN);
    }

    #[test]
    fn accepts_dash_and_bare_formats() {
        let oracle = VendorOracle {
            table: Arc::new(parse_oui_text("D83C69:Giga-Byte Technology\n")),
        };
        assert_eq!(oracle.lookup("d8-3c-69-ab-cd-ef"), "Giga-Byte Technology");
        assert_eq!(oracle.lookup("d83c69abcdef"), "Giga-Byte Technology");
    }

    #[test]
    fn load_missing_file_degrades_to_empty() {
        let oracle = VendorOracle::load_or_empty("/nonexistent/path/oui.txt");
        assert_eq!(oracle.lookup("00:11:22:33:44:55"), UNKNOWN);
    }
}
