//! End-to-end tests across the Registry, classifier, and Settings
//! persistence boundary: real files on disk, real reload, no mocking of
//! the serialization layer. This crate has no HTTP surface (out of
//! scope, §1), so there is no live server to stand up; these tests
//! instead drive the Registry's JSON persistence and the Settings TOML
//! file the same way a real run would.

use lanwarden::classifier::{classify, ClassifyInput};
use lanwarden::config::Settings;
use lanwarden::device::DeviceCategory;
use lanwarden::registry::DeviceRegistry;

fn unique_path(name: &str) -> String {
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("lanwarden-test-{name}-{pid}-{nanos}"))
        .to_string_lossy()
        .into_owned()
}

#[test]
fn device_discovered_then_persisted_then_reloaded_keeps_classification() {
    let path = unique_path("registry");

    let registry = DeviceRegistry::new();
    let device = registry.add_or_update("192.168.1.50", "AA:BB:CC:DD:EE:FF", Some("Apple, Inc."), 1000.0);
    assert_eq!(device.vendor, "Apple, Inc.");

    let (category, confidence) = classify(&ClassifyInput {
        vendor: &device.vendor,
        hostname: "Johns-iPhone",
        services: &[],
    });
    assert_eq!(category, DeviceCategory::Mobile);
    registry.with_device_mut("AA:BB:CC:DD:EE:FF", |d| {
        d.category = category;
        d.confidence = confidence;
        d.hostname = "Johns-iPhone".to_string();
    });

    registry.save(&path).expect("save should succeed");
    let reloaded = DeviceRegistry::load(&path).expect("load should succeed");

    let reloaded_device = reloaded
        .lookup_by_mac("AA:BB:CC:DD:EE:FF")
        .expect("device should survive the roundtrip");
    assert_eq!(reloaded_device.category, DeviceCategory::Mobile);
    assert_eq!(reloaded_device.ip, "192.168.1.50");
    assert_eq!(reloaded_device.hostname, "Johns-iPhone");

    let _ = std::fs::remove_file(&path);
}

#[test]
fn paranoid_mode_setting_roundtrips_into_registry_behavior() {
    let settings_path = unique_path("settings");
    let mut settings = Settings::default();
    settings.paranoid_mode = true;
    settings.save(&settings_path).expect("save should succeed");

    let loaded = Settings::load(&settings_path).expect("load should succeed");
    assert!(loaded.paranoid_mode);

    let registry = DeviceRegistry::new();
    registry.set_paranoid_mode(loaded.paranoid_mode);
    let device = registry.add_or_update("192.168.1.99", "11:22:33:44:55:66", None, 2000.0);
    assert!(device.is_blocked, "new devices must start blocked in paranoid mode");

    let _ = std::fs::remove_file(&settings_path);
}

#[test]
fn ip_conflict_is_arbitrated_across_two_devices_sharing_an_address() {
    let registry = DeviceRegistry::new();
    let first = registry.add_or_update("192.168.1.10", "AA:AA:AA:AA:AA:AA", None, 0.0);
    assert_eq!(first.ip, "192.168.1.10");

    // Same IP claimed by a different MAC within the arbitration window: the
    // original owner keeps the address.
    let second = registry.add_or_update("192.168.1.10", "BB:BB:BB:BB:BB:BB", None, 5.0);
    assert_ne!(second.ip, "192.168.1.10");

    // Past the arbitration window, the address transfers.
    let third = registry.add_or_update("192.168.1.10", "BB:BB:BB:BB:BB:BB", None, 40.0);
    assert_eq!(third.ip, "192.168.1.10");
    let stale = registry.lookup_by_mac("AA:AA:AA:AA:AA:AA").unwrap();
    assert!(stale.ip.is_empty());
    assert_eq!(stale.last_known_ip, "192.168.1.10");
}
