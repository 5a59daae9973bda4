//! lanwarden: LAN discovery, monitoring, and ARP/NDP-based enforcement
//! for a single broadcast domain.
//!
//! The crate is organized around the three engines in §4: Discovery
//! (`discovery`), Monitor/Enforcer (`monitor`, `link`, `icmp`, `sni`), and
//! the shared Device Registry (`registry`, `device`, `classifier`,
//! `oui`). `coordinator` wires the three together and owns their
//! lifecycle; `config` and `forwarding` are the ambient plumbing around
//! them.

pub mod classifier;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod discovery;
pub mod forwarding;
pub mod icmp;
pub mod link;
pub mod monitor;
pub mod oui;
pub mod registry;
pub mod sni;
