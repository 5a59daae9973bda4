//! Host-wide IP forwarding toggle (§4.5, §6 "OS forwarding toggle").
//!
//! Shells out to `sysctl -w` via `tokio::process::Command`, with the key
//! name switched between the Linux and BSD-family forwarding sysctls.
//! Failure to set is logged but never fatal.

use tokio::process::Command;
use tracing::warn;

#[cfg(target_os = "linux")]
const FORWARDING_KEY: &str = "net.ipv4.ip_forward";
#[cfg(not(target_os = "linux"))]
const FORWARDING_KEY: &str = "net.inet.ip.forwarding";

async fn set_forwarding(enabled: bool) {
    let value = if enabled { "1" } else { "0" };
    let assignment = format!("{FORWARDING_KEY}={value}");
    match Command::new("sysctl").arg("-w").arg(&assignment).output().await {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                assignment,
                "sysctl exited non-zero while toggling IP forwarding"
            );
        }
        Err(e) => {
            warn!(error = %e, assignment, "Failed to invoke sysctl for IP forwarding");
        }
    }
}

pub async fn enable() {
    set_forwarding(true).await;
}

pub async fn disable() {
    set_forwarding(false).await;
}
