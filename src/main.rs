use anyhow::Result;
use clap::Parser;
use lanwarden::{config::Settings, coordinator::Coordinator, oui::VendorOracle, registry::DeviceRegistry};
use tracing::info;

/// lanwarden — LAN discovery, monitoring, and ARP/NDP-based enforcement
/// for a single broadcast domain.
#[derive(Parser, Debug)]
#[command(name = "lanwarden-core", version, about)]
struct Cli {
    /// Override the autodetected network interface.
    #[arg(long)]
    interface: Option<String>,

    /// Path to the OUI vendor database (`PREFIX6:vendor` per line).
    #[arg(long, default_value = "oui.txt")]
    oui_file: String,

    /// Path to the device registry persistence file.
    #[arg(long, default_value = "registry.json")]
    registry_file: String,

    /// Path to the TOML settings file.
    #[arg(long, default_value = "settings.toml")]
    settings_file: String,

    /// Start with paranoid mode on (newly-discovered devices start blocked).
    #[arg(long)]
    paranoid: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (repeatable).
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count)]
    quiet: u8,
}

fn filter_directive(verbose: u8, quiet: u8) -> &'static str {
    let level = 2 + verbose as i16 - quiet as i16; // 0=error .. 4=trace, default info(2)
    match level {
        i16::MIN..=0 => "lanwarden=error",
        1 => "lanwarden=warn",
        2 => "lanwarden=info",
        3 => "lanwarden=debug",
        _ => "lanwarden=trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter_directive(cli.verbose, cli.quiet).into()),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting lanwarden");

    let mut settings = Settings::load_or_default(&cli.settings_file);
    if let Some(interface) = cli.interface {
        settings.interface = Some(interface);
    }
    if cli.paranoid {
        settings.paranoid_mode = true;
    }

    let vendor_oracle = VendorOracle::load_or_empty(&cli.oui_file);
    let registry = DeviceRegistry::load_or_empty(&cli.registry_file);
    registry.set_paranoid_mode(settings.paranoid_mode);

    let mut coordinator = Coordinator::new(settings);
    coordinator.registry = registry;
    coordinator.vendor_oracle = vendor_oracle;
    coordinator.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    coordinator.stop().await;
    if let Err(e) = coordinator.registry.save(&cli.registry_file) {
        tracing::warn!(error = %e, "Failed to persist device registry on shutdown");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directive_defaults_to_info() {
        assert_eq!(filter_directive(0, 0), "lanwarden=info");
    }

    #[test]
    fn verbose_flags_increase_level() {
        assert_eq!(filter_directive(1, 0), "lanwarden=debug");
        assert_eq!(filter_directive(2, 0), "lanwarden=trace");
    }

    #[test]
    fn quiet_flags_decrease_level() {
        assert_eq!(filter_directive(0, 1), "lanwarden=warn");
        assert_eq!(filter_directive(0, 2), "lanwarden=error");
    }
}
