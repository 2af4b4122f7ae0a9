// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! VortexL2 installer - Entry point for the install binary

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vortexl2_installer::config::DEFAULT_CONFIG_PATH;
use vortexl2_installer::host::SystemHost;
use vortexl2_installer::{
    ForwardMode, InstallationRequest, Installer, InstallerError, SystemState, TunnelMode,
    load_config,
};

#[derive(Debug, Parser)]
#[command(name = "vortexl2-install", version, about = "Install or upgrade VortexL2")]
struct Cli {
    /// Release to install, with or without the leading `v` (default: latest)
    version: Option<String>,

    /// Tunnel mode (default: the installed mode, else l2tpv3)
    #[arg(long, value_enum)]
    mode: Option<TunnelMode>,

    /// Port-forwarding backend (default: the installed one, else none)
    #[arg(long, value_enum)]
    forward_mode: Option<ForwardMode>,

    /// Installer configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Do not install system packages
    #[arg(long)]
    skip_deps: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vortexl2_installer=info")),
        )
        .init();

    let cli = Cli::parse();

    if !nix::unistd::Uid::effective().is_root() {
        return Err(InstallerError::NotRoot.into());
    }

    let config = load_config(&cli.config)?;
    let previous = SystemState::load(&config.paths)?;
    if let Some(state) = &previous {
        info!(
            "Found existing install: {} ({}, forwarding {})",
            if state.installed_version.is_empty() {
                "unknown version"
            } else {
                state.installed_version.as_str()
            },
            state.tunnel_mode,
            state.forward_mode
        );
    }

    let request =
        InstallationRequest::new(cli.mode, cli.forward_mode, cli.version, previous.as_ref());

    let host = SystemHost;
    let outcome = Installer::new(&config, &host)?
        .skip_dependencies(cli.skip_deps)
        .run(&request)
        .await?;

    for unit in &outcome.reconcile.torn_down {
        info!("Removed: {unit}");
    }
    let warnings = outcome.warnings.len() + outcome.reconcile.warnings.len();
    info!(
        "Installed {} ({} mode, forwarding {}) with {warnings} warning(s)",
        outcome.state.installed_version, outcome.state.tunnel_mode, outcome.state.forward_mode
    );
    info!("Run 'vortexl2' to manage tunnels");

    Ok(())
}
