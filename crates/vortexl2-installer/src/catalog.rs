// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Catalog of every host artifact VortexL2 releases have created
//!
//! Cleanup is driven by this data instead of guessing at unit names. When a
//! release retires an artifact, add it to [`LEGACY_ARTIFACTS`] with the
//! release that dropped it.

use crate::config::InstallPaths;
use crate::request::TunnelMode;
use std::path::{Path, PathBuf};

pub const TUNNEL_UNIT: &str = "vortexl2-tunnel.service";
pub const FORWARD_DAEMON_UNIT: &str = "vortexl2-forward-daemon.service";

/// Per-peer EasyTier units are named `vortexl2-easytier-<tunnel>.service`.
pub const PEER_UNIT_PREFIX: &str = "vortexl2-easytier-";
pub const PEER_UNIT_GLOB: &str = "vortexl2-easytier-*.service";

pub const L2TP_MODULES: [&str; 3] = ["l2tp_core", "l2tp_netlink", "l2tp_eth"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyArtifact {
    /// Template unit `name@.service` plus every instance of it
    TemplateUnit(&'static str),
    /// nftables table, by family and name
    FirewallTable {
        family: &'static str,
        name: &'static str,
    },
    /// File under `/etc/sysctl.d`
    SysctlFile(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub artifact: LegacyArtifact,
    /// First release that no longer creates it
    pub retired_in: &'static str,
}

/// Socat-per-port forwarding, replaced by the forward daemon.
pub const LEGACY_ARTIFACTS: &[CatalogEntry] = &[
    CatalogEntry {
        artifact: LegacyArtifact::TemplateUnit("vortexl2-forward@"),
        retired_in: "v3.0.0",
    },
    CatalogEntry {
        artifact: LegacyArtifact::FirewallTable {
            family: "inet",
            name: "vortexl2_forward",
        },
        retired_in: "v3.0.0",
    },
    CatalogEntry {
        artifact: LegacyArtifact::FirewallTable {
            family: "ip",
            name: "vortexl2_nat",
        },
        retired_in: "v3.0.0",
    },
    CatalogEntry {
        artifact: LegacyArtifact::SysctlFile("99-vortexl2-forward.conf"),
        retired_in: "v3.0.0",
    },
];

/// Unit files shipped under `systemd/` in the release archive for a mode.
pub fn static_units(mode: TunnelMode) -> &'static [&'static str] {
    match mode {
        TunnelMode::L2tpv3 => &[TUNNEL_UNIT, FORWARD_DAEMON_UNIT],
        TunnelMode::MeshVpn => &[FORWARD_DAEMON_UNIT],
    }
}

/// Previously configured EasyTier peer units present in `systemd_dir`.
pub fn peer_units(systemd_dir: &Path) -> std::io::Result<Vec<String>> {
    if !systemd_dir.exists() {
        return Ok(Vec::new());
    }

    let mut units: Vec<String> = std::fs::read_dir(systemd_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_peer_unit(name))
        .collect();
    units.sort();
    Ok(units)
}

pub fn is_peer_unit(name: &str) -> bool {
    name.strip_prefix(PEER_UNIT_PREFIX)
        .and_then(|rest| rest.strip_suffix(".service"))
        .is_some_and(|peer| !peer.is_empty())
}

/// Unit names the finished run leaves enabled and active.
pub fn desired_units(mode: TunnelMode, paths: &InstallPaths) -> std::io::Result<Vec<String>> {
    let mut units: Vec<String> = static_units(mode).iter().map(|u| (*u).to_string()).collect();
    match mode {
        TunnelMode::L2tpv3 => {}
        TunnelMode::MeshVpn => units.extend(peer_units(&paths.systemd_dir)?),
    }
    Ok(units)
}

/// Files that only exist while L2TPv3 mode is installed.
pub fn l2tp_only_files(paths: &InstallPaths) -> Vec<PathBuf> {
    vec![
        paths.systemd_dir.join(TUNNEL_UNIT),
        paths.modules_load_file(),
    ]
}
