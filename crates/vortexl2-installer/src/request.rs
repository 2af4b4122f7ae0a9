// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Tunnel modes and the per-run installation request

use crate::state::SystemState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overlay the installed application drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum TunnelMode {
    /// Kernel Ethernet-over-IP tunnels
    #[serde(rename = "l2tpv3")]
    #[value(name = "l2tpv3", alias = "l2tp")]
    L2tpv3,
    /// EasyTier peer-to-peer mesh
    #[serde(rename = "easytier")]
    #[value(name = "easytier", alias = "mesh")]
    MeshVpn,
}

impl TunnelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L2tpv3 => "l2tpv3",
            Self::MeshVpn => "easytier",
        }
    }

    /// Mesh mode ships architecture-specific executables.
    pub fn needs_mesh_binaries(self) -> bool {
        match self {
            Self::L2tpv3 => false,
            Self::MeshVpn => true,
        }
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port-forwarding backend used by the forward daemon.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    #[default]
    None,
    Haproxy,
    Socat,
}

impl ForwardMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Haproxy => "haproxy",
            Self::Socat => "socat",
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRequest {
    pub tunnel_mode: TunnelMode,
    pub forward_mode: ForwardMode,
    pub version_spec: Option<String>,
}

impl InstallationRequest {
    /// Build the request from operator input.
    ///
    /// Modes that were not given explicitly are taken from the state of the
    /// previous install, so a bare re-run keeps the host's configuration.
    pub fn new(
        tunnel_mode: Option<TunnelMode>,
        forward_mode: Option<ForwardMode>,
        version_spec: Option<String>,
        previous: Option<&SystemState>,
    ) -> Self {
        let version_spec = version_spec
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            tunnel_mode: tunnel_mode
                .or(previous.map(|s| s.tunnel_mode))
                .unwrap_or(TunnelMode::L2tpv3),
            forward_mode: forward_mode
                .or(previous.map(|s| s.forward_mode))
                .unwrap_or_default(),
            version_spec,
        }
    }
}
