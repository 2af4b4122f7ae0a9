// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Compatibility gate between the resolved release and the tunnel mode

use crate::config::InstallerConfig;
use crate::release::ResolvedRelease;
use crate::request::TunnelMode;

/// Make sure the release can run the requested mode.
///
/// A release too old for mesh mode is replaced by the branch head instead of
/// failing the run. L2TPv3 accepts any release.
pub fn gate(
    config: &InstallerConfig,
    release: ResolvedRelease,
    mode: TunnelMode,
) -> ResolvedRelease {
    match mode {
        TunnelMode::L2tpv3 => release,
        TunnelMode::MeshVpn if release.supports_mesh_mode => release,
        TunnelMode::MeshVpn => {
            tracing::warn!(
                "Release {} does not support EasyTier mode, installing {} branch head instead",
                release.reference,
                config.branch
            );
            ResolvedRelease::branch_head(config)
        }
    }
}
