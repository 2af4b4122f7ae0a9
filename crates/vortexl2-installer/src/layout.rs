// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Places the unpacked release onto the host: unit files, helper scripts,
//! the launcher, and the application's data directories.

use crate::catalog::static_units;
use crate::config::InstallPaths;
use crate::error::{InstallerError, Result};
use crate::request::TunnelMode;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub const LAUNCHER_NAME: &str = "vortexl2";
pub const DNS_HELPER: &str = "vortexl2-dns-check";

/// Install every file the mode needs from `paths.install_root`.
///
/// Returns soft warnings; a missing unit file aborts.
pub fn install_layout(paths: &InstallPaths, mode: TunnelMode) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    install_units(paths, mode)?;

    std::fs::create_dir_all(&paths.bin_dir)?;
    let helper = paths.install_root.join("scripts").join(DNS_HELPER);
    if helper.is_file() {
        let target = paths.bin_dir.join(DNS_HELPER);
        std::fs::copy(&helper, &target)?;
        std::fs::set_permissions(&target, Permissions::from_mode(0o755))?;
    } else {
        warnings.push(format!("DNS check helper missing from release: {}", helper.display()));
    }

    write_launcher(paths)?;

    for (dir, mode_bits) in data_dirs(paths, mode) {
        std::fs::create_dir_all(&dir)?;
        std::fs::set_permissions(&dir, Permissions::from_mode(mode_bits))?;
    }

    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    Ok(warnings)
}

fn install_units(paths: &InstallPaths, mode: TunnelMode) -> Result<()> {
    let source_dir = paths.install_root.join("systemd");
    std::fs::create_dir_all(&paths.systemd_dir)?;

    for unit in static_units(mode) {
        let source = source_dir.join(unit);
        if !source.is_file() {
            return Err(InstallerError::ArtifactIncomplete { path: source });
        }
        std::fs::copy(&source, paths.systemd_dir.join(unit))?;
        tracing::debug!("Installed unit {unit}");
    }
    Ok(())
}

fn write_launcher(paths: &InstallPaths) -> Result<PathBuf> {
    let target = paths.bin_dir.join(LAUNCHER_NAME);
    std::fs::write(&target, launcher_script(&paths.install_root))?;
    std::fs::set_permissions(&target, Permissions::from_mode(0o755))?;
    Ok(target)
}

pub fn launcher_script(install_root: &Path) -> String {
    format!(
        "#!/bin/sh\nexec python3 {}/vortexl2/main.py \"$@\"\n",
        install_root.display()
    )
}

/// Directories the application expects, with their permission bits.
pub fn data_dirs(paths: &InstallPaths, mode: TunnelMode) -> Vec<(PathBuf, u32)> {
    let tunnel_configs = match mode {
        TunnelMode::L2tpv3 => paths.config_dir.join("tunnels"),
        TunnelMode::MeshVpn => paths.config_dir.join("easytier"),
    };
    vec![
        (tunnel_configs, 0o700),
        (paths.data_dir.clone(), 0o755),
        (paths.log_dir.clone(), 0o755),
    ]
}
