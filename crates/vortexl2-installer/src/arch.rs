// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Host architecture detection and EasyTier binary provisioning

use crate::catalog::PEER_UNIT_GLOB;
use crate::config::InstallPaths;
use crate::error::{InstallerError, Result};
use crate::host::{Host, Systemctl};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executables shipped per architecture under `core/easytier/<slug>/`
pub const MESH_BINARIES: [&str; 2] = ["easytier-core", "easytier-cli"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostArchitecture {
    X86_64,
    Armv7,
    Aarch64,
    Unsupported(String),
}

impl HostArchitecture {
    pub fn from_machine(machine: &str) -> Self {
        match machine.trim() {
            "x86_64" | "amd64" => Self::X86_64,
            "armv7l" | "armv7" | "armhf" => Self::Armv7,
            "aarch64" | "arm64" => Self::Aarch64,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn detect<H: Host + ?Sized>(host: &H) -> Result<Self> {
        Ok(Self::from_machine(&host.machine()?))
    }

    /// Directory name of this architecture inside the release archive
    pub fn slug(&self) -> Option<&'static str> {
        match self {
            Self::X86_64 => Some("x86_64"),
            Self::Armv7 => Some("armv7"),
            Self::Aarch64 => Some("aarch64"),
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for HostArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(machine) => write!(f, "{machine}"),
            Self::X86_64 | Self::Armv7 | Self::Aarch64 => {
                f.write_str(self.slug().unwrap_or_default())
            }
        }
    }
}

/// Install the EasyTier executables for `arch` into the bin dir.
///
/// Running EasyTier processes are stopped first; replacing a busy
/// executable fails with ETXTBSY.
pub async fn provision<H: Host + ?Sized>(
    host: &H,
    paths: &InstallPaths,
    arch: &HostArchitecture,
    grace: Duration,
) -> Result<Vec<PathBuf>> {
    let slug = arch
        .slug()
        .ok_or_else(|| InstallerError::UnsupportedArchitecture(arch.to_string()))?;

    let source_dir = paths.install_root.join("core/easytier").join(slug);
    let sources = MESH_BINARIES
        .iter()
        .map(|name| {
            let path = source_dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(InstallerError::BinariesMissing {
                    arch: slug.to_string(),
                    path,
                })
            }
        })
        .collect::<Result<Vec<_>>>()?;

    stop_mesh_processes(host);
    if !grace.is_zero() {
        tracing::debug!("Waiting {}s for EasyTier processes to exit", grace.as_secs());
        tokio::time::sleep(grace).await;
    }

    std::fs::create_dir_all(&paths.bin_dir)?;
    let mut installed = Vec::with_capacity(sources.len());
    for source in &sources {
        let target = install_executable(source, &paths.bin_dir)?;
        tracing::info!("Installed {} ({slug})", target.display());
        installed.push(target);
    }

    Ok(installed)
}

/// Service stop first, then exact process names.
fn stop_mesh_processes<H: Host + ?Sized>(host: &H) {
    if let Err(e) = Systemctl::new(host).stop_matching(PEER_UNIT_GLOB) {
        tracing::debug!("Stopping EasyTier units: {e}");
    }

    for binary in MESH_BINARIES {
        match host.run("pkill", &["-x", binary]) {
            Ok(output) if output.success => tracing::info!("Killed running {binary}"),
            Ok(_) => tracing::debug!("No running {binary}"),
            Err(e) => tracing::warn!("Could not signal {binary}: {e}"),
        }
    }
}

fn install_executable(source: &Path, bin_dir: &Path) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let name = source
        .file_name()
        .ok_or_else(|| InstallerError::ArtifactIncomplete {
            path: source.to_path_buf(),
        })?;
    let target = bin_dir.join(name);

    std::fs::copy(source, &target)?;
    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
    Ok(target)
}
