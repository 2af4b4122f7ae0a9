// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Persisted system configuration written by a successful install

use crate::config::InstallPaths;
use crate::error::Result;
use crate::request::{ForwardMode, TunnelMode};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemState {
    /// Release reference the installed tree came from
    pub installed_version: String,
    pub tunnel_mode: TunnelMode,
    pub forward_mode: ForwardMode,
}

/// On-disk shape of the config file read by the application.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_tunnel_mode")]
    tunnel_mode: TunnelMode,
    #[serde(default)]
    forward_mode: ForwardMode,
}

// Installs that predate mode selection only knew L2TPv3.
fn default_tunnel_mode() -> TunnelMode {
    TunnelMode::L2tpv3
}

impl SystemState {
    /// State of the previous install, or `None` on a fresh host.
    pub fn load(paths: &InstallPaths) -> Result<Option<Self>> {
        let config_path = paths.state_file();
        if !config_path.exists() {
            return Ok(None);
        }

        let config: ConfigFile = toml::from_str(&std::fs::read_to_string(&config_path)?)?;
        let installed_version = match std::fs::read_to_string(paths.version_marker()) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Self {
            installed_version,
            tunnel_mode: config.tunnel_mode,
            forward_mode: config.forward_mode,
        }))
    }

    /// Replace the config file and version marker.
    pub fn save(&self, paths: &InstallPaths) -> Result<()> {
        std::fs::create_dir_all(&paths.config_dir)?;

        let config = toml::to_string(&ConfigFile {
            tunnel_mode: self.tunnel_mode,
            forward_mode: self.forward_mode,
        })?;
        write_atomic(&paths.state_file(), config.as_bytes())?;
        write_atomic(
            &paths.version_marker(),
            format!("{}\n", self.installed_version).as_bytes(),
        )?;

        tracing::debug!(
            "Saved state to {} ({}, {})",
            paths.state_file().display(),
            self.tunnel_mode,
            self.forward_mode
        );
        Ok(())
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let temp_path = path.with_extension("tmp");
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&temp_path)?;
    // Mode only applies on create; a stale tmp file keeps its old bits.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;
    Ok(())
}
