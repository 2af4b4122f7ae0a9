// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Configuration module for the installer

use crate::error::{InstallerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/vortexl2/installer.json";

fn default_repository() -> String {
    "iliya-Developer/VortexL2".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_archive_base_url() -> String {
    "https://github.com".to_string()
}

fn default_30() -> u64 {
    30
}

fn default_2() -> u64 {
    2
}

fn default_packages() -> Vec<String> {
    [
        "python3",
        "python3-pip",
        "python3-yaml",
        "python3-rich",
        "iproute2",
        "haproxy",
        "socat",
        "curl",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// GitHub repository in `owner/name` form
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Moving branch used when no usable tag exists
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Base URL of the releases API (overridable for testing)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL that serves tag and branch archives
    #[serde(default = "default_archive_base_url")]
    pub archive_base_url: String,

    /// Timeout applied to every HTTP request (seconds)
    #[serde(default = "default_30")]
    pub http_timeout_secs: u64,

    /// Pause after stopping mesh processes before replacing their binaries (seconds)
    #[serde(default = "default_2")]
    pub binary_grace_secs: u64,

    /// Packages that must install for the run to continue
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    #[serde(default)]
    pub paths: InstallPaths,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            branch: default_branch(),
            api_base_url: default_api_base_url(),
            archive_base_url: default_archive_base_url(),
            http_timeout_secs: 30,
            binary_grace_secs: 2,
            packages: default_packages(),
            paths: InstallPaths::default(),
        }
    }
}

/// Every host location the installer writes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallPaths {
    pub install_root: PathBuf,
    pub bin_dir: PathBuf,
    pub config_dir: PathBuf,
    pub systemd_dir: PathBuf,
    pub sysctl_dir: PathBuf,
    pub modules_load_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for InstallPaths {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/opt/vortexl2"),
            bin_dir: PathBuf::from("/usr/local/bin"),
            config_dir: PathBuf::from("/etc/vortexl2"),
            systemd_dir: PathBuf::from("/etc/systemd/system"),
            sysctl_dir: PathBuf::from("/etc/sysctl.d"),
            modules_load_dir: PathBuf::from("/etc/modules-load.d"),
            data_dir: PathBuf::from("/var/lib/vortexl2"),
            log_dir: PathBuf::from("/var/log/vortexl2"),
        }
    }
}

impl InstallPaths {
    /// All paths re-rooted under `root`, for staging and tests.
    pub fn under(root: &Path) -> Self {
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        let defaults = Self::default();
        Self {
            install_root: rebase(defaults.install_root),
            bin_dir: rebase(defaults.bin_dir),
            config_dir: rebase(defaults.config_dir),
            systemd_dir: rebase(defaults.systemd_dir),
            sysctl_dir: rebase(defaults.sysctl_dir),
            modules_load_dir: rebase(defaults.modules_load_dir),
            data_dir: rebase(defaults.data_dir),
            log_dir: rebase(defaults.log_dir),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn version_marker(&self) -> PathBuf {
        self.config_dir.join("VERSION")
    }

    pub fn modules_load_file(&self) -> PathBuf {
        self.modules_load_dir.join("vortexl2.conf")
    }
}

/// Load the installer config, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<InstallerConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| InstallerError::Config(format!("Failed to parse {}: {e}", path.display())))
    } else {
        tracing::debug!("No installer config at {}, using defaults", path.display());
        Ok(InstallerConfig::default())
    }
}
