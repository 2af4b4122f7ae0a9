// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Error types for the installer crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("state parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("version {tag} does not exist upstream")]
    VersionNotFound { tag: String },

    #[error("release check failed: {0}")]
    ReleaseCheck(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("unsupported architecture: {0} (supported: x86_64, armv7, aarch64)")]
    UnsupportedArchitecture(String),

    #[error("release is missing {arch} binary at {}", path.display())]
    BinariesMissing { arch: String, path: PathBuf },

    #[error("release archive is missing {}", path.display())]
    ArtifactIncomplete { path: PathBuf },

    #[error("failed to install system dependencies: {0}")]
    Dependencies(String),

    #[error("failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("systemctl {action} {unit} failed: {detail}")]
    Service {
        action: String,
        unit: String,
        detail: String,
    },

    #[error("the installer must be run as root")]
    NotRoot,
}

pub type Result<T> = std::result::Result<T, InstallerError>;
