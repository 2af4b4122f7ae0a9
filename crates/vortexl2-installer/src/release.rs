// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Release references and their archive locations

use crate::config::InstallerConfig;
use crate::version::tag_supports_mesh;
use std::fmt;

/// What the installer will download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseRef {
    /// A published tag, e.g. "v4.1.0"
    Tag(String),
    /// Head of a moving branch, always assumed current
    BranchHead(String),
}

impl ReleaseRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Tag(tag) => tag,
            Self::BranchHead(branch) => branch,
        }
    }

    pub fn is_moving(&self) -> bool {
        matches!(self, Self::BranchHead(_))
    }
}

impl fmt::Display for ReleaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::BranchHead(branch) => write!(f, "{branch} (branch head)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub reference: ReleaseRef,
    pub download_url: String,
    pub supports_mesh_mode: bool,
}

impl ResolvedRelease {
    pub fn tag(config: &InstallerConfig, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            download_url: tag_archive_url(config, &tag),
            supports_mesh_mode: tag_supports_mesh(&tag),
            reference: ReleaseRef::Tag(tag),
        }
    }

    pub fn branch_head(config: &InstallerConfig) -> Self {
        Self {
            reference: ReleaseRef::BranchHead(config.branch.clone()),
            download_url: branch_archive_url(config, &config.branch),
            supports_mesh_mode: true,
        }
    }
}

pub fn tag_archive_url(config: &InstallerConfig, tag: &str) -> String {
    format!(
        "{}/{}/archive/refs/tags/{tag}.tar.gz",
        config.archive_base_url.trim_end_matches('/'),
        config.repository
    )
}

pub fn branch_archive_url(config: &InstallerConfig, branch: &str) -> String {
    format!(
        "{}/{}/archive/refs/heads/{branch}.tar.gz",
        config.archive_base_url.trim_end_matches('/'),
        config.repository
    )
}

pub fn latest_release_url(config: &InstallerConfig) -> String {
    format!(
        "{}/repos/{}/releases/latest",
        config.api_base_url.trim_end_matches('/'),
        config.repository
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_urls() {
        let config = InstallerConfig::default();
        assert_eq!(
            tag_archive_url(&config, "v5.1.0"),
            "https://github.com/iliya-Developer/VortexL2/archive/refs/tags/v5.1.0.tar.gz"
        );
        assert_eq!(
            branch_archive_url(&config, "main"),
            "https://github.com/iliya-Developer/VortexL2/archive/refs/heads/main.tar.gz"
        );
        assert_eq!(
            latest_release_url(&config),
            "https://api.github.com/repos/iliya-Developer/VortexL2/releases/latest"
        );
    }

    #[test]
    fn test_trailing_slash_in_base() {
        let config = InstallerConfig {
            archive_base_url: "http://127.0.0.1:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            tag_archive_url(&config, "v1.0.0"),
            "http://127.0.0.1:9000/iliya-Developer/VortexL2/archive/refs/tags/v1.0.0.tar.gz"
        );
    }

    #[test]
    fn test_tag_release_mesh_support() {
        let config = InstallerConfig::default();
        assert!(!ResolvedRelease::tag(&config, "v3.2.0").supports_mesh_mode);
        assert!(ResolvedRelease::tag(&config, "v4.0.0").supports_mesh_mode);
        assert!(!ResolvedRelease::tag(&config, "nightly").supports_mesh_mode);
    }

    #[test]
    fn test_branch_head() {
        let release = ResolvedRelease::branch_head(&InstallerConfig::default());
        assert_eq!(release.reference, ReleaseRef::BranchHead("main".to_string()));
        assert!(release.reference.is_moving());
        assert!(release.supports_mesh_mode);
        assert!(release.download_url.ends_with("/refs/heads/main.tar.gz"));
    }
}
