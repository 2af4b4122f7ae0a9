// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Resolves a requested version into a concrete release reference

use crate::config::InstallerConfig;
use crate::error::{InstallerError, Result};
use crate::release::{ResolvedRelease, latest_release_url, tag_archive_url};
use crate::version::normalize_tag;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("vortexl2-installer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Shared HTTP client for metadata, existence checks and archive downloads.
///
/// Only connection setup and idle reads are bounded here; an archive download
/// may take as long as it keeps receiving data. Metadata requests add their
/// own total timeout.
pub fn build_client(config: &InstallerConfig) -> Result<reqwest::Client> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| InstallerError::ReleaseCheck(format!("Failed to build HTTP client: {e}")))
}

#[derive(Debug)]
pub struct ReleaseResolver<'a> {
    client: reqwest::Client,
    config: &'a InstallerConfig,
}

impl<'a> ReleaseResolver<'a> {
    pub fn new(client: reqwest::Client, config: &'a InstallerConfig) -> Self {
        Self { client, config }
    }

    /// Turn an optional version token into a release.
    ///
    /// No token means "latest release", falling back to the branch head when
    /// the latest release cannot be determined. An explicit token must name a
    /// tag that exists upstream.
    pub async fn resolve(&self, version_spec: Option<&str>) -> Result<ResolvedRelease> {
        match version_spec {
            None => match self.latest_tag().await {
                Ok(tag) => {
                    tracing::info!("Latest release is {tag}");
                    Ok(ResolvedRelease::tag(self.config, tag))
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not determine latest release ({e}), using branch head {}",
                        self.config.branch
                    );
                    Ok(ResolvedRelease::branch_head(self.config))
                }
            },
            Some(spec) => {
                let tag = normalize_tag(spec);
                self.ensure_tag_exists(&tag).await?;
                tracing::info!("Using requested release {tag}");
                Ok(ResolvedRelease::tag(self.config, tag))
            }
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.http_timeout_secs)
    }

    async fn latest_tag(&self) -> Result<String> {
        let url = latest_release_url(self.config);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| InstallerError::ReleaseCheck(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(InstallerError::ReleaseCheck(format!(
                "GitHub API returned {}",
                response.status()
            )));
        }

        let release: LatestRelease = response
            .json()
            .await
            .map_err(|e| InstallerError::ReleaseCheck(format!("Failed to parse response: {e}")))?;

        if release.tag_name.trim().is_empty() {
            return Err(InstallerError::ReleaseCheck(
                "Latest release has an empty tag".to_string(),
            ));
        }

        Ok(release.tag_name)
    }

    /// Header-only existence check against the tag archive.
    async fn ensure_tag_exists(&self, tag: &str) -> Result<()> {
        let url = tag_archive_url(self.config, tag);
        tracing::debug!("Checking {url}");

        let response = self
            .client
            .head(&url)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| InstallerError::ReleaseCheck(format!("Existence check of {tag} failed: {e}")))?;

        // Only an explicit "not here" proves absence; 403/429 are throttling.
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Err(InstallerError::VersionNotFound {
                tag: tag.to_string(),
            })
        } else {
            Err(InstallerError::ReleaseCheck(format!(
                "Existence check of {tag} returned {status}"
            )))
        }
    }
}
