// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Installer that runs one install or upgrade from start to finish

use crate::arch::{HostArchitecture, provision};
use crate::config::InstallerConfig;
use crate::error::{InstallerError, Result};
use crate::fetcher::fetch;
use crate::gate::gate;
use crate::host::Host;
use crate::layout::install_layout;
use crate::prereqs::{configure_kernel_support, install_dependencies};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::release::ResolvedRelease;
use crate::request::{InstallationRequest, TunnelMode};
use crate::resolver::{ReleaseResolver, build_client};
use crate::state::SystemState;
use std::time::Duration;

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub release: ResolvedRelease,
    pub state: SystemState,
    pub reconcile: ReconcileReport,
    /// Soft failures from the stages before reconciliation
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct Installer<'a, H: Host + ?Sized> {
    config: &'a InstallerConfig,
    host: &'a H,
    client: reqwest::Client,
    install_packages: bool,
}

impl<'a, H: Host + ?Sized> Installer<'a, H> {
    pub fn new(config: &'a InstallerConfig, host: &'a H) -> Result<Self> {
        Ok(Self {
            config,
            host,
            client: build_client(config)?,
            install_packages: true,
        })
    }

    /// Leave system packages alone; kernel modules are still configured.
    #[must_use]
    pub fn skip_dependencies(mut self, skip: bool) -> Self {
        self.install_packages = !skip;
        self
    }

    pub async fn run(&self, request: &InstallationRequest) -> Result<InstallOutcome> {
        let paths = &self.config.paths;
        let mode = request.tunnel_mode;
        let mut warnings = Vec::new();

        tracing::info!(
            "Installing {} in {mode} mode (forwarding: {})",
            request.version_spec.as_deref().unwrap_or("latest release"),
            request.forward_mode
        );

        // Refuse early so an unusable host keeps its current install.
        let arch = if mode.needs_mesh_binaries() {
            let arch = HostArchitecture::detect(self.host)?;
            if arch.slug().is_none() {
                return Err(InstallerError::UnsupportedArchitecture(arch.to_string()));
            }
            Some(arch)
        } else {
            None
        };

        if self.install_packages {
            install_dependencies(self.host, &self.config.packages)?;
        } else {
            tracing::info!("Skipping system dependencies");
        }
        match mode {
            TunnelMode::L2tpv3 => {
                warnings.extend(configure_kernel_support(
                    self.host,
                    paths,
                    self.install_packages,
                )?);
            }
            TunnelMode::MeshVpn => {}
        }

        let resolver = ReleaseResolver::new(self.client.clone(), self.config);
        let release = resolver.resolve(request.version_spec.as_deref()).await?;
        let release = gate(self.config, release, mode);
        if release.reference.is_moving() {
            tracing::warn!(
                "Installing {}, which is not a fixed release; reruns may pick up newer code",
                release.reference
            );
        } else {
            tracing::info!("Installing release {}", release.reference);
        }

        fetch(&self.client, &release, &paths.install_root).await?;

        if let Some(arch) = &arch {
            provision(
                self.host,
                paths,
                arch,
                Duration::from_secs(self.config.binary_grace_secs),
            )
            .await?;
        }

        warnings.extend(install_layout(paths, mode)?);

        let state = SystemState {
            installed_version: release.reference.name().to_string(),
            tunnel_mode: mode,
            forward_mode: request.forward_mode,
        };
        state.save(paths)?;

        let reconcile = Reconciler::new(self.host, paths).reconcile(mode)?;
        for warning in &reconcile.warnings {
            tracing::warn!("{warning}");
        }
        tracing::info!(
            "VortexL2 {} installed; active units: {}",
            release.reference,
            reconcile.activated.join(", ")
        );

        Ok(InstallOutcome {
            release,
            state,
            reconcile,
            warnings,
        })
    }
}
