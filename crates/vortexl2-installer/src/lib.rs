// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! VortexL2 installer
//!
//! Resolves a VortexL2 release, unpacks it into the installation root,
//! provisions EasyTier binaries when mesh mode is requested, and converges
//! the host's systemd units onto the requested tunnel mode. Safe to re-run:
//! every run wipes and reinstalls the application tree and reconciles
//! service state from scratch.

pub mod arch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod host;
pub mod layout;
pub mod pipeline;
pub mod prereqs;
pub mod reconciler;
pub mod release;
pub mod request;
pub mod resolver;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod version;

pub use config::{InstallPaths, InstallerConfig, load_config};
pub use error::{InstallerError, Result};
pub use pipeline::{InstallOutcome, Installer};
pub use reconciler::ReconcileReport;
pub use request::{ForwardMode, InstallationRequest, TunnelMode};
pub use state::SystemState;
