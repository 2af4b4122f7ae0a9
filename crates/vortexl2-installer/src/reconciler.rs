// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Service reconciler
//!
//! Converges the host's units onto the set the requested mode needs. Runs in
//! a fixed order: legacy cleanup, retirement of the other mode's artifacts,
//! `daemon-reload`, then activation. Everything before activation is best
//! effort; only a unit that cannot be (re)started fails the run.

use crate::catalog::{
    self, CatalogEntry, LEGACY_ARTIFACTS, LegacyArtifact, TUNNEL_UNIT, desired_units,
};
use crate::config::InstallPaths;
use crate::error::Result;
use crate::host::{Host, Systemctl};
use crate::request::TunnelMode;
use std::path::Path;

/// What a reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Units enabled and (re)started, in activation order
    pub activated: Vec<String>,
    /// Units, tables and files removed or stopped
    pub torn_down: Vec<String>,
    /// Soft failures that did not stop the run
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct Reconciler<'a, H: Host + ?Sized> {
    host: &'a H,
    systemctl: Systemctl<'a, H>,
    paths: &'a InstallPaths,
}

impl<'a, H: Host + ?Sized> Reconciler<'a, H> {
    pub fn new(host: &'a H, paths: &'a InstallPaths) -> Self {
        Self {
            host,
            systemctl: Systemctl::new(host),
            paths,
        }
    }

    pub fn reconcile(&self, mode: TunnelMode) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        self.cleanup_legacy(&mut report);
        self.retire_other_mode(mode, &mut report)?;
        self.systemctl.daemon_reload()?;
        self.activate(mode, &mut report)?;

        Ok(report)
    }

    fn cleanup_legacy(&self, report: &mut ReconcileReport) {
        let mut sysctl_changed = false;

        for entry in LEGACY_ARTIFACTS {
            let CatalogEntry {
                artifact,
                retired_in,
            } = *entry;
            match artifact {
                LegacyArtifact::TemplateUnit(template) => {
                    self.remove_template(template, report);
                }
                LegacyArtifact::FirewallTable { family, name } => {
                    self.remove_table(family, name, report);
                }
                LegacyArtifact::SysctlFile(name) => {
                    let path = self.paths.sysctl_dir.join(name);
                    if remove_file(&path, report) {
                        sysctl_changed = true;
                    }
                }
            }
            tracing::debug!("Checked artifact retired in {retired_in}: {artifact:?}");
        }

        if sysctl_changed {
            match self.host.run("sysctl", &["--system"]) {
                Ok(output) if output.success => {}
                Ok(output) => report
                    .warnings
                    .push(format!("sysctl --system: {}", output.detail())),
                Err(e) => report.warnings.push(format!("sysctl --system: {e}")),
            }
        }
    }

    fn remove_template(&self, template: &str, report: &mut ReconcileReport) {
        match self.systemctl.instances_of(template) {
            Ok(instances) => {
                for instance in instances {
                    self.teardown_unit(&instance, report);
                }
            }
            Err(e) => report
                .warnings
                .push(format!("Could not list {template} instances: {e}")),
        }

        let unit = format!("{template}.service");
        let path = self.paths.systemd_dir.join(&unit);
        if path.exists() {
            if let Err(e) = self.systemctl.disable(&unit) {
                tracing::debug!("{e}");
            }
            remove_file(&path, report);
        }
    }

    fn remove_table(&self, family: &str, name: &str, report: &mut ReconcileReport) {
        match self.host.run("nft", &["delete", "table", family, name]) {
            Ok(output) if output.success => {
                tracing::info!("Removed nftables table {family} {name}");
                report.torn_down.push(format!("nft {family} {name}"));
            }
            Ok(output) => {
                let detail = output.detail();
                if detail.contains("No such file or directory") {
                    tracing::debug!("nftables table {family} {name} already absent");
                } else {
                    report
                        .warnings
                        .push(format!("nft delete table {family} {name}: {detail}"));
                }
            }
            // No nft binary means no tables either
            Err(e) => tracing::debug!("{e}"),
        }
    }

    fn retire_other_mode(&self, mode: TunnelMode, report: &mut ReconcileReport) -> Result<()> {
        match mode {
            TunnelMode::MeshVpn => {
                self.teardown_unit(TUNNEL_UNIT, report);
                for path in catalog::l2tp_only_files(self.paths) {
                    remove_file(&path, report);
                }
            }
            TunnelMode::L2tpv3 => {
                for unit in catalog::peer_units(&self.paths.systemd_dir)? {
                    self.teardown_unit(&unit, report);
                }
            }
        }
        Ok(())
    }

    /// Stop and disable, tolerating units systemd does not know.
    fn teardown_unit(&self, unit: &str, report: &mut ReconcileReport) {
        let was_active = self.systemctl.is_active(unit).unwrap_or(false);
        let stopped = self.systemctl.stop(unit);
        let disabled = self.systemctl.disable(unit);

        match (stopped, disabled) {
            (Err(stop), Err(disable)) => {
                if was_active {
                    report.warnings.push(format!("{stop}; {disable}"));
                } else {
                    tracing::debug!("{unit} not present");
                }
            }
            (Ok(()), Ok(())) => {
                tracing::info!("Tore down {unit}");
                report.torn_down.push(unit.to_string());
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                report.warnings.push(e.to_string());
                report.torn_down.push(unit.to_string());
            }
        }
    }

    fn activate(&self, mode: TunnelMode, report: &mut ReconcileReport) -> Result<()> {
        for unit in desired_units(mode, self.paths)? {
            if let Err(e) = self.systemctl.enable(&unit) {
                report.warnings.push(e.to_string());
            }

            if self.systemctl.is_active(&unit)? {
                tracing::info!("Restarting {unit}");
                self.systemctl.restart(&unit)?;
            } else {
                tracing::info!("Starting {unit}");
                self.systemctl.start(&unit)?;
            }
            report.activated.push(unit);
        }
        Ok(())
    }
}

/// `true` when the file existed and is now gone.
fn remove_file(path: &Path, report: &mut ReconcileReport) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed {}", path.display());
            report.torn_down.push(path.display().to_string());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            report
                .warnings
                .push(format!("Could not remove {}: {e}", path.display()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FORWARD_DAEMON_UNIT;
    use crate::error::InstallerError;
    use crate::testing::FakeHost;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn setup() -> (TempDir, InstallPaths) {
        let temp = TempDir::new().unwrap();
        let paths = InstallPaths::under(temp.path());
        std::fs::create_dir_all(&paths.systemd_dir).unwrap();
        std::fs::create_dir_all(&paths.sysctl_dir).unwrap();
        std::fs::create_dir_all(&paths.modules_load_dir).unwrap();
        (temp, paths)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_fresh_l2tp_host() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();

        let report = Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::L2tpv3)
            .unwrap();

        assert_eq!(report.activated, vec![TUNNEL_UNIT, FORWARD_DAEMON_UNIT]);
        assert!(report.torn_down.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(host.enabled_units(), set(&[TUNNEL_UNIT, FORWARD_DAEMON_UNIT]));
        assert_eq!(host.active_units(), set(&[TUNNEL_UNIT, FORWARD_DAEMON_UNIT]));
    }

    #[test]
    fn test_running_units_are_restarted() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        host.add_unit(TUNNEL_UNIT, true, true);

        Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::L2tpv3)
            .unwrap();

        let calls = host.calls_to("systemctl");
        assert!(calls.contains(&format!("systemctl restart {TUNNEL_UNIT}")));
        assert!(calls.contains(&format!("systemctl start {FORWARD_DAEMON_UNIT}")));
        assert!(!calls.contains(&format!("systemctl start {TUNNEL_UNIT}")));
    }

    #[test]
    fn test_daemon_reload_precedes_activation() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();

        Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::MeshVpn)
            .unwrap();

        let calls = host.calls();
        let reload = calls
            .iter()
            .position(|c| c == "systemctl daemon-reload")
            .unwrap();
        let enable = calls
            .iter()
            .position(|c| c.starts_with("systemctl enable"))
            .unwrap();
        assert!(reload < enable);
    }

    #[test]
    fn test_legacy_artifacts_removed() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        host.add_unit("vortexl2-forward@.service", false, false);
        host.add_unit("vortexl2-forward@443.service", true, true);
        host.add_unit("vortexl2-forward@8443.service", true, false);
        host.add_nft_table("inet", "vortexl2_forward");
        host.add_nft_table("ip", "vortexl2_nat");
        std::fs::write(paths.systemd_dir.join("vortexl2-forward@.service"), "").unwrap();
        std::fs::write(
            paths.sysctl_dir.join("99-vortexl2-forward.conf"),
            "net.ipv4.ip_forward=1\n",
        )
        .unwrap();

        let report = Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::L2tpv3)
            .unwrap();

        assert!(report.warnings.is_empty());
        assert!(host.nft_tables().is_empty());
        assert!(!paths.systemd_dir.join("vortexl2-forward@.service").exists());
        assert!(!paths.sysctl_dir.join("99-vortexl2-forward.conf").exists());
        for instance in ["vortexl2-forward@443.service", "vortexl2-forward@8443.service"] {
            assert_eq!(host.unit(instance).unwrap(), Default::default());
            assert!(report.torn_down.contains(&instance.to_string()));
        }
        assert_eq!(host.calls_to("sysctl"), vec!["sysctl --system".to_string()]);
    }

    #[test]
    fn test_cleanup_of_absent_artifacts_is_quiet() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();

        let report = Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::L2tpv3)
            .unwrap();

        assert!(report.warnings.is_empty());
        assert!(host.calls_to("sysctl").is_empty());
        assert_eq!(host.calls_to("nft").len(), 2);
    }

    #[test]
    fn test_switch_l2tp_to_mesh() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        std::fs::write(paths.systemd_dir.join(TUNNEL_UNIT), "[Unit]\n").unwrap();
        std::fs::write(paths.modules_load_file(), "l2tp_core\n").unwrap();
        Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::L2tpv3)
            .unwrap();
        std::fs::write(
            paths.systemd_dir.join("vortexl2-easytier-iran.service"),
            "[Unit]\n",
        )
        .unwrap();

        let report = Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::MeshVpn)
            .unwrap();

        assert!(report.torn_down.contains(&TUNNEL_UNIT.to_string()));
        assert!(!paths.systemd_dir.join(TUNNEL_UNIT).exists());
        assert!(!paths.modules_load_file().exists());
        let expected = set(&[FORWARD_DAEMON_UNIT, "vortexl2-easytier-iran.service"]);
        assert_eq!(host.enabled_units(), expected);
        assert_eq!(host.active_units(), expected);
    }

    #[test]
    fn test_switch_mesh_to_l2tp_keeps_peer_files() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        let peer = "vortexl2-easytier-iran.service";
        std::fs::write(paths.systemd_dir.join(peer), "[Unit]\n").unwrap();
        host.add_unit(peer, true, true);

        let report = Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::L2tpv3)
            .unwrap();

        assert_eq!(report.torn_down, vec![peer.to_string()]);
        assert_eq!(host.unit(peer).unwrap(), Default::default());
        assert!(paths.systemd_dir.join(peer).exists());
        assert_eq!(host.active_units(), set(&[TUNNEL_UNIT, FORWARD_DAEMON_UNIT]));
    }

    #[test]
    fn test_enable_failure_is_soft() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        host.fail("systemctl", "enable");

        let report = Reconciler::new(&host, &paths)
            .reconcile(TunnelMode::MeshVpn)
            .unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.activated, vec![FORWARD_DAEMON_UNIT]);
        assert_eq!(host.active_units(), set(&[FORWARD_DAEMON_UNIT]));
    }

    #[test]
    fn test_start_failure_is_fatal() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        host.fail("systemctl", "start");

        let result = Reconciler::new(&host, &paths).reconcile(TunnelMode::L2tpv3);

        assert!(matches!(
            result,
            Err(InstallerError::Service { ref action, .. }) if action == "start"
        ));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (_temp, paths) = setup();
        let host = FakeHost::new();
        let reconciler = Reconciler::new(&host, &paths);

        let first = reconciler.reconcile(TunnelMode::L2tpv3).unwrap();
        let enabled = host.enabled_units();
        let active = host.active_units();
        let second = reconciler.reconcile(TunnelMode::L2tpv3).unwrap();

        assert_eq!(first.activated, second.activated);
        assert!(second.torn_down.is_empty());
        assert_eq!(host.enabled_units(), enabled);
        assert_eq!(host.active_units(), active);
    }
}
