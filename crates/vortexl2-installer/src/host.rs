// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! External command seam and the systemctl wrapper built on it

use crate::error::{InstallerError, Result};
use std::collections::BTreeSet;
use std::process::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Best human-readable description of what the command printed
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Everything the installer asks of the host besides plain file I/O.
pub trait Host {
    /// Run a program to completion. `Err` only when it cannot be spawned.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Machine hardware name, as `uname -m` reports it
    fn machine(&self) -> Result<String>;

    /// Running kernel release, as `uname -r` reports it
    fn kernel_release(&self) -> Result<String>;
}

/// The real machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!("Running {program} {}", args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| InstallerError::Command {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn machine(&self) -> Result<String> {
        let uts = nix::sys::utsname::uname().map_err(std::io::Error::from)?;
        Ok(uts.machine().to_string_lossy().into_owned())
    }

    fn kernel_release(&self) -> Result<String> {
        let uts = nix::sys::utsname::uname().map_err(std::io::Error::from)?;
        Ok(uts.release().to_string_lossy().into_owned())
    }
}

/// systemd control through the host's `systemctl`.
#[derive(Debug)]
pub struct Systemctl<'h, H: Host + ?Sized> {
    host: &'h H,
}

impl<'h, H: Host + ?Sized> Systemctl<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self { host }
    }

    fn call(&self, action: &str, unit: &str) -> Result<()> {
        let output = self.host.run("systemctl", &[action, unit])?;
        if output.success {
            Ok(())
        } else {
            Err(InstallerError::Service {
                action: action.to_string(),
                unit: unit.to_string(),
                detail: output.detail(),
            })
        }
    }

    pub fn is_active(&self, unit: &str) -> Result<bool> {
        Ok(self
            .host
            .run("systemctl", &["is-active", "--quiet", unit])?
            .success)
    }

    pub fn start(&self, unit: &str) -> Result<()> {
        self.call("start", unit)
    }

    pub fn restart(&self, unit: &str) -> Result<()> {
        self.call("restart", unit)
    }

    pub fn stop(&self, unit: &str) -> Result<()> {
        self.call("stop", unit)
    }

    /// Stop every loaded unit matching a glob such as `vortexl2-easytier-*`
    pub fn stop_matching(&self, pattern: &str) -> Result<()> {
        self.call("stop", pattern)
    }

    pub fn enable(&self, unit: &str) -> Result<()> {
        self.call("enable", unit)
    }

    pub fn disable(&self, unit: &str) -> Result<()> {
        self.call("disable", unit)
    }

    pub fn daemon_reload(&self) -> Result<()> {
        let output = self.host.run("systemctl", &["daemon-reload"])?;
        if output.success {
            Ok(())
        } else {
            Err(InstallerError::Service {
                action: "daemon-reload".to_string(),
                unit: String::new(),
                detail: output.detail(),
            })
        }
    }

    /// Concrete instances of a template unit (`name@`) that systemd knows of,
    /// whether loaded or only installed. The template itself is excluded.
    pub fn instances_of(&self, template: &str) -> Result<Vec<String>> {
        let pattern = format!("{template}*");
        let mut instances = BTreeSet::new();

        for listing in ["list-units", "list-unit-files"] {
            let mut args = vec![listing, "--plain", "--no-legend", "--type=service"];
            if listing == "list-units" {
                args.push("--all");
            }
            args.push(pattern.as_str());

            let output = self.host.run("systemctl", &args)?;
            if !output.success {
                continue;
            }
            instances.extend(
                output
                    .stdout
                    .lines()
                    .filter_map(|line| line.split_whitespace().next())
                    .filter(|unit| is_instance_of(unit, template))
                    .map(str::to_string),
            );
        }

        Ok(instances.into_iter().collect())
    }
}

fn is_instance_of(unit: &str, template: &str) -> bool {
    unit.strip_prefix(template)
        .and_then(|rest| rest.strip_suffix(".service"))
        .is_some_and(|instance| !instance.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[test]
    fn test_is_instance_of() {
        assert!(is_instance_of("vortexl2-forward@8080.service", "vortexl2-forward@"));
        assert!(!is_instance_of("vortexl2-forward@.service", "vortexl2-forward@"));
        assert!(!is_instance_of("vortexl2-tunnel.service", "vortexl2-forward@"));
    }

    #[test]
    fn test_instances_union_without_template() {
        let host = FakeHost::new();
        host.add_unit("vortexl2-forward@.service", false, false);
        host.add_unit("vortexl2-forward@443.service", true, true);
        host.add_unit("vortexl2-forward@8080.service", true, false);
        host.add_unit("vortexl2-tunnel.service", true, true);

        let instances = Systemctl::new(&host)
            .instances_of("vortexl2-forward@")
            .unwrap();

        assert_eq!(
            instances,
            vec![
                "vortexl2-forward@443.service".to_string(),
                "vortexl2-forward@8080.service".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_start_is_service_error() {
        let host = FakeHost::new();
        host.fail("systemctl", "start");

        let result = Systemctl::new(&host).start("vortexl2-tunnel.service");
        assert!(matches!(
            result,
            Err(InstallerError::Service { ref action, ref unit, .. })
                if action == "start" && unit == "vortexl2-tunnel.service"
        ));
    }

    #[test]
    fn test_is_active_tracks_state() {
        let host = FakeHost::new();
        let systemctl = Systemctl::new(&host);
        assert!(!systemctl.is_active("vortexl2-tunnel.service").unwrap());

        systemctl.start("vortexl2-tunnel.service").unwrap();
        assert!(systemctl.is_active("vortexl2-tunnel.service").unwrap());

        systemctl.stop("vortexl2-tunnel.service").unwrap();
        assert!(!systemctl.is_active("vortexl2-tunnel.service").unwrap());
    }

    #[test]
    fn test_command_output_detail_prefers_stderr() {
        let output = CommandOutput {
            success: false,
            stdout: "out\n".to_string(),
            stderr: " Unit not found.\n".to_string(),
        };
        assert_eq!(output.detail(), "Unit not found.");

        let output = CommandOutput {
            success: false,
            stdout: "only stdout\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.detail(), "only stdout");
    }
}
