// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! System packages and L2TPv3 kernel support

use crate::catalog::L2TP_MODULES;
use crate::config::InstallPaths;
use crate::error::{InstallerError, Result};
use crate::host::Host;

/// Install the packages the application cannot run without.
pub fn install_dependencies<H: Host + ?Sized>(host: &H, packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }

    tracing::info!("Installing system dependencies: {}", packages.join(" "));
    let update = host.run("apt-get", &["update"])?;
    if !update.success {
        return Err(InstallerError::Dependencies(format!(
            "apt-get update: {}",
            update.detail()
        )));
    }

    let mut args = vec!["install", "-y"];
    args.extend(packages.iter().map(String::as_str));
    let install = host.run("apt-get", &args)?;
    if !install.success {
        return Err(InstallerError::Dependencies(format!(
            "apt-get install: {}",
            install.detail()
        )));
    }

    Ok(())
}

/// Extra modules package and module loading for the running kernel.
///
/// Every step except the boot file is soft: the modules are often built in
/// or already present. Returned strings are the warnings raised.
pub fn configure_kernel_support<H: Host + ?Sized>(
    host: &H,
    paths: &InstallPaths,
    install_packages: bool,
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if install_packages {
        let package = format!("linux-modules-extra-{}", host.kernel_release()?.trim());
        match host.run("apt-get", &["install", "-y", package.as_str()]) {
            Ok(output) if output.success => tracing::info!("Installed {package}"),
            Ok(output) => {
                warnings.push(format!("{package} not installed: {}", output.detail()));
            }
            Err(e) => warnings.push(format!("{package} not installed: {e}")),
        }
    }

    for module in L2TP_MODULES {
        match host.run("modprobe", &[module]) {
            Ok(output) if output.success => tracing::debug!("Loaded {module}"),
            Ok(output) => warnings.push(format!("modprobe {module}: {}", output.detail())),
            Err(e) => warnings.push(format!("modprobe {module}: {e}")),
        }
    }

    std::fs::create_dir_all(&paths.modules_load_dir)?;
    let mut content = L2TP_MODULES.join("\n");
    content.push('\n');
    std::fs::write(paths.modules_load_file(), content)?;

    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use tempfile::TempDir;

    fn packages() -> Vec<String> {
        vec!["python3".to_string(), "iproute2".to_string()]
    }

    #[test]
    fn test_update_then_install() {
        let host = FakeHost::new();
        install_dependencies(&host, &packages()).unwrap();

        assert_eq!(
            host.calls(),
            vec![
                "apt-get update".to_string(),
                "apt-get install -y python3 iproute2".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_install_is_fatal() {
        let host = FakeHost::new();
        host.fail("apt-get", "install");

        assert!(matches!(
            install_dependencies(&host, &packages()),
            Err(InstallerError::Dependencies(_))
        ));
    }

    #[test]
    fn test_failed_update_stops_before_install() {
        let host = FakeHost::new();
        host.fail("apt-get", "update");

        assert!(install_dependencies(&host, &packages()).is_err());
        assert_eq!(host.calls_to("apt-get").len(), 1);
    }

    #[test]
    fn test_kernel_support_writes_boot_file() {
        let temp = TempDir::new().unwrap();
        let paths = InstallPaths::under(temp.path());
        let host = FakeHost::new();

        let warnings = configure_kernel_support(&host, &paths, true).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(
            std::fs::read_to_string(paths.modules_load_file()).unwrap(),
            "l2tp_core\nl2tp_netlink\nl2tp_eth\n"
        );
        assert!(
            host.calls()
                .contains(&"apt-get install -y linux-modules-extra-6.1.0-18-amd64".to_string())
        );
        assert_eq!(host.calls_to("modprobe").len(), 3);
    }

    #[test]
    fn test_kernel_package_failure_is_soft() {
        let temp = TempDir::new().unwrap();
        let paths = InstallPaths::under(temp.path());
        let host = FakeHost::new();
        host.fail("apt-get", "install");
        host.fail("modprobe", "l2tp_eth");

        let warnings = configure_kernel_support(&host, &paths, true).unwrap();

        assert_eq!(warnings.len(), 2);
        assert!(paths.modules_load_file().exists());
    }

    #[test]
    fn test_skip_packages_still_loads_modules() {
        let temp = TempDir::new().unwrap();
        let paths = InstallPaths::under(temp.path());
        let host = FakeHost::new();

        configure_kernel_support(&host, &paths, false).unwrap();

        assert!(host.calls_to("apt-get").is_empty());
        assert_eq!(host.calls_to("modprobe").len(), 3);
    }
}
