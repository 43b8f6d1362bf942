use std::path::Path;

use crate::host::on_path;
use crate::process::{self, RunResult};
use crate::util::Error;

/// The package manager family detected on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    /// Probes `PATH` for `apt-get`, then `yum`. Returns `None` if neither is found.
    pub fn detect() -> Option<Self> {
        if on_path("apt-get") {
            Some(Self::Apt)
        } else if on_path("yum") {
            Some(Self::Yum)
        } else {
            None
        }
    }

    /// Formats `name` with the package manager's pinned-version suffix
    /// convention (`name=VER-00` for apt, `name-VER-0` for yum).
    pub fn version_suffixed(&self, name: &str, version: &str) -> String {
        match self {
            Self::Apt => format!("{name}={version}-00"),
            Self::Yum => format!("{name}-{version}-0"),
        }
    }

    /// Refreshes the package index. A no-op for yum, which has no separate
    /// cache-update step ahead of `install --downloadonly`.
    pub async fn refresh(&self, step: &str, log_sink: &Path) -> Result<(), Error> {
        match self {
            Self::Apt => {
                process::must_run(step, &["apt-get", "update"], log_sink).await?;
                Ok(())
            }
            Self::Yum => Ok(()),
        }
    }

    /// Downloads (but does not install) the given already-version-suffixed
    /// package names. The exit status is checked for both managers.
    pub async fn download(
        &self,
        step: &str,
        packages: &[String],
        log_sink: &Path,
    ) -> Result<RunResult, Error> {
        let names: Vec<&str> = packages.iter().map(String::as_str).collect();
        match self {
            Self::Apt => {
                let mut argv = vec!["apt-get", "download"];
                argv.extend(names);
                process::must_run(step, &argv, log_sink).await
            }
            Self::Yum => {
                let mut argv = vec!["yum", "install", "--downloadonly", "-y"];
                argv.extend(names);
                process::must_run(step, &argv, log_sink).await
            }
        }
    }

    /// Installs the given already-version-suffixed package names.
    pub async fn install(
        &self,
        step: &str,
        packages: &[String],
        log_sink: &Path,
    ) -> Result<RunResult, Error> {
        let names: Vec<&str> = packages.iter().map(String::as_str).collect();
        match self {
            Self::Apt => {
                let mut argv = vec!["apt-get", "install", "-y", "--allow-change-held-packages"];
                argv.extend(names);
                process::must_run(step, &argv, log_sink).await
            }
            Self::Yum => {
                let mut argv = vec!["yum", "install", "-y"];
                argv.extend(names);
                process::must_run(step, &argv, log_sink).await
            }
        }
    }

    /// Updates `containerd.io` to the latest available version for this manager.
    pub async fn update_containerd(&self, step: &str, log_sink: &Path) -> Result<RunResult, Error> {
        match self {
            Self::Apt => {
                process::must_run(
                    step,
                    &["apt-get", "install", "-y", "--allow-change-held-packages", "containerd.io"],
                    log_sink,
                )
                .await
            }
            Self::Yum => process::must_run(step, &["yum", "update", "-y", "containerd.io"], log_sink).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apt_version_suffix_matches_dpkg_convention() {
        assert_eq!(
            PackageManager::Apt.version_suffixed("kubeadm", "1.29.4"),
            "kubeadm=1.29.4-00"
        );
    }

    #[test]
    fn yum_version_suffix_matches_rpm_convention() {
        assert_eq!(
            PackageManager::Yum.version_suffixed("kubeadm", "1.29.4"),
            "kubeadm-1.29.4-0"
        );
    }
}
