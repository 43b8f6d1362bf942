use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;

use crate::context::AgentContext;
use crate::host::package::PackageManager;
use crate::host::service::Service;
use crate::process;
use crate::store::{OperationMetadata, OperationStore};
use crate::util::Error;

const VERIFY_NODE_DEADLINE: Duration = Duration::from_secs(300);
const VERIFY_NODE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const RESTART_KUBELET_SETTLE: Duration = Duration::from_secs(15);
const UPGRADE_CONTAINERD_SETTLE: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: &str = "--timeout=300s";

fn require_package_manager(step: &str) -> Result<PackageManager, Error> {
    PackageManager::detect()
        .ok_or_else(|| Error::UnsupportedHost(format!("no supported package manager found for step `{step}`")))
}

fn versioned(pm: PackageManager, version: &str, names: &[&str]) -> Vec<String> {
    names.iter().map(|n| pm.version_suffixed(n, version)).collect()
}

pub async fn download_packages(_ctx: &AgentContext, dir: &Path, metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "download-packages");
    let pm = require_package_manager("download-packages")?;
    pm.refresh("download-packages", &log).await?;
    let packages = versioned(pm, &metadata.target_version, &["kubeadm", "kubelet", "kubectl"]);
    pm.download("download-packages", &packages, &log).await?;
    Ok(())
}

pub async fn upgrade_kubeadm(_ctx: &AgentContext, dir: &Path, metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "upgrade-kubeadm");
    let pm = require_package_manager("upgrade-kubeadm")?;
    let packages = versioned(pm, &metadata.target_version, &["kubeadm"]);
    pm.install("upgrade-kubeadm", &packages, &log).await?;
    let result = process::run(&["kubeadm", "version", "-o", "short"], &log).await?;
    tracing::info!(version = %result.stdout, "kubeadm upgraded");
    Ok(())
}

pub async fn kubeadm_upgrade(_ctx: &AgentContext, dir: &Path, metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "kubeadm-upgrade");
    let target = format!("v{}", metadata.target_version);
    // Advisory only — its exit status isn't checked, matching `kubeadm upgrade apply`'s own plan preview.
    process::run(&["kubeadm", "upgrade", "plan", &target], &log).await?;
    process::must_run(
        "kubeadm-upgrade",
        &["kubeadm", "upgrade", "apply", &target, "-y", "--force"],
        &log,
    )
    .await?;
    Ok(())
}

pub async fn kubeadm_upgrade_node(_ctx: &AgentContext, dir: &Path, _metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "kubeadm-upgrade-node");
    process::must_run("kubeadm-upgrade-node", &["kubeadm", "upgrade", "node"], &log).await?;
    Ok(())
}

pub async fn upgrade_kubelet(_ctx: &AgentContext, dir: &Path, metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "upgrade-kubelet");
    let pm = require_package_manager("upgrade-kubelet")?;
    let packages = versioned(pm, &metadata.target_version, &["kubelet", "kubectl"]);
    pm.install("upgrade-kubelet", &packages, &log).await?;
    let result = process::run(&["kubelet", "--version"], &log).await?;
    tracing::info!(version = %result.stdout, "kubelet upgraded");
    Ok(())
}

pub async fn upgrade_containerd(_ctx: &AgentContext, dir: &Path, _metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "upgrade-containerd");
    let Some(pm) = PackageManager::detect() else {
        tracing::warn!("no package manager detected, skipping containerd upgrade");
        return Ok(());
    };
    pm.update_containerd("upgrade-containerd", &log).await?;
    Service::restart("upgrade-containerd", "containerd", &log).await?;
    sleep(UPGRADE_CONTAINERD_SETTLE).await;
    if !Service::is_active("containerd", &log).await? {
        return Err(Error::SubprocessFailed {
            step: "upgrade-containerd".to_string(),
            command: "systemctl is-active containerd".to_string(),
            exit_code: None,
        });
    }
    Ok(())
}

pub async fn restart_kubelet(_ctx: &AgentContext, dir: &Path, _metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "restart-kubelet");
    Service::daemon_reload("restart-kubelet", &log).await?;
    Service::restart("restart-kubelet", "kubelet", &log).await?;
    sleep(RESTART_KUBELET_SETTLE).await;
    if !Service::is_active("kubelet", &log).await? {
        return Err(Error::SubprocessFailed {
            step: "restart-kubelet".to_string(),
            command: "systemctl is-active kubelet".to_string(),
            exit_code: None,
        });
    }
    Ok(())
}

pub async fn drain_node(ctx: &AgentContext, dir: &Path, _metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "drain-node");
    process::must_run(
        "drain-node",
        &[
            "kubectl",
            "drain",
            ctx.node_name(),
            "--ignore-daemonsets",
            "--delete-emptydir-data",
            DRAIN_TIMEOUT,
        ],
        &log,
    )
    .await?;
    Ok(())
}

pub async fn uncordon_node(ctx: &AgentContext, dir: &Path, _metadata: &OperationMetadata) -> Result<(), Error> {
    let log = OperationStore::step_log_path(dir, "uncordon-node");
    process::must_run("uncordon-node", &["kubectl", "uncordon", ctx.node_name()], &log).await?;
    Ok(())
}

pub async fn verify_node(ctx: &AgentContext, _dir: &Path, _metadata: &OperationMetadata) -> Result<(), Error> {
    let node_name = ctx.node_name().to_string();
    let cluster = ctx.cluster.clone();
    poll_until_ready(VERIFY_NODE_DEADLINE, VERIFY_NODE_POLL_INTERVAL, move || {
        let cluster = cluster.clone();
        let node_name = node_name.clone();
        async move { cluster.read_node(&node_name).await.map(|view| view.is_ready()) }
    })
    .await
}

/// Polls `check` until it reports ready or `deadline` elapses, sleeping
/// `poll_interval` between attempts. Factored out of [`verify_node`] so the
/// deadline boundary is exercisable without a real cluster client or a
/// real five-minute wait.
async fn poll_until_ready<F, Fut>(deadline: Duration, poll_interval: Duration, mut check: F) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = tokio::time::Instant::now();
    loop {
        match check().await {
            Ok(true) => return Ok(()),
            Ok(false) => tracing::debug!("node not ready yet, waiting"),
            Err(e) => tracing::warn!(error = %e, "error checking node status"),
        }
        if start.elapsed() >= deadline {
            return Err(Error::Deadline(format!(
                "node did not become Ready within {}s",
                deadline.as_secs()
            )));
        }
        sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn poll_until_ready_fails_with_deadline_when_never_ready() {
        let result = poll_until_ready(Duration::from_millis(30), Duration::from_millis(10), || async { Ok(false) }).await;
        assert!(matches!(result, Err(Error::Deadline(_))));
    }

    #[tokio::test]
    async fn poll_until_ready_succeeds_as_soon_as_ready_observed() {
        let attempts = AtomicUsize::new(0);
        let result = poll_until_ready(Duration::from_millis(200), Duration::from_millis(10), || {
            let seen = attempts.fetch_add(1, Ordering::SeqCst);
            async move { Ok(seen >= 2) }
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn poll_until_ready_tolerates_transient_check_errors() {
        let result = poll_until_ready(Duration::from_millis(50), Duration::from_millis(10), || async {
            Err(Error::Config("transient".to_string()))
        })
        .await;
        assert!(matches!(result, Err(Error::Deadline(_))));
    }
}
