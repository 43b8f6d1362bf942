pub mod sinks;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;

use crate::context::AgentContext;
use crate::host::consensus;
use crate::process;
use crate::util::Error;

const BACKUP_LABEL_SELECTOR: &str = "cupcake.ricardomolendijk.com/backup=true";

#[derive(Debug, Clone)]
struct SnapshotRequest {
    object_name: String,
    operation_id: String,
    snapshot_name: String,
}

/// Finds snapshot-request configuration objects addressed to this node,
/// executes them one at a time, and deletes each request once handled —
/// regardless of whether the snapshot itself succeeded.
pub async fn intake(ctx: &AgentContext) -> Result<(), Error> {
    let objects = ctx
        .cluster
        .list_config_objects(&ctx.config.namespace, BACKUP_LABEL_SELECTOR)
        .await?;

    for config_map in objects {
        let Some(request) = parse_request(&config_map, ctx.node_name()) else {
            continue;
        };

        tracing::info!(snapshot_name = %request.snapshot_name, "processing backup request");
        if let Err(e) = take_and_ship(ctx, &request).await {
            tracing::error!(error = %e, snapshot_name = %request.snapshot_name, "snapshot failed");
        }

        if let Err(e) = ctx
            .cluster
            .delete_config_object(&ctx.config.namespace, &request.object_name)
            .await
        {
            tracing::error!(error = %e, name = %request.object_name, "failed to delete backup request object");
        }
    }

    Ok(())
}

fn parse_request(config_map: &ConfigMap, node_name: &str) -> Option<SnapshotRequest> {
    let data = config_map.data.as_ref()?;
    if data.get("node_name")?.as_str() != node_name {
        return None;
    }
    Some(SnapshotRequest {
        object_name: config_map.metadata.name.clone()?,
        operation_id: data.get("operation_id")?.clone(),
        snapshot_name: data.get("snapshot_name")?.clone(),
    })
}

async fn take_and_ship(ctx: &AgentContext, request: &SnapshotRequest) -> Result<(), Error> {
    let snapshot_path = ctx.hostpath_root().join(format!("{}.db", request.snapshot_name));
    let log = ctx
        .hostpath_root()
        .join("logs")
        .join(format!("{}.snapshot.log", request.snapshot_name));
    if let Some(parent) = log.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = run_snapshot(ctx, &snapshot_path, &log).await;

    let (success, message) = match &result {
        Ok(()) => (true, "snapshot completed successfully".to_string()),
        Err(e) => (false, e.to_string()),
    };
    metrics::counter!("cupcake_snapshot_total", "outcome" => if success { "success" } else { "failed" })
        .increment(1);

    if let Err(e) = publish_status(ctx, request, success, &message).await {
        tracing::error!(error = %e, "failed to publish backup status object");
    }

    result
}

async fn run_snapshot(ctx: &AgentContext, snapshot_path: &Path, log: &Path) -> Result<(), Error> {
    let root = Path::new("/");
    let endpoints = consensus::resolve_endpoints(root, ctx.config.etcd_endpoints.as_deref());
    let certs = consensus::resolve_cert_paths(root);
    let snapshot_path_str = snapshot_path.to_str().expect("snapshot path is valid UTF-8");

    process::must_run_with_env(
        "etcd-snapshot-save",
        &[
            "etcdctl",
            "snapshot",
            "save",
            snapshot_path_str,
            &format!("--endpoints={endpoints}"),
            &format!("--cacert={}", certs.ca.display()),
            &format!("--cert={}", certs.cert.display()),
            &format!("--key={}", certs.key.display()),
        ],
        &[("ETCDCTL_API", "3")],
        log,
    )
    .await?;

    process::must_run_with_env(
        "etcd-snapshot-status",
        &["etcdctl", "snapshot", "status", snapshot_path_str, "--write-out=table"],
        &[("ETCDCTL_API", "3")],
        log,
    )
    .await?;

    if ctx.config.backup_store_enabled {
        let remote_key = format!("etcd-snapshots/{}.db", snapshot_path.file_stem().unwrap().to_string_lossy());
        sinks::upload(&ctx.config, snapshot_path, &remote_key).await?;
    }

    Ok(())
}

/// Creates (or, on a name conflict, replaces) the status object the
/// controller consumes. Name collisions on repeated snapshots for the same
/// `operation_id` are treated as an idempotent overwrite.
async fn publish_status(
    ctx: &AgentContext,
    request: &SnapshotRequest,
    success: bool,
    message: &str,
) -> Result<(), Error> {
    let name = format!("backup-status-{}-{}", request.operation_id, ctx.node_name()).replace('.', "-");

    let mut data = BTreeMap::new();
    data.insert("completed".to_string(), "true".to_string());
    data.insert("success".to_string(), success.to_string());
    data.insert("message".to_string(), message.to_string());
    data.insert("snapshot_name".to_string(), request.snapshot_name.clone());
    data.insert("timestamp".to_string(), Utc::now().to_rfc3339());

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(ctx.config.namespace.clone()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    ctx.cluster.create_config_object(&ctx.config.namespace, config_map).await?;
    tracing::info!(name, "published backup status object");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map_with_data(data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("backup-req-1".to_string()),
                ..Default::default()
            },
            data: Some(data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_request_addressed_to_this_node() {
        let cm = config_map_with_data(&[
            ("node_name", "node-1"),
            ("operation_id", "op1"),
            ("snapshot_name", "snap1"),
        ]);
        let request = parse_request(&cm, "node-1").unwrap();
        assert_eq!(request.operation_id, "op1");
        assert_eq!(request.snapshot_name, "snap1");
    }

    #[test]
    fn ignores_request_for_a_different_node() {
        let cm = config_map_with_data(&[
            ("node_name", "node-2"),
            ("operation_id", "op1"),
            ("snapshot_name", "snap1"),
        ]);
        assert!(parse_request(&cm, "node-1").is_none());
    }

    #[test]
    fn status_object_name_replaces_dots_with_dashes() {
        let name = format!("backup-status-{}-{}", "op.1.2", "node.1").replace('.', "-");
        assert_eq!(name, "backup-status-op-1-2-node-1");
    }
}
