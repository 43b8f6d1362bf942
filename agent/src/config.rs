use std::path::PathBuf;

use clap::Parser;

/// Environment-variable-driven configuration for the agent, parsed once at
/// startup. `NODE_NAME` has no default, so clap itself enforces the
/// fail-fast-on-missing-identity contract: a missing value is a parse error
/// before any component is constructed.
#[derive(Debug, Clone, Parser)]
#[command(name = "cupcake-agent", about = "Node-local cluster upgrade executor")]
pub struct Config {
    /// Identity of the node this agent runs on; also the node object it watches.
    #[arg(long, env = "NODE_NAME", required = true)]
    pub node_name: String,

    /// Namespace holding snapshot request/status configuration objects.
    #[arg(long, env = "NAMESPACE", default_value = "kube-system")]
    pub namespace: String,

    /// Durable state root for operation directories and etcd snapshots.
    #[arg(long, env = "HOSTPATH_ROOT", default_value = "/var/lib/cupcake")]
    pub hostpath_root: PathBuf,

    /// Enables uploading etcd snapshots after a successful local backup.
    #[arg(long, env = "BACKUP_STORE_ENABLED", default_value_t = false)]
    pub backup_store_enabled: bool,

    /// Upload sink type: `s3` or `gcs`.
    #[arg(long, env = "BACKUP_STORE_TYPE", default_value = "s3")]
    pub backup_store_type: String,

    #[arg(long, env = "BACKUP_STORE_BUCKET")]
    pub backup_store_bucket: Option<String>,

    /// Overrides the sink endpoint (S3-compatible stores such as MinIO).
    #[arg(long, env = "BACKUP_STORE_ENDPOINT")]
    pub backup_store_endpoint: Option<String>,

    /// Seconds between reconcile ticks.
    #[arg(long, env = "RECONCILE_INTERVAL", default_value_t = 30)]
    pub reconcile_interval: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Overrides discovered etcd client endpoints; the stacked/external
    /// probe in the consensus adapter currently resolves both branches to
    /// the same loopback address, so this is the only way to point the
    /// snapshot service at an external etcd cluster.
    #[arg(long, env = "ETCD_ENDPOINTS")]
    pub etcd_endpoints: Option<String>,

    /// Ambient `/healthz` `/readyz` `/metrics` surface; unset disables it.
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}
