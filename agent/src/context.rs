use std::path::Path;

use crate::cluster::ClusterClient;
use crate::config::Config;
use crate::store::OperationStore;

/// Everything a step, the executor, the reconciler, and the snapshot
/// service need to run, built once at startup and threaded through by
/// reference. Replaces ad-hoc process-global singletons for the cluster
/// client and configuration.
#[derive(Clone)]
pub struct AgentContext {
    pub config: Config,
    pub cluster: ClusterClient,
    pub store: OperationStore,
}

impl AgentContext {
    pub fn new(config: Config, cluster: ClusterClient, store: OperationStore) -> Self {
        Self {
            config,
            cluster,
            store,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    pub fn hostpath_root(&self) -> &Path {
        &self.config.hostpath_root
    }
}
