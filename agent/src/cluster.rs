use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Node, NodeCondition};
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};

use crate::util::Error;

/// The parts of a `Node` object this agent actually reads.
#[derive(Debug, Clone, Default)]
pub struct NodeView {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub conditions: Vec<NodeCondition>,
}

impl NodeView {
    /// True if either the modern or legacy control-plane label is present.
    /// Values are ignored — presence of the key is the signal, matching the
    /// upstream controller's own labeling convention.
    pub fn is_control_plane(&self) -> bool {
        self.labels.contains_key("node-role.kubernetes.io/control-plane")
            || self.labels.contains_key("node-role.kubernetes.io/master")
    }

    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True")
    }
}

/// Narrow view over the cluster API this agent needs: reading and
/// annotating its own node, and CRUD on namespaced configuration objects
/// used for the snapshot request/status protocol.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    /// Prefers in-cluster service-account credentials, falling back to
    /// ambient kubeconfig; fails hard if neither is available.
    pub async fn connect() -> Result<Self, Error> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    pub async fn read_node(&self, name: &str) -> Result<NodeView, Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes.get(name).await?;
        Ok(NodeView {
            labels: node.metadata.labels.unwrap_or_default(),
            annotations: node.metadata.annotations.unwrap_or_default(),
            conditions: node
                .status
                .and_then(|status| status.conditions)
                .unwrap_or_default(),
        })
    }

    /// JSON merge patch on `metadata.annotations`; leaves every other
    /// annotation untouched so the controller's own writes are never
    /// clobbered.
    pub async fn patch_node_annotation(&self, name: &str, key: &str, value: &str) -> Result<(), Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "metadata": { "annotations": { key: value } }
        });
        nodes
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    pub async fn list_config_objects(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ConfigMap>, Error> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(label_selector);
        Ok(config_maps.list(&params).await?.items)
    }

    /// Creates `obj`, replacing it in place on a name conflict — repeated
    /// snapshot runs for the same operation id are treated as an idempotent
    /// overwrite rather than an error.
    pub async fn create_config_object(&self, namespace: &str, obj: ConfigMap) -> Result<(), Error> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match config_maps.create(&PostParams::default(), &obj).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                let name = obj.metadata.name.clone().unwrap_or_default();
                config_maps.replace(&name, &PostParams::default(), &obj).await?;
                Ok(())
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    pub async fn delete_config_object(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match config_maps.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_with_labels(labels: &[(&str, &str)]) -> NodeView {
        NodeView {
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn detects_modern_control_plane_label() {
        let view = view_with_labels(&[("node-role.kubernetes.io/control-plane", "")]);
        assert!(view.is_control_plane());
    }

    #[test]
    fn detects_legacy_master_label() {
        let view = view_with_labels(&[("node-role.kubernetes.io/master", "")]);
        assert!(view.is_control_plane());
    }

    #[test]
    fn worker_has_neither_label() {
        let view = view_with_labels(&[("kubernetes.io/hostname", "node-1")]);
        assert!(!view.is_control_plane());
    }
}
