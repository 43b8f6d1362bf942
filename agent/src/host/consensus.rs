use std::path::{Path, PathBuf};

/// Client certificate material for talking to the consensus store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdCertPaths {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

const STACKED_ETCD_MANIFEST: &str = "etc/kubernetes/manifests/etcd.yaml";
const ETCD_PKI_DIR: &str = "etc/kubernetes/pki/etcd";
const KUBEADM_PKI_DIR: &str = "etc/kubernetes/pki";

/// Resolves the etcd client endpoints for this node.
///
/// `endpoint_override` takes priority when set (the only way to exercise the
/// external-etcd case: both probe branches below currently resolve to the
/// same loopback address, since stacked-vs-external discovery was never
/// finished upstream).
pub fn resolve_endpoints(root: &Path, endpoint_override: Option<&str>) -> String {
    if let Some(endpoints) = endpoint_override {
        return endpoints.to_string();
    }
    if root.join(STACKED_ETCD_MANIFEST).exists() {
        "https://127.0.0.1:2379".to_string()
    } else {
        "https://127.0.0.1:2379".to_string()
    }
}

/// Resolves the CA/client cert/key triple used to authenticate to etcd,
/// preferring the stacked-control-plane server certs and falling back to the
/// kube-apiserver's etcd healthcheck client cert. `root` is `/` in
/// production and a temp directory in tests.
pub fn resolve_cert_paths(root: &Path) -> EtcdCertPaths {
    let etcd_pki = root.join(ETCD_PKI_DIR);
    if etcd_pki.exists() {
        EtcdCertPaths {
            ca: etcd_pki.join("ca.crt"),
            cert: etcd_pki.join("server.crt"),
            key: etcd_pki.join("server.key"),
        }
    } else {
        let pki = root.join(KUBEADM_PKI_DIR);
        EtcdCertPaths {
            ca: pki.join("etcd/ca.crt"),
            cert: pki.join("apiserver-etcd-client.crt"),
            key: pki.join("apiserver-etcd-client.key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_always_wins() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_endpoints(root.path(), Some("https://etcd-0.example:2379")),
            "https://etcd-0.example:2379"
        );
    }

    #[test]
    fn falls_back_to_loopback_without_manifest() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(resolve_endpoints(root.path(), None), "https://127.0.0.1:2379");
    }

    #[test]
    fn prefers_stacked_etcd_pki_dir_when_present() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(ETCD_PKI_DIR)).unwrap();
        let paths = resolve_cert_paths(root.path());
        assert_eq!(paths.ca, root.path().join(ETCD_PKI_DIR).join("ca.crt"));
        assert_eq!(paths.cert, root.path().join(ETCD_PKI_DIR).join("server.crt"));
    }

    #[test]
    fn falls_back_to_apiserver_etcd_client_cert() {
        let root = tempfile::tempdir().unwrap();
        let paths = resolve_cert_paths(root.path());
        assert_eq!(
            paths.cert,
            root.path().join(KUBEADM_PKI_DIR).join("apiserver-etcd-client.crt")
        );
    }

    #[test]
    fn production_root_resolves_under_etc_kubernetes() {
        let paths = resolve_cert_paths(Path::new("/"));
        assert_eq!(
            paths.cert,
            Path::new("/etc/kubernetes/pki/apiserver-etcd-client.crt")
        );
    }
}
