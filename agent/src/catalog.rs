/// A node's role, derived from its labels at plan time (never supplied
/// directly by the controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ControlPlane,
    Worker,
}

/// The fixed vocabulary of named steps an operation can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    DownloadPackages,
    DrainNode,
    UpgradeKubeadm,
    KubeadmUpgrade,
    KubeadmUpgradeNode,
    UpgradeKubelet,
    UpgradeContainerd,
    RestartKubelet,
    VerifyNode,
    UncordonNode,
}

impl StepKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::DownloadPackages => "download-packages",
            Self::DrainNode => "drain-node",
            Self::UpgradeKubeadm => "upgrade-kubeadm",
            Self::KubeadmUpgrade => "kubeadm-upgrade",
            Self::KubeadmUpgradeNode => "kubeadm-upgrade-node",
            Self::UpgradeKubelet => "upgrade-kubelet",
            Self::UpgradeContainerd => "upgrade-containerd",
            Self::RestartKubelet => "restart-kubelet",
            Self::VerifyNode => "verify-node",
            Self::UncordonNode => "uncordon-node",
        }
    }
}

/// One entry of a plan: a 1-based position and the step it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub index: usize,
    pub name: String,
    pub kind: StepKind,
}

/// Builds the ordered step sequence for `role` and the requested
/// `components`. Pure function: equal inputs yield equal outputs.
///
/// Control-plane nodes are never drained (they host their own upgrade
/// tooling and singleton components); workers are drained before binary
/// changes and uncordoned only after health is verified. Package download
/// always runs first so network problems surface before any mutation.
pub fn plan(role: Role, components: &[String]) -> Vec<PlannedStep> {
    let wants_containerd = components.iter().any(|c| c == "containerd");

    let mut kinds = match role {
        Role::ControlPlane => vec![
            StepKind::DownloadPackages,
            StepKind::UpgradeKubeadm,
            StepKind::KubeadmUpgrade,
            StepKind::UpgradeKubelet,
        ],
        Role::Worker => vec![
            StepKind::DownloadPackages,
            StepKind::DrainNode,
            StepKind::UpgradeKubeadm,
            StepKind::KubeadmUpgradeNode,
            StepKind::UpgradeKubelet,
        ],
    };

    if wants_containerd {
        kinds.push(StepKind::UpgradeContainerd);
    }

    kinds.push(StepKind::RestartKubelet);
    kinds.push(StepKind::VerifyNode);

    if role == Role::Worker {
        kinds.push(StepKind::UncordonNode);
    }

    kinds
        .into_iter()
        .enumerate()
        .map(|(i, kind)| PlannedStep {
            index: i + 1,
            name: kind.name().to_string(),
            kind,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(steps: &[PlannedStep]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn worker_with_containerd_matches_full_nine_step_plan() {
        let steps = plan(Role::Worker, &["containerd".to_string()]);
        assert_eq!(
            names(&steps),
            vec![
                "download-packages",
                "drain-node",
                "upgrade-kubeadm",
                "kubeadm-upgrade-node",
                "upgrade-kubelet",
                "upgrade-containerd",
                "restart-kubelet",
                "verify-node",
                "uncordon-node",
            ]
        );
        assert_eq!(steps.last().unwrap().index, 9);
    }

    #[test]
    fn control_plane_without_containerd_has_six_steps() {
        let steps = plan(Role::ControlPlane, &[]);
        assert_eq!(steps.len(), 6);
        assert!(!steps.iter().any(|s| s.kind == StepKind::DrainNode));
        assert!(!steps.iter().any(|s| s.kind == StepKind::UncordonNode));
        assert!(!steps.iter().any(|s| s.kind == StepKind::UpgradeContainerd));
    }

    #[test]
    fn empty_components_omits_containerd_upgrade() {
        let steps = plan(Role::Worker, &[]);
        assert!(!steps.iter().any(|s| s.kind == StepKind::UpgradeContainerd));
    }

    #[test]
    fn plan_is_deterministic() {
        let components = vec!["containerd".to_string()];
        assert_eq!(plan(Role::Worker, &components), plan(Role::Worker, &components));
    }

    #[test]
    fn step_indices_are_dense_from_one() {
        let steps = plan(Role::Worker, &["containerd".to_string()]);
        let indices: Vec<usize> = steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, (1..=steps.len()).collect::<Vec<_>>());
    }
}
