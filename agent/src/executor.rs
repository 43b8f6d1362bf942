use std::path::Path;

use crate::catalog::{PlannedStep, StepKind};
use crate::context::AgentContext;
use crate::steps;
use crate::store::{OperationMetadata, OperationStore};
use crate::util::Error;

const STATUS_ANNOTATION: &str = "cupcake.ricardomolendijk.com/status";

/// Runs `plan` against the operation store, honoring resume semantics and
/// fail-fast: the first step that errors writes the `failed` marker, patches
/// the node status, and stops — no subsequent steps run. This is the only
/// place a step's `Result` is turned into a durable marker; steps themselves
/// never touch the operation store on error.
pub async fn execute(
    ctx: &AgentContext,
    operation_id: &str,
    plan: &[PlannedStep],
    metadata: OperationMetadata,
    resume: bool,
) -> Result<(), Error> {
    let dir = ctx.store.open(operation_id)?;

    if !resume {
        ctx.store.write_metadata(&dir, &metadata)?;
    }

    for step in plan {
        if OperationStore::is_done(&dir, step.index, &step.name) {
            tracing::info!(operation_id, step = step.index, name = %step.name, "step already done, skipping");
            continue;
        }

        tracing::info!(operation_id, step = step.index, name = %step.name, "executing step");
        ctx.store.mark_inprogress(&dir, step.index, &step.name)?;

        match dispatch(step.kind, ctx, &dir, &metadata).await {
            Ok(()) => {
                ctx.store.finish(&dir, step.index, &step.name)?;
                metrics::counter!("cupcake_steps_total", "step" => step.name.clone(), "outcome" => "success")
                    .increment(1);
                tracing::info!(operation_id, step = step.index, name = %step.name, "step completed");
            }
            Err(e) => {
                metrics::counter!("cupcake_steps_total", "step" => step.name.clone(), "outcome" => "failed")
                    .increment(1);
                tracing::error!(operation_id, step = step.index, name = %step.name, error = %e, "step failed");
                ctx.store.mark_failed(&dir, step.index, &step.name, &e.to_string())?;
                patch_status_best_effort(ctx, "failed").await;
                metrics::counter!("cupcake_operations_total", "outcome" => "failed").increment(1);
                return Err(e);
            }
        }
    }

    ctx.store.mark_completed(&dir, ctx.node_name())?;
    patch_status_best_effort(ctx, "completed").await;
    metrics::counter!("cupcake_operations_total", "outcome" => "completed").increment(1);
    tracing::info!(operation_id, "operation completed successfully");
    Ok(())
}

async fn patch_status_best_effort(ctx: &AgentContext, status: &str) {
    if let Err(e) = ctx
        .cluster
        .patch_node_annotation(ctx.node_name(), STATUS_ANNOTATION, status)
        .await
    {
        tracing::error!(error = %e, status, "failed to patch node status annotation");
    }
}

async fn dispatch(kind: StepKind, ctx: &AgentContext, dir: &Path, metadata: &OperationMetadata) -> Result<(), Error> {
    match kind {
        StepKind::DownloadPackages => steps::download_packages(ctx, dir, metadata).await,
        StepKind::DrainNode => steps::drain_node(ctx, dir, metadata).await,
        StepKind::UpgradeKubeadm => steps::upgrade_kubeadm(ctx, dir, metadata).await,
        StepKind::KubeadmUpgrade => steps::kubeadm_upgrade(ctx, dir, metadata).await,
        StepKind::KubeadmUpgradeNode => steps::kubeadm_upgrade_node(ctx, dir, metadata).await,
        StepKind::UpgradeKubelet => steps::upgrade_kubelet(ctx, dir, metadata).await,
        StepKind::UpgradeContainerd => steps::upgrade_containerd(ctx, dir, metadata).await,
        StepKind::RestartKubelet => steps::restart_kubelet(ctx, dir, metadata).await,
        StepKind::VerifyNode => steps::verify_node(ctx, dir, metadata).await,
        StepKind::UncordonNode => steps::uncordon_node(ctx, dir, metadata).await,
    }
}
