use std::time::Duration;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::catalog::{self, Role};
use crate::context::AgentContext;
use crate::executor;
use crate::snapshot;
use crate::store::OperationMetadata;
use crate::util::colors::{FG1, FG2};
use crate::util::Error;

const OPERATION_ID_ANNOTATION: &str = "cupcake.ricardomolendijk.com/operation-id";
const STATUS_ANNOTATION: &str = "cupcake.ricardomolendijk.com/status";
const TARGET_VERSION_ANNOTATION: &str = "cupcake.ricardomolendijk.com/target-version";
const COMPONENTS_ANNOTATION: &str = "cupcake.ricardomolendijk.com/components";

/// Resumes any incomplete operations found on disk, then polls forever at
/// `ctx.config.reconcile_interval`. A single operation runs to terminal
/// state before the next tick's poll begins. Errors raised inside a tick
/// (outside step execution) are logged and swallowed so an operator can
/// recover by editing annotations without restarting the agent.
pub async fn run(ctx: &AgentContext) {
    resume_incomplete_operations(ctx).await;

    let interval = Duration::from_secs(ctx.config.reconcile_interval);
    loop {
        if let Err(e) = tick(ctx).await {
            tracing::error!(error = %e, "error in reconciliation loop");
        }
        tokio::time::sleep(interval).await;
    }
}

async fn resume_incomplete_operations(ctx: &AgentContext) {
    tracing::info!("checking for incomplete operations to resume");
    let ids = match ctx.store.list_incomplete() {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "failed to scan hostpath root for incomplete operations");
            return;
        }
    };

    for operation_id in ids {
        tracing::info!(operation_id = %operation_id, "resuming incomplete operation");
        if let Err(e) = resume_one(ctx, &operation_id).await {
            tracing::error!(operation_id = %operation_id, error = %e, "resume did not complete");
        }
    }
}

async fn resume_one(ctx: &AgentContext, operation_id: &str) -> Result<(), Error> {
    let dir = ctx.store.open(operation_id)?;
    let metadata = ctx.store.read_metadata(&dir)?;
    let role = node_role(ctx).await?;
    let plan = catalog::plan(role, &metadata.components);
    // Step failures are recorded durably by the executor; a resume that
    // ends in `failed` is not itself a reconcile-loop error.
    let _ = executor::execute(ctx, operation_id, &plan, metadata, true).await;
    Ok(())
}

/// One reconcile tick: dispatch a pending operation if annotated, then
/// service snapshot requests. Only cluster-API failures propagate — an
/// operation that itself ends in `failed` is already durably recorded and
/// does not count as a tick failure.
pub async fn tick(ctx: &AgentContext) -> Result<(), Error> {
    let node = ctx.cluster.read_node(ctx.node_name()).await?;

    let operation_id = node.annotations.get(OPERATION_ID_ANNOTATION).cloned();
    let status = node
        .annotations
        .get(STATUS_ANNOTATION)
        .cloned()
        .unwrap_or_else(|| "pending".to_string());

    if let Some(operation_id) = operation_id {
        if status == "pending" {
            tracing::info!(operation_id = %operation_id, "found pending operation");
            println!(
                "🧁 {}{}{}{}{}",
                ctx.node_name().color(FG2),
                "/".color(FG1),
                operation_id.color(FG2),
                " OPERATION: ".color(FG1),
                "dispatching".color(FG2),
            );

            let target_version = node
                .annotations
                .get(TARGET_VERSION_ANNOTATION)
                .cloned()
                .unwrap_or_default();
            let components: Vec<String> = node
                .annotations
                .get(COMPONENTS_ANNOTATION)
                .map(|raw| raw.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            let role = if node.is_control_plane() { Role::ControlPlane } else { Role::Worker };
            let plan = catalog::plan(role, &components);
            let metadata = OperationMetadata {
                operation_id: operation_id.clone(),
                target_version,
                components,
                node_name: ctx.node_name().to_string(),
                started_at: Utc::now(),
            };

            let _ = executor::execute(ctx, &operation_id, &plan, metadata, false).await;
        }
    }

    snapshot::intake(ctx).await?;

    Ok(())
}

async fn node_role(ctx: &AgentContext) -> Result<Role, Error> {
    let node = ctx.cluster.read_node(ctx.node_name()).await?;
    Ok(if node.is_control_plane() { Role::ControlPlane } else { Role::Worker })
}
