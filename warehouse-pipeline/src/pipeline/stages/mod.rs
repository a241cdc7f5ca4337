mod index;
mod provision;
mod query;
mod teardown;
mod transform;
mod upload;

pub use index::{build_index, IndexDeployment};
pub use provision::{resolve_corpus, resolve_location};
pub use query::run_queries;
pub use teardown::{
    tear_down, StepOutcome, TeardownAction, TeardownReport, TeardownStep, TeardownTargets,
};
pub use transform::transform_assets;
pub use upload::{upload_assets, uploaded_assets};

use common::error::AppError;
use state_machines::core::GuardError;
use tracing::{debug, info, instrument};

use super::{
    context::PipelineContext,
    state::{
        AssetsTransformed, AssetsUploaded, CorpusResolved, Finished, IndexReady,
        ProvisioningMachine, Queried, Ready,
    },
};

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn provision_corpus(
    machine: ProvisioningMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ProvisioningMachine<(), CorpusResolved>, AppError> {
    let corpus = resolve_corpus(ctx.services.as_ref(), &ctx.plan.location, &ctx.plan.corpus).await?;
    ctx.corpus = Some(corpus);

    machine
        .resolve_corpus()
        .map_err(|(_, guard)| map_guard_error("resolve_corpus", &guard))
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn upload(
    machine: ProvisioningMachine<(), CorpusResolved>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ProvisioningMachine<(), AssetsUploaded>, AppError> {
    let corpus = ctx.corpus()?.clone();
    let reports = upload_assets(ctx.services, ctx.pool, &corpus, &ctx.plan.sources).await;
    let (assets, failures) = uploaded_assets(reports);

    info!(
        run_id = %ctx.run_id,
        %corpus,
        submitted = ctx.plan.sources.len(),
        uploaded = assets.len(),
        failed = failures,
        "upload stage finished"
    );

    ctx.assets = assets;
    ctx.upload_failures = failures;

    machine
        .upload()
        .map_err(|(_, guard)| map_guard_error("upload", &guard))
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn deploy_index(
    machine: ProvisioningMachine<(), AssetsUploaded>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ProvisioningMachine<(), IndexReady>, AppError> {
    let deployment = build_index(
        ctx.services.as_ref(),
        &ctx.pipeline_config.tuning,
        ctx.pipeline_config.reused_index_policy,
        &ctx.plan.location,
        ctx.corpus()?,
        &ctx.plan.index,
    )
    .await?;
    ctx.deployment = Some(deployment);

    machine
        .build_index()
        .map_err(|(_, guard)| map_guard_error("build_index", &guard))
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn transform(
    machine: ProvisioningMachine<(), IndexReady>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ProvisioningMachine<(), AssetsTransformed>, AppError> {
    let reports = transform_assets(
        ctx.services,
        ctx.pool,
        ctx.corpus()?,
        &ctx.deployment()?.index,
        &ctx.assets,
        &ctx.plan.enrichment,
    )
    .await?;

    let transformed = reports.iter().filter(|r| r.outcome.is_success()).count();
    ctx.transformed = transformed;
    ctx.transform_failures = reports.len().saturating_sub(transformed);

    info!(
        run_id = %ctx.run_id,
        transformed = ctx.transformed,
        failed = ctx.transform_failures,
        "transform stage finished"
    );

    machine
        .transform()
        .map_err(|(_, guard)| map_guard_error("transform", &guard))
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn query(
    machine: ProvisioningMachine<(), AssetsTransformed>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ProvisioningMachine<(), Queried>, AppError> {
    ctx.queries_issued = run_queries(
        ctx.services.as_ref(),
        &ctx.deployment()?.endpoint,
        &ctx.plan.queries,
        ctx.pipeline_config.tuning.search_page_size,
    )
    .await?;

    debug!(run_id = %ctx.run_id, issued = ctx.queries_issued, "queries issued");

    machine
        .query()
        .map_err(|(_, guard)| map_guard_error("query", &guard))
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn clean_up(
    machine: ProvisioningMachine<(), Queried>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ProvisioningMachine<(), Finished>, AppError> {
    let targets = TeardownTargets {
        corpus: ctx.corpus.as_ref(),
        assets: &ctx.assets,
        deployment: ctx.deployment.as_ref(),
    };
    let report = tear_down(
        ctx.services.as_ref(),
        &ctx.pipeline_config.tuning,
        ctx.pipeline_config.cleanup,
        &targets,
    )
    .await;

    if !report.steps.is_empty() {
        info!(
            run_id = %ctx.run_id,
            steps = report.steps.len(),
            failed = report.failures(),
            "teardown finished"
        );
    }
    ctx.teardown = report;

    machine
        .finish()
        .map_err(|(_, guard)| map_guard_error("finish", &guard))
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid provisioning pipeline transition during {event}: {guard:?}"
    ))
}
