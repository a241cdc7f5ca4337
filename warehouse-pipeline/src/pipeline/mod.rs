mod config;
mod context;
mod pool;
mod services;
mod stages;
mod state;

pub use config::{
    CleanupFlags, CorpusSpec, IndexSpec, PipelineConfig, PipelineTuning, ReusedIndexPolicy,
    RunPlan,
};
pub use context::RunSummary;
pub use pool::{TaskHandle, TaskOutcome, TaskPool, TaskReport};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultWarehouseServices, WarehouseServices};
pub use stages::{
    build_index, resolve_corpus, run_queries, tear_down, transform_assets, upload_assets,
    uploaded_assets, IndexDeployment, StepOutcome, TeardownAction, TeardownReport, TeardownStep,
    TeardownTargets,
};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    utils::config::AppConfig,
    warehouse::{client::WarehouseClient, Location},
};
use tracing::info;
use uuid::Uuid;

use self::{
    context::PipelineContext,
    stages::{clean_up, deploy_index, provision_corpus, query, transform, upload},
    state::ready,
};

/// Owns the shared task pool and drives a run through every stage in order.
#[allow(clippy::module_name_repetitions)]
pub struct ProvisioningPipeline {
    pipeline_config: PipelineConfig,
    services: Arc<dyn WarehouseServices>,
    pool: TaskPool,
}

impl ProvisioningPipeline {
    pub fn new(config: &AppConfig, pipeline_config: PipelineConfig) -> Result<Self, AppError> {
        let client = WarehouseClient::from_config(config)?
            .with_operation_timeout(pipeline_config.tuning.asset_operation_timeout());
        let services = DefaultWarehouseServices::new(client);

        Self::with_services(pipeline_config, Arc::new(services))
    }

    pub fn with_services(
        pipeline_config: PipelineConfig,
        services: Arc<dyn WarehouseServices>,
    ) -> Result<Self, AppError> {
        let pool = TaskPool::new(pipeline_config.tuning.pool_capacity)?;
        Ok(Self {
            pipeline_config,
            services,
            pool,
        })
    }

    /// Project and region the run operates in.
    pub async fn resolve_location(&self, config: &AppConfig) -> Result<Location, AppError> {
        stages::resolve_location(self.services.as_ref(), config).await
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    #[tracing::instrument(
        skip_all,
        fields(
            corpus = %plan.corpus.display_name,
            index = %plan.index.display_name,
            sources = plan.sources.len()
        )
    )]
    pub async fn run(&self, plan: &RunPlan) -> Result<RunSummary, AppError> {
        let mut ctx = PipelineContext::new(
            Uuid::new_v4().to_string(),
            plan,
            &self.pipeline_config,
            &self.services,
            &self.pool,
        );

        let machine = ready();

        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = provision_corpus(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let provision_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = upload(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let upload_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = deploy_index(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let index_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = transform(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let transform_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = query(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let query_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let _machine = clean_up(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let teardown_duration = stage_start.elapsed();

        info!(
            run_id = %ctx.run_id,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            provision_ms = Self::duration_millis(provision_duration),
            upload_ms = Self::duration_millis(upload_duration),
            index_ms = Self::duration_millis(index_duration),
            transform_ms = Self::duration_millis(transform_duration),
            query_ms = Self::duration_millis(query_duration),
            teardown_ms = Self::duration_millis(teardown_duration),
            uploaded = ctx.assets.len(),
            upload_failures = ctx.upload_failures,
            transformed = ctx.transformed,
            transform_failures = ctx.transform_failures,
            "provisioning run finished"
        );

        Ok(ctx.into_summary())
    }
}

#[cfg(test)]
mod tests;
