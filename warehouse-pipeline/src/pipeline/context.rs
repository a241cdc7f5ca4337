use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    warehouse::{AssetRef, CorpusRef},
};
use tracing::error;

use super::{
    config::{PipelineConfig, RunPlan},
    pool::TaskPool,
    services::WarehouseServices,
    stages::{IndexDeployment, TeardownReport},
};

pub struct PipelineContext<'a> {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub plan: &'a RunPlan,
    pub pipeline_config: &'a PipelineConfig,
    pub services: &'a Arc<dyn WarehouseServices>,
    pub pool: &'a TaskPool,
    pub corpus: Option<CorpusRef>,
    pub assets: Vec<AssetRef>,
    pub upload_failures: usize,
    pub deployment: Option<IndexDeployment>,
    pub transformed: usize,
    pub transform_failures: usize,
    pub queries_issued: usize,
    pub teardown: TeardownReport,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        run_id: String,
        plan: &'a RunPlan,
        pipeline_config: &'a PipelineConfig,
        services: &'a Arc<dyn WarehouseServices>,
        pool: &'a TaskPool,
    ) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            plan,
            pipeline_config,
            services,
            pool,
            corpus: None,
            assets: Vec::new(),
            upload_failures: 0,
            deployment: None,
            transformed: 0,
            transform_failures: 0,
            queries_issued: 0,
            teardown: TeardownReport::default(),
        }
    }

    pub fn corpus(&self) -> Result<&CorpusRef, AppError> {
        self.corpus
            .as_ref()
            .ok_or_else(|| AppError::InternalError("corpus expected to be resolved".into()))
    }

    pub fn deployment(&self) -> Result<&IndexDeployment, AppError> {
        self.deployment
            .as_ref()
            .ok_or_else(|| AppError::InternalError("index expected to be deployed".into()))
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            run_id = %self.run_id,
            corpus = ?self.corpus.as_ref().map(CorpusRef::name),
            index = ?self.deployment.as_ref().map(|d| d.index.name()),
            endpoint = ?self.deployment.as_ref().map(|d| d.endpoint.name()),
            uploaded_assets = self.assets.len(),
            error = %err,
            "provisioning run aborted; provisioned resources left in place"
        );
        err
    }

    pub fn into_summary(self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            corpus: self.corpus,
            deployment: self.deployment,
            uploaded: self.assets,
            upload_failures: self.upload_failures,
            transformed: self.transformed,
            transform_failures: self.transform_failures,
            queries_issued: self.queries_issued,
            teardown: self.teardown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub corpus: Option<CorpusRef>,
    pub deployment: Option<IndexDeployment>,
    pub uploaded: Vec<AssetRef>,
    pub upload_failures: usize,
    pub transformed: usize,
    pub transform_failures: usize,
    pub queries_issued: usize,
    pub teardown: TeardownReport,
}
