use std::time::Duration;

use common::warehouse::{Location, SearchQuery};

use crate::transformers::EnrichmentConfig;

#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub pool_capacity: usize,
    pub deploy_timeout_secs: u64,
    pub undeploy_timeout_secs: u64,
    pub asset_operation_timeout_secs: u64,
    pub search_page_size: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            pool_capacity: 8,
            deploy_timeout_secs: 7_200,
            undeploy_timeout_secs: 1_800,
            asset_operation_timeout_secs: 3_600,
            search_page_size: 10,
        }
    }
}

impl PipelineTuning {
    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    pub fn undeploy_timeout(&self) -> Duration {
        Duration::from_secs(self.undeploy_timeout_secs)
    }

    pub fn asset_operation_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_operation_timeout_secs)
    }
}

/// What to do when a reused index is not `CREATED` or has no deployed replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReusedIndexPolicy {
    /// Fail the index build stage.
    Strict,
    /// Log at fatal severity and carry on.
    #[default]
    WarnAndContinue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupFlags {
    pub assets: bool,
    pub index: bool,
    pub corpus: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub tuning: PipelineTuning,
    pub reused_index_policy: ReusedIndexPolicy,
    pub cleanup: CleanupFlags,
}

#[derive(Debug, Clone)]
pub struct CorpusSpec {
    pub display_name: String,
    pub description: String,
    pub existing_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub display_name: String,
    pub endpoint_display_name: String,
    pub existing_id: Option<String>,
}

/// Everything a single run provisions and feeds through the stages.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub location: Location,
    pub corpus: CorpusSpec,
    pub index: IndexSpec,
    pub sources: Vec<String>,
    pub enrichment: EnrichmentConfig,
    pub queries: Vec<SearchQuery>,
}
