use std::fmt;

use common::{
    error::AppError,
    warehouse::{AssetRef, CorpusRef},
};
use tracing::{info, warn};

use super::IndexDeployment;
use crate::pipeline::{
    config::{CleanupFlags, PipelineTuning},
    services::WarehouseServices,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownAction {
    DeleteAsset,
    UndeployIndex,
    DeleteIndex,
    DeleteEndpoint,
    DeleteCorpus,
}

impl fmt::Display for TeardownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DeleteAsset => "delete-asset",
            Self::UndeployIndex => "undeploy-index",
            Self::DeleteIndex => "delete-index",
            Self::DeleteEndpoint => "delete-endpoint",
            Self::DeleteCorpus => "delete-corpus",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownStep {
    pub action: TeardownAction,
    pub resource: String,
    pub outcome: StepOutcome,
}

/// Attempted teardown steps in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed(_)))
            .count()
    }

    fn record(
        &mut self,
        action: TeardownAction,
        resource: &dyn fmt::Display,
        result: Result<(), AppError>,
    ) -> bool {
        let resource = resource.to_string();
        let outcome = match result {
            Ok(()) => {
                info!(%action, %resource, "teardown step done");
                StepOutcome::Done
            }
            Err(err) => {
                warn!(%action, %resource, error = %err, "teardown step failed");
                StepOutcome::Failed(err.to_string())
            }
        };
        let done = outcome == StepOutcome::Done;
        self.steps.push(TeardownStep {
            action,
            resource,
            outcome,
        });
        done
    }

    fn skip(&mut self, action: TeardownAction, resource: &dyn fmt::Display, reason: &str) {
        let resource = resource.to_string();
        warn!(%action, %resource, reason, "teardown step skipped");
        self.steps.push(TeardownStep {
            action,
            resource,
            outcome: StepOutcome::Skipped(reason.to_string()),
        });
    }
}

/// Resources a run created or attached to.
pub struct TeardownTargets<'a> {
    pub corpus: Option<&'a CorpusRef>,
    pub assets: &'a [AssetRef],
    pub deployment: Option<&'a IndexDeployment>,
}

/// Deletes in dependency order: assets, undeploy, index, endpoint, corpus. Each
/// step is best effort. The index and endpoint are only deleted once the
/// undeploy has completed.
pub async fn tear_down(
    services: &dyn WarehouseServices,
    tuning: &PipelineTuning,
    flags: CleanupFlags,
    targets: &TeardownTargets<'_>,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    if flags.assets {
        for asset in targets.assets {
            report.record(
                TeardownAction::DeleteAsset,
                asset,
                services.delete_asset(asset).await,
            );
        }
    }

    if flags.index {
        if let Some(deployment) = targets.deployment {
            let undeployed = async {
                let operation = services.undeploy_index(&deployment.endpoint).await?;
                services
                    .wait_operation(&operation, tuning.undeploy_timeout())
                    .await
            }
            .await;

            if report.record(TeardownAction::UndeployIndex, &deployment.index, undeployed) {
                report.record(
                    TeardownAction::DeleteIndex,
                    &deployment.index,
                    services.delete_index(&deployment.index).await,
                );
                report.record(
                    TeardownAction::DeleteEndpoint,
                    &deployment.endpoint,
                    services.delete_index_endpoint(&deployment.endpoint).await,
                );
            } else {
                report.skip(
                    TeardownAction::DeleteIndex,
                    &deployment.index,
                    "index was not undeployed",
                );
                report.skip(
                    TeardownAction::DeleteEndpoint,
                    &deployment.endpoint,
                    "index was not undeployed",
                );
            }
        }
    }

    if flags.corpus {
        if let Some(corpus) = targets.corpus {
            report.record(
                TeardownAction::DeleteCorpus,
                corpus,
                services.delete_corpus(corpus).await,
            );
        }
    }

    report
}
