use common::{
    error::AppError,
    warehouse::{CorpusRef, IndexEndpointRef, IndexInfo, IndexRef, IndexState, Location},
};
use tracing::{error, info};

use crate::pipeline::{
    config::{IndexSpec, PipelineTuning, ReusedIndexPolicy},
    services::WarehouseServices,
};

/// The active index and the endpoint serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDeployment {
    pub index: IndexRef,
    pub endpoint: IndexEndpointRef,
}

pub async fn build_index(
    services: &dyn WarehouseServices,
    tuning: &PipelineTuning,
    policy: ReusedIndexPolicy,
    location: &Location,
    corpus: &CorpusRef,
    spec: &IndexSpec,
) -> Result<IndexDeployment, AppError> {
    match &spec.existing_id {
        Some(existing_id) => {
            attach_existing(services, policy, &IndexRef::from_parts(corpus, existing_id)).await
        }
        None => create_and_deploy(services, tuning, location, corpus, spec).await,
    }
}

async fn create_and_deploy(
    services: &dyn WarehouseServices,
    tuning: &PipelineTuning,
    location: &Location,
    corpus: &CorpusRef,
    spec: &IndexSpec,
) -> Result<IndexDeployment, AppError> {
    let index = services.create_index(corpus, &spec.display_name).await?;
    info!(%index, "created index");

    let endpoint = services
        .create_index_endpoint(location, &spec.endpoint_display_name)
        .await?;
    info!(%endpoint, "created index endpoint");

    let operation = services.deploy_index(&endpoint, &index).await?;
    info!(
        %index,
        %endpoint,
        %operation,
        timeout_secs = tuning.deploy_timeout_secs,
        "waiting for index deployment"
    );

    // No rollback on failure: the index and endpoint stay provisioned.
    services
        .wait_operation(&operation, tuning.deploy_timeout())
        .await
        .map_err(|err| {
            error!(%index, %endpoint, %operation, error = %err, "index deployment did not complete");
            err
        })?;
    info!(%index, %endpoint, "index deployed");

    Ok(IndexDeployment { index, endpoint })
}

async fn attach_existing(
    services: &dyn WarehouseServices,
    policy: ReusedIndexPolicy,
    index: &IndexRef,
) -> Result<IndexDeployment, AppError> {
    let info = services.get_index(index).await?;

    if let Some(problem) = validation_problem(&info) {
        match policy {
            ReusedIndexPolicy::Strict => {
                return Err(AppError::InvalidIndex(format!("{index}: {problem}")));
            }
            ReusedIndexPolicy::WarnAndContinue => {
                error!(
                    severity = "fatal",
                    %index,
                    state = ?info.state,
                    deployed_replicas = info.deployed_indexes.len(),
                    problem,
                    "reused index failed validation; continuing"
                );
            }
        }
    }

    // Without a replica there is no endpoint to query, whatever the policy.
    let endpoint = info
        .deployed_indexes
        .first()
        .map(|deployed| deployed.index_endpoint.clone())
        .ok_or_else(|| AppError::InvalidIndex(format!("{index}: no deployed replica")))?;
    info!(%index, %endpoint, "attached to existing index");

    Ok(IndexDeployment {
        index: index.clone(),
        endpoint,
    })
}

fn validation_problem(info: &IndexInfo) -> Option<&'static str> {
    if info.state != IndexState::Created {
        Some("index is not in CREATED state")
    } else if info.deployed_indexes.is_empty() {
        Some("index has no deployed replica")
    } else {
        None
    }
}
