use std::sync::Arc;

use common::{
    error::AppError,
    warehouse::{AssetRef, CorpusRef, IndexRef},
};
use tracing::{error, info, warn};

use crate::{
    pipeline::{
        pool::{TaskOutcome, TaskPool, TaskReport},
        services::WarehouseServices,
    },
    transformers::{EnrichmentConfig, Transformer},
};

/// Runs every transformer over every asset, one pooled task per asset, then
/// releases each transformer exactly once regardless of task outcomes.
pub async fn transform_assets(
    services: &Arc<dyn WarehouseServices>,
    pool: &TaskPool,
    corpus: &CorpusRef,
    index: &IndexRef,
    assets: &[AssetRef],
    enrichment: &EnrichmentConfig,
) -> Result<Vec<TaskReport<()>>, AppError> {
    let transformers: Arc<[Arc<dyn Transformer>]> =
        services.build_transformers(enrichment, index).await?.into();
    info!(
        %corpus,
        %index,
        transformers = transformers.len(),
        assets = assets.len(),
        "transforming assets"
    );

    let mut handles = Vec::with_capacity(assets.len());
    for asset in assets {
        let transformers = Arc::clone(&transformers);
        let asset = asset.clone();
        let label = asset.name().to_string();
        handles.push(
            pool.submit(label, async move {
                for transformer in transformers.iter() {
                    transformer.process(&asset).await.map_err(|err| {
                        AppError::Processing(format!("{} transform failed: {err}", transformer.kind()))
                    })?;
                }
                Ok::<(), AppError>(())
            })
            .await,
        );
    }

    let reports = TaskPool::wait_all(handles).await;
    for report in &reports {
        match &report.outcome {
            TaskOutcome::Success(()) => info!(asset = %report.label, "asset transformed"),
            TaskOutcome::Failure(err) => {
                error!(asset = %report.label, error = %err, "asset transform failed");
            }
        }
    }

    release_transformers(&transformers).await;
    Ok(reports)
}

async fn release_transformers(transformers: &[Arc<dyn Transformer>]) {
    for transformer in transformers {
        if let Err(err) = transformer.teardown().await {
            warn!(transformer = %transformer.kind(), error = %err, "transformer release failed");
        }
    }
}
