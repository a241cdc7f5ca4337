use std::sync::Arc;

use common::warehouse::{AssetRef, CorpusRef};
use tracing::{error, info};

use crate::pipeline::{
    pool::{TaskOutcome, TaskPool, TaskReport},
    services::WarehouseServices,
};

/// Submits one create-and-upload task per source and waits for the whole batch.
/// Reports are labelled with their source and arrive in completion order.
pub async fn upload_assets(
    services: &Arc<dyn WarehouseServices>,
    pool: &TaskPool,
    corpus: &CorpusRef,
    sources: &[String],
) -> Vec<TaskReport<AssetRef>> {
    let mut handles = Vec::with_capacity(sources.len());
    for source in sources {
        let services = Arc::clone(services);
        let corpus = corpus.clone();
        let locator = source.clone();
        handles.push(
            pool.submit(source.as_str(), async move {
                services.create_and_upload_asset(&corpus, &locator).await
            })
            .await,
        );
    }

    let reports = TaskPool::wait_all(handles).await;
    for report in &reports {
        match &report.outcome {
            TaskOutcome::Success(asset) => {
                info!(source = %report.label, %asset, "asset uploaded");
            }
            TaskOutcome::Failure(err) => {
                error!(source = %report.label, error = %err, "asset upload failed");
            }
        }
    }
    reports
}

/// Assets whose upload reached `UPLOADED`; failed sources are dropped.
pub fn uploaded_assets(reports: Vec<TaskReport<AssetRef>>) -> (Vec<AssetRef>, usize) {
    let mut failures = 0_usize;
    let assets = reports
        .into_iter()
        .filter_map(|report| {
            let asset = report.outcome.success();
            if asset.is_none() {
                failures = failures.saturating_add(1);
            }
            asset
        })
        .collect();
    (assets, failures)
}
