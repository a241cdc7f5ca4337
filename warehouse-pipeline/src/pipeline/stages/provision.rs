use common::{
    error::AppError,
    utils::config::AppConfig,
    warehouse::{CorpusRef, Location},
};
use tracing::info;

use crate::pipeline::{config::CorpusSpec, services::WarehouseServices};

/// Resolves the project number once at startup, unless configured.
pub async fn resolve_location(
    services: &dyn WarehouseServices,
    config: &AppConfig,
) -> Result<Location, AppError> {
    let project_number = match &config.project_number {
        Some(number) => number.clone(),
        None => {
            let number = services.resolve_project_number(&config.project_id).await?;
            info!(project_id = %config.project_id, project_number = %number, "resolved project number");
            number
        }
    };
    Ok(Location::new(project_number, config.region.clone()))
}

/// Reuses a supplied corpus id without validation, or creates a new corpus.
pub async fn resolve_corpus(
    services: &dyn WarehouseServices,
    location: &Location,
    spec: &CorpusSpec,
) -> Result<CorpusRef, AppError> {
    if let Some(existing_id) = &spec.existing_id {
        let corpus = CorpusRef::from_parts(&location.project_number, &location.region, existing_id);
        info!(%corpus, "reusing existing corpus");
        return Ok(corpus);
    }

    let corpus = services
        .create_corpus(location, &spec.display_name, &spec.description)
        .await?;
    info!(%corpus, display_name = %spec.display_name, "created corpus");
    Ok(corpus)
}
