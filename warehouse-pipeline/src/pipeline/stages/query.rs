use common::{
    error::AppError,
    warehouse::{IndexEndpointRef, SearchQuery},
};
use tracing::info;

use crate::pipeline::services::WarehouseServices;

/// Issues each query once; the first failure ends the run.
pub async fn run_queries(
    services: &dyn WarehouseServices,
    endpoint: &IndexEndpointRef,
    queries: &[SearchQuery],
    page_size: usize,
) -> Result<usize, AppError> {
    let mut issued = 0_usize;
    for query in queries {
        let response = services.search(endpoint, query, page_size).await?;
        issued = issued.saturating_add(1);
        info!(
            %endpoint,
            query = %query.text,
            criteria = query.criteria.len(),
            %response,
            "search response"
        );
    }
    Ok(issued)
}
