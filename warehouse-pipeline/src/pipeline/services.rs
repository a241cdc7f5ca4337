use std::time::Duration;

use async_trait::async_trait;
use common::{
    error::AppError,
    warehouse::{
        client::WarehouseClient, AssetRef, CorpusRef, IndexEndpointRef, IndexInfo, IndexRef,
        Location, Operation, SearchQuery, SearchResponse,
    },
};
use tracing::warn;

use crate::transformers::{build_warehouse_transformers, EnrichmentConfig, TransformerSet};

/// Backend collaborators the pipeline drives. Every stage talks to the warehouse
/// exclusively through this trait.
#[async_trait]
pub trait WarehouseServices: Send + Sync {
    async fn resolve_project_number(&self, project_id: &str) -> Result<String, AppError>;

    async fn create_corpus(
        &self,
        location: &Location,
        display_name: &str,
        description: &str,
    ) -> Result<CorpusRef, AppError>;

    async fn delete_corpus(&self, corpus: &CorpusRef) -> Result<(), AppError>;

    async fn create_and_upload_asset(
        &self,
        corpus: &CorpusRef,
        source: &str,
    ) -> Result<AssetRef, AppError>;

    async fn delete_asset(&self, asset: &AssetRef) -> Result<(), AppError>;

    async fn create_index(
        &self,
        corpus: &CorpusRef,
        display_name: &str,
    ) -> Result<IndexRef, AppError>;

    async fn get_index(&self, index: &IndexRef) -> Result<IndexInfo, AppError>;

    async fn deploy_index(
        &self,
        endpoint: &IndexEndpointRef,
        index: &IndexRef,
    ) -> Result<Operation, AppError>;

    async fn undeploy_index(&self, endpoint: &IndexEndpointRef) -> Result<Operation, AppError>;

    async fn delete_index(&self, index: &IndexRef) -> Result<(), AppError>;

    async fn create_index_endpoint(
        &self,
        location: &Location,
        display_name: &str,
    ) -> Result<IndexEndpointRef, AppError>;

    async fn delete_index_endpoint(&self, endpoint: &IndexEndpointRef) -> Result<(), AppError>;

    async fn wait_operation(&self, operation: &Operation, timeout: Duration)
        -> Result<(), AppError>;

    async fn build_transformers(
        &self,
        config: &EnrichmentConfig,
        index: &IndexRef,
    ) -> Result<TransformerSet, AppError>;

    async fn search(
        &self,
        endpoint: &IndexEndpointRef,
        query: &SearchQuery,
        page_size: usize,
    ) -> Result<SearchResponse, AppError>;
}

pub struct DefaultWarehouseServices {
    client: WarehouseClient,
}

impl DefaultWarehouseServices {
    pub fn new(client: WarehouseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WarehouseServices for DefaultWarehouseServices {
    async fn resolve_project_number(&self, project_id: &str) -> Result<String, AppError> {
        self.client.resolve_project_number(project_id).await
    }

    async fn create_corpus(
        &self,
        location: &Location,
        display_name: &str,
        description: &str,
    ) -> Result<CorpusRef, AppError> {
        self.client
            .create_corpus(location, display_name, description)
            .await
    }

    async fn delete_corpus(&self, corpus: &CorpusRef) -> Result<(), AppError> {
        self.client.delete_corpus(corpus).await
    }

    async fn create_and_upload_asset(
        &self,
        corpus: &CorpusRef,
        source: &str,
    ) -> Result<AssetRef, AppError> {
        let asset = self.client.create_asset(corpus).await?;
        if let Err(err) = self.client.upload_asset(&asset, source).await {
            // The asset record stays behind in the corpus; teardown only sees
            // assets that uploaded.
            warn!(%asset, source, error = %err, "asset created but upload failed");
            return Err(err);
        }
        Ok(asset)
    }

    async fn delete_asset(&self, asset: &AssetRef) -> Result<(), AppError> {
        self.client.delete_asset(asset).await
    }

    async fn create_index(
        &self,
        corpus: &CorpusRef,
        display_name: &str,
    ) -> Result<IndexRef, AppError> {
        self.client.create_index(corpus, display_name).await
    }

    async fn get_index(&self, index: &IndexRef) -> Result<IndexInfo, AppError> {
        self.client.get_index(index).await
    }

    async fn deploy_index(
        &self,
        endpoint: &IndexEndpointRef,
        index: &IndexRef,
    ) -> Result<Operation, AppError> {
        self.client.deploy_index(endpoint, index).await
    }

    async fn undeploy_index(&self, endpoint: &IndexEndpointRef) -> Result<Operation, AppError> {
        self.client.undeploy_index(endpoint).await
    }

    async fn delete_index(&self, index: &IndexRef) -> Result<(), AppError> {
        self.client.delete_index(index).await
    }

    async fn create_index_endpoint(
        &self,
        location: &Location,
        display_name: &str,
    ) -> Result<IndexEndpointRef, AppError> {
        self.client
            .create_index_endpoint(location, display_name)
            .await
    }

    async fn delete_index_endpoint(&self, endpoint: &IndexEndpointRef) -> Result<(), AppError> {
        self.client.delete_index_endpoint(endpoint).await
    }

    async fn wait_operation(
        &self,
        operation: &Operation,
        timeout: Duration,
    ) -> Result<(), AppError> {
        self.client
            .wait_operation(operation, timeout)
            .await
            .map(drop)
    }

    async fn build_transformers(
        &self,
        config: &EnrichmentConfig,
        index: &IndexRef,
    ) -> Result<TransformerSet, AppError> {
        Ok(build_warehouse_transformers(&self.client, config, index))
    }

    async fn search(
        &self,
        endpoint: &IndexEndpointRef,
        query: &SearchQuery,
        page_size: usize,
    ) -> Result<SearchResponse, AppError> {
        self.client.search(endpoint, query, page_size).await
    }
}
