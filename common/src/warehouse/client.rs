use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::debug;
use url::Url;

use crate::{error::AppError, utils::config::AppConfig};

use super::{
    AssetRef, CorpusRef, IndexEndpointRef, IndexInfo, IndexRef, Location, Operation, SearchQuery,
    SearchResponse,
};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3_600);
const POLL_RETRY_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct OperationStatus {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

/// HTTPS/JSON client for the media warehouse API.
#[derive(Clone)]
pub struct WarehouseClient {
    http: reqwest::Client,
    api_base: String,
    resource_manager_base: String,
    access_token: String,
    poll_interval: Duration,
    operation_timeout: Duration,
}

impl WarehouseClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: normalize_base(&config.api_base_url)?,
            resource_manager_base: normalize_base(&config.resource_manager_url)?,
            access_token: config.access_token.clone(),
            poll_interval: Duration::from_millis(config.operation_poll_interval_ms),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    /// Timeout applied to operations the client waits on internally
    /// (creations, uploads, analysis, deletions).
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub async fn resolve_project_number(&self, project_id: &str) -> Result<String, AppError> {
        let url = format!("{}/projects/{project_id}", self.resource_manager_base);
        let project: NamedResource = self.send(self.http.get(url)).await?;
        parse_project_number(&project.name)
    }

    pub async fn create_corpus(
        &self,
        location: &Location,
        display_name: &str,
        description: &str,
    ) -> Result<CorpusRef, AppError> {
        let body = json!({
            "displayName": display_name,
            "description": description,
            "type": "VIDEO_ON_DEMAND",
        });
        let operation: Operation = self
            .call(Method::POST, &format!("{}/corpora", location.parent()), Some(body))
            .await?;
        let created: NamedResource = self.wait_for_resource(&operation).await?;
        Ok(CorpusRef::new(created.name))
    }

    pub async fn delete_corpus(&self, corpus: &CorpusRef) -> Result<(), AppError> {
        let _: Value = self.call(Method::DELETE, corpus.name(), None).await?;
        Ok(())
    }

    pub async fn create_asset(&self, corpus: &CorpusRef) -> Result<AssetRef, AppError> {
        let asset: NamedResource = self
            .call(Method::POST, &format!("{corpus}/assets"), Some(json!({})))
            .await?;
        Ok(AssetRef::new(asset.name))
    }

    pub async fn upload_asset(&self, asset: &AssetRef, gcs_uri: &str) -> Result<(), AppError> {
        let body = json!({ "assetSource": { "assetGcsSource": { "gcsUri": gcs_uri } } });
        let operation: Operation = self
            .call(Method::POST, &format!("{asset}:upload"), Some(body))
            .await?;
        self.wait_operation(&operation, self.operation_timeout)
            .await
            .map(drop)
    }

    pub async fn delete_asset(&self, asset: &AssetRef) -> Result<(), AppError> {
        let operation: Operation = self.call(Method::DELETE, asset.name(), None).await?;
        self.wait_operation(&operation, self.operation_timeout)
            .await
            .map(drop)
    }

    /// Runs one analysis feature over an asset and waits for it to finish.
    pub async fn analyze_asset(
        &self,
        asset: &AssetRef,
        feature: &str,
        language_code: Option<&str>,
    ) -> Result<(), AppError> {
        let mut body = json!({ "analyzer": feature });
        if let Some(language_code) = language_code {
            body["languageCode"] = Value::from(language_code);
        }
        let operation: Operation = self
            .call(Method::POST, &format!("{asset}:analyze"), Some(body))
            .await?;
        self.wait_operation(&operation, self.operation_timeout)
            .await
            .map(drop)
    }

    pub async fn index_asset(&self, asset: &AssetRef, index: &IndexRef) -> Result<(), AppError> {
        let body = json!({ "index": index.name() });
        let operation: Operation = self
            .call(Method::POST, &format!("{asset}:index"), Some(body))
            .await?;
        self.wait_operation(&operation, self.operation_timeout)
            .await
            .map(drop)
    }

    pub async fn create_index(
        &self,
        corpus: &CorpusRef,
        display_name: &str,
    ) -> Result<IndexRef, AppError> {
        let body = json!({ "displayName": display_name });
        let operation: Operation = self
            .call(Method::POST, &format!("{corpus}/indexes"), Some(body))
            .await?;
        let created: NamedResource = self.wait_for_resource(&operation).await?;
        Ok(IndexRef::new(created.name))
    }

    pub async fn get_index(&self, index: &IndexRef) -> Result<IndexInfo, AppError> {
        self.call(Method::GET, index.name(), None).await
    }

    pub async fn delete_index(&self, index: &IndexRef) -> Result<(), AppError> {
        let operation: Operation = self.call(Method::DELETE, index.name(), None).await?;
        self.wait_operation(&operation, self.operation_timeout)
            .await
            .map(drop)
    }

    pub async fn create_index_endpoint(
        &self,
        location: &Location,
        display_name: &str,
    ) -> Result<IndexEndpointRef, AppError> {
        let body = json!({ "displayName": display_name });
        let operation: Operation = self
            .call(
                Method::POST,
                &format!("{}/indexEndpoints", location.parent()),
                Some(body),
            )
            .await?;
        let created: NamedResource = self.wait_for_resource(&operation).await?;
        Ok(IndexEndpointRef::new(created.name))
    }

    pub async fn delete_index_endpoint(&self, endpoint: &IndexEndpointRef) -> Result<(), AppError> {
        let operation: Operation = self.call(Method::DELETE, endpoint.name(), None).await?;
        self.wait_operation(&operation, self.operation_timeout)
            .await
            .map(drop)
    }

    pub async fn deploy_index(
        &self,
        endpoint: &IndexEndpointRef,
        index: &IndexRef,
    ) -> Result<Operation, AppError> {
        let body = json!({ "deployedIndex": { "index": index.name() } });
        self.call(Method::POST, &format!("{endpoint}:deployIndex"), Some(body))
            .await
    }

    pub async fn undeploy_index(&self, endpoint: &IndexEndpointRef) -> Result<Operation, AppError> {
        self.call(
            Method::POST,
            &format!("{endpoint}:undeployIndex"),
            Some(json!({})),
        )
        .await
    }

    pub async fn search(
        &self,
        endpoint: &IndexEndpointRef,
        query: &SearchQuery,
        page_size: usize,
    ) -> Result<SearchResponse, AppError> {
        self.call(
            Method::POST,
            &format!("{endpoint}:searchIndexEndpoint"),
            Some(search_body(query, page_size)),
        )
        .await
    }

    /// Blocks until `operation` is done or `timeout` elapses. A timeout leaves the
    /// backend operation running.
    pub async fn wait_operation(
        &self,
        operation: &Operation,
        timeout: Duration,
    ) -> Result<Option<Value>, AppError> {
        match tokio::time::timeout(timeout, self.poll_until_done(operation)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::OperationTimeout {
                operation: operation.name.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn poll_until_done(&self, operation: &Operation) -> Result<Option<Value>, AppError> {
        loop {
            let strategy = ExponentialBackoff::from_millis(100)
                .map(jitter)
                .take(POLL_RETRY_ATTEMPTS);
            let status: OperationStatus = RetryIf::spawn(
                strategy,
                || self.call::<OperationStatus>(Method::GET, &operation.name, None),
                |err: &AppError| err.is_transient(),
            )
            .await?;

            if let Some(outcome) = operation_outcome(status) {
                return outcome;
            }

            debug!(operation = %operation, "operation still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn wait_for_resource<T: DeserializeOwned>(
        &self,
        operation: &Operation,
    ) -> Result<T, AppError> {
        let response = self
            .wait_operation(operation, self.operation_timeout)
            .await?
            .ok_or_else(|| AppError::OperationFailed {
                operation: operation.name.clone(),
                message: "operation completed without a response".into(),
            })?;
        Ok(serde_json::from_value(response)?)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        resource: &str,
        body: Option<Value>,
    ) -> Result<T, AppError> {
        let url = format!("{}/{resource}", self.api_base);
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AppError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

fn normalize_base(raw: &str) -> Result<String, AppError> {
    let url = Url::parse(raw)
        .map_err(|e| AppError::Validation(format!("invalid base url {raw:?}: {e}")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_project_number(name: &str) -> Result<String, AppError> {
    name.strip_prefix("projects/")
        .filter(|number| !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(format!("unexpected project name {name:?}")))
}

/// `None` while the operation is still running.
fn operation_outcome(status: OperationStatus) -> Option<Result<Option<Value>, AppError>> {
    if !status.done {
        return None;
    }
    Some(match status.error {
        Some(error) => Err(AppError::OperationFailed {
            operation: status.name,
            message: format!("code {}: {}", error.code, error.message),
        }),
        None => Ok(status.response),
    })
}

fn search_body(query: &SearchQuery, page_size: usize) -> Value {
    let criteria: Vec<Value> = query
        .criteria
        .iter()
        .map(|criterion| {
            json!({
                "field": criterion.field,
                "textArray": { "txtValues": criterion.values },
            })
        })
        .collect();

    json!({
        "textQuery": query.text,
        "criteria": criteria,
        "pageSize": page_size,
    })
}
