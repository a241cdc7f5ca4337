use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use common::{
    error::AppError,
    warehouse::{
        AssetRef, CorpusRef, DeployedIndexReference, IndexEndpointRef, IndexInfo, IndexRef,
        IndexState, Location, Operation, SearchCriterion, SearchQuery, SearchResponse,
    },
};
use serde_json::json;
use tokio::sync::Mutex;

use super::{
    CleanupFlags, CorpusSpec, IndexSpec, PipelineConfig, PipelineTuning, ProvisioningPipeline,
    ReusedIndexPolicy, RunPlan, StepOutcome, TeardownAction, WarehouseServices,
};
use crate::transformers::{EnrichmentConfig, Transformer, TransformerKind, TransformerSet};

const PROJECT: &str = "123456";
const REGION: &str = "us-central1";
const DEPLOY_OP: &str = "projects/123456/locations/us-central1/operations/deploy";
const UNDEPLOY_OP: &str = "projects/123456/locations/us-central1/operations/undeploy";

struct MockTransformer {
    kind: TransformerKind,
    fail: bool,
    processed: AtomicUsize,
    teardowns: AtomicUsize,
}

#[async_trait]
impl Transformer for MockTransformer {
    fn kind(&self) -> TransformerKind {
        self.kind
    }

    async fn process(&self, _asset: &AssetRef) -> Result<(), AppError> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if self.fail {
            return Err(AppError::Processing("mock transform failure".into()));
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), AppError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockServices {
    failing_sources: HashSet<String>,
    existing_index: Option<IndexInfo>,
    deploy_completes: bool,
    undeploy_completes: bool,
    transforms_fail: bool,
    search_fails: bool,
    transformers: Mutex<Vec<Arc<MockTransformer>>>,
    calls: Mutex<Vec<String>>,
}

impl MockServices {
    fn new() -> Self {
        Self {
            failing_sources: HashSet::new(),
            existing_index: None,
            deploy_completes: true,
            undeploy_completes: true,
            transforms_fail: false,
            search_fails: false,
            transformers: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn called(&self, prefix: &str) -> bool {
        self.calls
            .lock()
            .await
            .iter()
            .any(|call| call.starts_with(prefix))
    }
}

#[async_trait]
impl WarehouseServices for MockServices {
    async fn resolve_project_number(&self, _project_id: &str) -> Result<String, AppError> {
        self.record("resolve_project").await;
        Ok(PROJECT.into())
    }

    async fn create_corpus(
        &self,
        location: &Location,
        _display_name: &str,
        _description: &str,
    ) -> Result<CorpusRef, AppError> {
        self.record("create_corpus").await;
        Ok(CorpusRef::from_parts(
            &location.project_number,
            &location.region,
            "created-corpus",
        ))
    }

    async fn delete_corpus(&self, corpus: &CorpusRef) -> Result<(), AppError> {
        self.record(format!("delete_corpus:{corpus}")).await;
        Ok(())
    }

    async fn create_and_upload_asset(
        &self,
        corpus: &CorpusRef,
        source: &str,
    ) -> Result<AssetRef, AppError> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.record(format!("upload:{source}")).await;
        if self.failing_sources.contains(source) {
            return Err(AppError::Api {
                status: 400,
                message: format!("cannot read {source}"),
            });
        }
        let id = source.rsplit('/').next().unwrap_or(source);
        Ok(AssetRef::new(format!("{corpus}/assets/{id}")))
    }

    async fn delete_asset(&self, asset: &AssetRef) -> Result<(), AppError> {
        self.record(format!("delete_asset:{asset}")).await;
        Ok(())
    }

    async fn create_index(
        &self,
        corpus: &CorpusRef,
        _display_name: &str,
    ) -> Result<IndexRef, AppError> {
        self.record("create_index").await;
        Ok(IndexRef::from_parts(corpus, "created-index"))
    }

    async fn get_index(&self, index: &IndexRef) -> Result<IndexInfo, AppError> {
        self.record("get_index").await;
        self.existing_index
            .clone()
            .ok_or_else(|| AppError::NotFound(index.to_string()))
    }

    async fn deploy_index(
        &self,
        _endpoint: &IndexEndpointRef,
        _index: &IndexRef,
    ) -> Result<Operation, AppError> {
        self.record("deploy_index").await;
        Ok(Operation {
            name: DEPLOY_OP.into(),
        })
    }

    async fn undeploy_index(&self, _endpoint: &IndexEndpointRef) -> Result<Operation, AppError> {
        self.record("undeploy_index").await;
        Ok(Operation {
            name: UNDEPLOY_OP.into(),
        })
    }

    async fn delete_index(&self, index: &IndexRef) -> Result<(), AppError> {
        self.record(format!("delete_index:{index}")).await;
        Ok(())
    }

    async fn create_index_endpoint(
        &self,
        location: &Location,
        _display_name: &str,
    ) -> Result<IndexEndpointRef, AppError> {
        self.record("create_endpoint").await;
        Ok(IndexEndpointRef::new(format!(
            "{}/indexEndpoints/created-endpoint",
            location.parent()
        )))
    }

    async fn delete_index_endpoint(&self, endpoint: &IndexEndpointRef) -> Result<(), AppError> {
        self.record(format!("delete_endpoint:{endpoint}")).await;
        Ok(())
    }

    async fn wait_operation(
        &self,
        operation: &Operation,
        timeout: Duration,
    ) -> Result<(), AppError> {
        self.record(format!("wait:{}:{}", operation.name, timeout.as_secs()))
            .await;
        let completes = match operation.name.as_str() {
            DEPLOY_OP => self.deploy_completes,
            UNDEPLOY_OP => self.undeploy_completes,
            _ => true,
        };
        if completes {
            Ok(())
        } else {
            Err(AppError::OperationTimeout {
                operation: operation.name.clone(),
                timeout_secs: timeout.as_secs(),
            })
        }
    }

    async fn build_transformers(
        &self,
        config: &EnrichmentConfig,
        _index: &IndexRef,
    ) -> Result<TransformerSet, AppError> {
        self.record("build_transformers").await;
        let mut kinds = config.enabled_kinds();
        kinds.push(TransformerKind::Indexing);

        let built: Vec<Arc<MockTransformer>> = kinds
            .into_iter()
            .map(|kind| {
                Arc::new(MockTransformer {
                    kind,
                    fail: self.transforms_fail,
                    processed: AtomicUsize::new(0),
                    teardowns: AtomicUsize::new(0),
                })
            })
            .collect();
        self.transformers.lock().await.extend(built.iter().cloned());

        Ok(built
            .into_iter()
            .map(|t| t as Arc<dyn Transformer>)
            .collect())
    }

    async fn search(
        &self,
        _endpoint: &IndexEndpointRef,
        query: &SearchQuery,
        page_size: usize,
    ) -> Result<SearchResponse, AppError> {
        self.record(format!("search:{}", query.text)).await;
        if self.search_fails {
            return Err(AppError::Api {
                status: 500,
                message: "search backend down".into(),
            });
        }
        Ok(json!({ "searchResultItems": [], "pageSize": page_size }))
    }
}

fn sources(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("gs://media-bucket/clip-{i}.mp4"))
        .collect()
}

fn plan(sources: Vec<String>) -> RunPlan {
    RunPlan {
        location: Location::new(PROJECT, REGION),
        corpus: CorpusSpec {
            display_name: "my_vw_corpus_name".into(),
            description: "This is my VW Corpus".into(),
            existing_id: None,
        },
        index: IndexSpec {
            display_name: "my_vw_index".into(),
            endpoint_display_name: "my_vw_endpoint".into(),
            existing_id: None,
        },
        sources,
        enrichment: EnrichmentConfig::default(),
        queries: vec![
            SearchQuery {
                text: "a dog catching a frisbee".into(),
                criteria: Vec::new(),
            },
            SearchQuery {
                text: "breakfast".into(),
                criteria: vec![SearchCriterion {
                    field: "speech".into(),
                    values: vec!["pancakes".into()],
                }],
            },
        ],
    }
}

fn pipeline_config(cleanup: CleanupFlags) -> PipelineConfig {
    PipelineConfig {
        tuning: PipelineTuning {
            pool_capacity: 3,
            ..PipelineTuning::default()
        },
        reused_index_policy: ReusedIndexPolicy::WarnAndContinue,
        cleanup,
    }
}

fn pipeline(config: PipelineConfig, services: &Arc<MockServices>) -> ProvisioningPipeline {
    let services: Arc<dyn WarehouseServices> = Arc::clone(services) as Arc<dyn WarehouseServices>;
    ProvisioningPipeline::with_services(config, services).expect("pipeline")
}

fn deployed_index(state: IndexState, replicas: usize) -> IndexInfo {
    let corpus = CorpusRef::from_parts(PROJECT, REGION, "existing-corpus");
    IndexInfo {
        name: IndexRef::from_parts(&corpus, "existing-index"),
        state,
        deployed_indexes: (0..replicas)
            .map(|i| DeployedIndexReference {
                index_endpoint: IndexEndpointRef::new(format!(
                    "projects/{PROJECT}/locations/{REGION}/indexEndpoints/existing-endpoint-{i}"
                )),
            })
            .collect(),
    }
}

#[tokio::test]
async fn failed_upload_is_excluded_and_run_proceeds_to_index_build() {
    let sources = sources(7);
    let failing = sources.get(3).expect("fourth source").clone();
    let mut mock = MockServices::new();
    mock.failing_sources.insert(failing.clone());
    let services = Arc::new(mock);

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan(sources))
        .await
        .expect("run succeeds");

    assert_eq!(summary.uploaded.len(), 6);
    assert_eq!(summary.upload_failures, 1);
    assert!(summary
        .uploaded
        .iter()
        .all(|asset| !asset.name().ends_with("/assets/clip-4.mp4")));
    assert!(services.called("create_index").await);
    assert!(services.called("deploy_index").await);
    assert_eq!(summary.transformed, 6);
    assert_eq!(summary.queries_issued, 2);
}

#[tokio::test]
async fn uploaded_count_is_submitted_minus_failures() {
    let sources = sources(10);
    let mut mock = MockServices::new();
    for failing in sources.iter().step_by(3) {
        mock.failing_sources.insert(failing.clone());
    }
    let expected_failures = mock.failing_sources.len();
    let services = Arc::new(mock);

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan(sources.clone()))
        .await
        .expect("run succeeds");

    assert_eq!(summary.uploaded.len(), sources.len() - expected_failures);
    assert_eq!(summary.upload_failures, expected_failures);
    for failing in &services.failing_sources {
        let id = failing.rsplit('/').next().expect("file name");
        assert!(summary
            .uploaded
            .iter()
            .all(|asset| !asset.name().ends_with(&format!("/assets/{id}"))));
    }
}

#[tokio::test]
async fn transformers_are_released_once_even_when_every_asset_fails() {
    let mut mock = MockServices::new();
    mock.transforms_fail = true;
    let services = Arc::new(mock);

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan(sources(5)))
        .await
        .expect("transform failures are contained");

    assert_eq!(summary.transformed, 0);
    assert_eq!(summary.transform_failures, 5);

    let transformers = services.transformers.lock().await;
    assert_eq!(transformers.len(), 4);
    for transformer in transformers.iter() {
        assert_eq!(
            transformer.teardowns.load(Ordering::SeqCst),
            1,
            "{} released once",
            transformer.kind
        );
    }
}

#[tokio::test]
async fn every_transformer_processes_every_uploaded_asset() {
    let services = Arc::new(MockServices::new());

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan(sources(4)))
        .await
        .expect("run succeeds");

    assert_eq!(summary.transformed, 4);
    let transformers = services.transformers.lock().await;
    assert!(transformers
        .iter()
        .all(|t| t.processed.load(Ordering::SeqCst) == 4));
    assert_eq!(
        transformers.last().map(|t| t.kind),
        Some(TransformerKind::Indexing)
    );
}

#[tokio::test]
async fn reused_corpus_id_skips_creation() {
    let services = Arc::new(MockServices::new());
    let mut plan = plan(sources(2));
    plan.corpus.existing_id = Some("existing-corpus".into());

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan)
        .await
        .expect("run succeeds");

    assert!(!services.called("create_corpus").await);
    assert_eq!(
        summary.corpus.as_ref().map(CorpusRef::name),
        Some("projects/123456/locations/us-central1/corpora/existing-corpus")
    );
}

#[tokio::test]
async fn reused_index_attaches_to_first_replica_without_create_or_deploy() {
    let mut mock = MockServices::new();
    mock.existing_index = Some(deployed_index(IndexState::Created, 1));
    let services = Arc::new(mock);
    let mut plan = plan(sources(3));
    plan.corpus.existing_id = Some("existing-corpus".into());
    plan.index.existing_id = Some("existing-index".into());

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan)
        .await
        .expect("run succeeds");

    let deployment = summary.deployment.expect("deployment");
    assert_eq!(
        deployment.index.name(),
        "projects/123456/locations/us-central1/corpora/existing-corpus/indexes/existing-index"
    );
    assert_eq!(
        deployment.endpoint.name(),
        "projects/123456/locations/us-central1/indexEndpoints/existing-endpoint-0"
    );
    assert!(!services.called("create_index").await);
    assert!(!services.called("create_endpoint").await);
    assert!(!services.called("deploy_index").await);
}

#[tokio::test]
async fn strict_policy_rejects_reused_index_that_is_not_created() {
    let mut mock = MockServices::new();
    mock.existing_index = Some(deployed_index(IndexState::Creating, 1));
    let services = Arc::new(mock);
    let mut plan = plan(sources(2));
    plan.index.existing_id = Some("existing-index".into());
    let config = PipelineConfig {
        reused_index_policy: ReusedIndexPolicy::Strict,
        ..pipeline_config(CleanupFlags::default())
    };

    let result = pipeline(config, &services).run(&plan).await;

    assert!(matches!(result, Err(AppError::InvalidIndex(_))));
    assert!(!services.called("build_transformers").await);
    assert!(!services.called("search:").await);
}

#[tokio::test]
async fn permissive_policy_continues_with_invalid_state_when_replica_exists() {
    let mut mock = MockServices::new();
    mock.existing_index = Some(deployed_index(IndexState::Updating, 2));
    let services = Arc::new(mock);
    let mut plan = plan(sources(2));
    plan.index.existing_id = Some("existing-index".into());

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan)
        .await
        .expect("warn-and-continue keeps going");

    assert_eq!(
        summary.deployment.map(|d| d.endpoint.name().to_string()),
        Some("projects/123456/locations/us-central1/indexEndpoints/existing-endpoint-0".into())
    );
    assert_eq!(summary.queries_issued, 2);
}

#[tokio::test]
async fn reused_index_without_replica_cannot_be_queried() {
    let mut mock = MockServices::new();
    mock.existing_index = Some(deployed_index(IndexState::Created, 0));
    let services = Arc::new(mock);
    let mut plan = plan(sources(1));
    plan.index.existing_id = Some("existing-index".into());

    let result = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan)
        .await;

    assert!(matches!(result, Err(AppError::InvalidIndex(_))));
    assert!(!services.called("search:").await);
}

#[tokio::test]
async fn deploy_timeout_aborts_before_any_query() {
    let mut mock = MockServices::new();
    mock.deploy_completes = false;
    let services = Arc::new(mock);

    let result = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan(sources(3)))
        .await;

    match result {
        Err(AppError::OperationTimeout {
            operation,
            timeout_secs,
        }) => {
            assert_eq!(operation, DEPLOY_OP);
            assert_eq!(timeout_secs, 7_200);
        }
        other => panic!("expected deploy timeout, got {other:?}"),
    }
    assert!(!services.called("search:").await);
    assert!(!services.called("build_transformers").await);
    assert!(!services.called("delete_").await, "no automatic rollback");
}

#[tokio::test]
async fn query_failure_ends_the_run() {
    let mut mock = MockServices::new();
    mock.search_fails = true;
    let services = Arc::new(mock);

    let result = pipeline(
        pipeline_config(CleanupFlags {
            assets: true,
            index: true,
            corpus: true,
        }),
        &services,
    )
    .run(&plan(sources(2)))
    .await;

    assert!(matches!(result, Err(AppError::Api { status: 500, .. })));
    let searches = services
        .calls()
        .await
        .into_iter()
        .filter(|call| call.starts_with("search:"))
        .count();
    assert_eq!(searches, 1, "no retries after the first failure");
    assert!(!services.called("delete_").await);
}

#[tokio::test]
async fn full_cleanup_runs_in_dependency_order() {
    let services = Arc::new(MockServices::new());

    let summary = pipeline(
        pipeline_config(CleanupFlags {
            assets: true,
            index: true,
            corpus: true,
        }),
        &services,
    )
    .run(&plan(sources(2)))
    .await
    .expect("run succeeds");

    let calls = services.calls().await;
    let teardown: Vec<&str> = calls
        .iter()
        .map(String::as_str)
        .skip_while(|call| !call.starts_with("delete_asset:"))
        .collect();

    assert_eq!(teardown.len(), 7);
    assert!(teardown
        .get(0..2)
        .expect("asset deletions")
        .iter()
        .all(|call| call.starts_with("delete_asset:")));
    assert_eq!(
        teardown.get(2..).expect("index and corpus teardown"),
        [
            "undeploy_index",
            &format!("wait:{UNDEPLOY_OP}:1800") as &str,
            "delete_index:projects/123456/locations/us-central1/corpora/created-corpus/indexes/created-index",
            "delete_endpoint:projects/123456/locations/us-central1/indexEndpoints/created-endpoint",
            "delete_corpus:projects/123456/locations/us-central1/corpora/created-corpus",
        ]
    );

    let actions: Vec<TeardownAction> = summary.teardown.steps.iter().map(|s| s.action).collect();
    assert_eq!(
        actions,
        vec![
            TeardownAction::DeleteAsset,
            TeardownAction::DeleteAsset,
            TeardownAction::UndeployIndex,
            TeardownAction::DeleteIndex,
            TeardownAction::DeleteEndpoint,
            TeardownAction::DeleteCorpus,
        ]
    );
    assert_eq!(summary.teardown.failures(), 0);
}

#[tokio::test]
async fn failed_undeploy_keeps_index_and_endpoint_but_still_deletes_corpus() {
    let mut mock = MockServices::new();
    mock.undeploy_completes = false;
    let services = Arc::new(mock);

    let summary = pipeline(
        pipeline_config(CleanupFlags {
            assets: false,
            index: true,
            corpus: true,
        }),
        &services,
    )
    .run(&plan(sources(1)))
    .await
    .expect("teardown failures do not fail the run");

    assert!(!services.called("delete_endpoint:").await);
    assert!(!services.called("delete_index:").await);
    assert!(!services.called("delete_asset:").await);
    assert!(services.called("delete_corpus:").await);

    let outcomes: Vec<(TeardownAction, bool)> = summary
        .teardown
        .steps
        .iter()
        .map(|s| (s.action, matches!(s.outcome, StepOutcome::Skipped(_))))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (TeardownAction::UndeployIndex, false),
            (TeardownAction::DeleteIndex, true),
            (TeardownAction::DeleteEndpoint, true),
            (TeardownAction::DeleteCorpus, false),
        ]
    );
    assert_eq!(summary.teardown.failures(), 1);
}

#[tokio::test]
async fn cleanup_flags_off_leave_everything_in_place() {
    let services = Arc::new(MockServices::new());

    let summary = pipeline(pipeline_config(CleanupFlags::default()), &services)
        .run(&plan(sources(3)))
        .await
        .expect("run succeeds");

    assert!(summary.teardown.steps.is_empty());
    assert!(!services.called("delete_").await);
    assert!(!services.called("undeploy_index").await);
}

#[tokio::test]
async fn project_number_is_resolved_only_when_not_configured() {
    let services = Arc::new(MockServices::new());
    let pipeline = pipeline(pipeline_config(CleanupFlags::default()), &services);
    let mut config = common::utils::config::AppConfig {
        project_id: "media-lab".into(),
        project_number: Some("999".into()),
        region: REGION.into(),
        api_base_url: "https://warehouse.example/v1".into(),
        resource_manager_url: "https://resource-manager.example/v3".into(),
        access_token: "token".into(),
        request_timeout_secs: 5,
        operation_poll_interval_ms: 10,
    };

    let configured = pipeline
        .resolve_location(&config)
        .await
        .expect("location");
    assert_eq!(configured, Location::new("999", REGION));
    assert!(!services.called("resolve_project").await);

    config.project_number = None;
    let resolved = pipeline
        .resolve_location(&config)
        .await
        .expect("location");
    assert_eq!(resolved, Location::new(PROJECT, REGION));
    assert!(services.called("resolve_project").await);
}
