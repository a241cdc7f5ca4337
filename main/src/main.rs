mod args;

use anyhow::Context;
use clap::Parser;
use common::utils::config::get_config;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warehouse_pipeline::{load_manifest, pipeline::StepOutcome, ProvisioningPipeline, RunPlan};

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();

    let args = Args::parse();

    // Get config
    let config = get_config().context("loading configuration")?;
    let manifest = load_manifest(&args.manifest)
        .with_context(|| format!("loading run manifest {}", args.manifest))?;

    if manifest.sources.is_empty() {
        warn!(manifest = %args.manifest, "run manifest lists no media sources");
    }

    let pipeline = ProvisioningPipeline::new(&config, args.pipeline_config())
        .context("building provisioning pipeline")?;
    let location = pipeline
        .resolve_location(&config)
        .await
        .context("resolving project")?;
    info!(
        project_id = %config.project_id,
        project_number = %location.project_number,
        region = %location.region,
        "project resolved"
    );

    let plan = RunPlan {
        location,
        corpus: args.corpus_spec(),
        index: args.index_spec(),
        sources: manifest.sources,
        enrichment: manifest.enrichment,
        queries: manifest.queries,
    };

    let summary = pipeline.run(&plan).await.context("provisioning run failed")?;

    for step in &summary.teardown.steps {
        if let StepOutcome::Failed(reason) = &step.outcome {
            warn!(action = %step.action, resource = %step.resource, %reason, "resource left in place");
        }
    }

    info!(
        run_id = %summary.run_id,
        corpus = ?summary.corpus.as_ref().map(|corpus| corpus.name()),
        index = ?summary.deployment.as_ref().map(|d| d.index.name()),
        endpoint = ?summary.deployment.as_ref().map(|d| d.endpoint.name()),
        uploaded = summary.uploaded.len(),
        upload_failures = summary.upload_failures,
        transformed = summary.transformed,
        queries = summary.queries_issued,
        "provisioning complete"
    );

    Ok(())
}
