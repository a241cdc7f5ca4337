#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod manifest;
pub mod pipeline;
pub mod transformers;

pub use manifest::{load_manifest, RunManifest};
pub use pipeline::{PipelineConfig, ProvisioningPipeline, RunPlan, RunSummary};
