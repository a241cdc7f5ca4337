use common::{error::AppError, warehouse::SearchQuery};
use config::{Config, File};
use serde::Deserialize;

use crate::transformers::EnrichmentConfig;

/// Media sources, sample queries and enrichment settings for a run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunManifest {
    pub sources: Vec<String>,
    pub queries: Vec<SearchQuery>,
    pub enrichment: EnrichmentConfig,
}

/// Loads a manifest from `file_stem` in any format the `config` crate supports.
/// A missing file yields an empty manifest.
pub fn load_manifest(file_stem: &str) -> Result<RunManifest, AppError> {
    let manifest = Config::builder()
        .add_source(File::with_name(file_stem).required(false))
        .build()?;

    Ok(manifest.try_deserialize()?)
}
