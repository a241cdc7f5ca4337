use clap::Parser;
use warehouse_pipeline::pipeline::{
    CleanupFlags, CorpusSpec, IndexSpec, PipelineConfig, PipelineTuning, ReusedIndexPolicy,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Provision a media warehouse corpus, index and sample queries", long_about = None)]
pub struct Args {
    /// Display name for a newly created corpus
    #[arg(long, default_value = "my_vw_corpus_name", env = "VW_CORPUS_NAME")]
    pub corpus: String,

    /// Description for a newly created corpus
    #[arg(long, default_value = "This is my VW Corpus", env = "VW_CORPUS_DESC")]
    pub corpus_desc: String,

    /// Display name for a newly created index
    #[arg(long, default_value = "my_vw_index", env = "VW_INDEX_NAME")]
    pub index: String,

    /// Display name for a newly created index endpoint
    #[arg(long, default_value = "my_vw_endpoint", env = "VW_INDEX_ENDPOINT_NAME")]
    pub index_endpoint: String,

    /// Reuse an existing corpus instead of creating one
    #[arg(long, env = "VW_CORPUS_ID")]
    pub corpus_id: Option<String>,

    /// Reuse an existing, already deployed index
    #[arg(long, env = "VW_INDEX_ID")]
    pub index_id: Option<String>,

    /// Delete the corpus after the run
    #[arg(long, env = "VW_CLEAN_CORPUS")]
    pub clean_corpus: bool,

    /// Delete uploaded assets after the run
    #[arg(long, env = "VW_CLEAN_ASSETS")]
    pub clean_assets: bool,

    /// Undeploy and delete the index and its endpoint after the run
    #[arg(long, env = "VW_CLEAN_INDEX")]
    pub clean_index: bool,

    /// Fail the run when a reused index is not created or not deployed
    #[arg(long, env = "VW_STRICT_INDEX")]
    pub strict_index: bool,

    /// Maximum number of concurrent upload and transform tasks
    #[arg(long, default_value_t = 8, env = "VW_CONCURRENCY")]
    pub concurrency: usize,

    /// Run manifest file stem (sources, queries, enrichment)
    #[arg(long, default_value = "manifest", env = "VW_MANIFEST")]
    pub manifest: String,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            tuning: PipelineTuning {
                pool_capacity: self.concurrency,
                ..PipelineTuning::default()
            },
            reused_index_policy: if self.strict_index {
                ReusedIndexPolicy::Strict
            } else {
                ReusedIndexPolicy::WarnAndContinue
            },
            cleanup: CleanupFlags {
                assets: self.clean_assets,
                index: self.clean_index,
                corpus: self.clean_corpus,
            },
        }
    }

    pub fn corpus_spec(&self) -> CorpusSpec {
        CorpusSpec {
            display_name: self.corpus.clone(),
            description: self.corpus_desc.clone(),
            existing_id: self.corpus_id.clone(),
        }
    }

    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            display_name: self.index.clone(),
            endpoint_display_name: self.index_endpoint.clone(),
            existing_id: self.index_id.clone(),
        }
    }
}
