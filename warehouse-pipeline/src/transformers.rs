use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use common::{
    error::AppError,
    warehouse::{client::WarehouseClient, AssetRef, IndexRef},
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformerKind {
    TextRecognition,
    SpeechTranscription,
    Embedding,
    Indexing,
}

impl TransformerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextRecognition => "text-recognition",
            Self::SpeechTranscription => "speech-transcription",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
        }
    }

    /// Analyzer name understood by the warehouse `:analyze` call.
    fn analyzer(self) -> &'static str {
        match self {
            Self::TextRecognition => "OCR",
            Self::SpeechTranscription => "SPEECH_TRANSCRIPTION",
            Self::Embedding => "EMBEDDING",
            Self::Indexing => "INDEXING",
        }
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_language_code")]
    pub language_code: String,
}

fn default_language_code() -> String {
    "en-US".to_string()
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            language_code: default_language_code(),
        }
    }
}

/// Which enrichment transforms run ahead of indexing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub text_recognition: bool,
    pub speech_transcription: Option<SpeechSettings>,
    pub embedding: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            text_recognition: true,
            speech_transcription: Some(SpeechSettings::default()),
            embedding: true,
        }
    }
}

impl EnrichmentConfig {
    /// Enabled enrichment kinds in execution order.
    pub fn enabled_kinds(&self) -> Vec<TransformerKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.text_recognition {
            kinds.push(TransformerKind::TextRecognition);
        }
        if self.speech_transcription.is_some() {
            kinds.push(TransformerKind::SpeechTranscription);
        }
        if self.embedding {
            kinds.push(TransformerKind::Embedding);
        }
        kinds
    }
}

/// A per-asset enrichment or indexing unit. One instance serves every asset of a
/// run concurrently and is released once at the end.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn kind(&self) -> TransformerKind;

    async fn process(&self, asset: &AssetRef) -> Result<(), AppError>;

    async fn teardown(&self) -> Result<(), AppError>;
}

pub type TransformerSet = Vec<Arc<dyn Transformer>>;

enum Target {
    Analyze { language_code: Option<String> },
    Index(IndexRef),
}

pub struct WarehouseTransformer {
    kind: TransformerKind,
    client: WarehouseClient,
    target: Target,
    processed: AtomicUsize,
    released: AtomicBool,
}

impl WarehouseTransformer {
    fn new(kind: TransformerKind, client: WarehouseClient, target: Target) -> Self {
        Self {
            kind,
            client,
            target,
            processed: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transformer for WarehouseTransformer {
    fn kind(&self) -> TransformerKind {
        self.kind
    }

    async fn process(&self, asset: &AssetRef) -> Result<(), AppError> {
        if self.released.load(Ordering::Acquire) {
            return Err(AppError::Processing(format!(
                "{} transformer used after release",
                self.kind
            )));
        }

        match &self.target {
            Target::Analyze { language_code } => {
                self.client
                    .analyze_asset(asset, self.kind.analyzer(), language_code.as_deref())
                    .await?;
            }
            Target::Index(index) => self.client.index_asset(asset, index).await?,
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), AppError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(AppError::InternalError(format!(
                "{} transformer released twice",
                self.kind
            )));
        }
        debug!(
            transformer = %self.kind,
            processed = self.processed.load(Ordering::Relaxed),
            "transformer released"
        );
        Ok(())
    }
}

/// Enrichment transformers in configured order, then the indexing transformer
/// bound to `index`.
pub fn build_warehouse_transformers(
    client: &WarehouseClient,
    config: &EnrichmentConfig,
    index: &IndexRef,
) -> TransformerSet {
    let mut set: TransformerSet = config
        .enabled_kinds()
        .into_iter()
        .map(|kind| {
            let language_code = match kind {
                TransformerKind::SpeechTranscription => config
                    .speech_transcription
                    .as_ref()
                    .map(|speech| speech.language_code.clone()),
                _ => None,
            };
            Arc::new(WarehouseTransformer::new(
                kind,
                client.clone(),
                Target::Analyze { language_code },
            )) as Arc<dyn Transformer>
        })
        .collect();

    set.push(Arc::new(WarehouseTransformer::new(
        TransformerKind::Indexing,
        client.clone(),
        Target::Index(index.clone()),
    )));
    set
}
