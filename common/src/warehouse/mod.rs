pub mod client;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a newtype around a fully qualified warehouse resource name.
macro_rules! resource_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn name(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

resource_name!(
    /// `projects/{number}/locations/{region}/corpora/{id}`
    CorpusRef
);
resource_name!(
    /// `{corpus}/assets/{id}`
    AssetRef
);
resource_name!(
    /// `{corpus}/indexes/{id}`
    IndexRef
);
resource_name!(
    /// `projects/{number}/locations/{region}/indexEndpoints/{id}`
    IndexEndpointRef
);

impl CorpusRef {
    /// Canonical corpus path. No lookup is made; the id is trusted as given.
    pub fn from_parts(project_number: &str, region: &str, corpus_id: &str) -> Self {
        Self(format!(
            "projects/{project_number}/locations/{region}/corpora/{corpus_id}"
        ))
    }
}

impl IndexRef {
    pub fn from_parts(corpus: &CorpusRef, index_id: &str) -> Self {
        Self(format!("{corpus}/indexes/{index_id}"))
    }
}

/// Project and region that own corpora and index endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub project_number: String,
    pub region: String,
}

impl Location {
    pub fn new(project_number: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project_number: project_number.into(),
            region: region.into(),
        }
    }

    pub fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.project_number, self.region
        )
    }
}

/// Handle on an in-flight long-running backend action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexState {
    StateUnspecified,
    Creating,
    Created,
    Updating,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedIndexReference {
    pub index_endpoint: IndexEndpointRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: IndexRef,
    #[serde(default = "unspecified_state")]
    pub state: IndexState,
    #[serde(default)]
    pub deployed_indexes: Vec<DeployedIndexReference>,
}

fn unspecified_state() -> IndexState {
    IndexState::StateUnspecified
}

/// Field/value criterion attached to a search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriterion {
    pub field: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub criteria: Vec<SearchCriterion>,
}

/// Search results are logged, never interpreted.
pub type SearchResponse = serde_json::Value;
