use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub project_id: String,
    /// Numeric project id. Resolved through the resource manager when absent.
    #[serde(default)]
    pub project_number: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_resource_manager_url")]
    pub resource_manager_url: String,
    pub access_token: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_operation_poll_interval_ms")]
    pub operation_poll_interval_ms: u64,
}

// Only us-central1 serves the warehouse API.
fn default_region() -> String {
    "us-central1".to_string()
}

fn default_api_base_url() -> String {
    "https://warehouse-visionai.googleapis.com/v1".to_string()
}

fn default_resource_manager_url() -> String {
    "https://cloudresourcemanager.googleapis.com/v3".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_operation_poll_interval_ms() -> u64 {
    5_000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    load_config("config")
}

/// Loads configuration from `file_stem` (any format the `config` crate knows,
/// optional) overlaid with environment variables.
pub fn load_config(file_stem: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
