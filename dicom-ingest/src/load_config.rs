/// `load_config` module: reads the YAML config file into [`CliConfig`] and
/// applies environment overrides.
///
/// This module is the only place where untrusted YAML is parsed.
///
/// # Responsibilities
/// - Parse the `upload` and `ingest` sections into typed structs, with
///   defaults for everything except the endpoint.
/// - Let `DICOM_INGEST_ENDPOINT` (from the environment or a `.env` file)
///   override `upload.endpoint`.
/// - Refuse a config that neither names an endpoint nor asks for a dry run.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use dicom_ingest_core::IngestConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Environment variable that overrides `upload.endpoint`.
pub const ENDPOINT_ENV: &str = "DICOM_INGEST_ENDPOINT";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadSection {
    /// Base URL of the ingest endpoint, e.g. `https://pacs.example.org/api`.
    pub endpoint: Option<String>,
    /// Log every call instead of sending it.
    #[serde(default)]
    pub dry_run: bool,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    dotenvy::dotenv().ok();
    if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
        if !endpoint.trim().is_empty() {
            info!(env = ENDPOINT_ENV, "Endpoint overridden from environment");
            config.upload.endpoint = Some(endpoint);
        }
    }

    if config.upload.endpoint.is_none() && !config.upload.dry_run {
        error!(config_path = ?path_ref, "No upload endpoint configured");
        bail!("upload.endpoint is not set (set it in the config or via {ENDPOINT_ENV}, or enable upload.dry_run)");
    }

    config.ingest.trace_loaded();
    Ok(config)
}
