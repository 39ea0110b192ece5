use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::SpinnakerError;

pub const DEFAULT_CONFIG_FILE: &str = "spinnaker.json";
pub const DEFAULT_OUTPUT_DIR: &str = "/outputs";
pub const DEFAULT_REGISTRATION_FILE: &str = "registration.tsv";
pub const DEFAULT_RECEIPT_FILE: &str = "receipt.tsv";
pub const DEFAULT_SUBMISSION_SERVER: &str = "http://storage2.ucsc-cgl.org:8460";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub registration_file: Option<String>,
    #[serde(default)]
    pub receipt_file: Option<String>,
    #[serde(default)]
    pub submission_server_url: Option<String>,
    #[serde(default)]
    pub input_metadata_schema: Option<String>,
    #[serde(default)]
    pub metadata_schema: Option<String>,
    #[serde(default)]
    pub force_upload: Option<bool>,
    #[serde(default)]
    pub skip_submit: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub output_dir: Utf8PathBuf,
    pub registration_file: String,
    pub receipt_file: String,
    pub submission_server_url: String,
    pub input_metadata_schema: Option<Utf8PathBuf>,
    pub metadata_schema: Option<Utf8PathBuf>,
    pub force_upload: bool,
    pub skip_submit: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `spinnaker.json` from the working directory when no
    /// path is given. Only an explicitly named file has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SpinnakerError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SpinnakerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SpinnakerError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            output_dir: Utf8PathBuf::from(
                config
                    .output_dir
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            registration_file: config
                .registration_file
                .unwrap_or_else(|| DEFAULT_REGISTRATION_FILE.to_string()),
            receipt_file: config
                .receipt_file
                .unwrap_or_else(|| DEFAULT_RECEIPT_FILE.to_string()),
            submission_server_url: config
                .submission_server_url
                .unwrap_or_else(|| DEFAULT_SUBMISSION_SERVER.to_string()),
            input_metadata_schema: config.input_metadata_schema.map(Utf8PathBuf::from),
            metadata_schema: config.metadata_schema.map(Utf8PathBuf::from),
            force_upload: config.force_upload.unwrap_or(false),
            skip_submit: config.skip_submit.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default());
        assert_eq!(resolved.output_dir, Utf8PathBuf::from("/outputs"));
        assert_eq!(resolved.registration_file, "registration.tsv");
        assert_eq!(resolved.receipt_file, "receipt.tsv");
        assert_eq!(resolved.submission_server_url, DEFAULT_SUBMISSION_SERVER);
        assert!(resolved.metadata_schema.is_none());
        assert!(!resolved.force_upload);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"output_dir": "/tmp/out", "skip_submit": true}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config);
        assert_eq!(resolved.output_dir, Utf8PathBuf::from("/tmp/out"));
        assert!(resolved.skip_submit);
        assert_eq!(resolved.receipt_file, DEFAULT_RECEIPT_FILE);
    }
}
