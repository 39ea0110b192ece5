use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SpinnakerError {
    #[error("required field `{field}` not found")]
    MissingField { field: String },

    #[error("invalid workflow version `{version}`: {message}")]
    VersionParse { version: String, message: String },

    #[error("invalid timestamp `{timestamp}`: {message}")]
    TimestampParse { timestamp: String, message: String },

    #[error("failed to load JSON schema {name}: {message}")]
    SchemaLoad { name: String, message: String },

    #[error("{0} invalid metadata objects found")]
    #[diagnostic(help("fix the listed bundles before uploading; nothing was written"))]
    InvalidBundles(usize),

    #[error("no input files")]
    NoInputs,

    #[error("failed to read input file {path}: {message}")]
    InputRead { path: PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("bundles from previous upload found in {0}")]
    #[diagnostic(help("use a fresh output directory"))]
    PreviousUpload(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("upload registration failed: {0}")]
    RegistrationFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("upload manifest has no entry for {0}")]
    ManifestEntryMissing(String),

    #[error("submission server request failed: {0}")]
    SubmissionHttp(String),

    #[error("submission server returned status {status}: {message}")]
    SubmissionStatus { status: u16, message: String },
}

impl SpinnakerError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        SpinnakerError::MissingField {
            field: field.into(),
        }
    }
}
