use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error, info};

use crate::error::SpinnakerError;

pub const METADATA_CLIENT: &str = "dcc-metadata-client";
pub const STORAGE_CLIENT: &str = "icgc-storage-client";

/// Registration and transfer of bundle files to the storage service.
pub trait UploadClient {
    /// Registers every file in `manifest`; the tool writes its upload
    /// manifest into `out_dir`.
    fn register(&self, manifest: &Path, out_dir: &Path) -> Result<(), SpinnakerError>;
    fn upload(&self, manifest: &Path, force: bool) -> Result<(), SpinnakerError>;
}

#[derive(Debug, Clone)]
pub struct SystemUploadClient {
    metadata_client: Option<PathBuf>,
    storage_client: Option<PathBuf>,
}

impl Default for SystemUploadClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemUploadClient {
    pub fn new() -> Self {
        Self {
            metadata_client: find_in_path(METADATA_CLIENT),
            storage_client: find_in_path(STORAGE_CLIENT),
        }
    }

    fn require(tool: &Option<PathBuf>, name: &str) -> Result<PathBuf, SpinnakerError> {
        tool.clone()
            .ok_or_else(|| SpinnakerError::MissingTool(name.to_string()))
    }
}

impl UploadClient for SystemUploadClient {
    fn register(&self, manifest: &Path, out_dir: &Path) -> Result<(), SpinnakerError> {
        let program = Self::require(&self.metadata_client, METADATA_CLIENT)?;
        let args = vec![
            "-m".to_string(),
            manifest.to_string_lossy().to_string(),
            "-o".to_string(),
            out_dir.to_string_lossy().to_string(),
        ];
        info!(manifest = %manifest.display(), "registering upload");
        match run_cmd(&program, &args) {
            Ok(()) => Ok(()),
            Err(stderr) => {
                for line in relevant_errors(&stderr) {
                    error!("{line}");
                }
                Err(SpinnakerError::RegistrationFailed(format!(
                    "{METADATA_CLIENT} exited with an error"
                )))
            }
        }
    }

    fn upload(&self, manifest: &Path, force: bool) -> Result<(), SpinnakerError> {
        let program = Self::require(&self.storage_client, STORAGE_CLIENT)?;
        let mut args = vec![
            "upload".to_string(),
            "--manifest".to_string(),
            manifest.to_string_lossy().to_string(),
        ];
        if force {
            args.push("--force".to_string());
        }
        info!(manifest = %manifest.display(), force, "uploading files");
        run_cmd(&program, &args).map_err(|stderr| {
            let message = if stderr.is_empty() {
                format!("{STORAGE_CLIENT} exited with an error")
            } else {
                stderr
            };
            SpinnakerError::UploadFailed(message)
        })
    }
}

/// Runs a tool to completion. On failure the trimmed stderr is returned.
fn run_cmd(program: &Path, args: &[String]) -> Result<(), String> {
    debug!(program = %program.display(), ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| err.to_string())?;
    if output.status.success() {
        return Ok(());
    }
    Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
}

/// The tool's error lines, without the Java stack frames tagged `main]`.
pub fn relevant_errors(stderr: &str) -> Vec<&str> {
    stderr
        .lines()
        .filter(|line| line.contains("ERROR") && !line.contains("main]"))
        .collect()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
