use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use md5::Md5;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::error::SpinnakerError;

/// Filesystem access needed while assembling bundles and manifests.
pub trait FileProbe {
    fn size(&self, path: &Path) -> Result<u64, SpinnakerError>;
    /// Content checksum recorded as `file_sha` in bundle metadata.
    fn checksum(&self, path: &Path) -> Result<String, SpinnakerError>;
    /// Hex md5 digest used by the registration manifest.
    fn md5(&self, path: &Path) -> Result<String, SpinnakerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileProbe;

impl LocalFileProbe {
    pub fn new() -> Self {
        Self
    }
}

impl FileProbe for LocalFileProbe {
    fn size(&self, path: &Path) -> Result<u64, SpinnakerError> {
        fs::metadata(path)
            .map(|meta| meta.len())
            .map_err(|err| SpinnakerError::Filesystem(format!("stat {}: {err}", path.display())))
    }

    fn checksum(&self, path: &Path) -> Result<String, SpinnakerError> {
        info!(file = %display_name(path), "calculating sha1 sum");
        let digest = hash_file::<Sha1>(path)?;
        debug!(file = %display_name(path), "sha1 sum done");
        Ok(format!("sha1${digest}"))
    }

    fn md5(&self, path: &Path) -> Result<String, SpinnakerError> {
        info!(file = %display_name(path), "calculating md5 checksum");
        hash_file::<Md5>(path)
    }
}

fn hash_file<D: Digest + io::Write>(path: &Path) -> Result<String, SpinnakerError> {
    let file = File::open(path)
        .map_err(|err| SpinnakerError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)
        .map_err(|err| SpinnakerError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
