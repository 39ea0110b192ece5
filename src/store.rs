use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::bundle::DonorBundle;
use crate::error::SpinnakerError;

pub const METADATA_FILE: &str = "metadata.json";
pub const UPLOAD_MANIFEST_DIR: &str = "redwoodUploadManifest";

/// On-disk layout of an output directory:
///
/// ```text
/// <root>/<bundle_uuid>/metadata.json
/// <root>/<bundle_uuid>/<data file symlinks>
/// <root>/donors/<donor_uuid>.json
/// <root>/redwoodUploadManifest/<bundle_uuid>
/// ```
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: Utf8PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn bundle_dir(&self, bundle_uuid: &Uuid) -> Utf8PathBuf {
        self.root.join(bundle_uuid.to_string())
    }

    pub fn metadata_path(&self, bundle_uuid: &Uuid) -> Utf8PathBuf {
        self.bundle_dir(bundle_uuid).join(METADATA_FILE)
    }

    pub fn donor_path(&self, donor_uuid: &Uuid) -> Utf8PathBuf {
        self.root.join("donors").join(format!("{donor_uuid}.json"))
    }

    pub fn upload_manifest_dir(&self) -> Utf8PathBuf {
        self.root.join(UPLOAD_MANIFEST_DIR)
    }

    pub fn ensure_root(&self) -> Result<(), SpinnakerError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(err.to_string()))
    }

    /// Refuses a directory that already holds bundles from an earlier run.
    pub fn ensure_fresh(&self) -> Result<(), SpinnakerError> {
        if !self.root.as_std_path().exists() {
            return Ok(());
        }
        let previous = walk_dir(self.root.as_std_path())?
            .into_iter()
            .any(|path| is_metadata_file(&path));
        if previous {
            return Err(SpinnakerError::PreviousUpload(self.root.to_string()));
        }
        Ok(())
    }

    /// Writes `metadata.json` and links each data file into the bundle
    /// directory. Output paths are rewritten to bare file names since the
    /// upload strips directories. Returns the bundle as stored.
    pub fn write_bundle(
        &self,
        bundle: &DonorBundle,
        cwd: &Utf8Path,
    ) -> Result<DonorBundle, SpinnakerError> {
        let bundle_uuid = bundle
            .bundle_uuid()
            .ok_or_else(|| SpinnakerError::missing_field("bundle_uuid"))?;
        let dir = self.bundle_dir(&bundle_uuid);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;

        let mut stored = bundle.clone();
        for output in stored.outputs_mut() {
            let original = Utf8PathBuf::from(&output.file_path);
            let file_name = original
                .file_name()
                .ok_or_else(|| {
                    SpinnakerError::Filesystem(format!("no file name in {original}"))
                })?
                .to_string();
            link_file(&cwd.join(&original), &dir.join(&file_name))?;
            output.file_path = file_name;
        }

        write_json_atomic(&dir.join(METADATA_FILE), &stored)?;
        debug!(%bundle_uuid, "wrote bundle");
        Ok(stored)
    }

    pub fn write_donor(&self, donor: &DonorBundle) -> Result<Utf8PathBuf, SpinnakerError> {
        let path = self.donor_path(&donor.donor_uuid);
        write_json_atomic(&path, donor)?;
        Ok(path)
    }

    /// Leaf directories holding a `metadata.json`, sorted by path.
    pub fn bundle_dirs(&self) -> Result<Vec<Utf8PathBuf>, SpinnakerError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for path in walk_dir(self.root.as_std_path())? {
            if !path.is_dir() || !path.join(METADATA_FILE).is_file() {
                continue;
            }
            let has_subdirs = fs::read_dir(&path)
                .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?
                .flatten()
                .any(|entry| entry.path().is_dir());
            if has_subdirs {
                continue;
            }
            dirs.push(to_utf8(path)?);
        }
        dirs.sort();
        Ok(dirs)
    }

    pub fn read_bundle(dir: &Utf8Path) -> Result<DonorBundle, SpinnakerError> {
        let path = dir.join(METADATA_FILE);
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| SpinnakerError::Json(format!("{path}: {err}")))
    }

    /// Regular files and links directly inside a bundle directory, sorted.
    pub fn bundle_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, SpinnakerError> {
        let mut files = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
            if entry.path().is_dir() {
                continue;
            }
            files.push(to_utf8(entry.path())?);
        }
        files.sort();
        Ok(files)
    }
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), SpinnakerError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| SpinnakerError::Json(err.to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent.as_std_path())
        .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
    tmp.write_all(&content)
        .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
    tmp.persist(path.as_std_path())
        .map_err(|err| SpinnakerError::Filesystem(format!("write {path}: {}", err.error)))?;
    Ok(())
}

/// `ln -s` that never clobbers what is already at `link`.
fn link_file(target: &Utf8Path, link: &Utf8Path) -> Result<(), SpinnakerError> {
    match symlink(target.as_std_path(), link.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            let kind = match fs::symlink_metadata(link.as_std_path()) {
                Ok(meta) if meta.file_type().is_symlink() => "link",
                Ok(meta) if meta.is_dir() => "directory",
                _ => "file",
            };
            error!("linking failed -> {link} is an existing {kind}");
            Ok(())
        }
        Err(err) => Err(SpinnakerError::Filesystem(format!(
            "link {target} -> {link}: {err}"
        ))),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn is_metadata_file(path: &Path) -> bool {
    path.file_name().map(|name| name == METADATA_FILE).unwrap_or(false)
}

fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, SpinnakerError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| SpinnakerError::Filesystem(format!("non UTF-8 path {}", path.display())))
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, SpinnakerError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = BundleStore::new("/outputs");
        let id = Uuid::nil();
        assert_eq!(
            store.metadata_path(&id).as_str(),
            "/outputs/00000000-0000-0000-0000-000000000000/metadata.json"
        );
        assert!(store.donor_path(&id).as_str().starts_with("/outputs/donors/"));
        assert!(store.upload_manifest_dir().ends_with(UPLOAD_MANIFEST_DIR));
    }

    #[test]
    fn fresh_check_detects_previous_bundles() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = BundleStore::new(root.join("out"));
        store.ensure_fresh().unwrap();

        fs::create_dir_all(root.join("out/abc").as_std_path()).unwrap();
        store.ensure_fresh().unwrap();

        fs::write(root.join("out/abc/metadata.json").as_std_path(), b"{}").unwrap();
        assert!(matches!(
            store.ensure_fresh(),
            Err(SpinnakerError::PreviousUpload(_))
        ));
    }
}
