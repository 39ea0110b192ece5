//! Manifests exchanged with the registration and upload tools, and the upload
//! receipt handed back to the submitter.

use std::collections::HashMap;
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

use crate::bundle::DonorBundle;
use crate::error::SpinnakerError;
use crate::probe::FileProbe;
use crate::store::{BundleStore, METADATA_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Controlled,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Controlled => write!(f, "controlled"),
        }
    }
}

/// One row of the registration manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationEntry {
    pub gnos_id: String,
    pub program_code: String,
    pub file_path: String,
    pub file_md5: String,
    pub access: Access,
}

/// Registration rows for every file in every bundle directory under the
/// store, including each bundle's `metadata.json`.
pub fn registration_entries<P: FileProbe>(
    store: &BundleStore,
    probe: &P,
) -> Result<Vec<RegistrationEntry>, SpinnakerError> {
    let mut entries = Vec::new();
    for dir in store.bundle_dirs()? {
        debug!(%dir, "found bundle directory");
        let bundle = BundleStore::read_bundle(&dir)?;
        let program_code = bundle.program.trim().replace(' ', "_");
        let gnos_id = dir.file_name().unwrap_or_default().to_string();
        for file in BundleStore::bundle_files(&dir)? {
            entries.push(RegistrationEntry {
                gnos_id: gnos_id.clone(),
                program_code: program_code.clone(),
                file_md5: probe.md5(file.as_std_path())?,
                file_path: file.into_string(),
                access: Access::Controlled,
            });
        }
    }
    Ok(entries)
}

pub fn write_registration(
    path: &Utf8Path,
    entries: &[RegistrationEntry],
) -> Result<(), SpinnakerError> {
    write_tsv(path, entries)
}

/// Object identifiers assigned by the storage service, from the manifest the
/// registration tool writes.
#[derive(Debug, Clone, Default)]
pub struct UploadManifest {
    by_path: HashMap<Utf8PathBuf, String>,
    by_name: HashMap<String, String>,
}

impl UploadManifest {
    pub fn parse(content: &str) -> Self {
        let mut manifest = UploadManifest::default();
        for line in content.lines() {
            let fields = line.split_whitespace().collect::<Vec<_>>();
            let [object_id, file_path, ..] = fields.as_slice() else {
                continue;
            };
            if *object_id == "object-id" {
                continue;
            }
            let path = Utf8PathBuf::from(*file_path);
            if let Some(name) = path.file_name() {
                manifest
                    .by_name
                    .insert(name.to_string(), object_id.to_string());
            }
            manifest.by_path.insert(path, object_id.to_string());
        }
        manifest
    }

    pub fn read(path: &Utf8Path) -> Result<Self, SpinnakerError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(format!("read {path}: {err}")))?;
        Ok(Self::parse(&content))
    }

    /// Exact path match first, then bare file name.
    pub fn object_id(&self, dir: &Utf8Path, file_name: &str) -> Option<&str> {
        self.by_path
            .get(&dir.join(file_name))
            .or_else(|| self.by_name.get(file_name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// One uploaded file as reported back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptRow {
    pub program: String,
    pub project: String,
    pub center_name: String,
    pub submitter_donor_id: String,
    pub donor_uuid: String,
    pub submitter_donor_primary_site: String,
    pub submitter_specimen_id: String,
    pub specimen_uuid: String,
    pub submitter_specimen_type: String,
    pub submitter_experimental_design: String,
    pub submitter_sample_id: String,
    pub sample_uuid: String,
    pub analysis_type: String,
    pub workflow_name: String,
    pub workflow_version: String,
    pub file_type: String,
    pub file_path: String,
    pub file_uuid: String,
    pub bundle_uuid: String,
    pub metadata_uuid: String,
}

/// Receipt rows for a bundle stored in `dir`, one per workflow output.
pub fn collect_receipt(
    manifest: &UploadManifest,
    dir: &Utf8Path,
    bundle: &DonorBundle,
) -> Result<Vec<ReceiptRow>, SpinnakerError> {
    let lookup = |file_name: &str| {
        manifest
            .object_id(dir, file_name)
            .map(str::to_string)
            .ok_or_else(|| SpinnakerError::ManifestEntryMissing(dir.join(file_name).to_string()))
    };
    let metadata_uuid = lookup(METADATA_FILE)?;

    let mut rows = Vec::new();
    for path in bundle.analyses() {
        for output in &path.analysis.workflow_outputs {
            let file_name = Utf8Path::new(&output.file_path)
                .file_name()
                .unwrap_or(&output.file_path);
            rows.push(ReceiptRow {
                program: bundle.program.clone(),
                project: bundle.project.clone(),
                center_name: bundle.center_name.clone(),
                submitter_donor_id: bundle.submitter_donor_id.clone(),
                donor_uuid: bundle.donor_uuid.to_string(),
                submitter_donor_primary_site: bundle.submitter_donor_primary_site.clone(),
                submitter_specimen_id: path.specimen.submitter_specimen_id.clone(),
                specimen_uuid: path.specimen.specimen_uuid.to_string(),
                submitter_specimen_type: path.specimen.submitter_specimen_type.clone(),
                submitter_experimental_design: path
                    .specimen
                    .submitter_experimental_design
                    .clone(),
                submitter_sample_id: path.sample.submitter_sample_id.clone(),
                sample_uuid: path.sample.sample_uuid.to_string(),
                analysis_type: path.analysis.analysis_type.clone(),
                workflow_name: path.analysis.workflow_name.clone(),
                workflow_version: path.analysis.workflow_version.clone(),
                file_type: output.file_type.clone(),
                file_path: output.file_path.clone(),
                file_uuid: lookup(file_name)?,
                bundle_uuid: path.analysis.bundle_uuid.to_string(),
                metadata_uuid: metadata_uuid.clone(),
            });
        }
    }
    Ok(rows)
}

pub fn write_receipt(path: &Utf8Path, rows: &[ReceiptRow]) -> Result<(), SpinnakerError> {
    write_tsv(path, rows)
}

fn write_tsv<T: Serialize>(path: &Utf8Path, rows: &[T]) -> Result<(), SpinnakerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
    }
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(|err| SpinnakerError::Filesystem(format!("create {path}: {err}")))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| SpinnakerError::Filesystem(format!("write {path}: {err}")))?;
    }
    writer
        .flush()
        .map_err(|err| SpinnakerError::Filesystem(format!("write {path}: {err}")))?;
    Ok(())
}
