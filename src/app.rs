use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assembly;
use crate::bundle::DonorBundle;
use crate::domain::{FlatRecord, WORKFLOW_UUID};
use crate::error::SpinnakerError;
use crate::identity;
use crate::input;
use crate::manifest::{self, UploadManifest};
use crate::merge::{self, DonorMapping};
use crate::probe::FileProbe;
use crate::schema::Schema;
use crate::store::BundleStore;
use crate::submission::SubmissionClient;
use crate::upload::UploadClient;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub inputs: Vec<PathBuf>,
    /// Also merge the assembled bundles per donor and validate the result.
    pub test: bool,
    pub skip_upload: bool,
    pub force_upload: bool,
    pub skip_submit: bool,
    pub registration_file: String,
    pub receipt_file: String,
    /// Directory relative input file paths are resolved against when linking.
    pub working_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub records_read: usize,
    pub records_skipped: usize,
    pub bundles: Vec<BundleSummary>,
    pub uploaded: bool,
    pub submission_id: Option<String>,
    pub registration_manifest: Option<String>,
    pub receipt_file: Option<String>,
    pub receipt_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub bundle_uuid: String,
    pub donor_uuid: String,
    pub analysis_type: String,
    pub files: usize,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub bundles_read: usize,
    pub donors: Vec<MergedDonor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<DonorMapping>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedDonor {
    pub donor_uuid: String,
    pub timestamp: String,
    pub specimens: usize,
    pub analyses: usize,
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct App<U: UploadClient, S: SubmissionClient, P: FileProbe> {
    store: BundleStore,
    input_schema: Schema,
    metadata_schema: Schema,
    uploader: U,
    submissions: S,
    probe: P,
}

impl<U: UploadClient, S: SubmissionClient, P: FileProbe> App<U, S, P> {
    pub fn new(
        store: BundleStore,
        input_schema: Schema,
        metadata_schema: Schema,
        uploader: U,
        submissions: S,
        probe: P,
    ) -> Self {
        Self {
            store,
            input_schema,
            metadata_schema,
            uploader,
            submissions,
            probe,
        }
    }

    pub fn store(&self) -> &BundleStore {
        &self.store
    }

    /// Reads the input tables, writes one bundle directory per workflow run
    /// and, unless told otherwise, registers and uploads them.
    pub fn upload(
        &self,
        options: &UploadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<UploadResult, SpinnakerError> {
        let start = Instant::now();
        if options.inputs.is_empty() {
            return Err(SpinnakerError::NoInputs);
        }
        self.store.ensure_fresh()?;
        self.store.ensure_root()?;

        phase(sink, "phase=Read; reading input tables");
        let mut records_read = 0;
        let mut records = Vec::new();
        for path in &options.inputs {
            for record in input::read_input(path)? {
                records_read += 1;
                if let Some(record) = self.prepare_record(record) {
                    records.push(record);
                }
            }
        }
        let records_skipped = records_read - records.len();
        info!(records_read, records_skipped, "read input records");

        phase(sink, "phase=Assemble; building bundles");
        let assembled = assembly::assemble(&self.probe, &records)?;

        if options.test {
            let merged = merge::merge(assembled.iter().cloned())?;
            let partition = self.metadata_schema.validate_all(merged.values());
            if partition.invalid.is_empty() {
                info!("all merged objects validated");
            } else {
                error!("{} invalid merged objects found", partition.invalid.len());
            }
        }

        phase(sink, "phase=Verify; validating bundles");
        let partition = self.metadata_schema.validate_all(assembled.iter());
        if !partition.invalid.is_empty() {
            return Err(SpinnakerError::InvalidBundles(partition.invalid.len()));
        }
        info!("validated all metadata objects for output");

        phase(sink, "phase=Store; writing bundle directories");
        let mut bundles = Vec::new();
        for bundle in assembled.iter() {
            let stored = self.store.write_bundle(bundle, &options.working_dir)?;
            bundles.push(summarize(&self.store, &stored));
        }
        info!("number of metadata files written: {}", bundles.len());

        let mut result = UploadResult {
            records_read,
            records_skipped,
            bundles,
            uploaded: false,
            submission_id: None,
            registration_manifest: None,
            receipt_file: None,
            receipt_rows: 0,
        };

        if options.skip_upload {
            info!("skipping data upload steps");
            sink.event(ProgressEvent {
                message: "done".to_string(),
                elapsed: Some(start.elapsed()),
            });
            return Ok(result);
        }
        if result.bundles.is_empty() {
            warn!("no bundles to upload");
            return Ok(result);
        }

        if !options.skip_submit {
            result.submission_id = Some(self.submissions.create_submission()?);
        }

        phase(sink, "phase=Register; writing registration manifest");
        let registration = self.store.root().join(&options.registration_file);
        let entries = manifest::registration_entries(&self.store, &self.probe)?;
        manifest::write_registration(&registration, &entries)?;
        // The registration tool names its manifest after the first bundle listed.
        let first_bundle = entries
            .first()
            .map(|entry| entry.gnos_id.clone())
            .ok_or_else(|| SpinnakerError::RegistrationFailed("no files to register".to_string()))?;
        let upload_manifest = self.store.upload_manifest_dir().join(first_bundle);
        result.registration_manifest = Some(registration.to_string());

        let manifest_dir = self.store.upload_manifest_dir();
        fs::create_dir_all(manifest_dir.as_std_path())
            .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
        self.uploader
            .register(registration.as_std_path(), manifest_dir.as_std_path())?;

        phase(sink, "phase=Upload; uploading files");
        info!("uploading files; if this hangs the client IP may be blocked");
        self.uploader
            .upload(upload_manifest.as_std_path(), options.force_upload)?;
        result.uploaded = true;

        phase(sink, "phase=Receipt; writing upload receipt");
        let uploaded = UploadManifest::read(&upload_manifest)?;
        let receipt_path = self.store.root().join(&options.receipt_file);
        let rows = self.collect_receipts(&uploaded)?;
        manifest::write_receipt(&receipt_path, &rows)?;
        result.receipt_rows = rows.len();
        result.receipt_file = Some(receipt_path.to_string());

        if let Some(submission_id) = &result.submission_id {
            let receipt = fs::read_to_string(receipt_path.as_std_path())
                .map_err(|err| SpinnakerError::Filesystem(err.to_string()))?;
            self.submissions.put_receipt(submission_id, &receipt)?;
        }

        info!("upload succeeded");
        sink.event(ProgressEvent {
            message: "done".to_string(),
            elapsed: Some(start.elapsed()),
        });
        Ok(result)
    }

    /// Merges every bundle found below `source` into one tree per donor.
    /// With `write`, each donor is stored as `donors/<donor_uuid>.json`
    /// under the store; otherwise the mapping is returned in the result.
    pub fn merge(
        &self,
        source: &Utf8Path,
        write: bool,
        sink: &dyn ProgressSink,
    ) -> Result<MergeResult, SpinnakerError> {
        phase(sink, format!("phase=Resolve; scanning {source}"));
        let source_store = BundleStore::new(source);
        let bundles = source_store
            .bundle_dirs()?
            .iter()
            .map(|dir| BundleStore::read_bundle(dir))
            .collect::<Result<Vec<_>, _>>()?;
        let bundles_read = bundles.len();

        phase(sink, "phase=Merge; reconciling donors");
        let mapping = merge::merge(bundles)?;
        let partition = self.metadata_schema.validate_all(mapping.values());
        if !partition.invalid.is_empty() {
            error!("{} invalid merged objects found", partition.invalid.len());
        }

        let mut donors = Vec::new();
        for (donor_uuid, donor) in &mapping {
            let path = if write {
                Some(self.store.write_donor(donor)?.to_string())
            } else {
                None
            };
            donors.push(MergedDonor {
                donor_uuid: donor_uuid.to_string(),
                timestamp: donor.timestamp.clone(),
                specimens: donor.specimen.len(),
                analyses: donor.analyses().count(),
                path,
            });
        }
        info!(bundles_read, donors = donors.len(), "merged bundles");

        Ok(MergeResult {
            bundles_read,
            donors,
            mapping: (!write).then_some(mapping),
        })
    }

    /// Assigns identifiers and checks the row against the input schema.
    /// Rejected rows are logged and dropped.
    fn prepare_record(&self, mut record: FlatRecord) -> Option<FlatRecord> {
        if let Err(err) = identity::assign(&mut record) {
            error!("skipping record: {err}\n{record}");
            return None;
        }
        let projected = record.project(self.input_schema.property_names());
        if !self.input_schema.validate(&projected) {
            error!(
                workflow_uuid = projected.get_or_empty(WORKFLOW_UUID),
                "skipping record that failed input validation"
            );
            return None;
        }
        Some(projected)
    }

    fn collect_receipts(
        &self,
        uploaded: &UploadManifest,
    ) -> Result<Vec<manifest::ReceiptRow>, SpinnakerError> {
        let mut rows = Vec::new();
        for dir in self.store.bundle_dirs()? {
            let bundle = BundleStore::read_bundle(&dir)?;
            rows.extend(manifest::collect_receipt(uploaded, &dir, &bundle)?);
        }
        Ok(rows)
    }
}

fn summarize(store: &BundleStore, bundle: &DonorBundle) -> BundleSummary {
    let bundle_uuid = bundle.bundle_uuid().unwrap_or(Uuid::nil());
    let first = bundle.analyses().next();
    BundleSummary {
        bundle_uuid: bundle_uuid.to_string(),
        donor_uuid: bundle.donor_uuid.to_string(),
        analysis_type: first
            .as_ref()
            .map(|path| path.analysis.analysis_type.clone())
            .unwrap_or_default(),
        files: first
            .map(|path| path.analysis.workflow_outputs.len())
            .unwrap_or(0),
        path: store.bundle_dir(&bundle_uuid).to_string(),
    }
}
