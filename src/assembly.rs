//! Folding flat rows into one hierarchical bundle per workflow run.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::bundle::{
    Analysis, DonorBundle, KeyedList, SCHEMA_VERSION, Sample, Specimen, WorkflowOutput,
};
use crate::domain::{
    ANALYSIS_TYPE, CENTER_NAME, DONOR_UUID, FILE_PATH, FILE_TYPE, FlatRecord, PROGRAM, PROJECT,
    SAMPLE_UUID, SPECIMEN_UUID, SUBMITTER_DONOR_ID, SUBMITTER_DONOR_PRIMARY_SITE,
    SUBMITTER_EXPERIMENTAL_DESIGN, SUBMITTER_SAMPLE_ID, SUBMITTER_SPECIMEN_ID,
    SUBMITTER_SPECIMEN_TYPE, WORKFLOW_NAME, WORKFLOW_UUID, WORKFLOW_VERSION,
};
use crate::error::SpinnakerError;
use crate::probe::FileProbe;
use crate::timestamp;

/// Bundles produced by one assembly run, in the order their workflow was
/// first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledBundles {
    bundles: Vec<DonorBundle>,
    index: HashMap<Uuid, usize>,
}

impl AssembledBundles {
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn get(&self, workflow_uuid: &Uuid) -> Option<&DonorBundle> {
        self.index.get(workflow_uuid).map(|&pos| &self.bundles[pos])
    }

    pub fn workflow_uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.bundles.iter().filter_map(DonorBundle::bundle_uuid)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DonorBundle> {
        self.bundles.iter()
    }

    pub fn into_vec(self) -> Vec<DonorBundle> {
        self.bundles
    }
}

/// Builder scoped to a single assembly run.
pub struct BundleAssembler<'a, P: FileProbe> {
    probe: &'a P,
    clock: Box<dyn Fn() -> DateTime<Utc> + 'a>,
    assembled: AssembledBundles,
}

impl<'a, P: FileProbe> BundleAssembler<'a, P> {
    pub fn new(probe: &'a P) -> Self {
        Self {
            probe,
            clock: Box::new(Utc::now),
            assembled: AssembledBundles::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Adds one row: creates the bundle skeleton for an unseen workflow and
    /// appends the row's file to that workflow's outputs.
    pub fn add(&mut self, record: &FlatRecord) -> Result<(), SpinnakerError> {
        let workflow_uuid = parse_uuid(record, WORKFLOW_UUID)?;
        let output = self.describe_output(record)?;

        let pos = match self.assembled.index.get(&workflow_uuid) {
            Some(&pos) => pos,
            None => {
                let created_at = timestamp::format((self.clock)());
                let bundle = skeleton(record, workflow_uuid, created_at)?;
                debug!(%workflow_uuid, "created bundle");
                let pos = self.assembled.bundles.len();
                self.assembled.bundles.push(bundle);
                self.assembled.index.insert(workflow_uuid, pos);
                pos
            }
        };

        let analysis = self.assembled.bundles[pos]
            .specimen
            .first_mut()
            .and_then(|specimen| specimen.samples.first_mut())
            .and_then(|sample| sample.analysis.first_mut())
            .ok_or_else(|| SpinnakerError::missing_field("analysis"))?;
        analysis.workflow_outputs.push(output);
        Ok(())
    }

    pub fn extend<'r>(
        &mut self,
        records: impl IntoIterator<Item = &'r FlatRecord>,
    ) -> Result<(), SpinnakerError> {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    pub fn finish(self) -> AssembledBundles {
        self.assembled
    }

    fn describe_output(&self, record: &FlatRecord) -> Result<WorkflowOutput, SpinnakerError> {
        let file_path = record.require(FILE_PATH)?;
        let path = Path::new(file_path);
        Ok(WorkflowOutput {
            file_type: record.get_or_empty(FILE_TYPE).to_string(),
            file_path: file_path.to_string(),
            file_size: self.probe.size(path)?,
            file_sha: self.probe.checksum(path)?,
        })
    }
}

/// Assembles every record in order.
pub fn assemble<'r, P: FileProbe>(
    probe: &P,
    records: impl IntoIterator<Item = &'r FlatRecord>,
) -> Result<AssembledBundles, SpinnakerError> {
    let mut assembler = BundleAssembler::new(probe);
    assembler.extend(records)?;
    Ok(assembler.finish())
}

fn skeleton(
    record: &FlatRecord,
    workflow_uuid: Uuid,
    created_at: String,
) -> Result<DonorBundle, SpinnakerError> {
    let analysis = Analysis {
        workflow_name: record.require(WORKFLOW_NAME)?.to_string(),
        workflow_version: record.require(WORKFLOW_VERSION)?.to_string(),
        analysis_type: record.get_or_empty(ANALYSIS_TYPE).to_string(),
        bundle_uuid: workflow_uuid,
        timestamp: Some(created_at.clone()),
        workflow_outputs: Vec::new(),
    };
    let sample = Sample {
        submitter_sample_id: record.require(SUBMITTER_SAMPLE_ID)?.to_string(),
        sample_uuid: parse_uuid(record, SAMPLE_UUID)?,
        analysis: KeyedList::from_iter([analysis]),
    };
    let specimen = Specimen {
        submitter_specimen_id: record.require(SUBMITTER_SPECIMEN_ID)?.to_string(),
        submitter_specimen_type: record.get_or_empty(SUBMITTER_SPECIMEN_TYPE).to_string(),
        submitter_experimental_design: record
            .get_or_empty(SUBMITTER_EXPERIMENTAL_DESIGN)
            .to_string(),
        specimen_uuid: parse_uuid(record, SPECIMEN_UUID)?,
        samples: KeyedList::from_iter([sample]),
    };
    Ok(DonorBundle {
        program: record.get_or_empty(PROGRAM).to_string(),
        project: record.get_or_empty(PROJECT).to_string(),
        center_name: record.require(CENTER_NAME)?.to_string(),
        submitter_donor_id: record.require(SUBMITTER_DONOR_ID)?.to_string(),
        donor_uuid: parse_uuid(record, DONOR_UUID)?,
        submitter_donor_primary_site: record
            .get_or_empty(SUBMITTER_DONOR_PRIMARY_SITE)
            .to_string(),
        timestamp: created_at,
        schema_version: SCHEMA_VERSION.to_string(),
        specimen: KeyedList::from_iter([specimen]),
    })
}

fn parse_uuid(record: &FlatRecord, field: &str) -> Result<Uuid, SpinnakerError> {
    let value = record.require(field)?;
    Uuid::parse_str(value).map_err(|_| SpinnakerError::missing_field(field))
}
