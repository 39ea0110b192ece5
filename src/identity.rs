//! Deterministic identifiers for the donor / specimen / sample / workflow
//! hierarchy.
//!
//! Each identifier is a UUIDv5 in the URL namespace whose name is the
//! lowercased concatenation of an ordered tuple of business keys. Shorter
//! tuples are prefixes of longer ones, so a specimen identifier can be
//! re-derived from the same keys as its donor plus one more.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    CENTER_NAME, DONOR_UUID, FlatRecord, SAMPLE_UUID, SPECIMEN_UUID, SUBMITTER_DONOR_ID,
    SUBMITTER_SAMPLE_ID, SUBMITTER_SPECIMEN_ID, WORKFLOW_NAME, WORKFLOW_UUID, WORKFLOW_VERSION,
};
use crate::error::SpinnakerError;

pub const DONOR_KEYS: [&str; 2] = [CENTER_NAME, SUBMITTER_DONOR_ID];
pub const SPECIMEN_KEYS: [&str; 3] = [CENTER_NAME, SUBMITTER_DONOR_ID, SUBMITTER_SPECIMEN_ID];
pub const SAMPLE_KEYS: [&str; 4] = [
    CENTER_NAME,
    SUBMITTER_DONOR_ID,
    SUBMITTER_SPECIMEN_ID,
    SUBMITTER_SAMPLE_ID,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Identifiers {
    pub donor_uuid: Uuid,
    pub specimen_uuid: Uuid,
    pub sample_uuid: Uuid,
    pub workflow_uuid: Uuid,
}

pub fn derive<S: AsRef<str>>(components: &[S]) -> Uuid {
    let name = components
        .iter()
        .flat_map(|component| component.as_ref().chars().filter(char::is_ascii))
        .collect::<String>()
        .to_ascii_lowercase();
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

fn derive_from(record: &FlatRecord, keys: &[&str]) -> Result<Uuid, SpinnakerError> {
    let components = keys
        .iter()
        .map(|key| record.require(key))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(derive(components.as_slice()))
}

/// Derives all four identifiers and writes them onto the record.
///
/// The record is left untouched when any business key is missing.
pub fn assign(record: &mut FlatRecord) -> Result<Identifiers, SpinnakerError> {
    let donor_uuid = derive_from(record, &DONOR_KEYS)?;
    let specimen_uuid = derive_from(record, &SPECIMEN_KEYS)?;
    let sample_uuid = derive_from(record, &SAMPLE_KEYS)?;

    let sample = sample_uuid.to_string();
    let workflow_name = record.require(WORKFLOW_NAME)?;
    let workflow_version = record.require(WORKFLOW_VERSION)?;
    let workflow_uuid = derive(&[sample.as_str(), workflow_name, workflow_version]);

    record.insert(DONOR_UUID, donor_uuid.to_string());
    record.insert(SPECIMEN_UUID, specimen_uuid.to_string());
    record.insert(SAMPLE_UUID, sample);
    record.insert(WORKFLOW_UUID, workflow_uuid.to_string());

    Ok(Identifiers {
        donor_uuid,
        specimen_uuid,
        sample_uuid,
        workflow_uuid,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record() -> FlatRecord {
        [
            ("center_name", "UCSC"),
            ("submitter_donor_id", "DO1"),
            ("submitter_specimen_id", "SP1"),
            ("submitter_sample_id", "SA1"),
            ("workflow_name", "quay.io/ucsc_cgl/rnaseq-cgl-pipeline"),
            ("workflow_version", "3.3.4-1.12.3"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn derive_is_deterministic_and_case_insensitive() {
        assert_eq!(derive(&["UCSC", "DO1"]), derive(&["UCSC", "DO1"]));
        assert_eq!(derive(&["UCSC", "DO1"]), derive(&["ucsc", "do1"]));
        assert_eq!(derive(&["UCSC", "DO1"]).get_version_num(), 5);
    }

    #[test]
    fn derive_concatenates_without_separator() {
        assert_eq!(derive(&["UCSC", "DO1"]), derive(&["UCSCDO1"]));
        assert_eq!(derive(&["UCSC", "DO1"]), derive(&["UC", "SCDO1"]));
    }

    #[test]
    fn derive_drops_non_ascii() {
        assert_eq!(derive(&["UCSC\u{00e9}", "DO1"]), derive(&["UCSC", "DO1"]));
    }

    #[test]
    fn derive_matches_url_namespace_uuid5() {
        let expected = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"ucscdo1");
        assert_eq!(derive(&["UCSC", "DO1"]), expected);
    }

    #[test]
    fn assign_sets_all_identifiers() {
        let mut record = record();
        let ids = assign(&mut record).unwrap();
        assert_eq!(ids.donor_uuid, derive(&["UCSC", "DO1"]));
        assert_eq!(ids.specimen_uuid, derive(&["UCSC", "DO1", "SP1"]));
        assert_eq!(ids.sample_uuid, derive(&["UCSC", "DO1", "SP1", "SA1"]));
        let sample = ids.sample_uuid.to_string();
        assert_eq!(
            ids.workflow_uuid,
            derive(&[
                sample.as_str(),
                "quay.io/ucsc_cgl/rnaseq-cgl-pipeline",
                "3.3.4-1.12.3"
            ])
        );
        assert_eq!(record.get(DONOR_UUID), Some(ids.donor_uuid.to_string().as_str()));
        assert_eq!(
            record.get(WORKFLOW_UUID),
            Some(ids.workflow_uuid.to_string().as_str())
        );
    }

    #[test]
    fn assign_is_idempotent() {
        let mut record = record();
        let first = assign(&mut record).unwrap();
        let second = assign(&mut record).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn every_key_changes_the_identity() {
        let base = assign(&mut record()).unwrap();
        for key in [
            "center_name",
            "submitter_donor_id",
            "submitter_specimen_id",
            "submitter_sample_id",
            "workflow_name",
            "workflow_version",
        ] {
            let mut changed = record();
            changed.insert(key, "other");
            let ids = assign(&mut changed).unwrap();
            assert_ne!(ids.workflow_uuid, base.workflow_uuid, "{key}");
        }
    }

    #[test]
    fn missing_key_fails_without_touching_record() {
        let mut record = record();
        record.insert("submitter_sample_id", "");
        let err = assign(&mut record).unwrap_err();
        assert_matches!(err, SpinnakerError::MissingField { field } if field == "submitter_sample_id");
        assert!(!record.contains(DONOR_UUID));
    }
}
