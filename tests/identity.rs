use uuid::Uuid;

use spinnaker::domain::{FlatRecord, normalize_property_name};
use spinnaker::identity::{assign, derive};

fn record(pairs: &[(&str, &str)]) -> FlatRecord {
    pairs.iter().copied().collect()
}

fn base() -> FlatRecord {
    record(&[
        ("center_name", "UCSC"),
        ("submitter_donor_id", "DO1"),
        ("submitter_specimen_id", "SP1"),
        ("submitter_sample_id", "SA1"),
        ("workflow_name", "spinnaker"),
        ("workflow_version", "1.0.0"),
    ])
}

#[test]
fn donor_uuid_is_uuid5_of_lowercased_keys() {
    let expected = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"ucscdo1");
    assert_eq!(derive(&["UCSC", "DO1"]), expected);
    assert_eq!(derive(&["ucsc", "do1"]), expected);
    assert_eq!(derive(&["UC", "SCDO1"]), expected);
}

#[test]
fn non_ascii_characters_are_dropped() {
    assert_eq!(derive(&["UCSC", "DÖ1"]), derive(&["UCSC", "D1"]));
}

#[test]
fn identifiers_are_stable_across_records() {
    let mut first = base();
    let mut second = base();
    second.insert("file_path", "other.fq");
    let a = assign(&mut first).unwrap();
    let b = assign(&mut second).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.get("workflow_uuid"), Some(a.workflow_uuid.to_string().as_str()));
}

#[test]
fn each_level_extends_the_previous_tuple() {
    let mut rec = base();
    let ids = assign(&mut rec).unwrap();
    assert_eq!(ids.specimen_uuid, derive(&["UCSC", "DO1", "SP1"]));
    assert_eq!(ids.sample_uuid, derive(&["UCSC", "DO1", "SP1", "SA1"]));
    let sample = ids.sample_uuid.to_string();
    assert_eq!(
        ids.workflow_uuid,
        derive(&[sample.as_str(), "spinnaker", "1.0.0"])
    );
}

#[test]
fn new_version_means_new_workflow_but_same_sample() {
    let mut old = base();
    let mut new = base();
    new.insert("workflow_version", "1.1.0");
    let old_ids = assign(&mut old).unwrap();
    let new_ids = assign(&mut new).unwrap();
    assert_eq!(old_ids.sample_uuid, new_ids.sample_uuid);
    assert_ne!(old_ids.workflow_uuid, new_ids.workflow_uuid);
}

#[test]
fn header_names_normalize() {
    assert_eq!(normalize_property_name(" Submitter Donor ID "), "submitter_donor_id");
    assert_eq!(normalize_property_name("File Päth"), "file_pth");
}
