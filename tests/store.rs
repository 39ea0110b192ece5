use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use spinnaker::assembly::assemble;
use spinnaker::bundle::DonorBundle;
use spinnaker::domain::FlatRecord;
use spinnaker::identity::assign;
use spinnaker::probe::LocalFileProbe;
use spinnaker::store::{BundleStore, METADATA_FILE};

fn scratch() -> (TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn bundle_for(root: &Utf8Path, relative: &str, sample: &str) -> DonorBundle {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    fs::write(path.as_std_path(), "ACGT\n").unwrap();
    let mut record: FlatRecord = [
        ("program", "TEST"),
        ("project", "PROJ"),
        ("center_name", "UCSC"),
        ("submitter_donor_id", "DO1"),
        ("submitter_specimen_id", "SP1"),
        ("submitter_sample_id", sample),
        ("analysis_type", "sequence_upload"),
        ("workflow_name", "spinnaker"),
        ("workflow_version", "1.0.0"),
        ("file_type", "fastq"),
        ("file_path", path.as_str()),
    ]
    .into_iter()
    .collect();
    assign(&mut record).unwrap();
    assemble(&LocalFileProbe::new(), [&record])
        .unwrap()
        .into_vec()
        .remove(0)
}

#[test]
fn write_bundle_links_files_and_round_trips() {
    let (_temp, root) = scratch();
    let bundle = bundle_for(&root, "data/run1/reads.fq", "SA1");
    let store = BundleStore::new(root.join("out"));
    store.ensure_fresh().unwrap();

    let stored = store.write_bundle(&bundle, &root).unwrap();
    let bundle_uuid = bundle.bundle_uuid().unwrap();
    let dir = store.bundle_dir(&bundle_uuid);

    let output = &stored.analyses().next().unwrap().analysis.workflow_outputs[0];
    assert_eq!(output.file_path, "reads.fq");
    let link = dir.join("reads.fq");
    assert!(
        fs::symlink_metadata(link.as_std_path())
            .unwrap()
            .file_type()
            .is_symlink()
    );
    assert_eq!(fs::read_to_string(link.as_std_path()).unwrap(), "ACGT\n");

    let read_back = BundleStore::read_bundle(&dir).unwrap();
    assert_eq!(read_back, stored);
    assert_eq!(store.bundle_dirs().unwrap(), vec![dir.clone()]);
    assert_eq!(
        BundleStore::bundle_files(&dir).unwrap(),
        vec![dir.join(METADATA_FILE), dir.join("reads.fq")]
    );
    assert!(store.ensure_fresh().is_err());
}

#[test]
fn existing_link_is_left_alone() {
    let (_temp, root) = scratch();
    let bundle = bundle_for(&root, "data/reads.fq", "SA1");
    let store = BundleStore::new(root.join("out"));
    let dir = store.bundle_dir(&bundle.bundle_uuid().unwrap());
    fs::create_dir_all(dir.as_std_path()).unwrap();
    fs::write(dir.join("reads.fq").as_std_path(), "already here").unwrap();

    store.write_bundle(&bundle, &root).unwrap();
    assert_eq!(
        fs::read_to_string(dir.join("reads.fq").as_std_path()).unwrap(),
        "already here"
    );
}

#[test]
fn bundle_dirs_are_sorted_leaf_directories() {
    let (_temp, root) = scratch();
    let store = BundleStore::new(root.join("out"));
    let first = bundle_for(&root, "data/a.fq", "SA1");
    let second = bundle_for(&root, "data/b.fq", "SA2");
    store.write_bundle(&first, &root).unwrap();
    store.write_bundle(&second, &root).unwrap();
    fs::create_dir_all(store.upload_manifest_dir().as_std_path()).unwrap();

    let dirs = store.bundle_dirs().unwrap();
    assert_eq!(dirs.len(), 2);
    assert!(dirs[0] < dirs[1]);
    assert!(dirs.iter().all(|dir| dir.join(METADATA_FILE).as_std_path().is_file()));
}

#[test]
fn donors_are_written_by_uuid() {
    let (_temp, root) = scratch();
    let bundle = bundle_for(&root, "data/reads.fq", "SA1");
    let store = BundleStore::new(root.join("out"));
    let path = store.write_donor(&bundle).unwrap();
    assert_eq!(path, store.donor_path(&bundle.donor_uuid));
    let content = fs::read_to_string(path.as_std_path()).unwrap();
    let parsed: DonorBundle = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed, bundle);
}
