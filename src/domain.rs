use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SpinnakerError;

pub const CENTER_NAME: &str = "center_name";
pub const SUBMITTER_DONOR_ID: &str = "submitter_donor_id";
pub const SUBMITTER_SPECIMEN_ID: &str = "submitter_specimen_id";
pub const SUBMITTER_SAMPLE_ID: &str = "submitter_sample_id";
pub const WORKFLOW_NAME: &str = "workflow_name";
pub const WORKFLOW_VERSION: &str = "workflow_version";

pub const DONOR_UUID: &str = "donor_uuid";
pub const SPECIMEN_UUID: &str = "specimen_uuid";
pub const SAMPLE_UUID: &str = "sample_uuid";
pub const WORKFLOW_UUID: &str = "workflow_uuid";

pub const PROGRAM: &str = "program";
pub const PROJECT: &str = "project";
pub const SUBMITTER_DONOR_PRIMARY_SITE: &str = "submitter_donor_primary_site";
pub const SUBMITTER_SPECIMEN_TYPE: &str = "submitter_specimen_type";
pub const SUBMITTER_EXPERIMENTAL_DESIGN: &str = "submitter_experimental_design";
pub const ANALYSIS_TYPE: &str = "analysis_type";
pub const FILE_TYPE: &str = "file_type";
pub const FILE_PATH: &str = "file_path";

/// One input row keyed by lower-snake-case field name.
///
/// Empty cells are treated as absent by [`FlatRecord::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord(BTreeMap<String, String>);

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn get_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn require(&self, field: &str) -> Result<&str, SpinnakerError> {
        self.get(field)
            .ok_or_else(|| SpinnakerError::missing_field(field))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keeps only the named fields, filling absent ones with an empty string.
    /// `workflow_uuid` is carried over whenever it has been derived.
    pub fn project<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> FlatRecord {
        let mut projected = FlatRecord::new();
        for field in fields {
            projected.insert(field, self.get_or_empty(field));
        }
        if let Some(workflow_uuid) = self.get(WORKFLOW_UUID) {
            projected.insert(WORKFLOW_UUID, workflow_uuid);
        }
        projected
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = FlatRecord::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

impl fmt::Display for FlatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Column headers become schema property names: ASCII only, trimmed,
/// lowercase, inner spaces replaced by underscores.
pub fn normalize_property_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_ascii_lowercase()
        .replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn normalizes_header_names() {
        assert_eq!(normalize_property_name("Center Name"), "center_name");
        assert_eq!(normalize_property_name("Submitter Donor ID"), "submitter_donor_id");
        assert_eq!(normalize_property_name("file_type"), "file_type");
        assert_eq!(normalize_property_name("Sample\u{00e9} ID"), "sample_id");
    }

    #[test]
    fn empty_values_count_as_missing() {
        let record: FlatRecord = [("center_name", ""), ("program", "TEST")]
            .into_iter()
            .collect();
        assert_eq!(record.get("center_name"), None);
        assert_eq!(record.get_or_empty("center_name"), "");
        assert_eq!(record.get("program"), Some("TEST"));
        let err = record.require("center_name").unwrap_err();
        assert_matches!(err, SpinnakerError::MissingField { field } if field == "center_name");
    }

    #[test]
    fn projection_fills_missing_and_keeps_workflow_uuid() {
        let record: FlatRecord = [("program", "TEST"), ("workflow_uuid", "abc"), ("extra", "x")]
            .into_iter()
            .collect();
        let projected = record.project(["program", "project"]);
        assert_eq!(projected.get("program"), Some("TEST"));
        assert_eq!(projected.get_or_empty("project"), "");
        assert!(projected.fields().any(|(k, _)| k == "project"));
        assert_eq!(projected.get("workflow_uuid"), Some("abc"));
        assert!(!projected.contains("extra"));
    }
}
