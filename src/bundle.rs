//! The hierarchical bundle document: donor → specimen → sample → analysis →
//! workflow outputs.
//!
//! Child collections are [`KeyedList`]s so that each level of the merge can
//! look children up by identifier while still serializing as the plain JSON
//! arrays found in `metadata.json`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SCHEMA_VERSION: &str = "0.0.3";

pub trait Keyed {
    type Key: Eq + Hash + Clone + Debug;

    fn key(&self) -> Self::Key;
}

/// An insertion-ordered list with an index from child key to position.
///
/// When several items share a key the first one is the one found by lookups.
#[derive(Debug, Clone)]
pub struct KeyedList<T: Keyed> {
    items: Vec<T>,
    index: HashMap<T::Key, usize>,
}

impl<T: Keyed> KeyedList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub(crate) fn first_mut(&mut self) -> Option<&mut T> {
        self.items.first_mut()
    }

    pub fn contains_key(&self, key: &T::Key) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.index.get(key).map(|&pos| &self.items[pos])
    }

    pub(crate) fn get_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        match self.index.get(key) {
            Some(&pos) => Some(&mut self.items[pos]),
            None => None,
        }
    }

    pub fn push(&mut self, item: T) {
        let pos = self.items.len();
        self.index.entry(item.key()).or_insert(pos);
        self.items.push(item);
    }

    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let pos = self.index.get(key).copied()?;
        let removed = self.items.remove(pos);
        self.reindex();
        Some(removed)
    }

    /// Drops the item stored under `key` and appends `item` at the end.
    pub fn replace(&mut self, key: &T::Key, item: T) -> Option<T> {
        let removed = self.remove(key);
        self.push(item);
        removed
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, item) in self.items.iter().enumerate() {
            self.index.entry(item.key()).or_insert(pos);
        }
    }
}

impl<T: Keyed> Default for KeyedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed + PartialEq> PartialEq for KeyedList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Keyed + Eq> Eq for KeyedList<T> {}

impl<T: Keyed> FromIterator<T> for KeyedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = KeyedList::new();
        for item in iter {
            list.push(item);
        }
        list
    }
}

impl<'a, T: Keyed> IntoIterator for &'a KeyedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Keyed + Serialize> Serialize for KeyedList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Keyed + Deserialize<'de>> Deserialize<'de> for KeyedList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}

/// One bundle rooted at a donor. Freshly assembled bundles hold exactly one
/// specimen, sample and analysis; merged donors hold any number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorBundle {
    pub program: String,
    pub project: String,
    pub center_name: String,
    pub submitter_donor_id: String,
    pub donor_uuid: Uuid,
    #[serde(default)]
    pub submitter_donor_primary_site: String,
    pub timestamp: String,
    pub schema_version: String,
    pub specimen: KeyedList<Specimen>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specimen {
    pub submitter_specimen_id: String,
    #[serde(default)]
    pub submitter_specimen_type: String,
    #[serde(default)]
    pub submitter_experimental_design: String,
    pub specimen_uuid: Uuid,
    pub samples: KeyedList<Sample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub submitter_sample_id: String,
    pub sample_uuid: Uuid,
    pub analysis: KeyedList<Analysis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub workflow_name: String,
    pub workflow_version: String,
    pub analysis_type: String,
    pub bundle_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub workflow_outputs: Vec<WorkflowOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutput {
    pub file_type: String,
    pub file_path: String,
    pub file_size: u64,
    pub file_sha: String,
}

impl Keyed for Specimen {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.specimen_uuid
    }
}

impl Keyed for Sample {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.sample_uuid
    }
}

/// Analyses under one sample compete by business type, not by bundle.
impl Keyed for Analysis {
    type Key = String;

    fn key(&self) -> String {
        self.analysis_type.clone()
    }
}

/// A flattened view of one analysis together with its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisPath<'a> {
    pub donor: &'a DonorBundle,
    pub specimen: &'a Specimen,
    pub sample: &'a Sample,
    pub analysis: &'a Analysis,
}

impl DonorBundle {
    pub fn analyses(&self) -> impl Iterator<Item = AnalysisPath<'_>> {
        self.specimen.iter().flat_map(move |specimen| {
            specimen.samples.iter().flat_map(move |sample| {
                sample.analysis.iter().map(move |analysis| AnalysisPath {
                    donor: self,
                    specimen,
                    sample,
                    analysis,
                })
            })
        })
    }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut WorkflowOutput> {
        self.specimen.iter_mut().flat_map(|specimen| {
            specimen.samples.iter_mut().flat_map(|sample| {
                sample
                    .analysis
                    .iter_mut()
                    .flat_map(|analysis| analysis.workflow_outputs.iter_mut())
            })
        })
    }

    /// The bundle identifier of a freshly assembled bundle.
    pub fn bundle_uuid(&self) -> Option<Uuid> {
        self.analyses().next().map(|path| path.analysis.bundle_uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(analysis_type: &str, version: &str) -> Analysis {
        Analysis {
            workflow_name: "wf".to_string(),
            workflow_version: version.to_string(),
            analysis_type: analysis_type.to_string(),
            bundle_uuid: Uuid::nil(),
            timestamp: None,
            workflow_outputs: Vec::new(),
        }
    }

    #[test]
    fn keyed_list_lookup_and_replace() {
        let mut list: KeyedList<Analysis> = [
            analysis("alignment", "1.0.0"),
            analysis("rna_seq_quantification", "1.0.0"),
        ]
        .into_iter()
        .collect();

        let key = "alignment".to_string();
        assert!(list.contains_key(&key));
        assert_eq!(list.get(&key).unwrap().workflow_version, "1.0.0");

        let old = list.replace(&key, analysis("alignment", "2.0.0")).unwrap();
        assert_eq!(old.workflow_version, "1.0.0");
        assert_eq!(list.len(), 2);
        let order = list
            .iter()
            .map(|a| a.analysis_type.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["rna_seq_quantification", "alignment"]);
        assert_eq!(list.get(&key).unwrap().workflow_version, "2.0.0");
    }

    #[test]
    fn keyed_list_serializes_as_array() {
        let list: KeyedList<Analysis> = [analysis("alignment", "1.0.0")].into_iter().collect();
        let json = serde_json::to_value(&list).unwrap();
        assert!(json.is_array());
        assert!(json[0].get("timestamp").is_none());

        let back: KeyedList<Analysis> = serde_json::from_value(json).unwrap();
        assert_eq!(back, list);
        assert!(back.contains_key(&"alignment".to_string()));
    }

    #[test]
    fn rewriting_outputs_keeps_keyed_lookups() {
        let mut alignment = analysis("alignment", "1.0.0");
        alignment.workflow_outputs.push(WorkflowOutput {
            file_type: "bam".to_string(),
            file_path: "/data/run/reads.bam".to_string(),
            file_size: 1,
            file_sha: "sha1$00".to_string(),
        });
        let sample_uuid = Uuid::from_u128(2);
        let specimen_uuid = Uuid::from_u128(1);
        let mut donor = DonorBundle {
            program: "TEST".to_string(),
            project: "PROJ".to_string(),
            center_name: "UCSC".to_string(),
            submitter_donor_id: "DO1".to_string(),
            donor_uuid: Uuid::nil(),
            submitter_donor_primary_site: String::new(),
            timestamp: "2017-01-01T00:00:00.000000".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            specimen: KeyedList::from_iter([Specimen {
                submitter_specimen_id: "SP1".to_string(),
                submitter_specimen_type: String::new(),
                submitter_experimental_design: String::new(),
                specimen_uuid,
                samples: KeyedList::from_iter([Sample {
                    submitter_sample_id: "SA1".to_string(),
                    sample_uuid,
                    analysis: KeyedList::from_iter([alignment]),
                }]),
            }]),
        };

        for output in donor.outputs_mut() {
            output.file_path = "reads.bam".to_string();
        }

        let sample = donor
            .specimen
            .get(&specimen_uuid)
            .and_then(|specimen| specimen.samples.get(&sample_uuid))
            .unwrap();
        let found = sample.analysis.get(&"alignment".to_string()).unwrap();
        assert_eq!(found.workflow_outputs[0].file_path, "reads.bam");
    }

    #[test]
    fn first_duplicate_wins_lookup() {
        let list: KeyedList<Analysis> = [analysis("alignment", "1.0.0"), analysis("alignment", "2.0.0")]
            .into_iter()
            .collect();
        assert_eq!(list.get(&"alignment".to_string()).unwrap().workflow_version, "1.0.0");
    }
}
