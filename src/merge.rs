//! Merging bundles from one or more submission rounds into a single canonical
//! tree per donor.
//!
//! Bundles are processed in input order. Specimens and samples are matched by
//! identifier and inserted as whole subtrees when unseen. Analyses under the
//! same sample compete by `analysis_type`: a newer `workflow_version` wins, an
//! equal version falls back to the later timestamp, and an entry without a
//! timestamp never displaces an equal-version one. After all bundles are
//! folded in, each donor's `timestamp` is set to the latest timestamp among
//! the analyses it accepted, including those inside appended subtrees.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use semver::Version;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bundle::{Analysis, DonorBundle, Sample, Specimen};
use crate::error::SpinnakerError;
use crate::timestamp;

/// Canonical donor trees keyed by `donor_uuid`.
pub type DonorMapping = BTreeMap<Uuid, DonorBundle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Inserted,
    Replaced,
    Kept,
}

struct DonorState {
    bundle: DonorBundle,
    timestamps: Vec<(DateTime<Utc>, String)>,
}

impl DonorState {
    fn new(bundle: DonorBundle) -> Result<Self, SpinnakerError> {
        let mut state = Self {
            timestamps: Vec::new(),
            bundle,
        };
        let initial = state.bundle.timestamp.clone();
        state.record(&initial)?;
        Ok(state)
    }

    fn record(&mut self, raw: &str) -> Result<(), SpinnakerError> {
        let parsed = timestamp::parse(raw)?;
        self.timestamps.push((parsed, raw.to_string()));
        Ok(())
    }

    fn absorb(&mut self, incoming: DonorBundle) -> Result<(), SpinnakerError> {
        for specimen in incoming.specimen.iter() {
            self.absorb_specimen(specimen.clone())?;
        }
        Ok(())
    }

    fn absorb_specimen(&mut self, specimen: Specimen) -> Result<(), SpinnakerError> {
        let Some(saved) = self.bundle.specimen.get_mut(&specimen.specimen_uuid) else {
            debug!(specimen_uuid = %specimen.specimen_uuid, "adding specimen");
            let stamps = specimen
                .samples
                .iter()
                .flat_map(sample_timestamps)
                .collect::<Vec<_>>();
            self.bundle.specimen.push(specimen);
            for stamp in stamps {
                self.record(&stamp)?;
            }
            return Ok(());
        };

        let mut accepted = Vec::new();
        for sample in specimen.samples.iter() {
            match saved.samples.get_mut(&sample.sample_uuid) {
                None => {
                    debug!(sample_uuid = %sample.sample_uuid, "adding sample");
                    accepted.extend(sample_timestamps(sample));
                    saved.samples.push(sample.clone());
                }
                Some(saved_sample) => {
                    for analysis in sample.analysis.iter() {
                        let resolution = resolve_analysis(saved_sample, analysis.clone())?;
                        if resolution != Resolution::Kept {
                            if let Some(stamp) = &analysis.timestamp {
                                accepted.push(stamp.clone());
                            }
                        }
                    }
                }
            }
        }
        for stamp in accepted {
            self.record(&stamp)?;
        }
        Ok(())
    }

    fn finish(mut self) -> DonorBundle {
        if let Some((_, latest)) = self.timestamps.iter().max_by_key(|(parsed, _)| *parsed) {
            self.bundle.timestamp = latest.clone();
        }
        self.bundle
    }
}

fn sample_timestamps(sample: &Sample) -> impl Iterator<Item = String> + '_ {
    sample
        .analysis
        .iter()
        .filter_map(|analysis| analysis.timestamp.clone())
}

/// Folds one incoming analysis into a sample, applying the conflict rules.
pub fn resolve_analysis(
    sample: &mut Sample,
    incoming: Analysis,
) -> Result<Resolution, SpinnakerError> {
    let key = incoming.analysis_type.clone();
    let Some(saved) = sample.analysis.get(&key) else {
        debug!(analysis_type = %key, "adding analysis");
        sample.analysis.push(incoming);
        return Ok(Resolution::Inserted);
    };

    if incoming_wins(saved, &incoming)? {
        info!(
            analysis_type = %key,
            saved = %saved.workflow_version,
            incoming = %incoming.workflow_version,
            "replacing analysis"
        );
        sample.analysis.replace(&key, incoming);
        Ok(Resolution::Replaced)
    } else {
        debug!(
            analysis_type = %key,
            bundle_uuid = %incoming.bundle_uuid,
            "keeping saved analysis"
        );
        Ok(Resolution::Kept)
    }
}

fn incoming_wins(saved: &Analysis, incoming: &Analysis) -> Result<bool, SpinnakerError> {
    match compare_versions(&saved.workflow_version, &incoming.workflow_version)? {
        Ordering::Less => Ok(true),
        Ordering::Greater => Ok(false),
        Ordering::Equal => match (&saved.timestamp, &incoming.timestamp) {
            (Some(saved_ts), Some(incoming_ts)) => {
                Ok(timestamp::parse(saved_ts)? < timestamp::parse(incoming_ts)?)
            }
            _ => Ok(false),
        },
    }
}

/// Semantic-version precedence of two workflow versions. Build metadata does
/// not take part, so `1.0.0+b.1` and `1.0.0+b.2` are equal.
pub fn compare_versions(saved: &str, incoming: &str) -> Result<Ordering, SpinnakerError> {
    Ok(parse_version(saved)?.cmp_precedence(&parse_version(incoming)?))
}

fn parse_version(value: &str) -> Result<Version, SpinnakerError> {
    Version::parse(value.trim()).map_err(|err| SpinnakerError::VersionParse {
        version: value.to_string(),
        message: err.to_string(),
    })
}

/// Merges bundles into one canonical tree per donor.
///
/// Any malformed version or timestamp aborts the whole merge.
pub fn merge(
    bundles: impl IntoIterator<Item = DonorBundle>,
) -> Result<DonorMapping, SpinnakerError> {
    let mut donors: BTreeMap<Uuid, DonorState> = BTreeMap::new();
    for bundle in bundles {
        match donors.entry(bundle.donor_uuid) {
            Entry::Vacant(slot) => {
                debug!(donor_uuid = %bundle.donor_uuid, "new donor");
                slot.insert(DonorState::new(bundle)?);
            }
            Entry::Occupied(mut slot) => slot.get_mut().absorb(bundle)?,
        }
    }
    Ok(donors
        .into_iter()
        .map(|(donor_uuid, state)| (donor_uuid, state.finish()))
        .collect())
}
