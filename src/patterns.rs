//! Format transformation patterns mined from computations and experiments
//!
//! A pattern summarizes what an activity consumed and produced as sets of
//! format labels, e.g. `"CSV, TSV → JSON"`. Labels are held in sorted sets
//! so two computations that list the same inputs in a different order
//! produce the same pattern.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::classify::{CategorizedEntities, EntityCategory};
use crate::entity::{extract_id, extract_str, references};
use crate::resolve::FormatResolver;
use crate::vocab::{FORMAT, GENERATED, GENERATED_BY, SAMPLE_LABEL, UNKNOWN_FORMAT, USED_DATASET};

/// Structured identity of a pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternKey {
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<&str> = self.inputs.iter().map(String::as_str).collect();
        let outputs: Vec<&str> = self.outputs.iter().map(String::as_str).collect();
        write!(f, "{} → {}", inputs.join(", "), outputs.join(", "))
    }
}

/// Multiset of patterns, remembering first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCounter {
    counts: IndexMap<PatternKey, usize>,
}

impl PatternCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: PatternKey) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn count(&self, key: &PatternKey) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatternKey, usize)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }

    /// Display strings of the distinct patterns
    pub fn patterns(&self) -> Vec<String> {
        self.counts.keys().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// A dataset feeding the crate, with the sub-crate it lives in ("" for local)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub id: String,
    pub format: String,
    pub subcrate: String,
}

/// Accumulate computation patterns into `counter`, returning the inputs
/// that were resolved in a sub-crate
pub fn mine_computation_patterns(
    computations: &[&Value],
    local: &dyn FormatResolver,
    subcrates: Option<&dyn FormatResolver>,
    counter: &mut PatternCounter,
) -> Vec<DatasetRef> {
    let mut external_datasets = Vec::new();

    for computation in computations {
        let computation_id = extract_id(computation).unwrap_or("<anonymous>");
        let mut inputs = BTreeSet::new();

        for dataset_id in references(computation, USED_DATASET) {
            if let Some(resolved) = local.lookup_format(&dataset_id) {
                inputs.insert(resolved.format);
                continue;
            }

            if let Some(resolved) = subcrates.and_then(|r| r.lookup_format(&dataset_id)) {
                let subcrate = resolved.subcrate.unwrap_or_default();
                let label = if subcrate.is_empty() {
                    resolved.format.clone()
                } else {
                    format!("{} ({})", subcrate, resolved.format)
                };
                inputs.insert(label);
                external_datasets.push(DatasetRef {
                    id: dataset_id,
                    format: resolved.format,
                    subcrate,
                });
                continue;
            }

            let is_experiment = local.is_experiment(&dataset_id)
                || subcrates.map(|r| r.is_experiment(&dataset_id)).unwrap_or(false);
            if is_experiment {
                inputs.insert(SAMPLE_LABEL.to_string());
            } else {
                debug!(
                    computation = computation_id,
                    dataset = %dataset_id,
                    "input format unresolved"
                );
            }
        }

        let outputs = output_formats(computation, local);
        if !inputs.is_empty() && !outputs.is_empty() {
            counter.record(PatternKey { inputs, outputs });
        }
    }

    external_datasets
}

/// Distinct computation patterns plus the datasets resolved in sub-crates
pub fn extract_computation_patterns(
    computations: &[&Value],
    local: &dyn FormatResolver,
    subcrates: Option<&dyn FormatResolver>,
) -> (Vec<String>, Vec<DatasetRef>) {
    let mut counter = PatternCounter::new();
    let external = mine_computation_patterns(computations, local, subcrates, &mut counter);
    (counter.patterns(), external)
}

/// Accumulate experiment patterns; the input side is always a sample
pub fn mine_experiment_patterns(
    experiments: &[&Value],
    local: &dyn FormatResolver,
    counter: &mut PatternCounter,
) {
    for experiment in experiments {
        let outputs = output_formats(experiment, local);
        if outputs.is_empty() {
            continue;
        }
        counter.record(PatternKey {
            inputs: BTreeSet::from([SAMPLE_LABEL.to_string()]),
            outputs,
        });
    }
}

/// Distinct `"Sample → ..."` patterns of the given experiments
pub fn extract_experiment_patterns(
    experiments: &[&Value],
    local: &dyn FormatResolver,
) -> Vec<String> {
    let mut counter = PatternCounter::new();
    mine_experiment_patterns(experiments, local, &mut counter);
    counter.patterns()
}

/// Formats of the `generated` entities, resolved in the local crate only
fn output_formats(activity: &Value, local: &dyn FormatResolver) -> BTreeSet<String> {
    references(activity, GENERATED)
        .iter()
        .filter_map(|id| local.lookup_format(id))
        .map(|resolved| resolved.format)
        .collect()
}

/// Datasets that were not produced inside the crate
///
/// A dataset without a format is labelled `"Sample"` when `experiments`
/// knows its id as an Experiment.
pub fn identify_crate_inputs(
    categorized: &CategorizedEntities<'_>,
    experiments: &dyn FormatResolver,
) -> Vec<DatasetRef> {
    categorized
        .get(EntityCategory::Dataset)
        .iter()
        .filter(|dataset| references(dataset, GENERATED_BY).is_empty())
        .filter_map(|dataset| {
            let id = extract_id(dataset)?;
            let format = match extract_str(dataset, FORMAT) {
                Some(format) => format.to_string(),
                None if experiments.is_experiment(id) => SAMPLE_LABEL.to_string(),
                None => UNKNOWN_FORMAT.to_string(),
            };
            Some(DatasetRef {
                id: id.to_string(),
                format,
                subcrate: String::new(),
            })
        })
        .collect()
}

/// Tally input datasets by `"<subcrate>, <format>"`, or `"<format>"` for local ones
pub fn aggregate_input_datasets(
    external: &[DatasetRef],
    internal: &[DatasetRef],
) -> IndexMap<String, usize> {
    let mut tally = IndexMap::new();
    for dataset in external.iter().chain(internal) {
        let key = if dataset.subcrate.is_empty() {
            dataset.format.clone()
        } else {
            format!("{}, {}", dataset.subcrate, dataset.format)
        };
        *tally.entry(key).or_insert(0) += 1;
    }
    tally
}
