//! Crate-wide provenance summary
//!
//! Runs categorization and pattern mining over a crate and its direct
//! sub-crates. Each crate's computations resolve their inputs locally first
//! and then against every other crate in the set, so a pipeline that reads
//! a dataset published in a sibling sub-crate is still reported.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::classify::{categorize, EntityCategory};
use crate::index::GraphIndex;
use crate::patterns::{
    aggregate_input_datasets, identify_crate_inputs, mine_computation_patterns,
    mine_experiment_patterns, DatasetRef, PatternCounter,
};
use crate::resolve::{FederatedResolver, FormatResolver};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceSummary {
    pub crate_name: String,
    pub subcrate_count: usize,
    pub category_counts: BTreeMap<EntityCategory, usize>,
    pub computation_patterns: Vec<String>,
    pub experiment_patterns: Vec<String>,
    /// Inputs of the top-level crate that were not produced inside it;
    /// unformatted ones known anywhere in the set as an Experiment read "Sample"
    pub crate_inputs: Vec<DatasetRef>,
    /// Computation inputs that were found in another crate of the set
    pub external_datasets: Vec<DatasetRef>,
    pub input_datasets: IndexMap<String, usize>,
}

/// Summarize `index` together with its loaded sub-crates
pub fn summarize(index: &GraphIndex, subcrates: &IndexMap<String, GraphIndex>) -> ProvenanceSummary {
    let crates: Vec<&GraphIndex> = std::iter::once(index).chain(subcrates.values()).collect();
    let everywhere = FederatedResolver::new(crates.iter().copied());

    let mut category_counts: BTreeMap<EntityCategory, usize> = BTreeMap::new();
    let mut computations = PatternCounter::new();
    let mut experiments = PatternCounter::new();
    let mut external_datasets = Vec::new();
    let mut crate_inputs = Vec::new();

    for (position, current) in crates.iter().enumerate() {
        let categorized = categorize(current);
        for (category, count) in categorized.counts() {
            *category_counts.entry(category).or_insert(0) += count;
        }

        let others = FederatedResolver::new(
            crates
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != position)
                .map(|(_, c)| *c),
        );
        let federated: Option<&dyn FormatResolver> = if others.is_empty() {
            None
        } else {
            Some(&others)
        };

        external_datasets.extend(mine_computation_patterns(
            categorized.get(EntityCategory::Computation),
            *current,
            federated,
            &mut computations,
        ));
        mine_experiment_patterns(
            categorized.get(EntityCategory::Experiment),
            *current,
            &mut experiments,
        );

        if position == 0 {
            crate_inputs = identify_crate_inputs(&categorized, &everywhere);
        }
    }

    let input_datasets = aggregate_input_datasets(&external_datasets, &crate_inputs);

    ProvenanceSummary {
        crate_name: index.display_name().to_string(),
        subcrate_count: subcrates.len(),
        category_counts,
        computation_patterns: computations.patterns(),
        experiment_patterns: experiments.patterns(),
        crate_inputs,
        external_datasets,
        input_datasets,
    }
}
