//! Semantic categorization of crate entities

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::entity::{extract_id, extract_types, is_metadata_descriptor, is_subcrate_pointer};
use crate::index::GraphIndex;

/// Semantic category of an entity, declared in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EntityCategory {
    Dataset,
    Software,
    Instrument,
    Sample,
    Experiment,
    Computation,
    Schema,
    Other,
}

impl EntityCategory {
    /// Categories tried against type names, highest priority first
    pub const MATCHED: [EntityCategory; 7] = [
        EntityCategory::Dataset,
        EntityCategory::Software,
        EntityCategory::Instrument,
        EntityCategory::Sample,
        EntityCategory::Experiment,
        EntityCategory::Computation,
        EntityCategory::Schema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Dataset => "Dataset",
            EntityCategory::Software => "Software",
            EntityCategory::Instrument => "Instrument",
            EntityCategory::Sample => "Sample",
            EntityCategory::Experiment => "Experiment",
            EntityCategory::Computation => "Computation",
            EntityCategory::Schema => "Schema",
            EntityCategory::Other => "Other",
        }
    }

    /// Categorize a list of type names by substring match
    pub fn from_types<S: AsRef<str>>(types: &[S]) -> Self {
        Self::MATCHED
            .into_iter()
            .find(|category| {
                types
                    .iter()
                    .any(|t| t.as_ref().contains(category.as_str()))
            })
            .unwrap_or(EntityCategory::Other)
    }

    pub fn of(entity: &Value) -> Self {
        Self::from_types(&extract_types(entity))
    }

    /// Entities whose provenance is traced through `generatedBy`
    pub fn is_produced(&self) -> bool {
        matches!(
            self,
            EntityCategory::Dataset | EntityCategory::Sample | EntityCategory::Instrument
        )
    }

    /// Entities whose inputs are traced through the `used*` relations
    pub fn is_activity(&self) -> bool {
        matches!(self, EntityCategory::Computation | EntityCategory::Experiment)
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content entities of one crate grouped by category
#[derive(Debug, Clone)]
pub struct CategorizedEntities<'a> {
    buckets: BTreeMap<EntityCategory, Vec<&'a Value>>,
}

impl<'a> CategorizedEntities<'a> {
    /// Entities in a category, in graph order
    pub fn get(&self, category: EntityCategory) -> &[&'a Value] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, &[&'a Value])> {
        self.buckets.iter().map(|(c, v)| (*c, v.as_slice()))
    }

    /// Number of entities in each category, every category included
    pub fn counts(&self) -> BTreeMap<EntityCategory, usize> {
        self.buckets.iter().map(|(c, v)| (*c, v.len())).collect()
    }

    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Check whether an id is categorized under `category`
    pub fn contains_id(&self, category: EntityCategory, id: &str) -> bool {
        self.get(category)
            .iter()
            .any(|e| extract_id(e) == Some(id))
    }
}

/// Partition a crate's content entities into categories
pub fn categorize(index: &GraphIndex) -> CategorizedEntities<'_> {
    categorize_entities(index.graph(), index.root_id())
}

/// Partition entities, skipping the root, the descriptor and sub-crate pointers
pub fn categorize_entities<'a>(
    entities: impl IntoIterator<Item = &'a Value>,
    root_id: &str,
) -> CategorizedEntities<'a> {
    let mut buckets: BTreeMap<EntityCategory, Vec<&'a Value>> = EntityCategory::MATCHED
        .into_iter()
        .chain([EntityCategory::Other])
        .map(|c| (c, Vec::new()))
        .collect();

    for entity in entities {
        if extract_id(entity) == Some(root_id)
            || is_metadata_descriptor(entity)
            || is_subcrate_pointer(entity)
        {
            continue;
        }
        buckets
            .entry(EntityCategory::of(entity))
            .or_default()
            .push(entity);
    }

    CategorizedEntities { buckets }
}
