//! Evidence graph construction
//!
//! Traces an entity back through the computations, experiments, datasets,
//! samples and instruments that produced it. Produced entities (Dataset,
//! Sample, Instrument) are followed through `generatedBy`; activities
//! (Computation, Experiment) through `usedDataset`, `usedSample` and
//! `usedInstrument`. Software is a leaf: it is attached but never traced.
//!
//! Each id is expanded at most once per traversal. A second encounter, which
//! happens on cycles and on diamond-shaped provenance, yields a bare
//! `{"@id"}` reference, as does an id that is not in the graph.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::classify::EntityCategory;
use crate::entity::{extract_str, references};
use crate::error::{ProvenanceError, Result};
use crate::index::GraphIndex;
use crate::vocab::{
    EVIDENCE_GRAPH_TYPE, GENERATED_BY, USED_DATASET, USED_INSTRUMENT, USED_SAMPLE, USED_SOFTWARE,
};

/// Node of an evidence graph
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvidenceNode {
    /// Fully expanded entity
    Entity(Box<EntityNode>),
    /// Already expanded elsewhere, or not present in the graph
    Reference {
        #[serde(rename = "@id")]
        id: String,
    },
}

impl EvidenceNode {
    pub fn reference(id: impl Into<String>) -> Self {
        EvidenceNode::Reference { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            EvidenceNode::Entity(node) => &node.id,
            EvidenceNode::Reference { id } => id,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, EvidenceNode::Reference { .. })
    }

    pub fn as_entity(&self) -> Option<&EntityNode> {
        match self {
            EvidenceNode::Entity(node) => Some(node),
            EvidenceNode::Reference { .. } => None,
        }
    }

    /// Number of fully expanded nodes in this subtree
    pub fn expanded_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let EvidenceNode::Entity(entity) = node {
                count += 1;
                stack.extend(entity.children());
            }
        }
        count
    }
}

/// An expanded entity with its traced provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityNode {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub types: Value,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "generatedBy", skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<EvidenceNode>,
    #[serde(rename = "usedDataset", skip_serializing_if = "Option::is_none")]
    pub used_dataset: Option<Vec<EvidenceNode>>,
    #[serde(rename = "usedSample", skip_serializing_if = "Option::is_none")]
    pub used_sample: Option<Vec<EvidenceNode>>,
    #[serde(rename = "usedInstrument", skip_serializing_if = "Option::is_none")]
    pub used_instrument: Option<Vec<EvidenceNode>>,
    #[serde(rename = "usedSoftware", skip_serializing_if = "Option::is_none")]
    pub used_software: Option<Vec<EvidenceNode>>,
}

impl EntityNode {
    fn base(id: &str, entity: &Value) -> Self {
        Self {
            id: id.to_string(),
            types: entity.get("@type").cloned().unwrap_or(Value::Null),
            name: extract_str(entity, "name").map(String::from),
            description: extract_str(entity, "description").map(String::from),
            generated_by: None,
            used_dataset: None,
            used_sample: None,
            used_instrument: None,
            used_software: None,
        }
    }

    fn children(&self) -> impl Iterator<Item = &EvidenceNode> {
        self.generated_by
            .iter()
            .chain(self.used_dataset.iter().flatten())
            .chain(self.used_sample.iter().flatten())
            .chain(self.used_instrument.iter().flatten())
            .chain(self.used_software.iter().flatten())
    }

    fn used_mut(&mut self, relation: UsedRelation) -> &mut Option<Vec<EvidenceNode>> {
        match relation {
            UsedRelation::Dataset => &mut self.used_dataset,
            UsedRelation::Sample => &mut self.used_sample,
            UsedRelation::Instrument => &mut self.used_instrument,
        }
    }
}

/// `used*` relations that are traced further
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UsedRelation {
    Dataset,
    Sample,
    Instrument,
}

impl UsedRelation {
    const ALL: [UsedRelation; 3] = [
        UsedRelation::Dataset,
        UsedRelation::Sample,
        UsedRelation::Instrument,
    ];

    fn key(self) -> &'static str {
        match self {
            UsedRelation::Dataset => USED_DATASET,
            UsedRelation::Sample => USED_SAMPLE,
            UsedRelation::Instrument => USED_INSTRUMENT,
        }
    }
}

/// Where a finished node is attached in its parent
#[derive(Debug, Clone, Copy)]
enum Slot {
    GeneratedBy,
    Used(UsedRelation),
}

struct Pending {
    node: EvidenceNode,
    parent: Option<(usize, Slot)>,
}

/// Build the evidence tree rooted at `root_id`
///
/// Runs on an explicit stack so deep provenance chains cannot exhaust the
/// call stack. Children are pushed in reverse so they are visited in
/// depth-first pre-order, the order that decides which encounter of a
/// shared entity gets expanded.
pub fn build_evidence_graph(index: &GraphIndex, root_id: &str) -> Result<EvidenceNode> {
    if !index.contains(root_id) {
        return Err(ProvenanceError::EntityNotFound(root_id.to_string()));
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut arena: Vec<Pending> = Vec::new();
    let mut stack: Vec<(String, Option<(usize, Slot)>)> = vec![(root_id.to_string(), None)];

    while let Some((id, parent)) = stack.pop() {
        let position = arena.len();

        if !visited.insert(id.clone()) {
            arena.push(Pending {
                node: EvidenceNode::reference(id),
                parent,
            });
            continue;
        }

        let Some(entity) = index.lookup(&id) else {
            debug!(id = %id, "dangling reference in evidence graph");
            arena.push(Pending {
                node: EvidenceNode::reference(id),
                parent,
            });
            continue;
        };

        let mut node = EntityNode::base(&id, entity);
        let mut children: Vec<(String, Slot)> = Vec::new();
        let category = EntityCategory::of(entity);

        if category.is_produced() {
            if let Some(generator) = references(entity, GENERATED_BY).into_iter().next() {
                children.push((generator, Slot::GeneratedBy));
            }
        } else if category.is_activity() {
            for relation in UsedRelation::ALL {
                if entity.get(relation.key()).is_none() {
                    continue;
                }
                *node.used_mut(relation) = Some(Vec::new());
                for used in references(entity, relation.key()) {
                    children.push((used, Slot::Used(relation)));
                }
            }
            if entity.get(USED_SOFTWARE).is_some() {
                node.used_software = Some(
                    references(entity, USED_SOFTWARE)
                        .into_iter()
                        .map(|sw| software_node(index, sw))
                        .collect(),
                );
            }
        }

        for (child, slot) in children.into_iter().rev() {
            stack.push((child, Some((position, slot))));
        }
        arena.push(Pending {
            node: EvidenceNode::Entity(Box::new(node)),
            parent,
        });
    }

    let root = assemble(arena);
    info!(
        root = %root_id,
        expanded = root.expanded_count(),
        "built evidence graph"
    );
    Ok(root)
}

/// Software is attached as its base node without tracing it further
fn software_node(index: &GraphIndex, id: String) -> EvidenceNode {
    match index.lookup(&id) {
        Some(entity) => EvidenceNode::Entity(Box::new(EntityNode::base(&id, entity))),
        None => {
            debug!(id = %id, "dangling software reference in evidence graph");
            EvidenceNode::reference(id)
        }
    }
}

/// Fold the arena into a tree
///
/// Every child sits at a higher arena position than its parent, so popping
/// from the back always finds the parent still in place. Siblings arrive
/// last-first and their lists are reversed once the parent itself is popped.
fn assemble(mut arena: Vec<Pending>) -> EvidenceNode {
    loop {
        let Some(Pending { mut node, parent }) = arena.pop() else {
            unreachable!("evidence arena always holds the root");
        };

        if let EvidenceNode::Entity(entity) = &mut node {
            for relation in UsedRelation::ALL {
                if let Some(list) = entity.used_mut(relation) {
                    list.reverse();
                }
            }
        }

        let Some((parent_pos, slot)) = parent else {
            return node;
        };
        if let EvidenceNode::Entity(parent_node) = &mut arena[parent_pos].node {
            match slot {
                Slot::GeneratedBy => parent_node.generated_by = Some(node),
                Slot::Used(relation) => parent_node
                    .used_mut(relation)
                    .get_or_insert_with(Vec::new)
                    .push(node),
            }
        }
    }
}

/// Options for the evidence graph wrapper
#[derive(Debug, Clone, Default)]
pub struct EvidenceOptions {
    /// Owner recorded on the wrapper; defaults to the crate root's author
    pub owner: Option<String>,
}

/// Serializable evidence graph with crate-level metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceGraph {
    #[serde(rename = "@id")]
    pub guid: String,
    #[serde(rename = "@type")]
    pub type_name: String,
    pub name: String,
    pub description: String,
    pub owner: Option<String>,
    #[serde(rename = "@graph")]
    pub graph: EvidenceNode,
}

impl EvidenceGraph {
    /// Trace `entity_id` and wrap the result
    pub fn build(index: &GraphIndex, entity_id: &str, options: &EvidenceOptions) -> Result<Self> {
        let graph = build_evidence_graph(index, entity_id)?;
        let label = index
            .lookup(entity_id)
            .and_then(|e| extract_str(e, "name"))
            .unwrap_or(entity_id);
        let owner = options
            .owner
            .clone()
            .or_else(|| extract_str(index.root(), "author").map(String::from));

        Ok(Self {
            guid: format!("{}-evidence-graph", entity_id.trim_end_matches('/')),
            type_name: EVIDENCE_GRAPH_TYPE.to_string(),
            name: format!("Evidence Graph for {}", label),
            description: format!("Provenance of {} within {}", label, index.display_name()),
            owner,
            graph,
        })
    }
}
