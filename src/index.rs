//! Indexed view over a crate's `@graph`
//!
//! A [`GraphIndex`] is built once per crate document and never mutated: it
//! owns the graph, locates the root entity and answers id lookups in O(1).
//! Reload the crate to pick up changes.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::entity::{
    extract_id, extract_str, extract_types, is_metadata_descriptor, is_standard_descriptor_id,
    references, subcrate_metadata_path,
};
use crate::error::{ProvenanceError, Result};
use crate::loader::{read_document, CrateOrigin, CrateSource};
use crate::vocab::{HAS_PART, ROCRATE_TYPE_MARKER};

/// A nested crate announced in the root's `hasPart`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubcrateRef {
    pub id: String,
    pub metadata_path: String,
}

/// Loaded crate with O(1) entity lookup
#[derive(Debug, Clone)]
pub struct GraphIndex {
    graph: Vec<Value>,
    by_id: HashMap<String, usize>,
    root: usize,
    root_id: String,
    origin: CrateOrigin,
}

impl GraphIndex {
    /// Load a crate from a directory, metadata file or zip archive
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_source(&CrateSource::from_path(path.as_ref()))
    }

    /// Load a crate from an explicit source
    pub fn load_source(source: &CrateSource) -> Result<Self> {
        let (document, origin) = read_document(source)?;
        Self::with_origin(document, origin)
    }

    /// Index an already-parsed JSON-LD document
    pub fn from_document(document: Value) -> Result<Self> {
        Self::with_origin(document, CrateOrigin::Memory)
    }

    fn with_origin(document: Value, origin: CrateOrigin) -> Result<Self> {
        let Value::Object(mut doc) = document else {
            return Err(ProvenanceError::InvalidStructure(
                "metadata document is not a JSON object".to_string(),
            ));
        };

        let graph = match doc.remove("@graph") {
            Some(Value::Array(graph)) => graph,
            Some(_) => {
                return Err(ProvenanceError::InvalidStructure(
                    "@graph is not an array".to_string(),
                ))
            }
            None => {
                return Err(ProvenanceError::InvalidStructure(
                    "missing @graph".to_string(),
                ))
            }
        };

        let mut by_id = HashMap::with_capacity(graph.len());
        for (pos, entity) in graph.iter().enumerate() {
            match extract_id(entity) {
                Some(id) => {
                    if by_id.contains_key(id) {
                        warn!(id, "duplicate @id in @graph, keeping first occurrence");
                    } else {
                        by_id.insert(id.to_string(), pos);
                    }
                }
                None => warn!(position = pos, "entity without @id ignored"),
            }
        }

        let root = find_root(&graph, &by_id).ok_or(ProvenanceError::MissingRootEntity)?;
        let root_id = extract_id(&graph[root])
            .map(String::from)
            .ok_or(ProvenanceError::MissingRootEntity)?;
        debug!(root = %root_id, entities = graph.len(), "indexed crate graph");

        Ok(Self {
            graph,
            by_id,
            root,
            root_id,
            origin,
        })
    }

    /// All entities in document order
    pub fn graph(&self) -> &[Value] {
        &self.graph
    }

    /// The crate's own root entity
    pub fn root(&self) -> &Value {
        &self.graph[self.root]
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// The `ro-crate-metadata.json` descriptor, if the crate has one
    pub fn descriptor(&self) -> Option<&Value> {
        descriptors(&self.graph).next()
    }

    pub fn lookup(&self, id: &str) -> Option<&Value> {
        self.by_id.get(id).map(|&pos| &self.graph[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Human-readable crate name: root `name`, falling back to its id
    pub fn display_name(&self) -> &str {
        extract_str(self.root(), "name").unwrap_or(&self.root_id)
    }

    pub fn origin(&self) -> &CrateOrigin {
        &self.origin
    }

    /// Crate directory for resolving relative content paths
    pub fn base_dir(&self) -> Option<&Path> {
        self.origin.base_dir()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Sub-crates listed in the root's `hasPart` that point at a nested descriptor
    pub fn find_subcrates(&self) -> Vec<SubcrateRef> {
        references(self.root(), HAS_PART)
            .into_iter()
            .filter_map(|id| {
                let entity = self.lookup(&id)?;
                let metadata_path = subcrate_metadata_path(entity)?;
                Some(SubcrateRef {
                    id,
                    metadata_path: metadata_path.to_string(),
                })
            })
            .collect()
    }
}

/// Locate the root entity
///
/// 1. the descriptor's `about` reference
/// 2. an entity typed both Dataset and ROCrate
/// 3. the second graph element
fn find_root(graph: &[Value], by_id: &HashMap<String, usize>) -> Option<usize> {
    let from_descriptor = descriptors(graph)
        .flat_map(|d| references(d, "about"))
        .find_map(|about| by_id.get(&about).copied())
        .filter(|&pos| !is_metadata_descriptor(&graph[pos]));
    if from_descriptor.is_some() {
        return from_descriptor;
    }

    let typed = graph.iter().position(|e| {
        let types = extract_types(e);
        extract_id(e).is_some()
            && !is_metadata_descriptor(e)
            && types.iter().any(|t| t.contains("Dataset"))
            && types.iter().any(|t| t.contains(ROCRATE_TYPE_MARKER))
    });
    if typed.is_some() {
        return typed;
    }

    [1usize, 0].into_iter().find(|&pos| {
        graph
            .get(pos)
            .map(|e| extract_id(e).is_some() && !is_metadata_descriptor(e))
            .unwrap_or(false)
    })
}

/// Descriptor candidates, `ro-crate-metadata.json` ahead of prefixed names
fn descriptors(graph: &[Value]) -> impl Iterator<Item = &Value> {
    let standard = graph
        .iter()
        .filter(|e| extract_id(e).map(is_standard_descriptor_id).unwrap_or(false));
    let prefixed = graph.iter().filter(|e| {
        is_metadata_descriptor(e) && !extract_id(e).map(is_standard_descriptor_id).unwrap_or(false)
    });
    standard.chain(prefixed)
}

/// Load every direct sub-crate of `index`, keyed by the sub-crate's root id
pub fn load_subcrates(index: &GraphIndex) -> Result<IndexMap<String, GraphIndex>> {
    let mut subcrates = IndexMap::new();
    for subcrate in index.find_subcrates() {
        let source = index.origin().subcrate_source(&subcrate.metadata_path)?;
        let loaded = GraphIndex::load_source(&source)?;
        debug!(
            pointer = %subcrate.id,
            root = %loaded.root_id(),
            "loaded sub-crate"
        );
        subcrates.insert(loaded.root_id().to_string(), loaded);
    }
    Ok(subcrates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> Value {
        json!({
            "@context": "https://w3id.org/ro/crate/1.2/context",
            "@graph": [
                {
                    "@id": "ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "about": {"@id": "ark:59852/root"}
                },
                {
                    "@id": "ark:59852/dataset-1",
                    "@type": "Dataset",
                    "name": "Listed before the root"
                },
                {
                    "@id": "ark:59852/root",
                    "@type": ["Dataset", "https://w3id.org/EVI#ROCrate"],
                    "name": "Root Crate",
                    "hasPart": [
                        {"@id": "ark:59852/dataset-1"},
                        {"@id": "ark:59852/sub"},
                        {"@id": "ark:59852/missing"}
                    ]
                },
                {
                    "@id": "ark:59852/sub",
                    "@type": ["Dataset", "https://w3id.org/EVI#ROCrate"],
                    "name": "Sub Crate",
                    "ro-crate-metadata": "sub/ro-crate-metadata.json"
                }
            ]
        })
    }

    #[test]
    fn test_root_from_descriptor() {
        let index = GraphIndex::from_document(sample_document()).unwrap();
        assert_eq!(index.root_id(), "ark:59852/root");
        assert_eq!(index.display_name(), "Root Crate");
        assert!(index.descriptor().is_some());
    }

    #[test]
    fn test_nested_descriptor_ids_are_content() {
        let index = GraphIndex::from_document(json!({
            "@graph": [
                {"@id": "sub/ro-crate-metadata.json", "about": {"@id": "ark:sub"}},
                {"@id": "ro-crate-metadata.json", "about": {"@id": "ark:root"}},
                {"@id": "ark:root", "@type": ["Dataset", "ROCrate"], "name": "Root"},
                {"@id": "ark:sub", "@type": "Dataset"},
                {"@id": "data/ro-crate-metadata.json", "@type": "Dataset"}
            ]
        }))
        .unwrap();

        assert_eq!(index.root_id(), "ark:root");
        assert_eq!(
            index.descriptor().and_then(|d| d.get("@id")),
            Some(&json!("ro-crate-metadata.json"))
        );
    }

    #[test]
    fn test_standard_descriptor_wins_over_prefixed() {
        let index = GraphIndex::from_document(json!({
            "@graph": [
                {"@id": "old-ro-crate-metadata.json", "about": {"@id": "ark:old"}},
                {"@id": "ro-crate-metadata.json", "about": {"@id": "ark:root"}},
                {"@id": "ark:old", "@type": "Dataset"},
                {"@id": "ark:root", "@type": "Dataset"}
            ]
        }))
        .unwrap();
        assert_eq!(index.root_id(), "ark:root");
    }

    #[test]
    fn test_root_from_type_scan() {
        let index = GraphIndex::from_document(json!({
            "@graph": [
                {"@id": "ark:a", "@type": "Dataset"},
                {"@id": "ark:b", "@type": "Software"},
                {"@id": "ark:c", "@type": ["Dataset", "https://w3id.org/EVI#ROCrate"]}
            ]
        }))
        .unwrap();
        assert_eq!(index.root_id(), "ark:c");
    }

    #[test]
    fn test_root_falls_back_to_second_element() {
        let index = GraphIndex::from_document(json!({
            "@graph": [
                {"@id": "ark:a", "@type": "Dataset"},
                {"@id": "ark:b", "@type": "Dataset"}
            ]
        }))
        .unwrap();
        assert_eq!(index.root_id(), "ark:b");
    }

    #[test]
    fn test_missing_graph_is_structure_error() {
        let result = GraphIndex::from_document(json!({"@context": {}}));
        assert!(matches!(result, Err(ProvenanceError::InvalidStructure(_))));

        let result = GraphIndex::from_document(json!({"@graph": {"@id": "x"}}));
        assert!(matches!(result, Err(ProvenanceError::InvalidStructure(_))));
    }

    #[test]
    fn test_empty_graph_has_no_root() {
        let result = GraphIndex::from_document(json!({"@graph": []}));
        assert!(matches!(result, Err(ProvenanceError::MissingRootEntity)));
    }

    #[test]
    fn test_lookup() {
        let index = GraphIndex::from_document(sample_document()).unwrap();
        assert_eq!(
            index.lookup("ark:59852/dataset-1").and_then(|e| e.get("name")),
            Some(&json!("Listed before the root"))
        );
        assert!(index.lookup("ark:59852/missing").is_none());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_find_subcrates_cross_checks_graph() {
        let index = GraphIndex::from_document(sample_document()).unwrap();
        let subcrates = index.find_subcrates();
        assert_eq!(
            subcrates,
            vec![SubcrateRef {
                id: "ark:59852/sub".to_string(),
                metadata_path: "sub/ro-crate-metadata.json".to_string(),
            }]
        );
    }

    #[test]
    fn test_load_subcrates_from_memory_crate_fails() {
        let index = GraphIndex::from_document(sample_document()).unwrap();
        assert!(load_subcrates(&index).is_err());
    }
}
