//! RO-Crate Provenance Library
//!
//! This library analyzes the provenance recorded in RO-Crate metadata
//! (`ro-crate-metadata.json`) and checks the integrity of the files a crate
//! ships.
//!
//! # Overview
//!
//! An RO-Crate is a JSON-LD document with a flat `@graph` of entities that
//! reference each other by `@id`. This library:
//!
//! 1. Indexes a crate's `@graph` by `@id` and locates the root entity
//! 2. Sorts entities into categories (Dataset, Computation, Experiment, ...)
//! 3. Traces an entity back through `generatedBy` into a nested evidence graph
//! 4. Mines format transformation patterns such as `"CSV, TSV → JSON"`
//!    across a crate and its sub-crates
//! 5. Builds a SHA-256 Merkle tree over every local `contentUrl`
//!
//! # Vocabulary
//!
//! Provenance links follow the EVI conventions used by FAIRSCAPE crates:
//!
//! - `generatedBy`: on a Dataset/Software/Sample, the activity that produced it
//! - `usedDataset`, `usedSoftware`, `usedSample`, `usedInstrument`: on an activity, its inputs
//! - `generated`: on an activity, its outputs
//! - `ro-crate-metadata`: on a Dataset, the path to a nested sub-crate's metadata
//!
//! # Usage
//!
//! ## Trace the provenance of a dataset
//!
//! ```ignore
//! use rocrate_provenance::{EvidenceGraph, EvidenceOptions, GraphIndex};
//!
//! let index = GraphIndex::load("path/to/crate")?;
//! let evidence = EvidenceGraph::build(&index, "ark:59852/result", &EvidenceOptions::default())?;
//! println!("{}", to_json_string(&evidence, true)?);
//! ```
//!
//! ## Summarize a release and its sub-crates
//!
//! ```ignore
//! use rocrate_provenance::{load_subcrates, summarize, GraphIndex};
//!
//! let index = GraphIndex::load("path/to/release")?;
//! let subcrates = load_subcrates(&index)?;
//! let summary = summarize(&index, &subcrates);
//! for pattern in &summary.computation_patterns {
//!     println!("{}", pattern);
//! }
//! ```
//!
//! ## Fingerprint the files of a crate
//!
//! ```ignore
//! use rocrate_provenance::generate_merkle_tree;
//!
//! if let Some(tree) = generate_merkle_tree(Path::new("path/to/crate"))? {
//!     println!("root: {}", tree.root_hash);
//! }
//! ```

use serde::Serialize;

pub mod classify;
pub mod entity;
pub mod error;
pub mod evidence;
pub mod index;
pub mod loader;
pub mod merkle;
pub mod patterns;
pub mod resolve;
pub mod summary;
pub mod vocab;

// Re-export main types for convenience
pub use crate::classify::{categorize, categorize_entities, CategorizedEntities, EntityCategory};
pub use crate::error::{ProvenanceError, Result};
pub use crate::evidence::{
    build_evidence_graph, EntityNode, EvidenceGraph, EvidenceNode, EvidenceOptions,
};
pub use crate::index::{load_subcrates, GraphIndex, SubcrateRef};
pub use crate::loader::{CrateOrigin, CrateSource};
pub use crate::merkle::{
    build_merkle_tree, generate_merkle_tree, generate_merkle_tree_with, merkle_tree_for,
    resolve_content_url, verify_merkle_tree, MerkleLeaf, MerkleOptions, MerkleTree,
    MerkleVerification,
};
pub use crate::patterns::{
    aggregate_input_datasets, extract_computation_patterns, extract_experiment_patterns,
    identify_crate_inputs, DatasetRef, PatternCounter, PatternKey,
};
pub use crate::resolve::{FederatedResolver, FormatResolver, ResolvedFormat};
pub use crate::summary::{summarize, ProvenanceSummary};

/// Serialize any analysis result to a JSON string
pub fn to_json_string<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}
