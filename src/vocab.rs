//! Vocabulary used when reading RO-Crate provenance graphs
//!
//! Property names and type markers that the graph engine keys on.

/// Standard metadata descriptor filename
pub const METADATA_DESCRIPTOR_ID: &str = "ro-crate-metadata.json";

/// Attribute on a `hasPart` entry pointing at a nested crate's descriptor
pub const SUBCRATE_METADATA_KEY: &str = "ro-crate-metadata";

/// Substring of the type that marks the crate's own root Dataset
/// (e.g. "https://w3id.org/EVI#ROCrate")
pub const ROCRATE_TYPE_MARKER: &str = "ROCrate";

/// Placeholder contentUrl for files that exist but are not released
pub const EMBARGOED: &str = "Embargoed";

/// Input label used when an experiment stands in for a physical sample
pub const SAMPLE_LABEL: &str = "Sample";

/// Format reported for crate inputs that carry no format at all
pub const UNKNOWN_FORMAT: &str = "unknown";

/// Type of the wrapper emitted around an evidence graph
pub const EVIDENCE_GRAPH_TYPE: &str = "evi:EvidenceGraph";

// Relationship properties
pub const GENERATED_BY: &str = "generatedBy";
pub const GENERATED: &str = "generated";
pub const USED_DATASET: &str = "usedDataset";
pub const USED_SOFTWARE: &str = "usedSoftware";
pub const USED_SAMPLE: &str = "usedSample";
pub const USED_INSTRUMENT: &str = "usedInstrument";
pub const HAS_PART: &str = "hasPart";
pub const CONTENT_URL: &str = "contentUrl";
pub const FORMAT: &str = "format";
