//! Dataset format resolution within one crate or across sub-crates

use crate::classify::EntityCategory;
use crate::entity::{extract_str, extract_types};
use crate::index::GraphIndex;
use crate::vocab::FORMAT;

/// A dataset format and the sub-crate it was found in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub format: String,
    /// Display name of the owning sub-crate; `None` for the local crate
    pub subcrate: Option<String>,
}

/// Looks up entity formats by id
pub trait FormatResolver {
    /// Format of the entity with this id, if it exists and declares one
    fn lookup_format(&self, entity_id: &str) -> Option<ResolvedFormat>;

    /// Whether this id names an entity with an Experiment type, even when
    /// another type outranks it in categorization
    fn is_experiment(&self, entity_id: &str) -> bool;
}

impl FormatResolver for GraphIndex {
    fn lookup_format(&self, entity_id: &str) -> Option<ResolvedFormat> {
        let format = extract_str(self.lookup(entity_id)?, FORMAT)?;
        Some(ResolvedFormat {
            format: format.to_string(),
            subcrate: None,
        })
    }

    fn is_experiment(&self, entity_id: &str) -> bool {
        self.lookup(entity_id)
            .map(|e| {
                extract_types(e)
                    .iter()
                    .any(|t| t.contains(EntityCategory::Experiment.as_str()))
            })
            .unwrap_or(false)
    }
}

/// Resolver over a set of sub-crates, tried in order
#[derive(Debug, Clone, Default)]
pub struct FederatedResolver<'a> {
    crates: Vec<&'a GraphIndex>,
}

impl<'a> FederatedResolver<'a> {
    pub fn new(crates: impl IntoIterator<Item = &'a GraphIndex>) -> Self {
        Self {
            crates: crates.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crates.is_empty()
    }
}

impl FormatResolver for FederatedResolver<'_> {
    fn lookup_format(&self, entity_id: &str) -> Option<ResolvedFormat> {
        self.crates.iter().find_map(|index| {
            index.lookup_format(entity_id).map(|resolved| ResolvedFormat {
                format: resolved.format,
                subcrate: Some(index.display_name().to_string()),
            })
        })
    }

    fn is_experiment(&self, entity_id: &str) -> bool {
        self.crates.iter().any(|index| index.is_experiment(entity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crate_with(name: &str, entities: serde_json::Value) -> GraphIndex {
        let mut graph = vec![json!({
            "@id": format!("ark:{name}"),
            "@type": ["Dataset", "ROCrate"],
            "name": name
        })];
        graph.extend(entities.as_array().unwrap().iter().cloned());
        GraphIndex::from_document(json!({ "@graph": graph })).unwrap()
    }

    #[test]
    fn test_local_lookup() {
        let index = crate_with(
            "local",
            json!([
                {"@id": "ark:d1", "@type": "Dataset", "format": "CSV"},
                {"@id": "ark:d2", "@type": "Dataset"},
                {"@id": "ark:e1", "@type": "evi:Experiment"},
                {"@id": "ark:e2", "@type": ["Dataset", "Experiment"]}
            ]),
        );

        assert_eq!(
            index.lookup_format("ark:d1"),
            Some(ResolvedFormat {
                format: "CSV".to_string(),
                subcrate: None
            })
        );
        assert_eq!(index.lookup_format("ark:d2"), None);
        assert_eq!(index.lookup_format("ark:none"), None);
        assert!(index.is_experiment("ark:e1"));
        assert!(index.is_experiment("ark:e2"));
        assert!(!index.is_experiment("ark:d1"));
        assert!(!index.is_experiment("ark:none"));
    }

    #[test]
    fn test_federated_lookup_tags_subcrate() {
        let first = crate_with("Imaging", json!([{"@id": "ark:img", "format": "TIFF"}]));
        let second = crate_with("Proteomics", json!([{"@id": "ark:ms", "format": "mzML"}]));
        let resolver = FederatedResolver::new([&first, &second]);

        let resolved = resolver.lookup_format("ark:ms").unwrap();
        assert_eq!(resolved.format, "mzML");
        assert_eq!(resolved.subcrate.as_deref(), Some("Proteomics"));
        assert!(resolver.lookup_format("ark:missing").is_none());
    }
}
