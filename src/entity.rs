//! Entity accessors for RO-Crate graphs
//!
//! Entities stay as `serde_json::Value` objects. Everything that reads an
//! attribute whose shape varies (string vs list vs reference object) goes
//! through the helpers here, so the graph algorithms only ever see plain
//! id lists and strings.

use serde_json::Value;

use crate::vocab::{CONTENT_URL, METADATA_DESCRIPTOR_ID, SUBCRATE_METADATA_KEY};

/// A relationship value as it appears in JSON-LD
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Bare id string: `"ark:59852/dataset-1"`
    Id(String),
    /// Reference object: `{"@id": "ark:59852/dataset-1"}`
    Object { id: String },
    /// Ordered list of either form
    List(Vec<Reference>),
}

impl Reference {
    /// Parse a relationship value, ignoring anything that carries no id
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Reference::Id(s.clone())),
            Value::Object(obj) => obj
                .get("@id")
                .and_then(|v| v.as_str())
                .map(|id| Reference::Object { id: id.to_string() }),
            Value::Array(arr) => Some(Reference::List(
                arr.iter().filter_map(Reference::from_value).collect(),
            )),
            _ => None,
        }
    }

    /// Flatten into the referenced ids, in document order
    pub fn ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Reference::Id(id) | Reference::Object { id } => out.push(id),
            Reference::List(items) => {
                for item in items {
                    item.collect_ids(out);
                }
            }
        }
    }
}

/// Extract @id from an entity
pub fn extract_id(entity: &Value) -> Option<&str> {
    entity.get("@id").and_then(|v| v.as_str())
}

/// Extract @type as a list of type names
pub fn extract_types(entity: &Value) -> Vec<String> {
    match entity.get("@type") {
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => vec![],
    }
}

/// Ids referenced by a relationship attribute; empty when absent
pub fn references(entity: &Value, key: &str) -> Vec<String> {
    entity
        .get(key)
        .and_then(Reference::from_value)
        .map(|r| r.ids().into_iter().map(String::from).collect())
        .unwrap_or_default()
}

/// Read a textual attribute, taking the first string if it is a list
pub fn extract_str<'a>(entity: &'a Value, key: &str) -> Option<&'a str> {
    match entity.get(key)? {
        Value::String(s) => Some(s),
        Value::Array(arr) => arr.iter().find_map(|v| v.as_str()),
        _ => None,
    }
}

/// All contentUrl values of an entity, a single string normalized to one element
pub fn content_urls(entity: &Value) -> Vec<&str> {
    match entity.get(CONTENT_URL) {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(arr)) => arr.iter().filter_map(|v| v.as_str()).collect(),
        _ => vec![],
    }
}

/// Check if an @id is exactly `ro-crate-metadata.json` (or `./ro-crate-metadata.json`)
pub fn is_standard_descriptor_id(id: &str) -> bool {
    id.strip_prefix("./").unwrap_or(id) == METADATA_DESCRIPTOR_ID
}

/// Check if an @id names this crate's metadata descriptor
///
/// Besides the standard name, a `<prefix>-ro-crate-metadata.json` id is
/// accepted when it has no path component. Ids such as
/// `sub/ro-crate-metadata.json` belong to nested crates and are content.
pub fn is_descriptor_id(id: &str) -> bool {
    if is_standard_descriptor_id(id) {
        return true;
    }
    !id.contains('/')
        && id
            .strip_suffix(METADATA_DESCRIPTOR_ID)
            .map(|prefix| prefix.ends_with('-'))
            .unwrap_or(false)
}

/// Check if an entity is the metadata descriptor
pub fn is_metadata_descriptor(entity: &Value) -> bool {
    extract_id(entity).map(is_descriptor_id).unwrap_or(false)
}

/// Relative path of the nested descriptor if this entity points at a sub-crate
pub fn subcrate_metadata_path(entity: &Value) -> Option<&str> {
    entity.get(SUBCRATE_METADATA_KEY).and_then(|v| v.as_str())
}

/// Check if an entity is a sub-crate pointer (structural, not content)
pub fn is_subcrate_pointer(entity: &Value) -> bool {
    entity.get(SUBCRATE_METADATA_KEY).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_types() {
        let single = json!({"@type": "Dataset"});
        assert_eq!(extract_types(&single), vec!["Dataset"]);

        let multiple = json!({"@type": ["Dataset", "https://w3id.org/EVI#ROCrate"]});
        assert_eq!(
            extract_types(&multiple),
            vec!["Dataset", "https://w3id.org/EVI#ROCrate"]
        );

        assert!(extract_types(&json!({"@id": "x"})).is_empty());
    }

    #[test]
    fn test_reference_shapes() {
        let bare = json!("ark:1");
        assert_eq!(Reference::from_value(&bare).unwrap().ids(), vec!["ark:1"]);

        let obj = json!({"@id": "ark:2"});
        assert_eq!(Reference::from_value(&obj).unwrap().ids(), vec!["ark:2"]);

        let mixed = json!([{"@id": "ark:3"}, "ark:4", 17, {"name": "no id"}]);
        assert_eq!(
            Reference::from_value(&mixed).unwrap().ids(),
            vec!["ark:3", "ark:4"]
        );

        assert!(Reference::from_value(&json!(42)).is_none());
    }

    #[test]
    fn test_references_missing_attribute() {
        let entity = json!({"@id": "ark:c", "usedDataset": []});
        assert!(references(&entity, "usedDataset").is_empty());
        assert!(references(&entity, "usedSoftware").is_empty());
    }

    #[test]
    fn test_content_urls() {
        let single = json!({"contentUrl": "data/a.txt"});
        assert_eq!(content_urls(&single), vec!["data/a.txt"]);

        let list = json!({"contentUrl": ["a.txt", "https://example.org/b.txt"]});
        assert_eq!(content_urls(&list).len(), 2);

        assert!(content_urls(&json!({"@id": "x"})).is_empty());
    }

    #[test]
    fn test_descriptor_and_subcrate_pointer() {
        assert!(is_metadata_descriptor(&json!({"@id": "ro-crate-metadata.json"})));
        assert!(is_metadata_descriptor(
            &json!({"@id": "prefix-ro-crate-metadata.json"})
        ));
        assert!(is_metadata_descriptor(&json!({"@id": "./ro-crate-metadata.json"})));
        assert!(!is_metadata_descriptor(&json!({"@id": "./"})));
        assert!(!is_metadata_descriptor(
            &json!({"@id": "sub/ro-crate-metadata.json"})
        ));
        assert!(!is_metadata_descriptor(
            &json!({"@id": "data/prefix-ro-crate-metadata.json"})
        ));
        assert!(!is_metadata_descriptor(&json!({"@id": "xro-crate-metadata.json"})));

        let pointer = json!({
            "@id": "ark:59852/sub",
            "@type": "Dataset",
            "ro-crate-metadata": "sub/ro-crate-metadata.json"
        });
        assert!(is_subcrate_pointer(&pointer));
        assert_eq!(
            subcrate_metadata_path(&pointer),
            Some("sub/ro-crate-metadata.json")
        );
    }

    #[test]
    fn test_extract_str_takes_first_of_list() {
        let entity = json!({"format": ["text/csv", "CSV"], "name": "A"});
        assert_eq!(extract_str(&entity, "format"), Some("text/csv"));
        assert_eq!(extract_str(&entity, "name"), Some("A"));
        assert_eq!(extract_str(&entity, "description"), None);
    }
}
