//! Reading RO-Crate metadata documents from disk and zip archives

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{ProvenanceError, Result};
use crate::vocab::METADATA_DESCRIPTOR_ID;

/// Source from which to load an RO-Crate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrateSource {
    /// Local directory containing ro-crate-metadata.json
    Directory(PathBuf),
    /// Path to the metadata file itself
    MetadataFile(PathBuf),
    /// Local zip file holding the crate
    ZipFile(PathBuf),
    /// Descriptor of a nested crate inside a zip archive
    ZipSubcrate { zip_path: PathBuf, entry: String },
}

impl CrateSource {
    /// Pick a source kind from a filesystem path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);

        if is_zip {
            CrateSource::ZipFile(path)
        } else if path.is_dir() {
            CrateSource::Directory(path)
        } else {
            CrateSource::MetadataFile(path)
        }
    }
}

/// Where a loaded crate lives, used to resolve sub-crates and file contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrateOrigin {
    /// Crate directory on disk
    Directory(PathBuf),
    /// Directory `prefix` ("" for the archive root) inside a zip archive
    Zip { zip_path: PathBuf, prefix: String },
    /// Document supplied already parsed
    Memory,
}

impl CrateOrigin {
    /// Base directory for relative paths, when the crate lives on disk
    pub fn base_dir(&self) -> Option<&Path> {
        match self {
            CrateOrigin::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Source for a nested crate whose descriptor is at `metadata_path`
    /// relative to this crate
    pub fn subcrate_source(&self, metadata_path: &str) -> Result<CrateSource> {
        let relative = metadata_path.trim_start_matches("./");
        match self {
            CrateOrigin::Directory(dir) => Ok(CrateSource::MetadataFile(dir.join(relative))),
            CrateOrigin::Zip { zip_path, prefix } => {
                let entry = if prefix.is_empty() {
                    relative.to_string()
                } else {
                    format!("{}/{}", prefix, relative)
                };
                Ok(CrateSource::ZipSubcrate {
                    zip_path: zip_path.clone(),
                    entry,
                })
            }
            CrateOrigin::Memory => Err(ProvenanceError::InvalidStructure(format!(
                "cannot resolve sub-crate '{}' of an in-memory crate",
                metadata_path
            ))),
        }
    }
}

/// Read and parse the metadata document behind a source
pub fn read_document(source: &CrateSource) -> Result<(Value, CrateOrigin)> {
    match source {
        CrateSource::Directory(dir) => {
            if !dir.exists() {
                return Err(ProvenanceError::NotFound(dir.clone()));
            }
            let metadata_path = find_metadata_in_directory(dir)?;
            let document = read_metadata_file(&metadata_path)?;
            Ok((document, CrateOrigin::Directory(dir.clone())))
        }
        CrateSource::MetadataFile(path) => {
            let document = read_metadata_file(path)?;
            let base = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((document, CrateOrigin::Directory(base)))
        }
        CrateSource::ZipFile(path) => {
            let mut archive = open_zip(path)?;
            let (entry, prefix) = find_root_metadata_in_zip(&mut archive, path)?;
            let document = read_zip_entry(&mut archive, &entry, path)?;
            Ok((
                document,
                CrateOrigin::Zip {
                    zip_path: path.clone(),
                    prefix,
                },
            ))
        }
        CrateSource::ZipSubcrate { zip_path, entry } => {
            let mut archive = open_zip(zip_path)?;
            let document = read_zip_entry(&mut archive, entry, zip_path)?;
            Ok((
                document,
                CrateOrigin::Zip {
                    zip_path: zip_path.clone(),
                    prefix: extract_directory_from_metadata_path(entry),
                },
            ))
        }
    }
}

/// Read and parse a metadata file on disk
fn read_metadata_file(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Err(ProvenanceError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| ProvenanceError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), bytes = content.len(), "read crate metadata");
    parse_document(&content, &path.display().to_string())
}

/// Parse metadata JSON, attributing failures to `origin`
pub fn parse_document(content: &str, origin: &str) -> Result<Value> {
    serde_json::from_str(content).map_err(|e| ProvenanceError::Parse {
        path: origin.to_string(),
        source: e,
    })
}

/// Find ro-crate-metadata.json (with optional prefix) in a directory
fn find_metadata_in_directory(path: &Path) -> Result<PathBuf> {
    let standard = path.join(METADATA_DESCRIPTOR_ID);
    if standard.exists() {
        return Ok(standard);
    }

    // Look for *-ro-crate-metadata.json
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            if let Some(name_str) = name.to_str() {
                if name_str.ends_with("-ro-crate-metadata.json") {
                    return Ok(entry.path());
                }
            }
        }
    }

    Err(ProvenanceError::NotFound(standard))
}

fn open_zip(path: &Path) -> Result<ZipArchive<File>> {
    if !path.exists() {
        return Err(ProvenanceError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| ProvenanceError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    ZipArchive::new(file).map_err(|e| ProvenanceError::LoadError {
        path: path.display().to_string(),
        reason: format!("Failed to read zip archive: {}", e),
    })
}

fn read_zip_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry_path: &str,
    zip_path: &Path,
) -> Result<Value> {
    let mut metadata_file = archive
        .by_name(entry_path)
        .map_err(|_| ProvenanceError::NotFound(zip_path.join(entry_path)))?;

    let mut content = String::new();
    metadata_file
        .read_to_string(&mut content)
        .map_err(|e| ProvenanceError::LoadError {
            path: zip_path.display().to_string(),
            reason: format!("Failed to read {}: {}", entry_path, e),
        })?;

    parse_document(&content, &format!("{}!{}", zip_path.display(), entry_path))
}

/// Find the root ro-crate-metadata.json in a zip archive
/// Returns (full_path, root_prefix) where root_prefix is the top-level directory if any
fn find_root_metadata_in_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    zip_path: &Path,
) -> Result<(String, String)> {
    let entries: Vec<String> = archive.file_names().map(String::from).collect();

    // Metadata directly at the archive root
    for entry in &entries {
        if !entry.contains('/') && entry.ends_with(METADATA_DESCRIPTOR_ID) {
            return Ok((entry.clone(), String::new()));
        }
    }

    // Archive created by zipping a folder: every entry shares one top-level directory
    let top_level_dirs: std::collections::HashSet<&str> = entries
        .iter()
        .filter_map(|e| e.split('/').next())
        .filter(|s| !s.is_empty())
        .collect();

    if top_level_dirs.len() == 1 {
        if let Some(prefix) = top_level_dirs.into_iter().next() {
            let expected_root = format!("{}/", prefix);
            for entry in &entries {
                if let Some(remainder) = entry.strip_prefix(&expected_root) {
                    if !remainder.contains('/') && remainder.ends_with(METADATA_DESCRIPTOR_ID) {
                        return Ok((entry.clone(), prefix.to_string()));
                    }
                }
            }
        }
    }

    Err(ProvenanceError::LoadError {
        path: zip_path.display().to_string(),
        reason: "No root ro-crate-metadata.json found at archive root".to_string(),
    })
}

/// Extract the directory path from a metadata file path
/// e.g., "subdir/ro-crate-metadata.json" -> "subdir"
/// e.g., "ro-crate-metadata.json" -> ""
fn extract_directory_from_metadata_path(path: &str) -> String {
    if let Some(pos) = path.rfind('/') {
        path[..pos].trim_matches('/').to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_directory_from_metadata_path() {
        assert_eq!(
            extract_directory_from_metadata_path("subdir/ro-crate-metadata.json"),
            "subdir"
        );
        assert_eq!(
            extract_directory_from_metadata_path("a/b/ro-crate-metadata.json"),
            "a/b"
        );
        assert_eq!(
            extract_directory_from_metadata_path("ro-crate-metadata.json"),
            ""
        );
    }

    #[test]
    fn test_subcrate_source_from_directory() {
        let origin = CrateOrigin::Directory(PathBuf::from("/data/crate"));
        let source = origin
            .subcrate_source("./sub/ro-crate-metadata.json")
            .unwrap();
        assert_eq!(
            source,
            CrateSource::MetadataFile(PathBuf::from("/data/crate/sub/ro-crate-metadata.json"))
        );
    }

    #[test]
    fn test_subcrate_source_from_zip() {
        let origin = CrateOrigin::Zip {
            zip_path: PathBuf::from("/tmp/crate.zip"),
            prefix: "release".to_string(),
        };
        let source = origin.subcrate_source("sub/ro-crate-metadata.json").unwrap();
        assert_eq!(
            source,
            CrateSource::ZipSubcrate {
                zip_path: PathBuf::from("/tmp/crate.zip"),
                entry: "release/sub/ro-crate-metadata.json".to_string(),
            }
        );
    }

    #[test]
    fn test_subcrate_source_from_memory_fails() {
        let result = CrateOrigin::Memory.subcrate_source("sub/ro-crate-metadata.json");
        assert!(matches!(result, Err(ProvenanceError::InvalidStructure(_))));
    }

    #[test]
    fn test_from_path_detects_zip() {
        assert_eq!(
            CrateSource::from_path("/tmp/release.ZIP"),
            CrateSource::ZipFile(PathBuf::from("/tmp/release.ZIP"))
        );
        assert_eq!(
            CrateSource::from_path("/nonexistent/ro-crate-metadata.json"),
            CrateSource::MetadataFile(PathBuf::from("/nonexistent/ro-crate-metadata.json"))
        );
    }

    #[test]
    fn test_parse_document_reports_origin() {
        let err = parse_document("{not json", "broken.json").unwrap_err();
        match err {
            ProvenanceError::Parse { path, .. } => assert_eq!(path, "broken.json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
