//! Error types for RO-Crate provenance analysis

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("Crate metadata not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse crate metadata {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid crate structure: {0}")]
    InvalidStructure(String),

    #[error("Missing root entity in crate")]
    MissingRootEntity,

    #[error("Entity '{0}' not found in @graph")]
    EntityNotFound(String),

    #[error("Failed to load crate from {path}: {reason}")]
    LoadError { path: String, reason: String },

    #[error("Failed to read file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid SHA-256 digest '{0}'")]
    InvalidDigest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}

pub type Result<T> = std::result::Result<T, ProvenanceError>;
