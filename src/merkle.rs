//! Merkle integrity trees over a crate's file contents
//!
//! Every entity `contentUrl` that resolves to a local file becomes a leaf
//! `{contentUrl, sha256}`. Leaves are sorted by `contentUrl` before the tree
//! is built, so the root hash depends only on the set of files and their
//! bytes, never on `@graph` order or on hashing completion order.
//!
//! Interior nodes hash the decoded digests of their children:
//! `sha256(bytes(left) || bytes(right))`. A level of odd length repeats its
//! last hash, and `levels` records the level with that repeat included.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::entity::content_urls;
use crate::error::{ProvenanceError, Result};
use crate::index::GraphIndex;
use crate::to_json_string;
use crate::vocab::EMBARGOED;

pub const HASH_ALGORITHM: &str = "SHA-256";

/// Read size for streaming file digests
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Options for building integrity trees
#[derive(Debug, Clone)]
pub struct MerkleOptions {
    /// Bytes read per chunk while hashing a file
    pub chunk_size: usize,
    /// Hash files on the rayon thread pool
    pub parallel: bool,
}

impl Default for MerkleOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
        }
    }
}

/// Digest of one file referenced from the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleLeaf {
    pub content_url: String,
    pub sha256: String,
}

/// A leaf with its position in the sorted leaf list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedLeaf {
    pub index: usize,
    pub content_url: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleTree {
    pub algorithm: String,
    pub root_hash: String,
    pub leaf_count: usize,
    pub leaves: Vec<IndexedLeaf>,
    pub levels: Vec<Vec<String>>,
}

impl MerkleTree {
    /// Write the tree as a JSON sidecar file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, to_json_string(self, true)?)?;
        Ok(())
    }

    /// Read a tree previously written with [`MerkleTree::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProvenanceError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ProvenanceError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Map a `contentUrl` to an existing local file under `crate_dir`
///
/// Returns `None` for empty values, `"Embargoed"`, remote http(s) URLs and
/// paths that are not regular files.
pub fn resolve_content_url(url: &str, crate_dir: &Path) -> Option<PathBuf> {
    if url.is_empty() || url == EMBARGOED || is_remote(url) {
        return None;
    }

    let relative = url
        .strip_prefix("file:///")
        .or_else(|| url.strip_prefix("file://"))
        .unwrap_or(url);
    let path = crate_dir.join(relative);
    path.is_file().then_some(path)
}

fn is_remote(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Streaming hex SHA-256 of a file, read `chunk_size` bytes at a time
pub fn hash_file(path: &Path, chunk_size: usize) -> Result<String> {
    let read_error = |e| ProvenanceError::FileRead {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let n = file.read(&mut buffer).map_err(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn decode_digest(digest: &str) -> Result<Vec<u8>> {
    match hex::decode(digest) {
        Ok(bytes) if bytes.len() == 32 => Ok(bytes),
        _ => Err(ProvenanceError::InvalidDigest(digest.to_string())),
    }
}

/// Parent hash of two hex digests, left operand first
pub fn hash_pair(left: &str, right: &str) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(decode_digest(left)?);
    hasher.update(decode_digest(right)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Build a tree from leaves, sorting them by `contentUrl` first
pub fn build_merkle_tree(mut leaves: Vec<MerkleLeaf>) -> Result<MerkleTree> {
    leaves.sort_by(|a, b| a.content_url.cmp(&b.content_url));
    for leaf in &leaves {
        decode_digest(&leaf.sha256)?;
    }

    let indexed: Vec<IndexedLeaf> = leaves
        .into_iter()
        .enumerate()
        .map(|(index, leaf)| IndexedLeaf {
            index,
            content_url: leaf.content_url,
            sha256: leaf.sha256,
        })
        .collect();

    let (root_hash, levels) = match indexed.len() {
        0 => (sha256_hex(b""), Vec::new()),
        1 => {
            let hash = indexed[0].sha256.clone();
            (hash.clone(), vec![vec![hash]])
        }
        _ => {
            let mut levels = Vec::new();
            let mut level: Vec<String> = indexed.iter().map(|l| l.sha256.clone()).collect();
            while level.len() > 1 {
                if level.len() % 2 == 1 {
                    let last = level[level.len() - 1].clone();
                    level.push(last);
                }
                let next = level
                    .chunks(2)
                    .map(|pair| hash_pair(&pair[0], &pair[1]))
                    .collect::<Result<Vec<_>>>()?;
                levels.push(level);
                level = next;
            }
            let root = level[0].clone();
            levels.push(level);
            (root, levels)
        }
    };

    Ok(MerkleTree {
        algorithm: HASH_ALGORITHM.to_string(),
        root_hash,
        leaf_count: indexed.len(),
        leaves: indexed,
        levels,
    })
}

fn hash_leaf(content_url: String, path: PathBuf, chunk_size: usize) -> Result<MerkleLeaf> {
    let sha256 = hash_file(&path, chunk_size)?;
    Ok(MerkleLeaf {
        content_url,
        sha256,
    })
}

/// Hash every resolvable `contentUrl` in the graph, sorted by `contentUrl`
pub fn collect_leaves(
    index: &GraphIndex,
    crate_dir: &Path,
    options: &MerkleOptions,
) -> Result<Vec<MerkleLeaf>> {
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for entity in index.graph() {
        for url in content_urls(entity) {
            match resolve_content_url(url, crate_dir) {
                Some(path) => candidates.push((url.to_string(), path)),
                None => debug!(content_url = url, "contentUrl not hashable, skipped"),
            }
        }
    }

    let chunk_size = options.chunk_size;
    let mut leaves: Vec<MerkleLeaf> = if options.parallel {
        candidates
            .into_par_iter()
            .map(|(url, path)| hash_leaf(url, path, chunk_size))
            .collect::<Result<_>>()?
    } else {
        candidates
            .into_iter()
            .map(|(url, path)| hash_leaf(url, path, chunk_size))
            .collect::<Result<_>>()?
    };

    leaves.sort_by(|a, b| a.content_url.cmp(&b.content_url));
    Ok(leaves)
}

/// Build the integrity tree for a crate already loaded from `crate_dir`
///
/// `Ok(None)` means there was nothing to hash.
pub fn merkle_tree_for(
    index: &GraphIndex,
    crate_dir: &Path,
    options: &MerkleOptions,
) -> Result<Option<MerkleTree>> {
    let leaves = collect_leaves(index, crate_dir, options)?;
    if leaves.is_empty() {
        info!(crate_dir = %crate_dir.display(), "no local files to hash");
        return Ok(None);
    }

    let tree = build_merkle_tree(leaves)?;
    info!(
        root_hash = %tree.root_hash,
        leaves = tree.leaf_count,
        "built merkle tree"
    );
    Ok(Some(tree))
}

/// Load the crate in `crate_dir` and build its integrity tree
pub fn generate_merkle_tree(crate_dir: &Path) -> Result<Option<MerkleTree>> {
    generate_merkle_tree_with(crate_dir, &MerkleOptions::default())
}

pub fn generate_merkle_tree_with(
    crate_dir: &Path,
    options: &MerkleOptions,
) -> Result<Option<MerkleTree>> {
    let index = GraphIndex::load(crate_dir)?;
    merkle_tree_for(&index, crate_dir, options)
}

/// Outcome of re-checking a crate against a stored tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleVerification {
    pub matches: bool,
    pub expected_root: String,
    pub actual_root: Option<String>,
    /// contentUrls whose digest differs
    pub changed: Vec<String>,
    /// contentUrls present now but not in the stored tree
    pub added: Vec<String>,
    /// contentUrls in the stored tree that no longer resolve
    pub removed: Vec<String>,
}

/// Regenerate the tree for `crate_dir` and compare it with `expected`
pub fn verify_merkle_tree(crate_dir: &Path, expected: &MerkleTree) -> Result<MerkleVerification> {
    let actual = generate_merkle_tree(crate_dir)?;

    let expected_leaves: BTreeMap<&str, &str> = expected
        .leaves
        .iter()
        .map(|l| (l.content_url.as_str(), l.sha256.as_str()))
        .collect();
    let actual_leaves: BTreeMap<&str, &str> = actual
        .iter()
        .flat_map(|t| t.leaves.iter())
        .map(|l| (l.content_url.as_str(), l.sha256.as_str()))
        .collect();

    let mut changed = Vec::new();
    let mut removed = Vec::new();
    for (url, hash) in &expected_leaves {
        match actual_leaves.get(url) {
            Some(actual_hash) if actual_hash != hash => changed.push(url.to_string()),
            Some(_) => {}
            None => removed.push(url.to_string()),
        }
    }
    let added: Vec<String> = actual_leaves
        .keys()
        .filter(|url| !expected_leaves.contains_key(*url))
        .map(|url| url.to_string())
        .collect();

    let actual_root = actual.as_ref().map(|t| t.root_hash.clone());
    let matches = match &actual_root {
        Some(root) => *root == expected.root_hash,
        None => expected.leaf_count == 0,
    };

    Ok(MerkleVerification {
        matches,
        expected_root: expected.root_hash.clone(),
        actual_root,
        changed,
        added,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn leaf(url: &str, content: &[u8]) -> MerkleLeaf {
        MerkleLeaf {
            content_url: url.to_string(),
            sha256: sha256_hex(content),
        }
    }

    fn concat_hash(left: &str, right: &str) -> String {
        let mut bytes = hex::decode(left).unwrap();
        bytes.extend(hex::decode(right).unwrap());
        sha256_hex(&bytes)
    }

    #[test]
    fn test_empty_tree() {
        let tree = build_merkle_tree(vec![]).unwrap();
        assert_eq!(
            tree.root_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(tree.leaf_count, 0);
        assert!(tree.levels.is_empty());
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let only = leaf("a.txt", b"aaa");
        let tree = build_merkle_tree(vec![only.clone()]).unwrap();
        assert_eq!(tree.root_hash, only.sha256);
        assert_eq!(tree.levels, vec![vec![only.sha256.clone()]]);
        assert_eq!(tree.leaves[0].index, 0);
    }

    #[test]
    fn test_two_leaves() {
        let h1 = leaf("a.txt", b"aaa");
        let h2 = leaf("b.txt", b"bbb");
        let tree = build_merkle_tree(vec![h2.clone(), h1.clone()]).unwrap();

        assert_eq!(tree.root_hash, concat_hash(&h1.sha256, &h2.sha256));
        assert_eq!(tree.leaves[0].content_url, "a.txt");
        assert_eq!(tree.levels.len(), 2);
    }

    #[test]
    fn test_save_writes_pretty_json() {
        let dir = TempDir::new().unwrap();
        let tree = build_merkle_tree(vec![leaf("a.txt", b"aaa"), leaf("b.txt", b"bbb")]).unwrap();
        let path = dir.path().join("merkle.json");

        tree.save(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, crate::to_json_string(&tree, true).unwrap());
        assert!(written.contains("\"rootHash\""));
        assert_eq!(MerkleTree::load(&path).unwrap(), tree);
    }

    #[test]
    fn test_three_leaves_duplicate_last() {
        let h1 = leaf("1.txt", b"one");
        let h2 = leaf("2.txt", b"two");
        let h3 = leaf("3.txt", b"three");
        let tree = build_merkle_tree(vec![h1.clone(), h2.clone(), h3.clone()]).unwrap();

        let left = concat_hash(&h1.sha256, &h2.sha256);
        let right = concat_hash(&h3.sha256, &h3.sha256);
        assert_eq!(tree.root_hash, concat_hash(&left, &right));

        // Odd level is recorded with its repeated last element
        assert_eq!(
            tree.levels[0],
            vec![
                h1.sha256.clone(),
                h2.sha256.clone(),
                h3.sha256.clone(),
                h3.sha256.clone()
            ]
        );
        assert_eq!(tree.levels[1], vec![left, right]);
        assert_eq!(tree.levels[2], vec![tree.root_hash.clone()]);
        assert_eq!(tree.leaf_count, 3);
    }

    #[test]
    fn test_invalid_digest_rejected() {
        let bad = MerkleLeaf {
            content_url: "a.txt".to_string(),
            sha256: "not-hex".to_string(),
        };
        let result = build_merkle_tree(vec![bad, leaf("b.txt", b"b")]);
        assert!(matches!(result, Err(ProvenanceError::InvalidDigest(_))));
    }

    #[test]
    fn test_resolve_content_url() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "aaa").unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();

        assert_eq!(resolve_content_url("https://x/y", dir.path()), None);
        assert_eq!(resolve_content_url("http://x/y", dir.path()), None);
        assert_eq!(resolve_content_url("Embargoed", dir.path()), None);
        assert_eq!(resolve_content_url("", dir.path()), None);
        assert_eq!(resolve_content_url("missing.txt", dir.path()), None);
        // Directories are not files
        assert_eq!(resolve_content_url("data", dir.path()), None);

        let expected = dir.path().join("a.txt");
        assert_eq!(resolve_content_url("a.txt", dir.path()), Some(expected.clone()));
        assert_eq!(
            resolve_content_url("file:///a.txt", dir.path()),
            Some(expected.clone())
        );
        assert_eq!(resolve_content_url("file://a.txt", dir.path()), Some(expected));
    }

    #[test]
    fn test_hash_file_streams_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        assert_eq!(hash_file(&path, 7).unwrap(), sha256_hex(&content));
        assert_eq!(hash_file(&path, DEFAULT_CHUNK_SIZE).unwrap(), sha256_hex(&content));
    }

    #[test]
    fn test_hash_file_missing_names_path() {
        let err = hash_file(Path::new("/nonexistent/file.bin"), 1024).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/file.bin"));
    }
}
