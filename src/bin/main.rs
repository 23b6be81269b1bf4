//! RO-Crate Provenance CLI
//!
//! Command-line tool for tracing evidence graphs, mining provenance patterns
//! and fingerprinting crate contents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rocrate_provenance::entity::extract_id;
use rocrate_provenance::{
    categorize, load_subcrates, merkle_tree_for, summarize, to_json_string, verify_merkle_tree,
    EntityCategory, EvidenceGraph, EvidenceOptions, GraphIndex, MerkleOptions, MerkleTree,
    ProvenanceError,
};

#[derive(Parser)]
#[command(name = "rocrate-provenance")]
#[command(about = "Analyze provenance and integrity of RO-Crates")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace an entity back through generatedBy into an evidence graph
    Evidence(EvidenceArgs),
    /// Summarize computation and experiment patterns across sub-crates
    Patterns(CrateArgs),
    /// List entity ids per category
    Categorize(CrateArgs),
    /// Build a SHA-256 Merkle tree over local contentUrls
    Merkle(MerkleArgs),
    /// Check a crate directory against a stored Merkle tree
    Verify(VerifyArgs),
}

#[derive(Args)]
struct OutputArgs {
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct CrateArgs {
    /// Path to RO-Crate directory, ro-crate-metadata.json file, or zip archive
    source: PathBuf,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct EvidenceArgs {
    /// Path to RO-Crate directory, ro-crate-metadata.json file, or zip archive
    source: PathBuf,

    /// @id of the entity to trace
    entity_id: String,

    /// Owner recorded on the evidence graph (default: root author)
    #[arg(long)]
    owner: Option<String>,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct MerkleArgs {
    /// Path to RO-Crate directory or ro-crate-metadata.json file
    source: PathBuf,

    /// Bytes read per chunk while hashing
    #[arg(long, default_value_t = rocrate_provenance::merkle::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Hash files on a single thread
    #[arg(long)]
    sequential: bool,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct VerifyArgs {
    /// Path to RO-Crate directory or ro-crate-metadata.json file
    source: PathBuf,

    /// Merkle tree JSON written by the `merkle` command
    tree: PathBuf,

    #[command(flatten)]
    out: OutputArgs,
}

/// Directory that contentUrls resolve against
fn crate_directory(source: &Path) -> Result<PathBuf, ProvenanceError> {
    if source.is_dir() {
        return Ok(source.to_path_buf());
    }
    let is_zip = source
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    match source.parent() {
        Some(parent) if source.is_file() && !is_zip => Ok(parent.to_path_buf()),
        _ => Err(ProvenanceError::InvalidPath(source.to_path_buf())),
    }
}

/// Write output to file or stdout
fn write_output(content: &str, output: Option<&PathBuf>) -> Result<(), ProvenanceError> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn run_evidence(args: EvidenceArgs) -> Result<(), ProvenanceError> {
    let index = GraphIndex::load(&args.source)?;
    let options = EvidenceOptions { owner: args.owner };
    let evidence = EvidenceGraph::build(&index, &args.entity_id, &options)?;

    eprintln!(
        "Traced {} ({} entities expanded)",
        args.entity_id,
        evidence.graph.expanded_count()
    );

    let output = to_json_string(&evidence, args.out.pretty)?;
    write_output(&output, args.out.output.as_ref())
}

fn run_patterns(args: CrateArgs) -> Result<(), ProvenanceError> {
    let index = GraphIndex::load(&args.source)?;
    let subcrates = load_subcrates(&index)?;
    let summary = summarize(&index, &subcrates);

    eprintln!(
        "Analyzed {} with {} sub-crates: {} computation patterns, {} experiment patterns",
        summary.crate_name,
        summary.subcrate_count,
        summary.computation_patterns.len(),
        summary.experiment_patterns.len()
    );

    let output = to_json_string(&summary, args.out.pretty)?;
    write_output(&output, args.out.output.as_ref())
}

fn run_categorize(args: CrateArgs) -> Result<(), ProvenanceError> {
    let index = GraphIndex::load(&args.source)?;
    let categorized = categorize(&index);

    let listing: BTreeMap<EntityCategory, Vec<&str>> = categorized
        .iter()
        .map(|(category, entities)| {
            let ids = entities.iter().filter_map(|e| extract_id(e)).collect();
            (category, ids)
        })
        .collect();

    eprintln!("Categorized {} entities", categorized.total());

    let output = to_json_string(&listing, args.out.pretty)?;
    write_output(&output, args.out.output.as_ref())
}

fn run_merkle(args: MerkleArgs) -> Result<(), ProvenanceError> {
    let crate_dir = crate_directory(&args.source)?;
    let index = GraphIndex::load(&args.source)?;
    let options = MerkleOptions {
        chunk_size: args.chunk_size.max(1),
        parallel: !args.sequential,
    };

    let Some(tree) = merkle_tree_for(&index, &crate_dir, &options)? else {
        warn!(crate_dir = %crate_dir.display(), "no local files referenced, nothing written");
        return Ok(());
    };

    eprintln!("Hashed {} files, root {}", tree.leaf_count, tree.root_hash);

    let output = to_json_string(&tree, args.out.pretty)?;
    write_output(&output, args.out.output.as_ref())
}

/// Returns whether the crate still matches the stored tree
fn run_verify(args: VerifyArgs) -> Result<bool, ProvenanceError> {
    let crate_dir = crate_directory(&args.source)?;
    let expected = MerkleTree::load(&args.tree)?;
    let verification = verify_merkle_tree(&crate_dir, &expected)?;

    if verification.matches {
        eprintln!("Crate matches root {}", verification.expected_root);
    } else {
        eprintln!(
            "Crate differs from root {}: {} changed, {} added, {} removed",
            verification.expected_root,
            verification.changed.len(),
            verification.added.len(),
            verification.removed.len()
        );
    }

    let output = to_json_string(&verification, args.out.pretty)?;
    write_output(&output, args.out.output.as_ref())?;
    Ok(verification.matches)
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("rocrate-provenance {}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Evidence(args) => run_evidence(args),
        Commands::Patterns(args) => run_patterns(args),
        Commands::Categorize(args) => run_categorize(args),
        Commands::Merkle(args) => run_merkle(args),
        Commands::Verify(args) => match run_verify(args) {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(2),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
