use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docindex_core::builder::IndexBuilder;
use docindex_core::persist::{
    check_fresh, load_index_dir, meta_for, save_index, save_meta, save_source_text, IndexPaths,
};
use docindex_core::source::load_sources;
use docindex_core::{search, SearchOptions};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, query and check documentation search indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build searchindex.js from a directory of .rst/.md/.txt sources
    Build {
        /// Source directory
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Do not copy source texts into _sources/ (disables snippets)
        #[arg(long, default_value_t = false)]
        no_sources: bool,
    },
    /// Run a query against an index directory or a searchindex.js file
    Search {
        #[arg(long)]
        index: PathBuf,
        #[arg(long, short)]
        query: String,
        /// Maximum number of results
        #[arg(short, default_value_t = 10)]
        k: usize,
        /// Also list matching API objects
        #[arg(long, default_value_t = false)]
        objects: bool,
    },
    /// Validate an index and report whether its build metadata is current
    Check {
        #[arg(long)]
        index: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, no_sources } => build_index(&input, &output, !no_sources),
        Commands::Search { index, query, k, objects } => run_search(&index, &query, k, objects),
        Commands::Check { index } => check_index(&index),
    }
}

fn build_index(input: &Path, output: &Path, keep_sources: bool) -> Result<()> {
    if !input.is_dir() {
        bail!("input {} is not a directory", input.display());
    }
    let out_paths = IndexPaths::new(output);
    fs::create_dir_all(&out_paths.root)?;

    let sources = load_sources(input).with_context(|| format!("reading sources from {}", input.display()))?;
    tracing::info!(num_sources = sources.len(), "ingested sources");

    let mut builder = IndexBuilder::new();
    for doc in sources {
        if keep_sources {
            save_source_text(&out_paths, &doc.filename, &doc.text)?;
        }
        builder.feed(doc);
    }
    let index = builder.build();

    let digest = save_index(&out_paths, &index)?;
    save_meta(&out_paths, &meta_for(&index, digest))?;

    tracing::info!(output = %output.display(), num_docs = index.num_docs(), "index build complete");
    Ok(())
}

fn run_search(path: &Path, query: &str, k: usize, objects: bool) -> Result<()> {
    let (index, _meta) = load_index_dir(path).with_context(|| format!("loading {}", path.display()))?;
    let results = search(&index, query, SearchOptions { limit: Some(k.max(1)), objects });

    println!("{} hit(s) for {:?}", results.total_hits, query);
    for hit in &results.hits {
        let target = match &hit.anchor {
            Some(anchor) => format!("{}#{}", hit.path, anchor),
            None => hit.path.clone(),
        };
        println!("{:>4}  {}  ({})", hit.score, hit.plain_title, target);
    }
    if objects && !results.objects.is_empty() {
        println!("objects:");
        for obj in &results.objects {
            println!("{:>4}  {} [{}]  ({}#{})", obj.score, obj.name, obj.kind, obj.path, obj.anchor);
        }
    }
    Ok(())
}

fn check_index(path: &Path) -> Result<()> {
    let (index, meta) = load_index_dir(path).with_context(|| format!("loading {}", path.display()))?;
    let envversion = index.envversion.primary().map_or_else(|| "?".to_string(), |v| v.to_string());
    println!(
        "documents={} terms={} titleterms={} objects={} envversion={}",
        index.num_docs(),
        index.terms.len(),
        index.titleterms.len(),
        index.objects().count(),
        envversion,
    );
    match meta {
        Some(meta) => {
            check_fresh(&IndexPaths::new(path), &meta)?;
            println!("build metadata current (created {})", meta.created_at);
        }
        None => tracing::warn!(path = %path.display(), "no build metadata; freshness not checked"),
    }
    Ok(())
}
