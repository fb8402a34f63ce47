//! Vellum CLI — ingest PDFs, search the graph, manage the overlay.
//!
//! Usage:
//!   vellum ingest <pdf>... [--db path] [--category c] [--division d]
//!   vellum search <query> [--strategy hybrid] [--top-k 5] [--no-rerank]
//!   vellum schema | export | import <file> | rebuild-communities

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vellum::store::GraphExport;
use vellum::{Config, Engine, IngestOptions, SearchRequest, Strategy};

#[derive(Parser)]
#[command(name = "vellum", version, about = "Graph-backed PDF retrieval engine")]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more PDF files
    Ingest {
        /// PDF files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Category tag stored on the documents
        #[arg(long)]
        category: Option<String>,
        /// Division tag stored on the documents
        #[arg(long)]
        division: Option<String>,
    },
    /// Search the corpus
    Search {
        query: String,
        /// keyword | vector | entity | hybrid | community
        #[arg(long, default_value = "hybrid")]
        strategy: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,
        /// Filter by document division
        #[arg(long)]
        division: Option<String>,
        /// Filter by document category
        #[arg(long)]
        category: Option<String>,
        /// Include division > category > product paths in citations
        #[arg(long)]
        hierarchical: bool,
    },
    /// Print node, relationship, and index counts
    Schema,
    /// Export the graph as JSON to stdout
    Export,
    /// Import a JSON export into the database
    Import {
        /// Export file to read
        file: PathBuf,
    },
    /// Recompute co-occurrence edges, communities, and entity metrics
    RebuildCommunities {
        /// Run even while ingestion is recent
        #[arg(long)]
        force: bool,
    },
}

fn default_db_path() -> PathBuf {
    PathBuf::from("vellum.db")
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading config {}", p.display()))?;
            Ok(serde_json::from_str(&raw).context("parsing config")?)
        }
        None => Ok(Config::default()),
    }
}

fn open_engine(db: Option<PathBuf>, config: Config) -> Result<Engine> {
    let path = db.unwrap_or_else(default_db_path);
    let error_log = vellum::ingest::ErrorLog::at_path(path.with_extension("errors.jsonl"));
    let engine = Engine::open(&path, config)
        .with_context(|| format!("opening database {}", path.display()))?
        .with_error_log(std::sync::Arc::new(error_log));
    Ok(engine)
}

async fn cmd_ingest(
    engine: &Engine,
    files: Vec<PathBuf>,
    category: Option<String>,
    division: Option<String>,
) -> Result<()> {
    let mut inputs = Vec::with_capacity(files.len());
    for file in &files {
        let bytes =
            std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("bad filename {}", file.display()))?
            .to_string();
        inputs.push((
            bytes,
            filename,
            IngestOptions {
                category: category.clone(),
                division: division.clone(),
            },
        ));
    }

    let reports = engine.ingest_batch(inputs).await;
    let mut failures = 0usize;
    for report in &reports {
        match report.errors.first() {
            None => println!(
                "{}  {:?}  {} chunks, {} entities",
                report.document_id, report.status, report.chunk_count, report.entity_count
            ),
            Some(error) => {
                failures += 1;
                println!(
                    "{}  {:?}  [{}] {}",
                    report.document_id, report.status, error.phase, error.message
                );
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} documents failed", reports.len());
    }
    Ok(())
}

fn cmd_search(
    engine: &Engine,
    query: String,
    strategy: String,
    top_k: usize,
    no_rerank: bool,
    division: Option<String>,
    category: Option<String>,
    hierarchical: bool,
) -> Result<()> {
    let Some(strategy) = Strategy::parse(&strategy) else {
        bail!("unknown strategy '{strategy}' (keyword|vector|entity|hybrid|community)");
    };

    let mut filter = vellum::SearchFilter::default();
    filter.division = division;
    filter.category = category;

    let mut request = SearchRequest::new(query)
        .with_strategy(strategy)
        .with_top_k(top_k)
        .with_rerank(!no_rerank)
        .with_filter(filter);
    if hierarchical {
        request = request.hierarchical();
    }

    let response = engine.search(&request)?;
    println!(
        "strategy={} candidates={} elapsed={}ms",
        response.strategy_actually_used,
        response.total_candidates_considered,
        response.elapsed_ms
    );
    for (rank, citation) in response.citations.iter().enumerate() {
        println!(
            "\n#{} [{:.3}] {} p{} ({})",
            rank + 1,
            citation.final_score,
            citation.document_name,
            citation.page_num,
            citation.source_tags.join(",")
        );
        if let Some(hierarchy) = &citation.hierarchy {
            println!("    {hierarchy}");
        }
        let preview: String = citation.text.chars().take(300).collect();
        println!("    {preview}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vellum=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let engine = open_engine(cli.db, config)?;

    match cli.command {
        Commands::Ingest { files, category, division } => {
            engine.start();
            cmd_ingest(&engine, files, category, division).await?;
        }
        Commands::Search {
            query,
            strategy,
            top_k,
            no_rerank,
            division,
            category,
            hierarchical,
        } => {
            cmd_search(
                &engine, query, strategy, top_k, no_rerank, division, category, hierarchical,
            )?;
        }
        Commands::Schema => {
            let schema = engine.schema()?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Export => {
            let export = engine.export()?;
            println!("{}", export.to_json()?);
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let export = GraphExport::from_json(&raw)?;
            engine.import(&export)?;
            println!("imported {} nodes, {} relationships", export.nodes.len(), export.relationships.len());
        }
        Commands::RebuildCommunities { force } => {
            let report = engine.rebuild_communities(force)?;
            println!(
                "communities={} entities={} related_edges={} bridges={}",
                report.communities,
                report.entities_clustered,
                report.related_edges,
                report.bridge_nodes
            );
        }
    }

    engine.shutdown();
    Ok(())
}
