use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use tutor_core::persist::{load_index, load_meta, save_index, IndexPaths};
use tutor_core::{rank, CorpusSource, FitOptions, Index, JsonCorpusSource, TfMode};

#[derive(Parser)]
#[command(name = "tutor-indexer")]
#[command(about = "Build and inspect the course retrieval index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the index from JSON/JSONL corpus files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Use tf = 1 + ln(count) instead of the raw count
        #[arg(long, default_value_t = false)]
        sublinear_tf: bool,
    },
    /// Print the metadata of a built index
    Inspect {
        #[arg(long)]
        index: String,
    },
    /// Rank the corpus against a query, for checking an index by hand
    Query {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, sublinear_tf } => build_index(&input, &output, sublinear_tf),
        Commands::Inspect { index } => inspect(&index),
        Commands::Query { index, q, k } => query(&index, &q, k),
    }
}

fn build_index(input: &str, output: &str, sublinear_tf: bool) -> Result<()> {
    let records = JsonCorpusSource::new(input)
        .fetch_all()
        .with_context(|| format!("reading corpus from {input}"))?;
    tracing::info!(input, records = records.len(), "corpus loaded");

    let tf_mode = if sublinear_tf { TfMode::Sublinear } else { TfMode::Raw };
    let index = Index::fit(records, FitOptions { tf_mode })?;
    save_index(&IndexPaths::new(output), &index)?;

    tracing::info!(output, "index build complete");
    Ok(())
}

fn inspect(index: &str) -> Result<()> {
    let meta = load_meta(&IndexPaths::new(index))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn query(index: &str, q: &str, k: usize) -> Result<()> {
    let index = load_index(&IndexPaths::new(index))?;
    for (i, m) in rank(&index, q, k)?.iter().enumerate() {
        let record = &index.records()[m.position];
        println!("{:>2}. {:.4}  [{}] {}", i + 1, m.score, m.id, record.description);
    }
    Ok(())
}
