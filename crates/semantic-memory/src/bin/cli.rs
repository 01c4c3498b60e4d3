//! Pipeline state inspector
//!
//! Run with: cargo run -p semantic-memory --features cli -- --database ./data/pipelines.db list

use clap::{Parser, Subcommand};
use semantic_memory::{
    InMemoryContentStore, MemoryConfig, Orchestrator, PipelineStatus, SqlitePipelineStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "semantic-memory", version, about = "Inspect persisted document pipelines")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite pipeline database (overrides the configuration)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Index name (default index when omitted)
    #[arg(short, long, global = true)]
    index: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the status summary of a document as JSON
    Status { document_id: String },
    /// Print whether a document finished processing
    Ready { document_id: String },
    /// List the pipelines of an index
    List,
    /// Count pipelines per status across all indexes
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "semantic_memory=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MemoryConfig::from_file(path)?,
        None => MemoryConfig::default(),
    };
    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| config.storage.database_path.clone());

    if !database.exists() {
        anyhow::bail!("Pipeline database not found: {}", database.display());
    }

    tracing::debug!("Opening pipeline database {}", database.display());
    let store = SqlitePipelineStore::new(&database)?;
    let orchestrator = Orchestrator::new(
        &config,
        Arc::new(store.clone()),
        Arc::new(InMemoryContentStore::new()),
    )?;
    let index = cli.index.as_deref();

    match cli.command {
        Command::Status { document_id } => {
            match orchestrator.get_document_status(&document_id, index).await? {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => {
                    println!("Document '{}' not found", document_id);
                    std::process::exit(1);
                }
            }
        }
        Command::Ready { document_id } => {
            let ready = orchestrator.is_document_ready(&document_id, index).await?;
            println!("{}", ready);
            if !ready {
                std::process::exit(1);
            }
        }
        Command::List => {
            let pipelines = orchestrator.list_pipelines(index).await?;
            if pipelines.is_empty() {
                println!("No pipelines in index '{}'", orchestrator.clean_index(index)?);
            }
            for pipeline in pipelines {
                let status = pipeline.status();
                let detail = match (status, pipeline.failure()) {
                    (PipelineStatus::Failed, Some(failure)) => format!(" ({})", failure),
                    (PipelineStatus::InProgress, _) => {
                        format!(" (remaining: {})", pipeline.remaining_steps().join(", "))
                    }
                    _ => String::new(),
                };
                println!(
                    "{:<40} {:<12} v{:<4} {}{}",
                    pipeline.document_id,
                    format!("{:?}", status),
                    pipeline.version,
                    pipeline.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    detail
                );
            }
        }
        Command::Stats => {
            let stats = store.get_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
