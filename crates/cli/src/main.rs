use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use embedsync_kb::{load_chunk_source, LoadOptions, DEFAULT_MAX_CHUNK_BYTES};
use embedsync_pipeline::{
    clamp_embed_concurrency, read_run_snapshot, EmbedPipeline, GeneratorOptions, MergeOptions,
    PipelineOptions, RunMode, RunSnapshot,
};
use embedsync_store::{
    Embedder, EmbeddingStore, OpenAiEmbedder, StubEmbedder, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_OPENAI_MODEL,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "embedsync")]
#[command(about = "Incremental embedding sync for documentation knowledge bases", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: only warnings and errors on stderr
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile knowledge-base files against an embedding store
    Sync(SyncArgs),

    /// Show the store contents and the last run
    Status(StatusArgs),
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Deterministic offline vectors, no network
    Stub,
    /// OpenAI-compatible embeddings endpoint (needs OPENAI_API_KEY)
    Openai,
}

#[derive(Args)]
struct SyncArgs {
    /// Knowledge-base JSON files, merged in argument order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Embedding store file
    #[arg(long, default_value = "embeddings/store.json")]
    store: PathBuf,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Stub)]
    embedder: EmbedderKind,

    /// Model id sent to the embeddings endpoint
    #[arg(long, default_value = DEFAULT_OPENAI_MODEL)]
    model: String,

    /// Base URL of the embeddings endpoint
    #[arg(long, default_value = DEFAULT_OPENAI_BASE_URL)]
    base_url: String,

    /// Vector width the backend produces
    #[arg(long, default_value_t = 1536)]
    dimension: usize,

    /// Maximum concurrent embedder calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-call embedder timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Byte budget per composed chunk for docs-map inputs
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_BYTES)]
    max_chunk_bytes: usize,

    /// Re-embed everything and rebuild the store wholesale
    #[arg(long)]
    full: bool,

    /// Keep store records whose chunks left the knowledge base
    #[arg(long)]
    keep_missing: bool,

    /// Allow an empty knowledge base to delete every stored record
    #[arg(long)]
    allow_empty_source: bool,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Embedding store file
    #[arg(long, default_value = "embeddings/store.json")]
    store: PathBuf,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // --json reserves stdout for machine output, so force quiet logging.
    let json_output = match &cli.command {
        Commands::Sync(args) => args.json,
        Commands::Status(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Sync(args) => run_sync(args).await,
        Commands::Status(args) => run_status(args).await,
    }
}

async fn run_sync(args: SyncArgs) -> Result<()> {
    let load_options = LoadOptions {
        max_chunk_bytes: args.max_chunk_bytes,
    };
    let source = load_chunk_source(&args.inputs, load_options)
        .await
        .context("Failed to load knowledge base")?;

    let embedder = build_embedder(&args)?;

    let mut generator = GeneratorOptions::default();
    if let Some(concurrency) = args.concurrency {
        generator.max_concurrent = clamp_embed_concurrency(concurrency);
    }
    generator.embed_timeout = Duration::from_secs(args.timeout_secs);

    let options = PipelineOptions {
        mode: if args.full { RunMode::Full } else { RunMode::Incremental },
        merge: MergeOptions {
            prune_removed: !args.keep_missing,
        },
        generator,
        allow_empty_source: args.allow_empty_source,
    };

    let report = EmbedPipeline::new(&args.store, options)
        .run(&source, embedder)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "Synced {} chunks into {}: {} inserted, {} updated, {} retained, {} deleted, {} failed in {}ms",
            source.len(),
            args.store.display(),
            report.inserted,
            report.updated,
            report.retained,
            report.deleted,
            report.failed(),
            report.time_ms
        );
        for failure in &report.failures {
            eprintln!("  failed {}: {}", failure.id, failure.reason);
        }
    }

    if report.is_partial() {
        // The commit happened; the exit code flags the skipped chunks.
        std::process::exit(2);
    }
    Ok(())
}

fn build_embedder(args: &SyncArgs) -> Result<Arc<dyn Embedder>> {
    match args.embedder {
        EmbedderKind::Stub => Ok(Arc::new(StubEmbedder::new(args.dimension))),
        EmbedderKind::Openai => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY is required for --embedder openai")?;
            let embedder = OpenAiEmbedder::new(
                &api_key,
                &args.base_url,
                &args.model,
                args.dimension,
                Duration::from_secs(args.timeout_secs),
            )?;
            Ok(Arc::new(embedder))
        }
    }
}

#[derive(Serialize)]
struct StatusOutput {
    store: String,
    exists: bool,
    records: usize,
    dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<RunSnapshot>,
}

async fn run_status(args: StatusArgs) -> Result<()> {
    let exists = args.store.exists();
    let (records, dimension) = if exists {
        let store = EmbeddingStore::load(&args.store)
            .await
            .with_context(|| format!("Failed to load store {}", args.store.display()))?;
        (store.len(), store.dimension())
    } else {
        (0, None)
    };
    let size_bytes = tokio::fs::metadata(&args.store)
        .await
        .ok()
        .map(|meta| meta.len());
    let last_run = read_run_snapshot(&args.store).await.ok().flatten();

    let status = StatusOutput {
        store: args.store.display().to_string(),
        exists,
        records,
        dimension,
        size_bytes,
        last_run,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if !status.exists {
        eprintln!("No store at {}", status.store);
        return Ok(());
    }

    let dimension = status
        .dimension
        .map_or_else(|| "unset".to_string(), |d| d.to_string());
    eprintln!(
        "Store {}: {} record(s), dimension {dimension}",
        status.store, status.records
    );
    if let Some(run) = &status.last_run {
        eprintln!(
            "Last run: {} inserted, {} updated, {} retained, {} deleted, {} failed in {}ms",
            run.inserted, run.updated, run.retained, run.deleted, run.failed, run.duration_ms
        );
        for reason in &run.failure_reasons {
            eprintln!("  failed {reason}");
        }
    }
    Ok(())
}
