mod config;
mod display;
mod embed;
mod pipeline;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use budgetlaw_ai::{ConsensusResolver, Embedder, ExtractionClient, OpenAiEmbedder, OpenAiOracle};
use budgetlaw_core::{BoundedPool, ValidationGate};
use budgetlaw_store::{LanceStore, SnapshotWriter};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command, ExtractArgs, OpenAiArgs, StoreArgs};
use crate::pipeline::Pipeline;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    info!("budgetlaw v{}", env!("CARGO_PKG_VERSION"));
    match cli.command {
        Command::Extract(args) => extract(&cli.openai, &args).await,
        Command::Sync(args) => sync(&cli.openai, &args.output, &args.store).await,
        Command::Run { extract: args, store } => {
            extract(&cli.openai, &args).await?;
            sync(&cli.openai, &args.output, &store).await
        }
        Command::Search(args) => search(&cli.openai, &args.query, args.limit, &args.store).await,
    }
}

async fn extract(openai: &OpenAiArgs, args: &ExtractArgs) -> Result<()> {
    let taxonomy = args.taxonomy()?;
    let oracle = OpenAiOracle::new(openai.client()?, args.model.as_str())
        .with_temperature(args.temperature)
        .with_max_turns(args.max_turns);
    let client = ExtractionClient::new(Arc::new(oracle), taxonomy.clone())
        .with_retry(args.retry_policy());
    let resolver = ConsensusResolver::new(client, ValidationGate::new(taxonomy), args.consensus());

    let stats = Pipeline::new(resolver, args.pipeline()).run().await?;
    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        segments = stats.segments,
        records = stats.records,
        "extract complete"
    );
    Ok(())
}

fn embedder(openai: &OpenAiArgs, store: &StoreArgs) -> Result<OpenAiEmbedder> {
    Ok(OpenAiEmbedder::new(
        openai.client()?,
        store.embed_model.as_str(),
        store.embed_dim,
    ))
}

async fn open_store(store: &StoreArgs) -> Result<LanceStore> {
    let lance = LanceStore::open(&store.db, store.embed_dim)
        .await
        .with_context(|| format!("opening LanceDB at {}", store.db.display()))?;
    Ok(lance.with_table(store.table.as_str()))
}

async fn sync(openai: &OpenAiArgs, output: &Path, store: &StoreArgs) -> Result<()> {
    let embedder = embedder(openai, store)?;
    let lance = open_store(store).await?;
    let stats = embed::sync(
        &SnapshotWriter::new(output),
        &embedder,
        &lance,
        &store.uploader(),
        BoundedPool::new(store.embed_concurrency),
    )
    .await?;
    let total = lance.count().await?;
    info!(uploaded = stats.uploaded, total, "sync complete");
    Ok(())
}

async fn search(openai: &OpenAiArgs, query: &str, limit: usize, store: &StoreArgs) -> Result<()> {
    let embedder = embedder(openai, store)?;
    let vector = embedder.embed(query).await.context("embedding query")?;
    let hits = open_store(store).await?.search(&vector, limit).await?;
    display::print_hits(query, &hits);
    Ok(())
}
