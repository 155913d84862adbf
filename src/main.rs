//! Binary entry point: configure the run, build the gateways, drive the
//! pipeline, and log the final summary.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use artindex::config::Cli;
use artindex::pipeline::Pipeline;
use artindex::search::{IndexSchema, SearchIndexClient};
use artindex::source::PostgresSource;
use artindex::vision::VisionClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("artindex=info")),
        )
        .init();

    let cli = Cli::parse();
    cli.validate().context("invalid configuration")?;

    let source = PostgresSource::new(cli.database_url.clone());
    let vectorizer = VisionClient::new(
        cli.vision_key.clone(),
        cli.vision_endpoint.clone(),
        Duration::from_secs(cli.vision_timeout_secs.max(1)),
        cli.max_attempts,
        Duration::from_secs(cli.retry_base_secs),
    )
    .context("failed to build vectorize client")?;
    let store = SearchIndexClient::new(
        cli.search_key.clone(),
        cli.search_endpoint.clone(),
        cli.index_name.clone(),
        Duration::from_secs(cli.search_timeout_secs.max(1)),
    )
    .context("failed to build index store client")?;

    let schema = IndexSchema::for_art_documents(&cli.index_name, cli.vector_dimensions);
    let pipeline = Pipeline::new(&source, &vectorizer, &store, cli.chunk_size)?;

    info!(
        index = %cli.index_name,
        chunk_size = cli.chunk_size,
        recreate = cli.recreate_index,
        "starting index run"
    );
    let summary = pipeline.run(&schema, cli.recreate_index).await?;

    info!(
        records = summary.records_total,
        enriched = summary.records_enriched,
        skipped_no_image = summary.skipped_no_image,
        skipped_vectorize = summary.skipped_vectorize,
        chunks = summary.chunks_total,
        committed = summary.chunks_committed,
        lost = summary.chunks_lost,
        indexed = summary.documents_indexed,
        "run complete"
    );
    if !summary.is_lossless() {
        warn!("run completed with losses; see the skip log above for record ids");
    }
    Ok(())
}
