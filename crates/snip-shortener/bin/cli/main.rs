mod cli;

use crate::cli::{Cli, Command};
use anyhow::Context;
use clap::Parser;
use snip_core::{OwnerId, ShortId, Storage};
use snip_generator::RandomGenerator;
use snip_shortener::{
    BatchItem, DeleteRequest, DeleteWorker, DeleteWorkerSettings, Shortener, ShortenerError,
    ShortenerService, ShortenerSettings,
};
use snip_telemetry::Logger;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, serde::Serialize)]
struct BatchLine {
    correlation_id: String,
    short_url: String,
    created: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse();
    snip_telemetry::init(config.log_format.into())?;

    let logger = Logger::root("snip");
    info!(
        parent: logger.span(),
        storage_backend = %config.storage,
        base_url = %config.base_url,
        "starting snip"
    );

    let storage_config = config
        .storage_config()
        .context("database dsn is required when storage backend is postgres")?;
    let storage = snip_storage::open(
        storage_config,
        config.deleted_links.into(),
        &logger.named("storage"),
    )
    .await?;

    let service = ShortenerService::new(
        storage.clone(),
        RandomGenerator::new(config.id_bytes),
        ShortenerSettings::builder()
            .max_attempts(config.max_attempts)
            .build(),
        logger.named("shortener"),
    );

    match config.command {
        Command::Shorten { owner, url } => {
            let shortened = service.shorten(&owner_id(owner)?, &url).await?;
            println!("{}", shortened.id.to_url(&config.base_url));
        }
        Command::ShortenBatch { owner, input } => {
            let items: Vec<BatchItem> = serde_json::from_str(&read_input(&input)?)
                .context("batch input must be a JSON array of {correlation_id, original_url}")?;
            let results = service.shorten_batch(&owner_id(owner)?, items).await?;
            let lines: Vec<_> = results
                .into_iter()
                .map(|result| BatchLine {
                    correlation_id: result.correlation_id,
                    short_url: result.id.to_url(&config.base_url),
                    created: result.created,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
        Command::Resolve { id } => {
            let id = ShortId::new(id).map_err(ShortenerError::from)?;
            match service.resolve(&id).await? {
                Some(url) => println!("{url}"),
                None => anyhow::bail!("no link found for '{id}'"),
            }
        }
        Command::List { owner } => {
            for (id, url) in service.user_urls(&owner_id(owner)?).await? {
                println!("{}\t{url}", id.to_url(&config.base_url));
            }
        }
        Command::Delete { owner, ids } => {
            let owner = owner_id(owner)?;
            let ids = ids
                .into_iter()
                .map(ShortId::new)
                .collect::<Result<Vec<_>, _>>()
                .map_err(ShortenerError::from)?;
            let settings = DeleteWorkerSettings::builder()
                .capacity(config.delete_queue_capacity)
                .build();
            delete(storage, settings, logger.named("delete"), DeleteRequest { owner, ids }).await?;
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}

fn owner_id(raw: String) -> Result<OwnerId, ShortenerError> {
    Ok(OwnerId::new(raw)?)
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Runs the delete worker for a single request and waits until it is applied.
async fn delete(
    storage: Arc<dyn Storage>,
    settings: DeleteWorkerSettings,
    logger: Logger,
    request: DeleteRequest,
) -> anyhow::Result<()> {
    let (queue, handle) = DeleteWorker::start(storage, settings, logger);

    queue.submit(request)?;
    drop(queue);
    handle.drain().await;

    Ok(())
}
