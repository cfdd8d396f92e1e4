//! Storage backends for short links.
//!
//! Three interchangeable implementations of [`Storage`]: an in-memory map,
//! a file-backed append log, and PostgreSQL. [`open`] picks one from a
//! [`StorageConfig`].

pub mod file;
pub mod memory;
pub mod postgres;

use snip_telemetry::Logger;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use snip_core::storage::Result;
pub use snip_core::{
    OwnerId, ReadStorage, SaveOutcome, ShortId, Storage, StorageError, TombstonePolicy, UrlRecord,
};

/// Which backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    File { path: PathBuf },
    Postgres { dsn: String, max_connections: u32 },
}

/// Opens the configured backend.
pub async fn open(
    config: StorageConfig,
    policy: TombstonePolicy,
    logger: &Logger,
) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Memory => {
            info!(parent: logger.span(), "using in-memory storage");
            Arc::new(MemoryStorage::with_policy(policy))
        }
        StorageConfig::File { path } => {
            info!(parent: logger.span(), path = %path.display(), "using file storage");
            Arc::new(FileStorage::open(path, policy, logger.named("file")).await?)
        }
        StorageConfig::Postgres {
            dsn,
            max_connections,
        } => {
            info!(parent: logger.span(), "using postgres storage");
            Arc::new(
                PostgresStorage::connect(&dsn, max_connections, policy, logger.named("postgres"))
                    .await?,
            )
        }
    };

    Ok(storage)
}
