use clap::{Parser, Subcommand, ValueEnum};
use snip_storage::{StorageConfig, TombstonePolicy};
use snip_telemetry::LogFormat;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "SNIP_DATABASE_MAX_CONNECTIONS";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const DELETED_LINKS_ENV: &str = "SNIP_DELETED_LINKS";
pub const DELETE_QUEUE_CAPACITY_ENV: &str = "SNIP_DELETE_QUEUE_CAPACITY";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";
pub const ID_BYTES_ENV: &str = "SNIP_ID_BYTES";
pub const MAX_ATTEMPTS_ENV: &str = "SNIP_MAX_ATTEMPTS";

pub const DEFAULT_FILE_STORAGE_PATH: &str = "storage.json";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "memory")]
    Memory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Memory => write!(f, "memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

/// What a deleted link resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeletedLinksArg {
    #[value(name = "hidden")]
    Hidden,
    #[value(name = "resolvable")]
    Resolvable,
}

impl From<DeletedLinksArg> for TombstonePolicy {
    fn from(value: DeletedLinksArg) -> Self {
        match value {
            DeletedLinksArg::Hidden => TombstonePolicy::Hide,
            DeletedLinksArg::Resolvable => TombstonePolicy::Resolve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "pretty")]
    Pretty,
    #[value(name = "json")]
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snip", version, about = "Shorten, resolve and delete links")]
pub struct Cli {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::File
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, default_value = DEFAULT_FILE_STORAGE_PATH)]
    pub file_storage_path: PathBuf,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(
        long,
        env = DATABASE_MAX_CONNECTIONS_ENV,
        default_value_t = DEFAULT_DATABASE_MAX_CONNECTIONS
    )]
    pub database_max_connections: u32,

    /// Prefix of printed short URLs.
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        env = DELETED_LINKS_ENV,
        value_enum,
        default_value_t = DeletedLinksArg::Hidden
    )]
    pub deleted_links: DeletedLinksArg,

    #[arg(
        long,
        env = DELETE_QUEUE_CAPACITY_ENV,
        default_value_t = snip_shortener::delete::DEFAULT_QUEUE_CAPACITY
    )]
    pub delete_queue_capacity: usize,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Random bytes per generated id.
    #[arg(
        long,
        env = ID_BYTES_ENV,
        default_value_t = snip_generator::random::DEFAULT_ID_BYTES
    )]
    pub id_bytes: usize,

    #[arg(
        long,
        env = MAX_ATTEMPTS_ENV,
        default_value_t = snip_shortener::service::DEFAULT_MAX_ATTEMPTS
    )]
    pub max_attempts: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the short URL for a long URL, creating it if needed.
    Shorten {
        #[arg(long)]
        owner: String,
        url: String,
    },
    /// Shorten a JSON array of `{"correlation_id", "original_url"}` objects.
    ShortenBatch {
        #[arg(long)]
        owner: String,
        /// Input file; `-` reads stdin.
        #[arg(default_value = "-")]
        input: PathBuf,
    },
    /// Print the original URL behind a short id.
    Resolve { id: String },
    /// List the links owned by a user.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Soft-delete links owned by a user.
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Check that the storage backend is reachable.
    Ping,
}

impl Cli {
    pub fn storage_config(&self) -> Option<StorageConfig> {
        let config = match self.storage {
            StorageBackendArg::Memory => StorageConfig::Memory,
            StorageBackendArg::File => StorageConfig::File {
                path: self.file_storage_path.clone(),
            },
            StorageBackendArg::Postgres => StorageConfig::Postgres {
                dsn: self.database_dsn.clone()?,
                max_connections: self.database_max_connections,
            },
        };
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_file_storage() {
        let cli = Cli::try_parse_from(["snip", "ping"]).unwrap();

        assert_eq!(cli.storage, StorageBackendArg::File);
        assert_eq!(
            cli.storage_config(),
            Some(StorageConfig::File {
                path: PathBuf::from(DEFAULT_FILE_STORAGE_PATH)
            })
        );
        assert_eq!(cli.base_url, DEFAULT_BASE_URL);
        assert_eq!(cli.delete_queue_capacity, 100);
        assert_eq!(cli.max_attempts, 10);
        assert_eq!(
            TombstonePolicy::from(cli.deleted_links),
            TombstonePolicy::Hide
        );
    }

    #[test]
    fn postgres_requires_a_dsn() {
        let err = Cli::try_parse_from(["snip", "--storage", "postgres", "ping"]);
        assert!(err.is_err());

        let cli = Cli::try_parse_from([
            "snip",
            "--storage",
            "postgres",
            "--database-dsn",
            "postgres://snip@localhost/snip",
            "ping",
        ])
        .unwrap();
        assert_eq!(
            cli.storage_config(),
            Some(StorageConfig::Postgres {
                dsn: "postgres://snip@localhost/snip".to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            })
        );
    }

    #[test]
    fn delete_needs_at_least_one_id() {
        assert!(Cli::try_parse_from(["snip", "delete", "--owner", "u1"]).is_err());

        let cli =
            Cli::try_parse_from(["snip", "delete", "--owner", "u1", "abc123", "def456"]).unwrap();
        match cli.command {
            Command::Delete { owner, ids } => {
                assert_eq!(owner, "u1");
                assert_eq!(ids, ["abc123", "def456"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
