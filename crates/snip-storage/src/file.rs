use crate::memory::MemoryStorage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::storage::Result;
use snip_core::{
    OwnerId, ReadStorage, SaveOutcome, ShortId, Storage, StorageError, TombstonePolicy, UrlRecord,
};
use snip_telemetry::Logger;
use std::collections::BTreeMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// One line of the append log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogEntry {
    short_url: String,
    original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_deleted: bool,
}

impl LogEntry {
    fn created(owner: &OwnerId, id: &ShortId, original_url: &str) -> Self {
        Self {
            short_url: id.to_string(),
            original_url: original_url.to_owned(),
            user_id: Some(owner.to_string()),
            is_deleted: false,
        }
    }

    fn tombstone(record: &UrlRecord) -> Self {
        Self {
            short_url: record.short_id.to_string(),
            original_url: record.original_url.clone(),
            user_id: Some(record.owner_id.to_string()),
            is_deleted: true,
        }
    }

    fn into_record(self) -> std::result::Result<UrlRecord, String> {
        let short_id = ShortId::new(self.short_url).map_err(|e| e.to_string())?;
        Ok(UrlRecord {
            short_id,
            original_url: self.original_url,
            owner_id: OwnerId::new_unchecked(self.user_id.unwrap_or_default()),
            deleted: self.is_deleted,
        })
    }
}

/// File-backed storage.
///
/// Reads are served by an inner [`MemoryStorage`]. Every successful write is
/// also appended to a newline-delimited JSON log, which is replayed in full
/// when the storage is opened. The log is never compacted or rewritten.
///
/// If the append fails after the in-memory write succeeded, the error is
/// returned but memory keeps the new state until the next restart.
#[derive(Debug)]
pub struct FileStorage {
    memory: MemoryStorage,
    /// Held across "mutate memory, then append" so the log order matches
    /// the order of in-memory mutations.
    log: Mutex<File>,
    path: PathBuf,
    logger: Logger,
}

impl FileStorage {
    /// Replays the log at `path` (a missing file is an empty store) and opens
    /// it for appending.
    ///
    /// A line that cannot be decoded fails with [`StorageError::Corrupted`].
    /// A final line without a trailing newline is accepted and terminated
    /// before anything else is appended.
    pub async fn open(
        path: impl AsRef<Path>,
        policy: TombstonePolicy,
        logger: Logger,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let memory = MemoryStorage::with_policy(policy);

        let replayed = replay(&path, &memory).await?;
        info!(
            parent: logger.span(),
            path = %path.display(),
            lines = replayed,
            records = memory.len(),
            "replayed storage log"
        );

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&path).await?;

        if ends_mid_line(&path).await? {
            warn!(
                parent: logger.span(),
                path = %path.display(),
                "storage log does not end with a newline, terminating last line"
            );
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        Ok(Self {
            memory,
            log: Mutex::new(file),
            path,
            logger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view rebuilt from the log.
    pub fn memory(&self) -> &MemoryStorage {
        &self.memory
    }

    async fn append(&self, file: &mut File, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            buf.push(b'\n');
        }

        let written = async {
            file.write_all(&buf).await?;
            file.flush().await
        }
        .await;

        if let Err(err) = written {
            error!(
                parent: self.logger.span(),
                path = %self.path.display(),
                error = %err,
                "failed to append to storage log"
            );
            return Err(err.into());
        }

        debug!(parent: self.logger.span(), lines = entries.len(), "appended to storage log");
        Ok(())
    }
}

/// Whether the file at `path` has bytes after its last newline.
async fn ends_mid_line(path: &Path) -> Result<bool> {
    let mut file = File::open(path).await?;
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

async fn replay(path: &Path, memory: &MemoryStorage) -> Result<usize> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0;
    let mut replayed = 0;

    loop {
        line_no += 1;
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Err(StorageError::Corrupted {
                    line: line_no,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str::<LogEntry>(&line)
            .map_err(|e| e.to_string())
            .and_then(LogEntry::into_record)
            .map_err(|reason| StorageError::Corrupted {
                line: line_no,
                reason,
            })?;

        memory.restore(record);
        replayed += 1;
    }

    Ok(replayed)
}

#[async_trait]
impl ReadStorage for FileStorage {
    async fn get(&self, id: &ShortId) -> Result<Option<UrlRecord>> {
        self.memory.get(id).await
    }

    async fn get_id_by_url(&self, original_url: &str) -> Result<Option<ShortId>> {
        self.memory.get_id_by_url(original_url).await
    }

    async fn get_user_urls(&self, owner: &OwnerId) -> Result<BTreeMap<ShortId, String>> {
        self.memory.get_user_urls(owner).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save_id(
        &self,
        owner: &OwnerId,
        id: &ShortId,
        original_url: &str,
    ) -> Result<SaveOutcome> {
        let mut file = self.log.lock().await;

        let outcome = self.memory.save_id(owner, id, original_url).await?;
        if outcome == SaveOutcome::Created {
            self.append(&mut file, &[LogEntry::created(owner, id, original_url)])
                .await?;
        }

        Ok(outcome)
    }

    async fn save_batch(&self, owner: &OwnerId, pairs: &BTreeMap<ShortId, String>) -> Result<()> {
        let mut file = self.log.lock().await;

        let batch = self.memory.insert_batch(owner, pairs);
        let entries: Vec<_> = batch
            .created
            .iter()
            .map(|(id, url)| LogEntry::created(owner, id, url))
            .collect();
        self.append(&mut file, &entries).await?;

        match batch.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn batch_delete(&self, owner: &OwnerId, ids: &[ShortId]) -> Result<u64> {
        let mut file = self.log.lock().await;

        let changed = self.memory.tombstone(owner, ids);
        let entries: Vec<_> = changed.iter().map(LogEntry::tombstone).collect();
        self.append(&mut file, &entries).await?;

        Ok(changed.len() as u64)
    }
}
