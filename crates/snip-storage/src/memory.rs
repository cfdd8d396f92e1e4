use async_trait::async_trait;
use parking_lot::Mutex;
use snip_core::storage::Result;
use snip_core::{
    OwnerId, ReadStorage, SaveOutcome, ShortId, Storage, StorageError, TombstonePolicy, UrlRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner_id: OwnerId,
    deleted: bool,
}

impl Entry {
    fn to_record(&self, id: &ShortId) -> UrlRecord {
        UrlRecord {
            short_id: id.clone(),
            original_url: self.original_url.clone(),
            owner_id: self.owner_id.clone(),
            deleted: self.deleted,
        }
    }
}

/// Forward, reverse and owner maps. Only ever touched under one lock.
#[derive(Debug, Default)]
struct Tables {
    forward: HashMap<ShortId, Entry>,
    reverse: HashMap<String, ShortId>,
    owners: HashMap<OwnerId, HashSet<ShortId>>,
}

impl Tables {
    fn insert(&mut self, owner: &OwnerId, id: &ShortId, original_url: &str) -> Result<SaveOutcome> {
        if let Some(entry) = self.forward.get(id) {
            if entry.original_url == original_url {
                return Ok(SaveOutcome::Unchanged);
            }
            return Err(StorageError::AlreadyExists(id.to_string()));
        }

        if let Some(existing) = self.reverse.get(original_url) {
            return Ok(SaveOutcome::UrlExists(existing.clone()));
        }

        self.forward.insert(
            id.clone(),
            Entry {
                original_url: original_url.to_owned(),
                owner_id: owner.clone(),
                deleted: false,
            },
        );
        self.reverse.insert(original_url.to_owned(), id.clone());
        self.owners
            .entry(owner.clone())
            .or_default()
            .insert(id.clone());

        Ok(SaveOutcome::Created)
    }

    fn unlink(&mut self, id: &ShortId) {
        let Some(old) = self.forward.remove(id) else {
            return;
        };

        if self.reverse.get(&old.original_url) == Some(id) {
            self.reverse.remove(&old.original_url);
        }

        if let Some(ids) = self.owners.get_mut(&old.owner_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.owners.remove(&old.owner_id);
            }
        }
    }
}

/// Ids written by [`MemoryStorage::insert_batch`] before it stopped.
#[derive(Debug, Default)]
pub(crate) struct BatchInsert {
    pub created: Vec<(ShortId, String)>,
    pub failure: Option<StorageError>,
}

/// In-memory storage backend.
///
/// All maps live behind a single mutex, so every operation observes a total
/// order. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    policy: TombstonePolicy,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: TombstonePolicy) -> Self {
        Self {
            tables: Mutex::default(),
            policy,
        }
    }

    /// Writes a record as-is, replacing whatever `record.short_id` held.
    ///
    /// Used to rebuild state from a log: the last write for an id or for a
    /// URL wins. An id previously bound to the same URL is dropped, so each
    /// URL keeps a single forward record.
    pub fn restore(&self, record: UrlRecord) {
        let mut tables = self.tables.lock();
        tables.unlink(&record.short_id);

        if let Some(previous) = tables.reverse.get(&record.original_url).cloned() {
            tables.unlink(&previous);
        }

        tables
            .reverse
            .insert(record.original_url.clone(), record.short_id.clone());
        tables
            .owners
            .entry(record.owner_id.clone())
            .or_default()
            .insert(record.short_id.clone());
        tables.forward.insert(
            record.short_id,
            Entry {
                original_url: record.original_url,
                owner_id: record.owner_id,
                deleted: record.deleted,
            },
        );
    }

    /// Snapshot of every record, tombstones included, ordered by id.
    pub fn records(&self) -> Vec<UrlRecord> {
        let tables = self.tables.lock();
        let mut records: Vec<_> = tables
            .forward
            .iter()
            .map(|(id, entry)| entry.to_record(id))
            .collect();
        records.sort_by(|a, b| a.short_id.cmp(&b.short_id));
        records
    }

    pub fn len(&self) -> usize {
        self.tables.lock().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts pairs in order and stops at the first error. Pairs inserted
    /// before the failure stay.
    pub(crate) fn insert_batch(
        &self,
        owner: &OwnerId,
        pairs: &BTreeMap<ShortId, String>,
    ) -> BatchInsert {
        let mut tables = self.tables.lock();
        let mut batch = BatchInsert::default();

        for (id, original_url) in pairs {
            match tables.insert(owner, id, original_url) {
                Ok(SaveOutcome::Created) => batch.created.push((id.clone(), original_url.clone())),
                Ok(SaveOutcome::Unchanged | SaveOutcome::UrlExists(_)) => {}
                Err(err) => {
                    batch.failure = Some(err);
                    break;
                }
            }
        }

        batch
    }

    /// Tombstones the ids owned by `owner` and returns the records that
    /// changed.
    pub(crate) fn tombstone(&self, owner: &OwnerId, ids: &[ShortId]) -> Vec<UrlRecord> {
        let mut tables = self.tables.lock();
        let mut changed = Vec::new();

        for id in ids {
            let Some(entry) = tables.forward.get_mut(id) else {
                continue;
            };
            if entry.owner_id != *owner || entry.deleted {
                continue;
            }
            entry.deleted = true;
            changed.push(entry.to_record(id));
        }

        changed
    }
}

#[async_trait]
impl ReadStorage for MemoryStorage {
    async fn get(&self, id: &ShortId) -> Result<Option<UrlRecord>> {
        let tables = self.tables.lock();

        let Some(entry) = tables.forward.get(id) else {
            return Ok(None);
        };

        if !self.policy.visible(entry.deleted) {
            return Ok(None);
        }

        Ok(Some(entry.to_record(id)))
    }

    async fn get_id_by_url(&self, original_url: &str) -> Result<Option<ShortId>> {
        Ok(self.tables.lock().reverse.get(original_url).cloned())
    }

    async fn get_user_urls(&self, owner: &OwnerId) -> Result<BTreeMap<ShortId, String>> {
        let tables = self.tables.lock();

        let Some(ids) = tables.owners.get(owner) else {
            return Ok(BTreeMap::new());
        };

        let urls = ids
            .iter()
            .filter_map(|id| {
                tables
                    .forward
                    .get(id)
                    .filter(|entry| !entry.deleted)
                    .map(|entry| (id.clone(), entry.original_url.clone()))
            })
            .collect();

        Ok(urls)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_id(
        &self,
        owner: &OwnerId,
        id: &ShortId,
        original_url: &str,
    ) -> Result<SaveOutcome> {
        self.tables.lock().insert(owner, id, original_url)
    }

    async fn save_batch(&self, owner: &OwnerId, pairs: &BTreeMap<ShortId, String>) -> Result<()> {
        match self.insert_batch(owner, pairs).failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn batch_delete(&self, owner: &OwnerId, ids: &[ShortId]) -> Result<u64> {
        Ok(self.tombstone(owner, ids).len() as u64)
    }
}
