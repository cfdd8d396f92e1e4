use crate::error::StorageError;
use crate::owner::OwnerId;
use crate::short_id::ShortId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored URL mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_id: ShortId,
    /// The original URL that was shortened.
    pub original_url: String,
    pub owner_id: OwnerId,
    /// Tombstone flag. Records are never physically removed.
    pub deleted: bool,
}

/// What [`Storage::save_id`] did with a candidate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new record was stored.
    Created,
    /// The identical `(id, url)` pair was already stored.
    Unchanged,
    /// The URL is already bound to another id; nothing was written.
    UrlExists(ShortId),
}

/// Whether soft-deleted records still resolve through [`ReadStorage::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TombstonePolicy {
    /// Deleted records are invisible to forward lookups.
    #[default]
    Hide,
    /// Deletion only affects owner listings; links keep resolving.
    Resolve,
}

impl TombstonePolicy {
    pub fn visible(&self, deleted: bool) -> bool {
        match self {
            TombstonePolicy::Hide => !deleted,
            TombstonePolicy::Resolve => true,
        }
    }
}

/// The read half of a storage backend.
#[async_trait]
pub trait ReadStorage: Send + Sync + 'static {
    /// Forward lookup. Returns `None` for unknown ids, and for tombstoned
    /// ids when the backend hides them.
    async fn get(&self, id: &ShortId) -> Result<Option<UrlRecord>>;

    /// Reverse lookup. Tombstoned records keep their claim on the URL and
    /// are still reported.
    async fn get_id_by_url(&self, original_url: &str) -> Result<Option<ShortId>>;

    /// Every non-deleted record owned by `owner`, keyed by short id.
    async fn get_user_urls(&self, owner: &OwnerId) -> Result<BTreeMap<ShortId, String>>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait Storage: ReadStorage {
    /// Binds `id` to `original_url` for `owner`.
    ///
    /// Returns `Err(AlreadyExists)` if `id` is bound to a different URL.
    /// Resubmitting an identical pair is not an error.
    async fn save_id(
        &self,
        owner: &OwnerId,
        id: &ShortId,
        original_url: &str,
    ) -> Result<SaveOutcome>;

    /// Saves many pairs as one logical operation.
    ///
    /// Pairs whose URL is already bound are skipped. Atomicity across pairs
    /// is backend specific.
    async fn save_batch(&self, owner: &OwnerId, pairs: &BTreeMap<ShortId, String>) -> Result<()>;

    /// Tombstones the given ids that belong to `owner` and returns how many
    /// records changed. Ids owned by someone else are ignored.
    async fn batch_delete(&self, owner: &OwnerId, ids: &[ShortId]) -> Result<u64>;
}
