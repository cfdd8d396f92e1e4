use crate::error::{Result, ShortenerError};
use crate::shortener::{BatchItem, BatchShortened, Shortened, Shortener};
use async_trait::async_trait;
use snip_core::{OwnerId, SaveOutcome, ShortId, Storage, StorageError};
use snip_generator::Generator;
use snip_telemetry::Logger;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerSettings {
    /// Upper bound on candidate ids tried per request.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

impl Default for ShortenerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A concrete implementation of the `Shortener` trait.
///
/// The storage backend is the only authority on uniqueness. This service
/// asks it for an existing id first, then proposes generated candidates until
/// one is accepted:
/// - a taken id is retried with a fresh candidate;
/// - a URL bound concurrently by someone else resolves to their id;
/// - any other storage failure aborts the request.
pub struct ShortenerService<S: ?Sized, G> {
    storage: Arc<S>,
    generator: G,
    settings: ShortenerSettings,
    logger: Logger,
}

impl<S: Storage + ?Sized, G: Generator> ShortenerService<S, G> {
    pub fn new(storage: Arc<S>, generator: G, settings: ShortenerSettings, logger: Logger) -> Self {
        Self {
            storage,
            generator,
            settings,
            logger,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    fn candidate(&self, attempt: u32) -> Option<ShortId> {
        match self.generator.generate() {
            Ok(id) => Some(id.into()),
            Err(err) => {
                warn!(
                    parent: self.logger.span(),
                    attempt,
                    error = %err,
                    "failed to generate short id"
                );
                None
            }
        }
    }

    fn exhausted(&self, owner: &OwnerId) -> ShortenerError {
        let attempts = self.settings.max_attempts;
        warn!(parent: self.logger.span(), owner = %owner, attempts, "gave up generating a short id");
        ShortenerError::IdGenerationExhausted { attempts }
    }
}

#[async_trait]
impl<S: Storage + ?Sized, G: Generator> Shortener for ShortenerService<S, G> {
    async fn shorten(&self, owner: &OwnerId, original_url: &str) -> Result<Shortened> {
        if let Some(id) = self.storage.get_id_by_url(original_url).await? {
            debug!(parent: self.logger.span(), id = %id, "url already shortened");
            return Ok(Shortened { id, created: false });
        }

        for attempt in 1..=self.settings.max_attempts {
            let Some(candidate) = self.candidate(attempt) else {
                continue;
            };

            match self.storage.save_id(owner, &candidate, original_url).await {
                Ok(SaveOutcome::Created | SaveOutcome::Unchanged) => {
                    info!(
                        parent: self.logger.span(),
                        owner = %owner,
                        id = %candidate,
                        attempt,
                        "created short id"
                    );
                    return Ok(Shortened {
                        id: candidate,
                        created: true,
                    });
                }
                Ok(SaveOutcome::UrlExists(existing)) => {
                    debug!(
                        parent: self.logger.span(),
                        id = %existing,
                        "url was shortened concurrently"
                    );
                    return Ok(Shortened {
                        id: existing,
                        created: false,
                    });
                }
                Err(StorageError::AlreadyExists(_)) => {
                    debug!(
                        parent: self.logger.span(),
                        id = %candidate,
                        attempt,
                        "short id collision, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(self.exhausted(owner))
    }

    /// Ids are proposed only for URLs that have none. After each
    /// `save_batch` round the stored id of every pending URL is read back,
    /// and URLs that are still unbound get fresh candidates in the next
    /// round, within the same attempt budget.
    async fn shorten_batch(
        &self,
        owner: &OwnerId,
        items: Vec<BatchItem>,
    ) -> Result<Vec<BatchShortened>> {
        let mut resolved: HashMap<String, (ShortId, bool)> = HashMap::new();
        let mut pending: Vec<String> = Vec::new();

        for item in &items {
            if resolved.contains_key(&item.original_url) || pending.contains(&item.original_url) {
                continue;
            }
            match self.storage.get_id_by_url(&item.original_url).await? {
                Some(id) => {
                    resolved.insert(item.original_url.clone(), (id, false));
                }
                None => pending.push(item.original_url.clone()),
            }
        }

        let mut attempt = 0;
        while !pending.is_empty() {
            if attempt == self.settings.max_attempts {
                return Err(self.exhausted(owner));
            }
            attempt += 1;

            let mut pairs = BTreeMap::new();
            for url in &pending {
                if let Some(id) = self.candidate(attempt) {
                    pairs.insert(id, url.clone());
                }
            }

            match self.storage.save_batch(owner, &pairs).await {
                Ok(()) => {}
                Err(StorageError::AlreadyExists(id)) => {
                    debug!(
                        parent: self.logger.span(),
                        id = %id,
                        attempt,
                        "short id collision in batch, retrying unbound urls"
                    );
                }
                Err(err) => return Err(err.into()),
            }

            let mut unbound = Vec::new();
            for url in pending {
                match self.storage.get_id_by_url(&url).await? {
                    Some(id) => {
                        let created = pairs.get(&id) == Some(&url);
                        resolved.insert(url, (id, created));
                    }
                    None => unbound.push(url),
                }
            }
            pending = unbound;
        }

        info!(
            parent: self.logger.span(),
            owner = %owner,
            items = items.len(),
            attempts = attempt,
            "shortened batch"
        );

        let mut reported = HashSet::new();
        items
            .into_iter()
            .map(|item| -> Result<BatchShortened> {
                let (id, created) = resolved.get(&item.original_url).cloned().ok_or_else(|| {
                    StorageError::Operation(format!(
                        "no short id recorded for '{}'",
                        item.original_url
                    ))
                })?;
                let first = reported.insert(item.original_url);
                Ok(BatchShortened {
                    correlation_id: item.correlation_id,
                    id,
                    created: created && first,
                })
            })
            .collect()
    }

    async fn resolve(&self, id: &ShortId) -> Result<Option<String>> {
        let record = self.storage.get(id).await?;
        Ok(record.map(|record| record.original_url))
    }

    async fn user_urls(&self, owner: &OwnerId) -> Result<BTreeMap<ShortId, String>> {
        Ok(self.storage.get_user_urls(owner).await?)
    }

    async fn ping(&self) -> Result<()> {
        Ok(self.storage.ping().await?)
    }
}
