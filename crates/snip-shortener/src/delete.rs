//! Background soft deletion.
//!
//! Callers submit [`DeleteRequest`]s to a bounded [`DeleteQueue`] and return
//! immediately. A single worker task drains the queue and applies each
//! request with [`Storage::batch_delete`]. Failed requests are logged and
//! dropped; there is no retry.

use crate::error::{Result, ShortenerError};
use snip_core::{OwnerId, ShortId, Storage};
use snip_telemetry::Logger;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Soft-delete `ids` on behalf of `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub owner: OwnerId,
    pub ids: Vec<ShortId>,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct DeleteWorkerSettings {
    /// Requests that may wait in the queue. At least one.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub capacity: usize,
}

impl Default for DeleteWorkerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Producer side of the delete queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    tx: mpsc::Sender<DeleteRequest>,
}

impl DeleteQueue {
    /// Enqueues a request without waiting.
    ///
    /// Fails with [`ShortenerError::QueueFull`] when the queue is at capacity
    /// and with [`ShortenerError::QueueClosed`] once the worker has stopped.
    pub fn submit(&self, request: DeleteRequest) -> Result<()> {
        self.tx.try_send(request).map_err(|err| match err {
            TrySendError::Full(_) => ShortenerError::QueueFull,
            TrySendError::Closed(_) => ShortenerError::QueueClosed,
        })
    }
}

/// A handle to the running delete worker.
///
/// When this handle is dropped, the worker is told to stop.
#[derive(Debug)]
pub struct DeleteWorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    logger: Logger,
}

impl DeleteWorkerHandle {
    /// Stops the worker and waits for it to exit.
    ///
    /// A request that is being applied finishes; requests still queued are
    /// dropped.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        self.join().await;
    }

    /// Waits for the worker to exit on its own, which happens once every
    /// [`DeleteQueue`] has been dropped and the queue is drained.
    pub async fn drain(mut self) {
        self.join().await;
    }

    async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(parent: self.logger.span(), error = %err, "delete worker task failed");
            }
        }
    }
}

impl Drop for DeleteWorkerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct DeleteWorker<S: ?Sized> {
    storage: Arc<S>,
    rx: mpsc::Receiver<DeleteRequest>,
    shutdown_rx: watch::Receiver<bool>,
    logger: Logger,
}

impl<S: Storage + ?Sized> DeleteWorker<S> {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(
        storage: Arc<S>,
        settings: DeleteWorkerSettings,
        logger: Logger,
    ) -> (DeleteQueue, DeleteWorkerHandle) {
        let capacity = settings.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Self {
            storage,
            rx,
            shutdown_rx,
            logger,
        };
        info!(parent: worker.logger.span(), capacity, "delete worker started");
        let logger = worker.logger.clone();
        let task = tokio::spawn(worker.run());

        (
            DeleteQueue { tx },
            DeleteWorkerHandle {
                shutdown_tx,
                task: Some(task),
                logger,
            },
        )
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                request = self.rx.recv() => match request {
                    Some(request) => self.apply(request).await,
                    None => {
                        info!(parent: self.logger.span(), "delete queue closed, worker exiting");
                        return;
                    }
                },
            }
        }

        self.rx.close();
        let dropped = self.rx.len();
        if dropped > 0 {
            warn!(parent: self.logger.span(), dropped, "dropped queued delete requests on shutdown");
        }
        info!(parent: self.logger.span(), "delete worker stopped");
    }

    async fn apply(&self, request: DeleteRequest) {
        if request.ids.is_empty() {
            debug!(parent: self.logger.span(), owner = %request.owner, "skipping empty delete request");
            return;
        }

        match self.storage.batch_delete(&request.owner, &request.ids).await {
            Ok(deleted) => info!(
                parent: self.logger.span(),
                owner = %request.owner,
                requested = request.ids.len(),
                deleted,
                "applied delete request"
            ),
            Err(err) => error!(
                parent: self.logger.span(),
                owner = %request.owner,
                requested = request.ids.len(),
                error = %err,
                "delete request failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snip_core::storage::Result as StorageResult;
    use snip_core::{ReadStorage, SaveOutcome, UrlRecord};
    use snip_storage::MemoryStorage;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    /// Memory storage whose deletes wait for a permit.
    struct GatedStorage {
        inner: MemoryStorage,
        gate: Semaphore,
        entered: Notify,
        panics: bool,
    }

    impl GatedStorage {
        fn new() -> Self {
            Self {
                inner: MemoryStorage::new(),
                gate: Semaphore::new(0),
                entered: Notify::new(),
                panics: false,
            }
        }
    }

    #[async_trait]
    impl ReadStorage for GatedStorage {
        async fn get(&self, id: &ShortId) -> StorageResult<Option<UrlRecord>> {
            self.inner.get(id).await
        }

        async fn get_id_by_url(&self, original_url: &str) -> StorageResult<Option<ShortId>> {
            self.inner.get_id_by_url(original_url).await
        }

        async fn get_user_urls(&self, owner: &OwnerId) -> StorageResult<BTreeMap<ShortId, String>> {
            self.inner.get_user_urls(owner).await
        }

        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Storage for GatedStorage {
        async fn save_id(
            &self,
            owner: &OwnerId,
            id: &ShortId,
            original_url: &str,
        ) -> StorageResult<SaveOutcome> {
            self.inner.save_id(owner, id, original_url).await
        }

        async fn save_batch(
            &self,
            owner: &OwnerId,
            pairs: &BTreeMap<ShortId, String>,
        ) -> StorageResult<()> {
            self.inner.save_batch(owner, pairs).await
        }

        async fn batch_delete(&self, owner: &OwnerId, ids: &[ShortId]) -> StorageResult<u64> {
            if self.panics {
                panic!("storage failed mid-delete");
            }
            self.entered.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| snip_core::StorageError::Operation(e.to_string()))?;
            permit.forget();
            self.inner.batch_delete(owner, ids).await
        }
    }

    fn owner(s: &str) -> OwnerId {
        OwnerId::new_unchecked(s)
    }

    fn id(s: &str) -> ShortId {
        ShortId::new_unchecked(s)
    }

    fn request(owner_id: &str, ids: &[&str]) -> DeleteRequest {
        DeleteRequest {
            owner: owner(owner_id),
            ids: ids.iter().map(|s| id(s)).collect(),
        }
    }

    async fn seeded_memory() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        storage.save_id(&owner("u1"), &id("aaa111"), "http://a.com").await.unwrap();
        storage.save_id(&owner("u1"), &id("bbb222"), "http://b.com").await.unwrap();
        storage.save_id(&owner("u2"), &id("ccc333"), "http://c.com").await.unwrap();
        storage
    }

    async fn wait_until_closed(queue: &DeleteQueue) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !queue.tx.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn worker_applies_queued_requests() {
        let storage = seeded_memory().await;
        let (queue, handle) = DeleteWorker::start(
            storage.clone(),
            DeleteWorkerSettings::default(),
            Logger::root("test"),
        );

        queue.submit(request("u1", &["aaa111"])).unwrap();
        queue.submit(request("u1", &[])).unwrap();
        // ccc333 belongs to u2 and must survive.
        queue.submit(request("u1", &["bbb222", "ccc333"])).unwrap();
        drop(queue);
        handle.drain().await;

        assert!(storage.get(&id("aaa111")).await.unwrap().is_none());
        assert!(storage.get(&id("bbb222")).await.unwrap().is_none());
        assert!(storage.get(&id("ccc333")).await.unwrap().is_some());
        assert!(storage.get_user_urls(&owner("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_queue_rejects_immediately() {
        let storage = Arc::new(GatedStorage::new());
        let (queue, handle) = DeleteWorker::start(
            storage.clone(),
            DeleteWorkerSettings::builder().capacity(1).build(),
            Logger::root("test"),
        );

        queue.submit(request("u1", &["aaa111"])).unwrap();
        storage.entered.notified().await;

        queue.submit(request("u1", &["bbb222"])).unwrap();
        assert!(matches!(
            queue.submit(request("u1", &["ccc333"])),
            Err(ShortenerError::QueueFull)
        ));

        storage.gate.add_permits(2);
        drop(queue);
        handle.drain().await;
    }

    #[tokio::test]
    async fn shutdown_drops_queued_requests() {
        let storage = Arc::new(GatedStorage::new());
        for (i, url) in ["http://a.com", "http://b.com"].iter().enumerate() {
            storage
                .save_id(&owner("u1"), &id(&format!("id{i}00")), url)
                .await
                .unwrap();
        }

        let (queue, handle) = DeleteWorker::start(
            storage.clone(),
            DeleteWorkerSettings::default(),
            Logger::root("test"),
        );

        queue.submit(request("u1", &["id000"])).unwrap();
        storage.entered.notified().await;
        queue.submit(request("u1", &["id100"])).unwrap();

        // Signal while the first request is in flight, then let it finish.
        drop(handle);
        storage.gate.add_permits(2);
        wait_until_closed(&queue).await;

        assert!(storage.get(&id("id000")).await.unwrap().is_none());
        assert!(storage.get(&id("id100")).await.unwrap().is_some());
        assert!(matches!(
            queue.submit(request("u1", &["id100"])),
            Err(ShortenerError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_worker() {
        let storage = seeded_memory().await;
        let (queue, handle) = DeleteWorker::start(
            storage.clone(),
            DeleteWorkerSettings::default(),
            Logger::root("test"),
        );

        handle.shutdown().await;

        assert!(matches!(
            queue.submit(request("u1", &["aaa111"])),
            Err(ShortenerError::QueueClosed)
        ));
        assert!(storage.get(&id("aaa111")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn drain_survives_a_panicked_worker() {
        let storage = Arc::new(GatedStorage {
            panics: true,
            ..GatedStorage::new()
        });
        let (queue, handle) = DeleteWorker::start(
            storage,
            DeleteWorkerSettings::default(),
            Logger::root("test").named("delete"),
        );
        assert_eq!(handle.logger.name(), "test.delete");

        queue.submit(request("u1", &["aaa111"])).unwrap();
        drop(queue);
        tokio::time::timeout(Duration::from_secs(5), handle.drain())
            .await
            .unwrap();
    }

    #[test]
    fn capacity_defaults_to_one_hundred() {
        assert_eq!(DeleteWorkerSettings::default().capacity, 100);
    }
}
