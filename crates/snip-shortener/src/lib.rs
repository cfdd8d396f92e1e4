//! URL shortening on top of a [`Storage`](snip_core::Storage) backend.
//!
//! [`ShortenerService`] deduplicates URLs and retries id collisions;
//! [`DeleteWorker`] applies soft deletes from a bounded queue in the
//! background.

pub mod delete;
pub mod error;
pub mod service;
pub mod shortener;

pub use delete::{DeleteQueue, DeleteRequest, DeleteWorker, DeleteWorkerHandle, DeleteWorkerSettings};
pub use error::{Result, ShortenerError};
pub use service::{ShortenerService, ShortenerSettings};
pub use shortener::{BatchItem, BatchShortened, Shortened, Shortener};
