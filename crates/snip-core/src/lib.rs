//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the data model and the storage capability traits
//! shared by the storage backends and the shortener service.

pub mod error;
pub mod owner;
pub mod short_id;
pub mod storage;

pub use error::{CoreError, StorageError};
pub use owner::OwnerId;
pub use short_id::ShortId;
pub use storage::{ReadStorage, SaveOutcome, Storage, TombstonePolicy, UrlRecord};
