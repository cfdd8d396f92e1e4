use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::{OwnerId, ShortId};
use std::collections::BTreeMap;

/// Result of shortening one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortened {
    pub id: ShortId,
    /// `false` when the URL already had an id.
    pub created: bool,
}

/// One entry of a batch request. The correlation id is echoed back untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub id: ShortId,
    pub created: bool,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Returns the id bound to `original_url`, creating one for `owner` if
    /// the URL has never been shortened.
    async fn shorten(&self, owner: &OwnerId, original_url: &str) -> Result<Shortened>;

    /// Shortens many URLs at once. Results follow the input order.
    async fn shorten_batch(
        &self,
        owner: &OwnerId,
        items: Vec<BatchItem>,
    ) -> Result<Vec<BatchShortened>>;

    /// Retrieves the original URL behind `id`.
    async fn resolve(&self, id: &ShortId) -> Result<Option<String>>;

    async fn user_urls(&self, owner: &OwnerId) -> Result<BTreeMap<ShortId, String>>;

    async fn ping(&self) -> Result<()>;
}
