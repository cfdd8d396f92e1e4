pub mod random;
pub mod seq;

use snip_core::ShortId;
use thiserror::Error;

pub use random::{EntropySource, OsEntropy, RandomGenerator};
pub use seq::SeqGenerator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("entropy source failed: {0}")]
    Entropy(String),
}

/// Trait for generating short ids.
///
/// Implementations are pure generators that don't interact with storage, so
/// no uniqueness is promised. Collisions are detected by the storage backend
/// and retried by the caller.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortId>;

    /// Produces a candidate id. Fails only when the underlying source does.
    fn generate(&self) -> Result<Self::Output, GenerationError>;
}
