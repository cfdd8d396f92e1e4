use crate::{GenerationError, Generator};
use snip_core::ShortId;
use std::sync::atomic::{AtomicU64, Ordering};

/// A deterministic id generator using a sequential counter.
///
/// Produces ids like "sn000000", "sn000001", etc. Useful for tests and for
/// reproducible runs; ids are predictable, so it is not meant for public links.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
    prefix: String,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            prefix: self.prefix.clone(),
        }
    }
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Creates a generator starting from a specific counter value.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl Generator for SeqGenerator {
    type Output = ShortId;

    fn generate(&self) -> Result<Self::Output, GenerationError> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ShortId::new_unchecked(format!("{}{:06}", self.prefix, count)))
    }
}
