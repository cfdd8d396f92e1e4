use crate::{GenerationError, Generator};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::TryRngCore;
use snip_core::ShortId;

pub const DEFAULT_ID_BYTES: usize = 6;
const MIN_ID_BYTES: usize = 3;
const MAX_ID_BYTES: usize = 24;

/// Source of random bytes for [`RandomGenerator`].
pub trait EntropySource: Send + Sync + 'static {
    fn fill(&self, dest: &mut [u8]) -> Result<(), GenerationError>;
}

/// The operating system's secure random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), GenerationError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| GenerationError::Entropy(e.to_string()))
    }
}

/// Generates random ids encoded as unpadded base64url.
///
/// `n` random bytes encode to `ceil(4n / 3)` characters from
/// `[A-Za-z0-9_-]`; the default 6 bytes give 8 characters. The byte count is
/// clamped to 3..=24 so every output is a valid [`ShortId`].
#[derive(Debug, Clone)]
pub struct RandomGenerator<E = OsEntropy> {
    id_bytes: usize,
    entropy: E,
}

impl RandomGenerator<OsEntropy> {
    pub fn new(id_bytes: usize) -> Self {
        Self::with_entropy(id_bytes, OsEntropy)
    }
}

impl Default for RandomGenerator<OsEntropy> {
    fn default() -> Self {
        Self::new(DEFAULT_ID_BYTES)
    }
}

impl<E: EntropySource> RandomGenerator<E> {
    pub fn with_entropy(id_bytes: usize, entropy: E) -> Self {
        Self {
            id_bytes: id_bytes.clamp(MIN_ID_BYTES, MAX_ID_BYTES),
            entropy,
        }
    }

    pub fn id_bytes(&self) -> usize {
        self.id_bytes
    }
}

impl<E: EntropySource> Generator for RandomGenerator<E> {
    type Output = ShortId;

    fn generate(&self) -> Result<Self::Output, GenerationError> {
        let mut bytes = vec![0u8; self.id_bytes];
        self.entropy.fill(&mut bytes)?;
        Ok(ShortId::new_unchecked(URL_SAFE_NO_PAD.encode(&bytes)))
    }
}
