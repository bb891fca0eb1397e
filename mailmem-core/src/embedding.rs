//! Text-to-vector providers used by indexed stores.
//!
//! A store only needs the same text to map to the same vector, and cosine
//! similarity to mean something. Three providers ship here:
//!
//! - [`HashingEmbeddingProvider`]: feature-hashed bag of words, deterministic.
//! - [`StubEmbeddingProvider`]: zero vectors, so every search ranks by recency.
//! - [`CachedEmbeddingProvider`]: LRU cache in front of any other provider.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{MemoryError, Result};
use crate::types::Embedding;

/// Turns record and query text into vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Vector for `text`, `dimensions()` long.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Embedding`] when the backend cannot produce a vector.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Vectors for several texts, in input order. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// The first error returned by [`embed`](Self::embed).
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text)?);
        }
        Ok(out)
    }

    /// Vector length.
    fn dimensions(&self) -> usize;

    /// Identifier logged with store setup.
    fn model_name(&self) -> &str;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<T> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        T::embed(self, text)
    }

    fn dimensions(&self) -> usize {
        T::dimensions(self)
    }

    fn model_name(&self) -> &str {
        T::model_name(self)
    }
}

/// Cosine of the angle between `a` and `b`, clamped to `[-1, 1]`.
///
/// Mismatched lengths and zero vectors score `0.0`.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a
        .0
        .iter()
        .zip(&b.0)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });
    let norms = (norm_a * norm_b).sqrt();
    if norms <= f32::EPSILON {
        0.0
    } else {
        (dot / norms).clamp(-1.0, 1.0)
    }
}

/// Always returns the zero vector of its width.
#[derive(Debug, Clone, Copy)]
pub struct StubEmbeddingProvider {
    width: usize,
}

impl StubEmbeddingProvider {
    /// A stub producing `width`-long zero vectors.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding(vec![0.0; self.width]))
    }

    fn dimensions(&self) -> usize {
        self.width
    }

    fn model_name(&self) -> &str {
        "zero"
    }
}

const DEFAULT_DIMENSIONS: usize = 256;

// ---------------------------------------------------------------------------
// Feature-hashing provider
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedding via the hashing trick.
///
/// Text is lower-cased and split on non-alphanumeric characters; each token
/// is hashed (FNV-1a, 64-bit) into one of `dimensions` buckets, with the top
/// hash bit choosing the sign. The result is L2-normalised, so the cosine
/// similarity of two texts reflects their token overlap.
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    /// Create a new hashing provider.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Config`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(MemoryError::Config(
                "hashing embedding dimensions must be > 0".into(),
            ));
        }
        Ok(Self { dims: dimensions })
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self { dims: DEFAULT_DIMENSIONS }
    }
}

/// FNV-1a over the token bytes.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    #[allow(clippy::cast_possible_truncation)]
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut raw = vec![0.0_f32; self.dims];
        for token in Self::tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            raw[bucket] += sign;
        }

        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            raw.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(Embedding(raw))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "fnv1a-hashing-bow"
    }
}

// ---------------------------------------------------------------------------
// LRU cache wrapper
// ---------------------------------------------------------------------------

/// Caches the most recently embedded texts in front of another provider.
///
/// Useful when the inner provider is remote or slow: the same query text is
/// embedded repeatedly by few-shot retrieval and episodic recall.
pub struct CachedEmbeddingProvider<P> {
    inner: P,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl<P: EmbeddingProvider> CachedEmbeddingProvider<P> {
    /// Wrap `inner` with a cache holding up to `capacity` embeddings.
    #[must_use]
    pub fn new(inner: P, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached embeddings.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingProvider<P> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(hit) = self.cache.lock().get(text) {
            return Ok(hit.clone());
        }
        // Compute outside the lock; a concurrent miss on the same text just
        // embeds twice and stores the same vector.
        let embedding = self.inner.embed(text)?;
        self.cache.lock().put(text.to_owned(), embedding.clone());
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn v(values: &[f32]) -> Embedding {
        Embedding(values.to_vec())
    }

    #[test]
    fn cosine_edge_cases() {
        let cases = [
            (v(&[0.6, 0.8]), v(&[0.6, 0.8]), 1.0),
            (v(&[1.0, 0.0]), v(&[0.0, 3.0]), 0.0),
            (v(&[2.0, 0.0]), v(&[-1.0, 0.0]), -1.0),
            (v(&[1.0, 1.0]), v(&[1.0, 1.0, 1.0]), 0.0),
            (v(&[0.0, 0.0]), v(&[1.0, 0.0]), 0.0),
        ];
        for (a, b, expected) in cases {
            let got = cosine_similarity(&a, &b);
            assert!((got - expected).abs() < 1e-6, "{a:?} vs {b:?}: {got}");
        }
    }

    #[test]
    fn stub_ranks_nothing() {
        let stub = StubEmbeddingProvider::new(4);
        let a = stub.embed("Q3 slides").expect("embed");
        let b = stub.embed("Q3 slides").expect("embed");
        assert_eq!(a.dimensions(), 4);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(stub.embed_batch(&["x", "y", "z"]).expect("batch").len(), 3);
    }

    #[test]
    fn hashing_ignores_case_and_punctuation() {
        let provider = HashingEmbeddingProvider::new(64).expect("provider");
        let a = provider.embed("Can you resend the Q3 slides?").expect("embed");
        let b = provider.embed("can you RESEND the q3 slides").expect("embed");
        assert_eq!(a, b);
        let norm: f32 = a.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm {norm}");
    }

    #[test]
    fn hashing_similarity_follows_shared_words() {
        let provider = HashingEmbeddingProvider::default();
        let query = provider.embed("resend the quarterly slides").expect("embed");
        let close = provider.embed("please resend the slides").expect("embed");
        let far = provider.embed("lunch menu for friday").expect("embed");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn hashing_edge_inputs() {
        assert!(matches!(HashingEmbeddingProvider::new(0), Err(MemoryError::Config(_))));
        let provider = HashingEmbeddingProvider::new(8).expect("provider");
        let blank = provider.embed("  ,,, ").expect("embed");
        assert_eq!(blank, Embedding(vec![0.0; 8]));
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl EmbeddingProvider for Counting {
        #[allow(clippy::cast_precision_loss)]
        fn embed(&self, text: &str) -> Result<Embedding> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding(vec![text.len() as f32, 1.0]))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn cache_serves_repeats_and_evicts_oldest() {
        let cached = CachedEmbeddingProvider::new(Counting::default(), NonZeroUsize::new(2).expect("nonzero"));
        for text in ["build failed", "build failed", "q3 slides", "standup", "build failed"] {
            cached.embed(text).expect("embed");
        }
        // "build failed" was evicted by "standup" and embedded again.
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 4);
        assert_eq!(cached.cached(), 2);
    }
}
