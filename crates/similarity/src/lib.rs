mod tokenize;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub use tokenize::tokenize;

/// Failure of an external scoring or embedding service.
#[derive(Debug, Clone, Error)]
#[error("{backend}: {reason}")]
pub struct BackendError {
    pub backend: String,
    pub reason: String,
}

impl BackendError {
    pub fn new(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

/// Scores how close two texts are, in `[0, 1]`.
pub trait SimilarityBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Threshold under which a best match is not trusted.
    fn default_threshold(&self) -> f32;

    async fn similarity(&self, text_a: &str, text_b: &str) -> Result<f32, BackendError>;

    /// Scores `query` against every candidate, in candidate order.
    async fn similarities(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<f32>, BackendError> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.similarity(query, candidate).await?);
        }
        Ok(scores)
    }
}

/// Dice coefficient over token sets. Deterministic and dependency free.
#[derive(Debug, Clone, Default)]
pub struct LexicalSimilarity;

impl LexicalSimilarity {
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityBackend for LexicalSimilarity {
    fn name(&self) -> &'static str {
        "lexical-dice"
    }

    fn default_threshold(&self) -> f32 {
        0.3
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> Result<f32, BackendError> {
        let a = tokenize(text_a).into_iter().collect::<HashSet<_>>();
        let b = tokenize(text_b).into_iter().collect::<HashSet<_>>();
        Ok(dice_coefficient(&a, &b))
    }
}

/// Cosine similarity between embeddings, clamped to `[0, 1]`.
///
/// Candidate embeddings are cached, since the same reference phrases are scored on
/// every request.
#[derive(Clone)]
pub struct EmbeddingSimilarity {
    model: Arc<dyn EmbeddingModel>,
    threshold: f32,
    cache: Arc<RwLock<HashMap<String, Arc<Vec<f32>>>>>,
}

impl EmbeddingSimilarity {
    pub fn new(model: Arc<dyn EmbeddingModel>, threshold: f32) -> Self {
        Self {
            model,
            threshold,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.model_name()
    }

    fn cached_embedding(&self, text: &str) -> Result<Arc<Vec<f32>>, BackendError> {
        if let Some(hit) = self.cache.read().get(text) {
            return Ok(hit.clone());
        }

        let embedding = Arc::new(self.model.embed(text)?);
        self.cache
            .write()
            .insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}

impl SimilarityBackend for EmbeddingSimilarity {
    fn name(&self) -> &'static str {
        "embedding-cosine"
    }

    fn default_threshold(&self) -> f32 {
        self.threshold
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> Result<f32, BackendError> {
        let a = self.model.embed(text_a)?;
        let b = self.model.embed(text_b)?;
        Ok(cosine_similarity(&a, &b).clamp(0.0, 1.0))
    }

    async fn similarities(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<f32>, BackendError> {
        let query = self.model.embed(query)?;
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let embedding = self.cached_embedding(candidate)?;
            scores.push(cosine_similarity(&query, &embedding).clamp(0.0, 1.0));
        }
        Ok(scores)
    }
}

pub fn dice_coefficient(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let overlap = a.intersection(b).count() as f32;
    (2.0 * overlap) / (a.len() + b.len()) as f32
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut a_norm = 0.0;
    let mut b_norm = 0.0;

    for (lhs, rhs) in a.iter().zip(b.iter()) {
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}
