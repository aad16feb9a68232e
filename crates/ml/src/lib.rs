mod classifier;
mod fallback;

use std::env;
use std::sync::Arc;

use prism_core::{ClassificationResult, ClassifierError, IntentLabel};
use prism_similarity::{
    BackendError, EmbeddingModel, EmbeddingSimilarity, LexicalSimilarity, SimilarityBackend,
};
use tracing::warn;

pub use classifier::SemanticClassifier;
pub use fallback::HashEmbeddingModel;

const DEFAULT_EMBED_DIMS: usize = 192;
const DEFAULT_EMBEDDING_THRESHOLD: f32 = 0.4;

pub trait IntentClassifier: Send + Sync {
    type Label: IntentLabel;

    async fn classify(
        &self,
        text: &str,
    ) -> Result<ClassificationResult<Self::Label>, ClassifierError>;
}

/// Runtime choice of similarity backend.
#[derive(Clone)]
pub enum SimilarityStack {
    Lexical(LexicalSimilarity),
    Embedding(EmbeddingSimilarity),
}

impl SimilarityBackend for SimilarityStack {
    fn name(&self) -> &'static str {
        match self {
            Self::Lexical(backend) => backend.name(),
            Self::Embedding(backend) => backend.name(),
        }
    }

    fn default_threshold(&self) -> f32 {
        match self {
            Self::Lexical(backend) => backend.default_threshold(),
            Self::Embedding(backend) => backend.default_threshold(),
        }
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> Result<f32, BackendError> {
        match self {
            Self::Lexical(backend) => backend.similarity(text_a, text_b).await,
            Self::Embedding(backend) => backend.similarity(text_a, text_b).await,
        }
    }

    async fn similarities(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<f32>, BackendError> {
        match self {
            Self::Lexical(backend) => backend.similarities(query, candidates).await,
            Self::Embedding(backend) => backend.similarities(query, candidates).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Lexical,
    HashEmbedding,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "lexical" | "dice" => Some(Self::Lexical),
            "hash-embedding" | "hash_embedding" | "embedding" => Some(Self::HashEmbedding),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct MlStack {
    pub embedder: Arc<dyn EmbeddingModel>,
    pub similarity: SimilarityStack,
    pub threshold: f32,
}

impl MlStack {
    pub fn new(kind: BackendKind, dims: usize, threshold: Option<f32>) -> Self {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashEmbeddingModel::new(dims));
        let similarity = match kind {
            BackendKind::Lexical => SimilarityStack::Lexical(LexicalSimilarity::new()),
            BackendKind::HashEmbedding => SimilarityStack::Embedding(EmbeddingSimilarity::new(
                embedder.clone(),
                DEFAULT_EMBEDDING_THRESHOLD,
            )),
        };
        let threshold = threshold
            .unwrap_or_else(|| similarity.default_threshold())
            .clamp(0.0, 1.0);

        Self {
            embedder,
            similarity,
            threshold,
        }
    }

    /// Reads `PRISM_CLASSIFIER_BACKEND`, `PRISM_EMBED_DIMS` and
    /// `PRISM_CLASSIFIER_THRESHOLD`.
    pub fn load_default() -> Self {
        let kind = match env::var("PRISM_CLASSIFIER_BACKEND") {
            Ok(value) => BackendKind::parse(&value).unwrap_or_else(|| {
                warn!(value = %value, "unknown classifier backend, using lexical");
                BackendKind::Lexical
            }),
            Err(_) => BackendKind::Lexical,
        };
        let dims = env::var("PRISM_EMBED_DIMS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_EMBED_DIMS);
        let threshold = env::var("PRISM_CLASSIFIER_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<f32>().ok());

        Self::new(kind, dims, threshold)
    }

    pub fn classifier<L: IntentLabel>(
        &self,
        registry: Arc<prism_core::IntentRegistry<L>>,
    ) -> SemanticClassifier<L, SimilarityStack> {
        SemanticClassifier::new(registry, self.similarity.clone()).with_threshold(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_threshold_overrides_backend_default() {
        let stack = MlStack::new(BackendKind::Lexical, 64, Some(0.7));
        assert_eq!(stack.threshold, 0.7);

        let stack = MlStack::new(BackendKind::HashEmbedding, 64, None);
        assert_eq!(stack.threshold, DEFAULT_EMBEDDING_THRESHOLD);
        assert_eq!(stack.similarity.name(), "embedding-cosine");
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!(BackendKind::parse(" Lexical "), Some(BackendKind::Lexical));
        assert_eq!(
            BackendKind::parse("hash-embedding"),
            Some(BackendKind::HashEmbedding)
        );
        assert_eq!(BackendKind::parse("gpu"), None);
    }
}
