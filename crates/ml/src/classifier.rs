use std::sync::Arc;

use prism_core::{
    normalize_text, ClassificationResult, ClassifierError, IntentLabel, IntentRegistry, MIN_SCORE,
};
use prism_similarity::SimilarityBackend;
use tracing::debug;

use crate::IntentClassifier;

/// Nearest-reference-phrase classifier.
///
/// Each intent scores as its best reference phrase; the best intent wins, earlier
/// registrations winning ties. A winner under the threshold is reported as `none`
/// with its score kept.
pub struct SemanticClassifier<L, B> {
    registry: Arc<IntentRegistry<L>>,
    backend: B,
    threshold: f32,
}

impl<L, B> SemanticClassifier<L, B>
where
    L: IntentLabel,
    B: SimilarityBackend,
{
    pub fn new(registry: Arc<IntentRegistry<L>>, backend: B) -> Self {
        let threshold = backend.default_threshold();
        Self {
            registry,
            backend,
            threshold,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn registry(&self) -> &IntentRegistry<L> {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<L, B> IntentClassifier for SemanticClassifier<L, B>
where
    L: IntentLabel,
    B: SimilarityBackend,
{
    type Label = L;

    async fn classify(&self, text: &str) -> Result<ClassificationResult<L>, ClassifierError> {
        let namespace = self.registry.namespace();
        let normalized = normalize_text(text);
        if normalized.is_empty() || self.registry.is_empty() {
            return Ok(ClassificationResult::none(MIN_SCORE, text, namespace));
        }

        let mut best: Option<(L, f32)> = None;
        for intent in self.registry.all() {
            let scores = self
                .backend
                .similarities(&normalized, &intent.reference_phrases)
                .await
                .map_err(|error| ClassifierError::Unavailable {
                    backend: self.backend.name().to_string(),
                    reason: error.reason,
                })?;

            // NaN scores fold away against the 0.0 seed
            let top = scores.into_iter().fold(MIN_SCORE, f32::max).min(1.0);
            debug!(intent = intent.name(), score = top, "intent scored");

            if best.map_or(true, |(_, best_score)| top > best_score) {
                best = Some((intent.label, top));
            }
        }

        Ok(match best {
            Some((label, score)) if score >= self.threshold => {
                ClassificationResult::matched(label, score, text, namespace)
            }
            Some((_, score)) => ClassificationResult::none(score, text, namespace),
            None => ClassificationResult::none(MIN_SCORE, text, namespace),
        })
    }
}
