use std::sync::Arc;
use std::time::Instant;

use prism_anonymizer::{Anonymized, Anonymizer, EntityDetector, SurrogateGenerator};
use prism_core::{AnonymizeError, Language};
use prism_observability::AppMetrics;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::generation::{GenerationError, GenerationService};

const INFORMATION: &str = "{information}";

/// Prompt with a single `{information}` slot for the anonymized user text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Templates without the slot get the information appended on a new line.
    pub fn new(template: impl Into<String>) -> Self {
        let mut template = template.into();
        if !template.contains(INFORMATION) {
            template.push('\n');
            template.push_str(INFORMATION);
        }
        Self { template }
    }

    /// Asks who the user is, where and when they were born, dates as yyyy-mm-dd.
    pub fn identity_pt_br() -> Self {
        Self::new(
            "A partir dessas informações: {information}.\n\
             Me diga quem eu sou, onde nasci e quando? Para responder a data utilize o formato yyyy-mm-dd",
        )
    }

    pub fn render(&self, information: &str) -> String {
        self.template.replace(INFORMATION, information)
    }
}

#[derive(Debug, Error)]
pub enum PrivateCompletionError {
    #[error(transparent)]
    Anonymize(#[from] AnonymizeError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivateAnswer {
    /// What the generation service actually received.
    pub prompt: String,
    pub anonymized: Anonymized,
    /// The raw completion, still holding surrogates.
    pub completion: String,
    pub answer: String,
}

/// Sends text to a generation service with its PII swapped for surrogates, then
/// restores the originals in the answer.
pub struct PrivateCompletion<D, G, S> {
    anonymizer: Arc<Anonymizer<D, G>>,
    service: S,
    template: PromptTemplate,
    metrics: Arc<AppMetrics>,
}

impl<D, G, S> PrivateCompletion<D, G, S>
where
    D: EntityDetector,
    G: SurrogateGenerator,
    S: GenerationService,
{
    pub fn new(anonymizer: Arc<Anonymizer<D, G>>, service: S, template: PromptTemplate) -> Self {
        Self {
            anonymizer,
            service,
            template,
            metrics: AppMetrics::shared(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[instrument(skip_all, fields(service = self.service.name()))]
    pub async fn complete(
        &self,
        text: &str,
        language: Option<Language>,
    ) -> Result<PrivateAnswer, PrivateCompletionError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let result = self.run(text, language).await;
        self.metrics.observe_latency(started.elapsed());
        result
    }

    async fn run(
        &self,
        text: &str,
        language: Option<Language>,
    ) -> Result<PrivateAnswer, PrivateCompletionError> {
        let anonymized = match language {
            Some(language) => self.anonymizer.anonymize(text, language).await?,
            None => self.anonymizer.anonymize_detecting_language(text).await?,
        };
        self.metrics
            .add_entities_anonymized(anonymized.entities.len());

        let prompt = self.template.render(&anonymized.text);
        let completion = self.service.generate(&prompt).await?;
        self.metrics.inc_generation();

        let answer = self
            .anonymizer
            .deanonymize(&completion, &anonymized.mapping);

        info!(
            entities = anonymized.entities.len(),
            language = anonymized.language.as_code(),
            "private completion finished"
        );

        Ok(PrivateAnswer {
            prompt,
            anonymized,
            completion,
            answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use prism_anonymizer::{AnonymizerConfig, PlaceholderSurrogates, RuleBasedDetector};

    use super::*;

    /// Repeats back the information part of the prompt.
    struct Parrot;

    impl GenerationService for Parrot {
        fn name(&self) -> &'static str {
            "parrot"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let information = prompt
                .trim_start_matches("Info: ")
                .trim_end_matches('.')
                .to_string();
            Ok(format!("You said: {information}"))
        }
    }

    struct Offline;

    impl GenerationService for Offline {
        fn name(&self) -> &'static str {
            "offline"
        }

        async fn generate(&self, _: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable {
                service: "offline".into(),
                reason: "no route to host".into(),
            })
        }
    }

    fn anonymizer() -> Arc<Anonymizer<RuleBasedDetector, PlaceholderSurrogates>> {
        let detector = RuleBasedDetector::new(["Maria"], ["Paris"]).unwrap();
        Arc::new(Anonymizer::new(
            detector,
            PlaceholderSurrogates::new(),
            AnonymizerConfig::default(),
        ))
    }

    #[test]
    fn template_without_slot_appends_information() {
        let template = PromptTemplate::new("Summarize:");
        assert_eq!(template.render("text"), "Summarize:\ntext");
    }

    #[test]
    fn identity_template_keeps_date_instruction() {
        let rendered = PromptTemplate::identity_pt_br().render("<PERSON_1>");
        assert!(rendered.starts_with("A partir dessas informações: <PERSON_1>."));
        assert!(rendered.ends_with("yyyy-mm-dd"));
    }

    #[tokio::test]
    async fn service_never_sees_originals() {
        let completion = PrivateCompletion::new(anonymizer(), Parrot, PromptTemplate::new("Info: {information}."));
        let answer = completion
            .complete("Maria lives in Paris", Some(Language::En))
            .await
            .unwrap();

        assert_eq!(answer.prompt, "Info: <PERSON_1> lives in <LOCATION_1>.");
        assert_eq!(answer.completion, "You said: <PERSON_1> lives in <LOCATION_1>");
        assert_eq!(answer.answer, "You said: Maria lives in Paris");
    }

    #[tokio::test]
    async fn generation_failure_is_typed() {
        let metrics = AppMetrics::shared();
        let completion = PrivateCompletion::new(anonymizer(), Offline, PromptTemplate::new("{information}"))
            .with_metrics(metrics.clone());
        let error = completion.complete("Maria", None).await.unwrap_err();

        assert!(matches!(
            error,
            PrivateCompletionError::Generation(GenerationError::Unavailable { .. })
        ));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert_eq!(snapshot.latency_samples, 1);
        assert_eq!(snapshot.generations_total, 0);
    }
}
