mod deanonymize;
mod detector;
mod surrogate;

use parking_lot::Mutex;
use prism_core::{
    detect_language, AnonymizationMapping, AnonymizeError, Entity, EntityKind, EntitySpan,
    Language,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use deanonymize::fuzzy_collides;
pub use deanonymize::{deanonymize, MatchingStrategy};
pub use detector::{
    EntityDetector, LabelGroups, NerBackend, NerDetector, NerSpan, RuleBasedDetector,
};
pub use surrogate::{FakerLocale, LocaleFaker, PlaceholderSurrogates, SurrogateGenerator};

const MAX_SURROGATE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizerConfig {
    pub kinds: Vec<EntityKind>,
    /// Detections scoring below this are ignored.
    pub min_score: f32,
    pub matching: MatchingStrategy,
}

impl Default for AnonymizerConfig {
    fn default() -> Self {
        Self {
            kinds: vec![EntityKind::Person, EntityKind::Location, EntityKind::DateTime],
            min_score: 0.0,
            matching: MatchingStrategy::Exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anonymized {
    pub text: String,
    pub language: Language,
    /// Replaced spans in source order, offsets into the original text.
    pub entities: Vec<Entity>,
    pub mapping: AnonymizationMapping,
}

/// Reversible PII replacement over a pluggable detector and surrogate generator.
///
/// The generator is reset at the start of every call, so nothing about one
/// request's surrogates carries into the next.
pub struct Anonymizer<D, G> {
    detector: D,
    generator: Mutex<G>,
    config: AnonymizerConfig,
}

impl<D, G> Anonymizer<D, G>
where
    D: EntityDetector,
    G: SurrogateGenerator,
{
    pub fn new(detector: D, generator: G, config: AnonymizerConfig) -> Self {
        Self {
            detector,
            generator: Mutex::new(generator),
            config,
        }
    }

    pub fn config(&self) -> &AnonymizerConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    #[instrument(skip_all, fields(detector = self.detector.name(), language = language.as_code()))]
    pub async fn anonymize(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Anonymized, AnonymizeError> {
        if text.is_empty() || self.config.kinds.is_empty() {
            return Ok(Anonymized {
                text: text.to_string(),
                language,
                entities: Vec::new(),
                mapping: AnonymizationMapping::new(),
            });
        }

        let detected = self
            .detector
            .detect_entities(text, language, &self.config.kinds)
            .await
            .map_err(|error| AnonymizeError::DetectionUnavailable {
                detector: error.backend,
                reason: error.reason,
            })?;

        let mut accepted = Vec::with_capacity(detected.len());
        for span in detected {
            if span.end > text.len()
                || span.start > span.end
                || !text.is_char_boundary(span.start)
                || !text.is_char_boundary(span.end)
            {
                return Err(AnonymizeError::InvalidSpan {
                    detector: self.detector.name().to_string(),
                    start: span.start,
                    end: span.end,
                });
            }
            if self.config.kinds.contains(&span.kind) && span.score >= self.config.min_score {
                accepted.push(span);
            }
        }
        let spans = resolve_overlaps(accepted);
        debug!(spans = spans.len(), "entity spans resolved");

        let mut mapping = AnonymizationMapping::new();
        let mut entities = Vec::with_capacity(spans.len());
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;
        {
            let mut generator = self.generator.lock();
            generator.reset();
            for span in &spans {
                let original = &text[span.start..span.end];
                let surrogate = match mapping.surrogate_for(span.kind, original) {
                    Some(existing) => existing.to_string(),
                    None => {
                        let fresh = unique_surrogate(
                            &mut *generator,
                            span.kind,
                            text,
                            &mapping,
                            self.config.matching,
                        );
                        mapping.insert(span.kind, fresh.clone(), original.to_string());
                        fresh
                    }
                };

                output.push_str(&text[cursor..span.start]);
                output.push_str(&surrogate);
                cursor = span.end;
                entities.push(Entity {
                    kind: span.kind,
                    start: span.start,
                    end: span.end,
                    surrogate,
                });
            }
        }
        output.push_str(&text[cursor..]);

        info!(
            entities = entities.len(),
            mapped = mapping.len(),
            "text anonymized"
        );
        Ok(Anonymized {
            text: output,
            language,
            entities,
            mapping,
        })
    }

    /// Same as [`Anonymizer::anonymize`] with the language guessed from the text.
    pub async fn anonymize_detecting_language(
        &self,
        text: &str,
    ) -> Result<Anonymized, AnonymizeError> {
        let language = detect_language(None, text);
        self.anonymize(text, language).await
    }

    pub fn deanonymize(&self, text: &str, mapping: &AnonymizationMapping) -> String {
        deanonymize(text, mapping, self.config.matching)
    }
}

/// Keeps a non-overlapping subset of `spans`, sorted by start offset.
///
/// Longer spans win; among equally long spans the one starting first wins, and exact
/// duplicates keep their first occurrence.
pub fn resolve_overlaps(mut spans: Vec<EntitySpan>) -> Vec<EntitySpan> {
    spans.sort_by(|a, b| b.len().cmp(&a.len()).then(a.start.cmp(&b.start)));

    let mut kept: Vec<EntitySpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.is_empty() || kept.iter().any(|existing| existing.overlaps(&span)) {
            continue;
        }
        kept.push(span);
    }
    kept.sort_by_key(|span| span.start);
    kept
}

fn unique_surrogate<G>(
    generator: &mut G,
    kind: EntityKind,
    source: &str,
    mapping: &AnonymizationMapping,
    matching: MatchingStrategy,
) -> String
where
    G: SurrogateGenerator + ?Sized,
{
    let mut candidate = String::new();
    for _ in 0..MAX_SURROGATE_ATTEMPTS {
        candidate = generator.generate(kind);
        if is_usable(&candidate, source, mapping, matching) {
            return candidate;
        }
    }

    // pool exhausted or colliding with the source: disambiguate with a suffix
    let base = if candidate.trim().is_empty() {
        format!("<{}>", kind.as_str())
    } else {
        candidate
    };
    let mut n = 1;
    loop {
        let suffixed = format!("{base}_{n}");
        if is_usable(&suffixed, source, mapping, matching) {
            return suffixed;
        }
        n += 1;
    }
}

/// A usable surrogate cannot be confused with anything already in the source or
/// the mapping, including source words a fuzzy restore would rewrite.
fn is_usable(
    candidate: &str,
    source: &str,
    mapping: &AnonymizationMapping,
    matching: MatchingStrategy,
) -> bool {
    !candidate.trim().is_empty()
        && !source.contains(candidate)
        && !fuzzy_collides(candidate, source, matching)
        && !mapping.contains_surrogate(candidate)
        && mapping.entries().iter().all(|entry| entry.original != candidate)
}

#[cfg(test)]
mod tests {
    use prism_similarity::BackendError;

    use super::*;

    fn placeholder_anonymizer() -> Anonymizer<RuleBasedDetector, PlaceholderSurrogates> {
        let detector = RuleBasedDetector::new(["Maria", "João Paulo"], ["Paris", "São Paulo"])
            .expect("gazetteer");
        Anonymizer::new(
            detector,
            PlaceholderSurrogates::new(),
            AnonymizerConfig::default(),
        )
    }

    /// Emits whatever spans it was built with.
    struct Scripted(Vec<EntitySpan>);

    impl EntityDetector for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn detect_entities(
            &self,
            _: &str,
            _: Language,
            _: &[EntityKind],
        ) -> Result<Vec<EntitySpan>, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct Offline;

    impl EntityDetector for Offline {
        fn name(&self) -> &'static str {
            "offline"
        }

        async fn detect_entities(
            &self,
            _: &str,
            _: Language,
            _: &[EntityKind],
        ) -> Result<Vec<EntitySpan>, BackendError> {
            Err(BackendError::new("offline", "model not loaded"))
        }
    }

    /// Always proposes the same value.
    struct Stuck(&'static str);

    impl SurrogateGenerator for Stuck {
        fn person(&mut self) -> String {
            self.0.to_string()
        }
        fn location(&mut self) -> String {
            self.0.to_string()
        }
        fn date_time(&mut self) -> String {
            self.0.to_string()
        }
        fn email_address(&mut self) -> String {
            self.0.to_string()
        }
        fn phone_number(&mut self) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn replaces_person_and_location() {
        let anonymizer = placeholder_anonymizer();
        let source = "Maria lives in Paris";
        let result = anonymizer.anonymize(source, Language::En).await.unwrap();

        assert_eq!(result.text, "<PERSON_1> lives in <LOCATION_1>");
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.mapping.original_for("<PERSON_1>"), Some("Maria"));
        assert_eq!(result.mapping.original_for("<LOCATION_1>"), Some("Paris"));
        assert_eq!(anonymizer.deanonymize(&result.text, &result.mapping), source);
    }

    #[tokio::test]
    async fn text_without_entities_is_unchanged() {
        let anonymizer = placeholder_anonymizer();
        let result = anonymizer
            .anonymize("nothing to hide here", Language::En)
            .await
            .unwrap();

        assert_eq!(result.text, "nothing to hide here");
        assert!(result.entities.is_empty());
        assert!(result.mapping.is_empty());
    }

    #[tokio::test]
    async fn seeded_faker_round_trips_portuguese() {
        let detector = RuleBasedDetector::with_default_gazetteers().unwrap();
        let anonymizer = Anonymizer::new(
            detector,
            LocaleFaker::seeded(FakerLocale::PtBr, 42),
            AnonymizerConfig::default(),
        );
        let source = "Olá, eu me chamo João Paulo, nasci em São Paulo no dia 2001-05-10";
        let result = anonymizer.anonymize(source, Language::Pt).await.unwrap();

        let kinds = result.entities.iter().map(|e| e.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![EntityKind::Person, EntityKind::Location, EntityKind::DateTime]
        );
        for entity in &result.entities {
            assert!(!source.contains(&entity.surrogate));
        }
        assert_eq!(anonymizer.deanonymize(&result.text, &result.mapping), source);
    }

    #[tokio::test]
    async fn repeated_value_shares_a_surrogate() {
        let anonymizer = placeholder_anonymizer();
        let result = anonymizer
            .anonymize("Maria met Maria in Paris", Language::En)
            .await
            .unwrap();

        assert_eq!(result.text, "<PERSON_1> met <PERSON_1> in <LOCATION_1>");
        assert_eq!(result.mapping.len(), 2);
    }

    #[tokio::test]
    async fn colliding_surrogates_get_a_suffix() {
        let detector = RuleBasedDetector::new(["Maria", "Ana"], Vec::<&str>::new()).unwrap();
        let anonymizer = Anonymizer::new(detector, Stuck("Lia"), AnonymizerConfig::default());
        let result = anonymizer
            .anonymize("Maria and Ana", Language::En)
            .await
            .unwrap();

        assert_eq!(result.text, "Lia and Lia_1");
        assert_eq!(
            anonymizer.deanonymize(&result.text, &result.mapping),
            "Maria and Ana"
        );
    }

    #[tokio::test]
    async fn surrogate_never_copies_source_text() {
        let detector = RuleBasedDetector::new(["Maria"], Vec::<&str>::new()).unwrap();
        let anonymizer = Anonymizer::new(detector, Stuck("Ana"), AnonymizerConfig::default());
        let result = anonymizer
            .anonymize("Maria called Ana", Language::En)
            .await
            .unwrap();

        assert_eq!(result.text, "Ana_1 called Ana");
    }

    #[tokio::test]
    async fn fuzzy_round_trip_keeps_lookalike_source_words() {
        let detector = RuleBasedDetector::new(["Maria"], Vec::<&str>::new()).unwrap();
        let config = AnonymizerConfig {
            matching: MatchingStrategy::from_distance(1),
            ..AnonymizerConfig::default()
        };
        let anonymizer = Anonymizer::new(detector, Stuck("Lívia"), config);
        let source = "Maria met Livia";
        let result = anonymizer.anonymize(source, Language::En).await.unwrap();

        assert_eq!(result.text, "Lívia_1 met Livia");
        assert_eq!(anonymizer.deanonymize(&result.text, &result.mapping), source);
    }

    #[tokio::test]
    async fn placeholder_numbering_restarts_per_request() {
        let anonymizer = placeholder_anonymizer();
        let first = anonymizer.anonymize("Maria", Language::En).await.unwrap();
        let second = anonymizer.anonymize("Maria", Language::En).await.unwrap();

        assert_eq!(first.text, "<PERSON_1>");
        assert_eq!(second.text, "<PERSON_1>");
        assert_eq!(second.mapping.len(), 1);
    }

    #[tokio::test]
    async fn names_after_a_place_are_still_replaced() {
        let anonymizer = Anonymizer::new(
            RuleBasedDetector::with_default_gazetteers().unwrap(),
            PlaceholderSurrogates::new(),
            AnonymizerConfig::default(),
        );

        let result = anonymizer
            .anonymize("Em São Paulo Ana trabalha", Language::Pt)
            .await
            .unwrap();
        assert_eq!(result.text, "Em <LOCATION_1> <PERSON_1> trabalha");
        assert_eq!(result.mapping.original_for("<PERSON_1>"), Some("Ana"));

        let result = anonymizer
            .anonymize("Nasci em São Paulo Maria e eu", Language::Pt)
            .await
            .unwrap();
        assert_eq!(result.text, "Nasci em <LOCATION_1> <PERSON_1> e eu");
        assert_eq!(result.mapping.original_for("<PERSON_1>"), Some("Maria"));
        assert_eq!(result.mapping.original_for("<LOCATION_1>"), Some("São Paulo"));
    }

    #[tokio::test]
    async fn overlapping_detections_keep_the_longest() {
        let text = "São Paulo Futebol Clube";
        let spans = vec![
            EntitySpan::new(EntityKind::Person, 4, 10, 0.9),
            EntitySpan::new(EntityKind::Location, 0, 10, 0.8),
            EntitySpan::new(EntityKind::Location, 0, 10, 0.8),
        ];
        let anonymizer = Anonymizer::new(
            Scripted(spans),
            PlaceholderSurrogates::new(),
            AnonymizerConfig::default(),
        );
        let result = anonymizer.anonymize(text, Language::Pt).await.unwrap();

        assert_eq!(result.text, "<LOCATION_1> Futebol Clube");
        assert_eq!(result.entities.len(), 1);
    }

    #[test]
    fn equal_length_overlap_prefers_earlier_start() {
        let kept = resolve_overlaps(vec![
            EntitySpan::new(EntityKind::Person, 3, 8, 0.5),
            EntitySpan::new(EntityKind::Location, 0, 5, 0.5),
            EntitySpan::new(EntityKind::DateTime, 10, 12, 0.5),
        ]);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].kind, EntityKind::Location);
        assert_eq!(kept[1].kind, EntityKind::DateTime);
    }

    #[tokio::test]
    async fn low_scores_and_other_kinds_are_ignored() {
        let spans = vec![
            EntitySpan::new(EntityKind::Person, 0, 5, 0.2),
            EntitySpan::new(EntityKind::EmailAddress, 6, 11, 0.9),
        ];
        let config = AnonymizerConfig {
            min_score: 0.5,
            ..AnonymizerConfig::default()
        };
        let anonymizer = Anonymizer::new(Scripted(spans), PlaceholderSurrogates::new(), config);
        let result = anonymizer.anonymize("Maria a@b.c", Language::En).await.unwrap();

        assert_eq!(result.text, "Maria a@b.c");
    }

    #[tokio::test]
    async fn out_of_bounds_span_is_rejected() {
        let anonymizer = Anonymizer::new(
            Scripted(vec![EntitySpan::new(EntityKind::Person, 0, 99, 1.0)]),
            PlaceholderSurrogates::new(),
            AnonymizerConfig::default(),
        );
        let error = anonymizer.anonymize("short", Language::En).await.unwrap_err();

        assert!(matches!(error, AnonymizeError::InvalidSpan { end: 99, .. }));
    }

    #[tokio::test]
    async fn detector_failure_is_reported() {
        let anonymizer = Anonymizer::new(
            Offline,
            PlaceholderSurrogates::new(),
            AnonymizerConfig::default(),
        );
        let error = anonymizer.anonymize("Maria", Language::En).await.unwrap_err();

        assert!(matches!(
            error,
            AnonymizeError::DetectionUnavailable { detector, .. } if detector == "offline"
        ));
    }

    #[tokio::test]
    async fn detects_language_when_not_given() {
        let anonymizer = placeholder_anonymizer();
        let result = anonymizer
            .anonymize_detecting_language("Eu sou a Maria e moro em São Paulo")
            .await
            .unwrap();

        assert_eq!(result.language, Language::Pt);
        assert_eq!(result.text, "Eu sou a <PERSON_1> e moro em <LOCATION_1>");
    }
}
