use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use futures::stream::{self, StreamExt, TryStreamExt};
use prism_agents::workspace::load_registry;
use prism_agents::{
    timed_stream, DispatchError, DispatchOutcome, Dispatcher, GenerationError, GenerationService,
    HandlerCall, HandlerError, HandlerReply, IntentHandler, MappingSessions, PrivateCompletion,
    PromptTemplate, TextStream, WorkspaceHandler, WorkspaceIntent, WorkspaceParameters,
};
use prism_anonymizer::{
    Anonymizer, AnonymizerConfig, FakerLocale, LocaleFaker, MatchingStrategy,
    PlaceholderSurrogates, RuleBasedDetector,
};
use prism_core::{
    ClassifierError, EntityKind, Intent, IntentLabel, IntentRegistry, Language, MIN_SCORE,
    NO_INTENT,
};
use prism_ml::{BackendKind, IntentClassifier, MlStack, SemanticClassifier};
use prism_observability::AppMetrics;
use prism_similarity::{BackendError, LexicalSimilarity, SimilarityBackend};
use prism_storage::MemoryStore;

fn dataset() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/intents/workspace.jsonl")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Talk {
    Greeting,
    Farewell,
}

impl IntentLabel for Talk {
    fn name(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "greeting" => Some(Self::Greeting),
            "farewell" => Some(Self::Farewell),
            _ => None,
        }
    }
}

struct TalkHandler;

impl IntentHandler for TalkHandler {
    type Label = Talk;

    fn handle(&self, call: HandlerCall<'_, Talk>) -> Result<Option<HandlerReply>, HandlerError> {
        Ok(Some(match call.intent {
            Talk::Greeting => HandlerReply::text("hello"),
            Talk::Farewell => HandlerReply::text("see you"),
        }))
    }
}

fn talk_registry() -> Arc<IntentRegistry<Talk>> {
    let mut registry = IntentRegistry::new();
    registry
        .register(Intent::new(Talk::Greeting, ["hello", "hi"]))
        .expect("greeting registers");
    registry
        .register(Intent::new(Talk::Farewell, ["bye", "goodbye"]))
        .expect("farewell registers");
    Arc::new(registry)
}

struct Unreachable;

impl SimilarityBackend for Unreachable {
    fn name(&self) -> &'static str {
        "remote-embeddings"
    }

    fn default_threshold(&self) -> f32 {
        0.5
    }

    async fn similarity(&self, _: &str, _: &str) -> Result<f32, BackendError> {
        Err(BackendError::new("remote-embeddings", "connection refused"))
    }
}

/// Answers with the first line of the prompt, the way a chat model quoting its input would.
struct Echo;

impl GenerationService for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let first_line = prompt.lines().next().unwrap_or_default();
        Ok(format!("Resposta: {first_line}"))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let words = prompt
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect::<Vec<_>>();
        Ok(stream::iter(words).boxed())
    }
}

#[tokio::test]
async fn greeting_and_farewell_route_lexically() {
    let classifier = SemanticClassifier::new(talk_registry(), LexicalSimilarity::new());
    let dispatcher = Dispatcher::new(classifier, TalkHandler);

    let outcome = dispatcher.handle("hi there").await.unwrap();
    assert_eq!(outcome.classification().intent_name, "greeting");
    assert_eq!(outcome.reply().unwrap().text, "hello");

    let outcome = dispatcher.handle("goodbye").await.unwrap();
    assert_eq!(outcome.reply().unwrap().text, "see you");
}

#[tokio::test]
async fn empty_input_is_none_not_an_error() {
    let classifier = SemanticClassifier::new(talk_registry(), LexicalSimilarity::new());
    let result = classifier.classify("").await.unwrap();

    assert_eq!(result.intent_name, NO_INTENT);
    assert_eq!(result.score, MIN_SCORE);
}

#[tokio::test]
async fn unreachable_backend_surfaces_through_handle() {
    let classifier = SemanticClassifier::new(talk_registry(), Unreachable);
    let dispatcher = Dispatcher::new(classifier, TalkHandler);

    let error = dispatcher.handle("hello").await.unwrap_err();
    match error {
        DispatchError::Classifier(ClassifierError::Unavailable { backend, reason }) => {
            assert_eq!(backend, "remote-embeddings");
            assert_eq!(reason, "connection refused");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn dataset_phrases_classify_as_their_intent_on_every_backend() {
    let registry = load_registry(&dataset(), None).unwrap();
    assert_eq!(registry.len(), 2);

    for kind in [BackendKind::Lexical, BackendKind::HashEmbedding] {
        let classifier = MlStack::new(kind, 192, None).classifier(registry.clone());
        for intent in registry.all() {
            for phrase in &intent.reference_phrases {
                let result = classifier.classify(phrase).await.unwrap();
                assert_eq!(result.intent, Some(intent.label), "{kind:?}: {phrase}");
            }
        }
    }
}

#[tokio::test]
async fn workspace_routes_reply_like_their_functions() {
    let registry = load_registry(&dataset(), Some("acme".to_string())).unwrap();
    let classifier = MlStack::new(BackendKind::Lexical, 192, None).classifier(registry);
    let metrics = AppMetrics::shared();
    let dispatcher = Dispatcher::new(classifier, WorkspaceHandler)
        .with_extractor(WorkspaceParameters)
        .with_metrics(metrics.clone());

    let outcome = dispatcher
        .handle("I need the balance sheet documents from 2019")
        .await
        .unwrap();
    assert_eq!(outcome.classification().qualified_name(), "acme/balancesheet_documents");
    assert_eq!(outcome.reply().unwrap().text, "Year: 2019");

    let outcome = dispatcher
        .handle("how many vacation days do I have left")
        .await
        .unwrap();
    assert_eq!(outcome.classification().intent, Some(WorkspaceIntent::Employees));
    assert_eq!(outcome.reply().unwrap().text, "Employees");

    let outcome = dispatcher.handle("order a pizza").await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::NoHandler { .. }));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.requests_total, 3);
    assert_eq!(snapshot.no_match_total, 1);
}

#[tokio::test]
async fn maria_in_paris_round_trips() {
    let detector = RuleBasedDetector::with_default_gazetteers().unwrap();
    let config = AnonymizerConfig {
        kinds: vec![EntityKind::Person, EntityKind::Location],
        ..AnonymizerConfig::default()
    };
    let anonymizer = Anonymizer::new(detector, LocaleFaker::seeded(FakerLocale::EnUs, 3), config);

    let source = "Maria lives in Paris";
    let anonymized = anonymizer.anonymize(source, Language::En).await.unwrap();

    assert_eq!(anonymized.entities.len(), 2);
    assert_eq!(anonymized.mapping.len(), 2);
    assert!(!anonymized.text.contains("Maria"));
    assert!(!anonymized.text.contains("Paris"));
    assert_eq!(anonymizer.deanonymize(&anonymized.text, &anonymized.mapping), source);
}

#[tokio::test]
async fn private_completion_restores_originals_in_the_answer() {
    let detector = RuleBasedDetector::with_default_gazetteers().unwrap();
    let anonymizer = Arc::new(Anonymizer::new(
        detector,
        PlaceholderSurrogates::new(),
        AnonymizerConfig::default(),
    ));
    let completion = PrivateCompletion::new(anonymizer, Echo, PromptTemplate::identity_pt_br());

    let answer = completion
        .complete(
            "Olá eu me chamo João Paulo, nasci em São Paulo no dia 2001-05-10",
            None,
        )
        .await
        .unwrap();

    assert_eq!(answer.anonymized.language, Language::Pt);
    assert!(!answer.prompt.contains("João"));
    assert!(!answer.prompt.contains("2001-05-10"));
    assert!(answer.completion.contains("<PERSON_1>"));
    assert_eq!(
        answer.answer,
        "Resposta: A partir dessas informações: Olá eu me chamo João Paulo, nasci em São Paulo \
         no dia 2001-05-10."
    );
}

#[tokio::test]
async fn retained_mapping_restores_a_streamed_answer() {
    let detector = RuleBasedDetector::with_default_gazetteers().unwrap();
    let anonymizer = Anonymizer::new(
        detector,
        LocaleFaker::seeded(FakerLocale::PtBr, 11),
        AnonymizerConfig::default(),
    );
    let anonymized = anonymizer
        .anonymize("Ana mora em Recife", Language::Pt)
        .await
        .unwrap();

    let sessions = MappingSessions::new(Arc::new(MemoryStore::new()), Duration::minutes(10));
    let session_id = sessions
        .retain(None, anonymized.mapping.clone())
        .await
        .unwrap();

    let metrics = AppMetrics::shared();
    let stream = Echo.generate_stream(&anonymized.text).await.unwrap();
    let chunks: Vec<String> = timed_stream(stream, Some(metrics.clone()))
        .try_collect()
        .await
        .unwrap();
    let streamed = chunks.concat();
    assert_eq!(streamed, anonymized.text);
    assert_eq!(metrics.snapshot().streams_total, 1);

    let restored = sessions
        .restore(&session_id, &streamed, MatchingStrategy::Exact)
        .await
        .unwrap();
    assert_eq!(restored, "Ana mora em Recife");
}
