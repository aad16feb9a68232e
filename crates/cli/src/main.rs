use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prism_agents::workspace::{dataset_path, load_registry};
use prism_agents::{
    DispatchOutcome, Dispatcher, WorkspaceHandler, WorkspaceIntent, WorkspaceParameters,
};
use prism_anonymizer::{
    Anonymizer, AnonymizerConfig, FakerLocale, LocaleFaker, MatchingStrategy,
    PlaceholderSurrogates, RuleBasedDetector, SurrogateGenerator,
};
use prism_core::{detect_language, AnonymizationMapping, EntityKind, IntentRegistry, Language};
use prism_ml::{BackendKind, IntentClassifier, MlStack, SemanticClassifier, SimilarityStack};
use prism_observability::{init_tracing, AppMetrics};
use prism_similarity::EmbeddingModel;
use serde_json::json;
use tracing::info;

type WorkspaceDispatcher = Dispatcher<
    SemanticClassifier<WorkspaceIntent, SimilarityStack>,
    WorkspaceHandler,
    WorkspaceParameters,
>;

#[derive(Debug, Parser)]
#[command(name = "prism")]
#[command(about = "Intent routing and reversible PII anonymization")]
struct Cli {
    /// JSONL intent dataset; the built-in workspace routes are used when absent.
    #[arg(long, env = "PRISM_INTENT_DATASET")]
    intents: Option<PathBuf>,

    /// Tags classification results as `<namespace>/<intent>`.
    #[arg(long)]
    namespace: Option<String>,

    #[arg(long, env = "PRISM_CLASSIFIER_THRESHOLD")]
    threshold: Option<f32>,

    #[arg(long, env = "PRISM_CLASSIFIER_BACKEND", default_value = "lexical")]
    backend: String,

    #[arg(long, global = true, env = "PRISM_EMBED_DIMS", default_value_t = 192)]
    dims: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints the classification of TEXT.
    Classify { text: String },
    /// Classifies TEXT and runs the bound workspace handler.
    Route { text: String },
    /// Interactive routing loop.
    Chat,
    Anonymize {
        text: String,
        /// Language code; guessed from the text when omitted.
        #[arg(long)]
        language: Option<String>,
        /// Comma separated entity kinds, e.g. PERSON,LOCATION.
        #[arg(long, env = "PRISM_ENTITY_KINDS")]
        kinds: Option<String>,
        #[arg(long, env = "PRISM_FAKER_LOCALE", default_value = "pt_br")]
        locale: String,
        #[arg(long, env = "PRISM_FAKER_SEED")]
        seed: Option<u64>,
        /// Use `<KIND_n>` tokens instead of fake values.
        #[arg(long)]
        placeholders: bool,
        /// Writes the mapping as JSON for a later `deanonymize`.
        #[arg(long)]
        mapping_out: Option<PathBuf>,
    },
    Deanonymize {
        text: String,
        #[arg(long)]
        mapping: PathBuf,
        /// Max edit distance for paraphrased surrogates; 0 matches exactly.
        #[arg(long, env = "PRISM_FUZZY_DISTANCE", default_value_t = 0)]
        fuzzy: usize,
    },
    DetectLanguage { text: String },
    /// Prints the hash embedding of TEXT.
    Embed { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("prism_cli");
    let cli = Cli::parse();

    match &cli.command {
        Command::Classify { text } => {
            let classifier = build_classifier(&cli)?;
            let result = classifier.classify(text).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Route { text } => {
            let dispatcher = build_dispatcher(&cli)?;
            let outcome = dispatcher.handle(text).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Chat => run_chat(build_dispatcher(&cli)?).await?,
        Command::Anonymize {
            text,
            language,
            kinds,
            locale,
            seed,
            placeholders,
            mapping_out,
        } => {
            let mut config = AnonymizerConfig::default();
            if let Some(kinds) = kinds {
                let parsed = EntityKind::parse_list(kinds);
                anyhow::ensure!(!parsed.is_empty(), "no known entity kinds in '{kinds}'");
                config.kinds = parsed;
            }
            let language = language
                .as_deref()
                .map(|code| Language::from_optional_str(Some(code)));

            if *placeholders {
                let generator = PlaceholderSurrogates::new();
                run_anonymize(generator, config, text, language, mapping_out.as_deref()).await?;
            } else {
                let locale = FakerLocale::parse(locale)
                    .with_context(|| format!("unsupported faker locale '{locale}'"))?;
                let faker = match seed {
                    Some(seed) => LocaleFaker::seeded(locale, *seed),
                    None => LocaleFaker::new(locale),
                };
                run_anonymize(faker, config, text, language, mapping_out.as_deref()).await?;
            }
        }
        Command::Deanonymize {
            text,
            mapping,
            fuzzy,
        } => {
            let mapping = read_mapping(mapping)?;
            let restored = prism_anonymizer::deanonymize(
                text,
                &mapping,
                MatchingStrategy::from_distance(*fuzzy),
            );
            println!("{restored}");
        }
        Command::DetectLanguage { text } => {
            println!("{}", detect_language(None, text).as_code());
        }
        Command::Embed { text } => {
            let stack = MlStack::new(BackendKind::HashEmbedding, cli.dims, None);
            let vector = stack.embedder.embed(text)?;
            println!(
                "{}",
                serde_json::to_string(&json!({
                    "model": stack.embedder.model_name(),
                    "dims": vector.len(),
                    "vector": vector,
                }))?
            );
        }
    }

    Ok(())
}

fn build_stack(cli: &Cli) -> Result<MlStack> {
    let kind = BackendKind::parse(&cli.backend)
        .with_context(|| format!("unknown classifier backend '{}'", cli.backend))?;
    Ok(MlStack::new(kind, cli.dims, cli.threshold))
}

fn build_registry(cli: &Cli) -> Result<Arc<IntentRegistry<WorkspaceIntent>>> {
    let path = cli.intents.clone().unwrap_or_else(dataset_path);
    load_registry(&path, cli.namespace.clone()).context("failed building the intent registry")
}

fn build_classifier(cli: &Cli) -> Result<SemanticClassifier<WorkspaceIntent, SimilarityStack>> {
    Ok(build_stack(cli)?.classifier(build_registry(cli)?))
}

fn build_dispatcher(cli: &Cli) -> Result<WorkspaceDispatcher> {
    Ok(Dispatcher::new(build_classifier(cli)?, WorkspaceHandler)
        .with_extractor(WorkspaceParameters)
        .with_metrics(AppMetrics::shared()))
}

async fn run_anonymize<G: SurrogateGenerator>(
    generator: G,
    config: AnonymizerConfig,
    text: &str,
    language: Option<Language>,
    mapping_out: Option<&Path>,
) -> Result<()> {
    let detector =
        RuleBasedDetector::with_default_gazetteers().context("failed building entity detector")?;
    let anonymizer = Anonymizer::new(detector, generator, config);

    let anonymized = match language {
        Some(language) => anonymizer.anonymize(text, language).await?,
        None => anonymizer.anonymize_detecting_language(text).await?,
    };

    if let Some(path) = mapping_out {
        let raw = serde_json::to_string_pretty(&anonymized.mapping)?;
        fs::write(path, raw)
            .with_context(|| format!("failed writing mapping to {}", path.display()))?;
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "text": anonymized.text,
            "language": anonymized.language,
            "entities": anonymized.entities,
            "mapping": anonymized.mapping.by_kind(),
        }))?
    );
    Ok(())
}

fn read_mapping(path: &Path) -> Result<AnonymizationMapping> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading mapping from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("mapping file {} is not valid JSON", path.display()))
}

async fn run_chat(dispatcher: WorkspaceDispatcher) -> Result<()> {
    println!("Prism routing chat. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        match dispatcher.handle(message).await? {
            DispatchOutcome::Handled {
                classification,
                reply,
                ..
            } => println!(
                "\n[{} {:.2}] {}\n",
                classification.qualified_name(),
                classification.score,
                reply.text
            ),
            DispatchOutcome::NoHandler {
                classification,
                message,
            } => println!(
                "\n[{} {:.2}] {}\n",
                classification.qualified_name(),
                classification.score,
                message
            ),
        }
    }

    info!(metrics = ?dispatcher.metrics().snapshot(), "chat ended");
    Ok(())
}
