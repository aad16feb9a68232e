use std::fmt;
use std::fs;
use std::hash::Hash;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::RegistryError;
use crate::models::ParameterSchema;

/// A closed set of intents an application routes to.
///
/// Implemented by a plain enum so the dispatch site can `match` exhaustively.
pub trait IntentLabel: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn name(self) -> &'static str;

    fn parse(value: &str) -> Option<Self>;

    fn parameter_schema(self) -> Option<ParameterSchema> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intent<L> {
    pub label: L,
    pub reference_phrases: Vec<String>,
    pub parameter_schema: Option<ParameterSchema>,
}

impl<L: IntentLabel> Intent<L> {
    /// Builds an intent, taking the label's own parameter schema if it declares one.
    pub fn new<I, S>(label: L, reference_phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label,
            reference_phrases: reference_phrases.into_iter().map(Into::into).collect(),
            parameter_schema: label.parameter_schema(),
        }
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = Some(schema);
        self
    }

    pub fn name(&self) -> &'static str {
        self.label.name()
    }
}

#[derive(Debug, Deserialize)]
struct LabeledPhrase {
    text: String,
    intent: String,
}

/// Intents in registration order. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct IntentRegistry<L> {
    namespace: Option<String>,
    intents: Vec<Intent<L>>,
}

impl<L: IntentLabel> Default for IntentRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: IntentLabel> IntentRegistry<L> {
    pub fn new() -> Self {
        Self {
            namespace: None,
            intents: Vec::new(),
        }
    }

    /// A registry whose classification results are tagged with `namespace`.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            intents: Vec::new(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn register(&mut self, intent: Intent<L>) -> Result<(), RegistryError> {
        if self
            .intents
            .iter()
            .any(|existing| existing.name() == intent.name())
        {
            return Err(RegistryError::DuplicateIntent {
                name: intent.name().to_string(),
            });
        }

        self.intents.push(intent);
        Ok(())
    }

    pub fn all(&self) -> impl Iterator<Item = &Intent<L>> + '_ {
        self.intents.iter()
    }

    pub fn get(&self, label: L) -> Option<&Intent<L>> {
        self.intents.iter().find(|intent| intent.label == label)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Loads `{"intent": "...", "text": "..."}` lines. Intents are registered in the
    /// order their first phrase appears; lines with unknown intent names are skipped.
    pub fn from_jsonl(
        path: impl AsRef<Path>,
        namespace: Option<String>,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut grouped: Vec<(L, Vec<String>)> = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let phrase: LabeledPhrase = serde_json::from_str(line)
                .map_err(|source| RegistryError::Parse {
                    line: idx + 1,
                    source,
                })?;
            let Some(label) = L::parse(&phrase.intent) else {
                warn!(line = idx + 1, intent = %phrase.intent, "skipping phrase for unknown intent");
                continue;
            };

            match grouped.iter_mut().find(|(existing, _)| *existing == label) {
                Some((_, phrases)) => phrases.push(phrase.text),
                None => grouped.push((label, vec![phrase.text])),
            }
        }

        if grouped.is_empty() {
            return Err(RegistryError::Empty {
                path: path.display().to_string(),
            });
        }

        let mut registry = Self {
            namespace,
            intents: Vec::new(),
        };
        for (label, phrases) in grouped {
            registry.register(Intent::new(label, phrases))?;
        }
        Ok(registry)
    }
}
