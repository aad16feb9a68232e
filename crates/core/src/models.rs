use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::IntentLabel;

/// Sentinel intent name reported when no intent clears the threshold.
pub const NO_INTENT: &str = "none";

/// Score reported for empty input and empty registries.
pub const MIN_SCORE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Pt,
    En,
    Es,
    Fr,
    Ru,
    Ar,
    He,
    Unknown,
}

impl Language {
    pub fn from_optional_str(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "pt" || v == "pt-br" || v == "pt_br" || v == "portuguese" => Self::Pt,
            Some(v) if v == "en" || v == "en-us" || v == "en_us" || v == "english" => Self::En,
            Some(v) if v == "es" || v == "es-es" || v == "spanish" => Self::Es,
            Some(v) if v == "fr" || v == "fr-fr" || v == "french" => Self::Fr,
            Some(v) if v == "ru" || v == "ru-ru" || v == "russian" => Self::Ru,
            Some(v) if v == "ar" || v == "ar-sa" || v == "arabic" => Self::Ar,
            Some(v) if v == "he" || v == "he-il" || v == "hebrew" => Self::He,
            _ => Self::Unknown,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Pt => "pt",
            Self::En => "en",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::Ru => "ru",
            Self::Ar => "ar",
            Self::He => "he",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Location,
    DateTime,
    EmailAddress,
    PhoneNumber,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Person,
        Self::Location,
        Self::DateTime,
        Self::EmailAddress,
        Self::PhoneNumber,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Location => "LOCATION",
            Self::DateTime => "DATE_TIME",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::PhoneNumber => "PHONE_NUMBER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().replace('-', "_").as_str() {
            "PERSON" | "PER" => Some(Self::Person),
            "LOCATION" | "LOC" => Some(Self::Location),
            "DATE_TIME" | "DATE" => Some(Self::DateTime),
            "EMAIL_ADDRESS" | "EMAIL" => Some(Self::EmailAddress),
            "PHONE_NUMBER" | "PHONE" => Some(Self::PhoneNumber),
            _ => None,
        }
    }

    /// Parses a comma separated list, skipping blanks and unknown kinds.
    pub fn parse_list(value: &str) -> Vec<Self> {
        let mut kinds = Vec::new();
        for kind in value.split(',').filter_map(Self::parse) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected PII span. Offsets are byte offsets into the analyzed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

impl EntitySpan {
    pub fn new(kind: EntityKind, start: usize, end: usize, score: f32) -> Self {
        Self {
            kind,
            start,
            end,
            score,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// An anonymized entity: the span in the source text and the surrogate that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
    pub surrogate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub kind: EntityKind,
    pub surrogate: String,
    pub original: String,
}

/// Surrogate → original lookup for one anonymization round trip.
///
/// Surrogates are unique within a mapping, and an original value that occurs several
/// times is represented by a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizationMapping {
    entries: Vec<MappingEntry>,
}

impl AnonymizationMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn original_for(&self, surrogate: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.surrogate == surrogate)
            .map(|entry| entry.original.as_str())
    }

    pub fn surrogate_for(&self, kind: EntityKind, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.kind == kind && entry.original == original)
            .map(|entry| entry.surrogate.as_str())
    }

    pub fn contains_surrogate(&self, surrogate: &str) -> bool {
        self.original_for(surrogate).is_some()
    }

    /// Adds an entry. Returns false and leaves the mapping untouched when the surrogate
    /// is already taken.
    pub fn insert(&mut self, kind: EntityKind, surrogate: String, original: String) -> bool {
        if self.contains_surrogate(&surrogate) {
            return false;
        }
        self.entries.push(MappingEntry {
            kind,
            surrogate,
            original,
        });
        true
    }

    /// Grouped view, `{"PERSON": {"<surrogate>": "<original>"}}`.
    pub fn by_kind(&self) -> BTreeMap<EntityKind, BTreeMap<String, String>> {
        let mut grouped: BTreeMap<EntityKind, BTreeMap<String, String>> = BTreeMap::new();
        for entry in &self.entries {
            grouped
                .entry(entry.kind)
                .or_default()
                .insert(entry.surrogate.clone(), entry.original.clone());
        }
        grouped
    }
}

/// JSON-schema style description of the parameters a handler expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Names listed under `required`, in schema order.
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|value| value.as_array())
            .map(|values| values.iter().filter_map(|value| value.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult<L> {
    #[serde(skip)]
    pub intent: Option<L>,
    pub intent_name: String,
    pub score: f32,
    pub raw_text: String,
    pub namespace: Option<String>,
}

impl<L: IntentLabel> ClassificationResult<L> {
    pub fn matched(intent: L, score: f32, raw_text: &str, namespace: Option<&str>) -> Self {
        Self {
            intent: Some(intent),
            intent_name: intent.name().to_string(),
            score,
            raw_text: raw_text.to_string(),
            namespace: namespace.map(ToString::to_string),
        }
    }

    pub fn none(score: f32, raw_text: &str, namespace: Option<&str>) -> Self {
        Self {
            intent: None,
            intent_name: NO_INTENT.to_string(),
            score,
            raw_text: raw_text.to_string(),
            namespace: namespace.map(ToString::to_string),
        }
    }

    pub fn is_none(&self) -> bool {
        self.intent.is_none()
    }

    /// `namespace/intent_name`, or the bare name for unscoped registries.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}/{}", self.intent_name),
            None => self.intent_name.clone(),
        }
    }
}
