use once_cell::sync::Lazy;
use prism_core::{EntityKind, EntitySpan, Language};
use prism_similarity::BackendError;
use regex::Regex;

pub trait EntityDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spans of the requested kinds, as byte offsets into `text`. Spans may overlap.
    async fn detect_entities(
        &self,
        text: &str,
        language: Language,
        kinds: &[EntityKind],
    ) -> Result<Vec<EntitySpan>, BackendError>;
}

const GAZETTEER_SCORE: f32 = 0.85;
const DATE_SCORE: f32 = 0.6;
const EMAIL_SCORE: f32 = 1.0;
const PHONE_SCORE: f32 = 0.75;

const DEFAULT_PERSONS: &[&str] = &[
    "Maria", "João", "Paulo", "Ana", "Carlos", "José", "Pedro", "Lucas", "Mariana", "Fernanda",
    "Rafael", "Juliana", "John", "Mary", "James", "Emma", "Olivia", "Michael", "Sarah", "David",
];
const DEFAULT_LOCATIONS: &[&str] = &[
    "São Paulo",
    "Rio de Janeiro",
    "Belo Horizonte",
    "Porto Alegre",
    "Brasília",
    "Curitiba",
    "Recife",
    "Lisboa",
    "Lisbon",
    "Paris",
    "London",
    "New York",
    "Boston",
    "Berlin",
    "Madrid",
];

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid iso date regex"));
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("valid slash date regex"));
static EN_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}|\d{1,2}\s+(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{4})\b",
    )
    .expect("valid english date regex")
});
static PT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}\s+de\s+(?:janeiro|fevereiro|março|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)(?:\s+de\s+\d{4})?\b",
    )
    .expect("valid portuguese date regex")
});
static ES_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}\s+de\s+(?:enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre)(?:\s+de\s+\d{4})?\b",
    )
    .expect("valid spanish date regex")
});
static FR_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}\s+(?:janvier|février|mars|avril|mai|juin|juillet|août|septembre|octobre|novembre|décembre)\s+\d{4}\b",
    )
    .expect("valid french date regex")
});
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,3}\)|\b\d{2,3})[\s.-]?\d{4,5}[\s.-]?\d{4}\b")
        .expect("valid phone regex")
});

/// Gazetteer and pattern based detection.
///
/// Names and places come from word lists; dates, e-mails and phone numbers from
/// patterns. A hit lying inside a longer hit of another kind is dropped, so the
/// "Paulo" of "São Paulo" is no PERSON. Remaining neighbouring name or place hits
/// separated only by whitespace are merged, so "João Paulo" is one PERSON.
#[derive(Debug, Clone)]
pub struct RuleBasedDetector {
    persons: Option<Regex>,
    locations: Option<Regex>,
}

impl RuleBasedDetector {
    pub fn new<P, L>(persons: P, locations: L) -> Result<Self, regex::Error>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        Ok(Self {
            persons: gazetteer(persons)?,
            locations: gazetteer(locations)?,
        })
    }

    pub fn with_default_gazetteers() -> Result<Self, regex::Error> {
        Self::new(DEFAULT_PERSONS, DEFAULT_LOCATIONS)
    }

    fn detect_kind(&self, text: &str, language: Language, kind: EntityKind) -> Vec<EntitySpan> {
        match kind {
            EntityKind::Person => self
                .persons
                .as_ref()
                .map(|regex| find_all(regex, text, kind, GAZETTEER_SCORE))
                .unwrap_or_default(),
            EntityKind::Location => self
                .locations
                .as_ref()
                .map(|regex| find_all(regex, text, kind, GAZETTEER_SCORE))
                .unwrap_or_default(),
            EntityKind::DateTime => {
                let mut spans = find_all(&ISO_DATE, text, kind, DATE_SCORE);
                spans.extend(find_all(&SLASH_DATE, text, kind, DATE_SCORE));
                let named = match language {
                    Language::Pt => Some(&*PT_DATE),
                    Language::Es => Some(&*ES_DATE),
                    Language::Fr => Some(&*FR_DATE),
                    Language::En | Language::Unknown => Some(&*EN_DATE),
                    Language::Ru | Language::Ar | Language::He => None,
                };
                if let Some(regex) = named {
                    spans.extend(find_all(regex, text, kind, DATE_SCORE));
                }
                spans
            }
            EntityKind::EmailAddress => find_all(&EMAIL, text, kind, EMAIL_SCORE),
            EntityKind::PhoneNumber => find_all(&PHONE, text, kind, PHONE_SCORE),
        }
    }
}

impl EntityDetector for RuleBasedDetector {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    async fn detect_entities(
        &self,
        text: &str,
        language: Language,
        kinds: &[EntityKind],
    ) -> Result<Vec<EntitySpan>, BackendError> {
        // gazetteer kinds are always scanned so their hits can shadow each other
        let mut scanned = kinds.to_vec();
        for kind in [EntityKind::Person, EntityKind::Location] {
            if !scanned.contains(&kind) {
                scanned.push(kind);
            }
        }
        let hits = drop_nested(
            scanned
                .iter()
                .flat_map(|kind| self.detect_kind(text, language, *kind))
                .collect(),
        );

        let mut spans = Vec::with_capacity(hits.len());
        for kind in kinds {
            let same_kind = hits
                .iter()
                .filter(|hit| hit.kind == *kind)
                .cloned()
                .collect::<Vec<_>>();
            match kind {
                EntityKind::Person | EntityKind::Location => {
                    spans.extend(merge_adjacent(text, same_kind))
                }
                _ => spans.extend(same_kind),
            }
        }
        Ok(spans)
    }
}

/// Drops hits enclosed by a longer hit of a different kind.
fn drop_nested(hits: Vec<EntitySpan>) -> Vec<EntitySpan> {
    hits.iter()
        .filter(|hit| {
            !hits.iter().any(|other| {
                other.kind != hit.kind
                    && other.len() > hit.len()
                    && other.start <= hit.start
                    && hit.end <= other.end
            })
        })
        .cloned()
        .collect()
}

fn gazetteer<I>(words: I) -> Result<Option<Regex>, regex::Error>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut words = words
        .into_iter()
        .map(|word| word.as_ref().trim().to_string())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    if words.is_empty() {
        return Ok(None);
    }

    // longest alternatives first so "São Paulo" beats "São"
    words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    words.dedup();
    let alternation = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).map(Some)
}

fn find_all(regex: &Regex, text: &str, kind: EntityKind, score: f32) -> Vec<EntitySpan> {
    regex
        .find_iter(text)
        .map(|found| EntitySpan::new(kind, found.start(), found.end(), score))
        .collect()
}

fn merge_adjacent(text: &str, spans: Vec<EntitySpan>) -> Vec<EntitySpan> {
    let mut merged: Vec<EntitySpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = merged.last_mut() {
            let gap = &text[last.end..span.start.max(last.end)];
            if span.start > last.end && gap.chars().all(|ch| ch == ' ' || ch == '\t') {
                last.end = span.end;
                continue;
            }
        }
        merged.push(span);
    }
    merged
}

/// A labelled span as returned by an external NER model.
#[derive(Debug, Clone, PartialEq)]
pub struct NerSpan {
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

pub trait NerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, text: &str, language: Language) -> Result<Vec<NerSpan>, BackendError>;
}

/// Maps model-specific NER labels onto entity kinds.
#[derive(Debug, Clone)]
pub struct LabelGroups {
    groups: Vec<(EntityKind, Vec<String>)>,
}

impl Default for LabelGroups {
    fn default() -> Self {
        Self::new()
            .group(EntityKind::Person, ["personName", "PER", "PERSON"])
            .group(EntityKind::Location, ["placeName", "geogName", "LOC", "GPE", "LOCATION"])
            .group(EntityKind::DateTime, ["date", "time", "DATE", "TIME"])
    }
}

impl LabelGroups {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    pub fn group<I, S>(mut self, kind: EntityKind, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels.into_iter().map(Into::into);
        match self.groups.iter_mut().find(|(existing, _)| *existing == kind) {
            Some((_, existing)) => existing.extend(labels),
            None => self.groups.push((kind, labels.collect())),
        }
        self
    }

    pub fn kind_for(&self, label: &str) -> Option<EntityKind> {
        self.groups
            .iter()
            .find(|(_, labels)| labels.iter().any(|candidate| candidate == label))
            .map(|(kind, _)| *kind)
    }
}

/// Adapts an external NER model into an [`EntityDetector`].
pub struct NerDetector<B> {
    backend: B,
    labels: LabelGroups,
}

impl<B: NerBackend> NerDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            labels: LabelGroups::default(),
        }
    }

    pub fn with_labels(mut self, labels: LabelGroups) -> Self {
        self.labels = labels;
        self
    }
}

impl<B: NerBackend> EntityDetector for NerDetector<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    async fn detect_entities(
        &self,
        text: &str,
        language: Language,
        kinds: &[EntityKind],
    ) -> Result<Vec<EntitySpan>, BackendError> {
        let spans = self.backend.recognize(text, language).await?;
        Ok(spans
            .into_iter()
            .filter_map(|span| {
                let kind = self.labels.kind_for(&span.label)?;
                kinds
                    .contains(&kind)
                    .then(|| EntitySpan::new(kind, span.start, span.end, span.score))
            })
            .collect())
    }
}
