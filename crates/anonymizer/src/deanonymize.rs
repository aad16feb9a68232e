use aho_corasick::{AhoCorasick, MatchKind};
use prism_core::AnonymizationMapping;
use serde::{Deserialize, Serialize};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// How surrogates are located in text handed back for deanonymization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchingStrategy {
    /// Whole-word, case-sensitive occurrences only.
    #[default]
    Exact,
    /// Also accepts word windows within `max_edit_distance` of a surrogate, for text a
    /// generation service paraphrased. The distance is further capped at a third of the
    /// surrogate length.
    Fuzzy { max_edit_distance: usize },
}

impl MatchingStrategy {
    pub fn from_distance(max_edit_distance: usize) -> Self {
        if max_edit_distance == 0 {
            Self::Exact
        } else {
            Self::Fuzzy { max_edit_distance }
        }
    }
}

#[derive(Debug, Clone)]
struct Replacement<'a> {
    start: usize,
    end: usize,
    original: &'a str,
}

impl Replacement<'_> {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Puts originals back in place of surrogates. Text that matches no surrogate is left
/// as it is.
pub fn deanonymize(text: &str, mapping: &AnonymizationMapping, strategy: MatchingStrategy) -> String {
    if text.is_empty() || mapping.is_empty() {
        return text.to_string();
    }

    let mut replacements = exact_matches(text, mapping);
    if let MatchingStrategy::Fuzzy { max_edit_distance } = strategy {
        if max_edit_distance > 0 {
            let fuzzy = fuzzy_matches(text, mapping, &replacements, max_edit_distance);
            replacements.extend(fuzzy);
        }
    }
    replacements.sort_by_key(|replacement| replacement.start);

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for replacement in replacements {
        if replacement.start < cursor {
            continue;
        }
        output.push_str(&text[cursor..replacement.start]);
        output.push_str(replacement.original);
        cursor = replacement.end;
    }
    output.push_str(&text[cursor..]);
    output
}

fn exact_matches<'a>(text: &str, mapping: &'a AnonymizationMapping) -> Vec<Replacement<'a>> {
    let entries = mapping
        .entries()
        .iter()
        .filter(|entry| !entry.surrogate.is_empty())
        .collect::<Vec<_>>();
    let automaton = match AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(entries.iter().map(|entry| entry.surrogate.as_str()))
    {
        Ok(automaton) => automaton,
        Err(error) => {
            warn!(error = %error, "failed to build surrogate automaton");
            return Vec::new();
        }
    };

    automaton
        .find_iter(text)
        .filter(|found| is_whole_word(text, found.start(), found.end()))
        .map(|found| Replacement {
            start: found.start(),
            end: found.end(),
            original: entries[found.pattern().as_usize()].original.as_str(),
        })
        .collect()
}

fn fuzzy_matches<'a>(
    text: &str,
    mapping: &'a AnonymizationMapping,
    taken: &[Replacement<'a>],
    max_edit_distance: usize,
) -> Vec<Replacement<'a>> {
    let words = text.unicode_word_indices().collect::<Vec<_>>();
    let mut found: Vec<Replacement<'a>> = Vec::new();

    for entry in mapping.entries() {
        let Some(target) = FuzzyTarget::new(&entry.surrogate, max_edit_distance) else {
            continue;
        };

        for window in words.windows(target.width) {
            let (start, end) = window_bounds(window);
            if taken.iter().chain(found.iter()).any(|r| r.overlaps(start, end)) {
                continue;
            }
            if target.matches(&text[start..end]) {
                found.push(Replacement {
                    start,
                    end,
                    original: entry.original.as_str(),
                });
            }
        }
    }

    found
}

/// Whether fuzzy deanonymization under `strategy` would take some run of words in
/// `text` for `surrogate`.
pub(crate) fn fuzzy_collides(surrogate: &str, text: &str, strategy: MatchingStrategy) -> bool {
    let MatchingStrategy::Fuzzy { max_edit_distance } = strategy else {
        return false;
    };
    let Some(target) = FuzzyTarget::new(surrogate, max_edit_distance) else {
        return false;
    };

    let words = text.unicode_word_indices().collect::<Vec<_>>();
    words.windows(target.width).any(|window| {
        let (start, end) = window_bounds(window);
        target.matches(&text[start..end])
    })
}

/// A surrogate prepared for fuzzy comparison against word windows.
struct FuzzyTarget {
    lowered: String,
    len: usize,
    width: usize,
    budget: usize,
}

impl FuzzyTarget {
    /// `None` when the surrogate is too short to allow any edit.
    fn new(surrogate: &str, max_edit_distance: usize) -> Option<Self> {
        let lowered = surrogate.to_lowercase();
        let len = lowered.chars().count();
        let width = surrogate.unicode_words().count();
        let budget = max_edit_distance.min(len / 3);
        (width > 0 && budget > 0).then_some(Self {
            lowered,
            len,
            width,
            budget,
        })
    }

    fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        candidate.chars().count().abs_diff(self.len) <= self.budget
            && levenshtein(&candidate, &self.lowered) <= self.budget
    }
}

fn window_bounds(window: &[(usize, &str)]) -> (usize, usize) {
    let (last_start, last_word) = window[window.len() - 1];
    (window[0].0, last_start + last_word.len())
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let matched = &text[start..end];
    let starts_alnum = matched.chars().next().is_some_and(char::is_alphanumeric);
    let ends_alnum = matched.chars().next_back().is_some_and(char::is_alphanumeric);
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();

    !(starts_alnum && before.is_some_and(char::is_alphanumeric))
        && !(ends_alnum && after.is_some_and(char::is_alphanumeric))
}

pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars = b.chars().collect::<Vec<_>>();
    let mut previous = (0..=b_chars.len()).collect::<Vec<_>>();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, a_char) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(a_char != *b_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}
