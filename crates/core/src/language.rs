use unicode_segmentation::UnicodeSegmentation;

use crate::models::Language;

pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

const PT_STOPWORDS: &[&str] = &[
    "não", "você", "olá", "eu", "me", "chamo", "nasci", "em", "no", "na", "dia", "com", "uma",
    "um", "para", "que", "é", "de", "do", "da", "os", "as", "meu", "minha", "obrigado",
];
const EN_STOPWORDS: &[&str] = &[
    "the", "and", "is", "are", "my", "name", "i", "was", "born", "in", "on", "of", "to", "you",
    "what", "lives", "hello", "with", "a", "an",
];
const ES_STOPWORDS: &[&str] = &[
    "el", "la", "los", "las", "y", "es", "mi", "nombre", "llamo", "nací", "en", "hola", "con",
    "una", "un", "para", "que", "de", "del", "usted",
];
const FR_STOPWORDS: &[&str] = &[
    "le", "la", "les", "et", "est", "je", "suis", "mon", "nom", "appelle", "né", "en", "bonjour",
    "avec", "une", "un", "pour", "que", "de", "du", "vous",
];

/// Picks `explicit` when it is a known language, otherwise guesses from the text:
/// non-Latin scripts first, then Latin stop-word counts.
pub fn detect_language(explicit: Option<Language>, text: &str) -> Language {
    if let Some(language) = explicit {
        if language != Language::Unknown {
            return language;
        }
    }

    let mut hebrew_count = 0usize;
    let mut arabic_count = 0usize;
    let mut cyrillic_count = 0usize;
    let mut latin_count = 0usize;

    for ch in text.chars() {
        let code = ch as u32;
        if (0x0590..=0x05FF).contains(&code) {
            hebrew_count += 1;
        } else if (0x0600..=0x06FF).contains(&code) {
            arabic_count += 1;
        } else if (0x0400..=0x04FF).contains(&code) {
            cyrillic_count += 1;
        } else if ch.is_alphabetic() && (ch.is_ascii() || (0x00C0..=0x024F).contains(&code)) {
            latin_count += 1;
        }
    }

    if hebrew_count > latin_count && hebrew_count > 0 {
        return Language::He;
    }
    if arabic_count > latin_count && arabic_count > 0 {
        return Language::Ar;
    }
    if cyrillic_count > latin_count && cyrillic_count > 0 {
        return Language::Ru;
    }
    if latin_count == 0 {
        return Language::Unknown;
    }

    let lower = text.to_lowercase();
    let words = lower.unicode_words().collect::<Vec<_>>();
    let candidates = [
        (Language::Pt, PT_STOPWORDS),
        (Language::En, EN_STOPWORDS),
        (Language::Es, ES_STOPWORDS),
        (Language::Fr, FR_STOPWORDS),
    ];

    let mut best = Language::En;
    let mut best_hits = 0usize;
    for (language, stopwords) in candidates {
        let hits = words.iter().filter(|word| stopwords.contains(word)).count();
        if hits > best_hits {
            best = language;
            best_hits = hits;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_language_wins() {
        assert_eq!(
            detect_language(Some(Language::Fr), "hello my name is Maria"),
            Language::Fr
        );
    }

    #[test]
    fn detects_portuguese() {
        assert_eq!(
            detect_language(None, "Olá eu me chamo João Paulo, nasci em São Paulo"),
            Language::Pt
        );
    }

    #[test]
    fn detects_english_and_scripts() {
        assert_eq!(detect_language(None, "Maria lives in Paris"), Language::En);
        assert_eq!(detect_language(None, "Меня зовут Мария"), Language::Ru);
        assert_eq!(detect_language(None, "12345 !!"), Language::Unknown);
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_text("  hi \n\t there  "), "hi there");
    }
}
