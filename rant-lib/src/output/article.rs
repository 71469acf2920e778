//! English indefinite article selection

use once_cell::sync::Lazy;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Article {
    A,
    An,
    The,
}

impl Article {
    pub fn as_str(self) -> &'static str {
        match self {
            Article::A => "a",
            Article::An => "an",
            Article::The => "the",
        }
    }
}

/// words starting with an h that is not pronounced
const SILENT_H: &[&str] = &["hour", "honor", "honour", "honest", "heir", "herb"];

/// words starting with a vowel letter but a consonant sound
const CONSONANT_SOUND: &[&str] = &[
    "unani", "uni", "use", "usu", "uti", "ura", "ure", "uro", "eu", "ewe", "one", "once",
];

static IRREGULAR_PLURALS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "men", "women", "children", "people", "geese", "mice", "lice", "teeth", "feet", "oxen",
        "fungi", "cacti", "alumni", "nuclei", "radii", "stimuli", "criteria", "phenomena",
        "data", "sheep",
    ]
    .into_iter()
    .collect()
});

fn looks_plural(word: &str) -> bool {
    if IRREGULAR_PLURALS.contains(word) {
        return true;
    }
    if word.len() < 4 || !word.ends_with('s') {
        return false;
    }
    if ["ses", "xes", "zes", "ches", "shes"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        return true;
    }
    !["ss", "us", "is", "os", "as"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
}

/// Picks the article for the word that follows it
pub fn indefinite_article(word: &str) -> Article {
    let word = word.to_lowercase();
    if word.is_empty() {
        return Article::A;
    }
    if looks_plural(&word) {
        return Article::The;
    }
    if SILENT_H.iter().any(|p| word.starts_with(p)) {
        return Article::An;
    }
    if CONSONANT_SOUND.iter().any(|p| word.starts_with(p)) {
        return Article::A;
    }
    match word.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => Article::An,
        _ => Article::A,
    }
}

/// the first word of `text`, if `text` contains one
pub fn first_word(text: &str) -> Option<&str> {
    let start = text.find(char::is_alphanumeric)?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::consonants(&["boy", "car", "bike", "man", "rat", "cat", "zoo"], Article::A)]
    #[case::silent_h(&["honor", "hour", "honour", "heir", "hourglass"], Article::An)]
    #[case::aspirated_h(&["hotel", "horrible", "hospital", "humorous", "human", "host"], Article::A)]
    #[case::vowels(&["elephant", "egg", "apple", "orphan", "idiot", "unanticipated", "unhappy", "underground"], Article::An)]
    #[case::u_as_you(&["user", "unanimous", "university", "unicycle", "union", "unit", "unique"], Article::A)]
    #[case::plurals(&["men", "dogs", "fungi", "octopuses", "viruses", "geese", "mice", "people", "cacti", "teeth"], Article::The)]
    fn articles(#[case] words: &[&str], #[case] expected: Article) {
        for word in words {
            assert_eq!(indefinite_article(word), expected, "{word}");
        }
    }

    #[test]
    fn capitalized_words() {
        assert_eq!(indefinite_article("Elephant"), Article::An);
    }

    #[rstest]
    #[case(" elephant", Some("elephant"))]
    #[case("  old-fashioned thing", Some("old-fashioned"))]
    #[case("   ", None)]
    fn first_words(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(first_word(text), expected);
    }
}
