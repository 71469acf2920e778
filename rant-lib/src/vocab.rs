//! The dictionary a program queries for words
//!
//! The vm only knows the [Dictionary] trait. [WordList] is a small in-memory implementation,
//! enough to run queries without a real vocabulary behind them.

use std::collections::{HashMap, HashSet};

use crate::core::{CarrierComponent, CarrierKind, Query};
use crate::core::program::ProgramRegex;
use crate::rng::Rng;

pub trait Dictionary: Send + Sync {
    /// Picks a word for `query`. The result must only depend on the arguments, so the same
    /// query with the same rng state and carriers always gives the same word.
    fn query(
        &self,
        query: &Query,
        regexes: &[ProgramRegex],
        carriers: &mut CarrierState,
        rng: &mut Rng,
    ) -> Option<String>;
}

/// What the carriers of earlier queries in a run remembered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarrierState {
    matches: HashMap<String, String>,
    uniques: HashMap<String, HashSet<String>>,
}

impl CarrierState {
    pub fn matched(&self, id: &str) -> Option<&str> {
        self.matches.get(id).map(String::as_str)
    }

    pub fn is_used(&self, id: &str, word: &str) -> bool {
        self.uniques.get(id).map_or(false, |used| used.contains(word))
    }

    pub fn remember(&mut self, carrier: &[CarrierComponent], word: &str) {
        for component in carrier {
            match component.kind {
                CarrierKind::Match => {
                    self.matches.insert(component.id.clone(), word.to_owned());
                }
                CarrierKind::Unique => {
                    self.uniques
                        .entry(component.id.clone())
                        .or_default()
                        .insert(word.to_owned());
                }
                _ => {}
            }
        }
    }

    /// forgets everything stored under the ids of `carrier`
    pub fn delete(&mut self, carrier: &[CarrierComponent]) {
        for component in carrier {
            match component.kind {
                CarrierKind::Match | CarrierKind::MatchUnique => {
                    self.matches.remove(&component.id);
                }
                CarrierKind::Unique => {
                    self.uniques.remove(&component.id);
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// one term per subtype of the table
    pub terms: Vec<String>,
    pub classes: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub subtypes: Vec<String>,
    pub entries: Vec<Entry>,
}

impl Table {
    pub fn new(name: &str, subtypes: &[&str]) -> Self {
        Table {
            name: name.to_owned(),
            subtypes: subtypes.iter().map(|s| s.to_string()).collect(),
            entries: vec![],
        }
    }

    pub fn entry(mut self, terms: &[&str], classes: &[&str]) -> Self {
        self.entries.push(Entry {
            terms: terms.iter().map(|s| s.to_string()).collect(),
            classes: classes.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    fn subtype_index(&self, subtype: Option<&str>) -> Option<usize> {
        match subtype {
            None => Some(0),
            Some(name) => self.subtypes.iter().position(|s| s == name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WordList {
    tables: HashMap<String, Table>,
}

impl WordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    fn passes_classes(query: &Query, entry: &Entry) -> bool {
        let switches_pass = query.class_filter.iter().all(|switch| {
            switch
                .iter()
                .any(|rule| rule.required == entry.classes.contains(&rule.class))
        });
        if !switches_pass {
            return false;
        }
        if !query.exclusive {
            return true;
        }
        let mentioned: HashSet<&str> = query
            .class_filter
            .iter()
            .flatten()
            .map(|rule| rule.class.as_str())
            .collect();
        entry.classes.iter().all(|c| mentioned.contains(c.as_str()))
    }
}

impl Dictionary for WordList {
    fn query(
        &self,
        query: &Query,
        regexes: &[ProgramRegex],
        carriers: &mut CarrierState,
        rng: &mut Rng,
    ) -> Option<String> {
        let table = self.tables.get(query.table.as_deref()?)?;
        let subtype = table.subtype_index(query.subtype.as_deref())?;

        let matched = query
            .carrier
            .iter()
            .filter(|c| c.kind == CarrierKind::Match)
            .find_map(|c| carriers.matched(&c.id));
        if let Some(word) = matched {
            return Some(word.to_owned());
        }

        let candidates: Vec<&str> = table
            .entries
            .iter()
            .filter(|entry| Self::passes_classes(query, entry))
            .filter_map(|entry| entry.terms.get(subtype).map(String::as_str))
            .filter(|term| {
                query.regex_filters.iter().all(|filter| {
                    regexes
                        .get(filter.regex as usize)
                        .map_or(true, |r| r.regex.is_match(term) == filter.include)
                })
            })
            .filter(|term| {
                query
                    .syllables
                    .map_or(true, |range| range.contains(count_syllables(term)))
            })
            .filter(|term| {
                query.carrier.iter().all(|c| match c.kind {
                    CarrierKind::Unique => !carriers.is_used(&c.id, term),
                    CarrierKind::MatchUnique => carriers.matched(&c.id) != Some(*term),
                    _ => true,
                })
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }
        let word = candidates[rng.next_below(candidates.len())].to_owned();
        carriers.remember(&query.carrier, &word);
        Some(word)
    }
}

/// rough syllable count: groups of vowels, ignoring a silent trailing e
pub fn count_syllables(word: &str) -> u32 {
    let lower = word.to_lowercase();
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut previous_vowel = false;
    for c in lower.chars() {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }
    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        count -= 1;
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClassRule, RegexFilter, SyllableRange};
    use regex_lite::Regex;
    use rstest::{fixture, rstest};

    #[fixture]
    fn words() -> WordList {
        WordList::new().with_table(
            Table::new("noun", &["singular", "plural"])
                .entry(&["dog", "dogs"], &["animal"])
                .entry(&["cat", "cats"], &["animal", "pet"])
                .entry(&["table", "tables"], &["furniture"])
                .entry(&["elephant", "elephants"], &["animal", "large"]),
        )
    }

    fn query(table: &str) -> Query {
        Query {
            table: Some(table.into()),
            ..Default::default()
        }
    }

    fn rule(class: &str, required: bool) -> ClassRule {
        ClassRule {
            class: class.into(),
            required,
        }
    }

    fn run(words: &WordList, q: &Query, regexes: &[ProgramRegex]) -> Option<String> {
        words.query(q, regexes, &mut CarrierState::default(), &mut Rng::new(1))
    }

    #[rstest]
    fn class_filters(words: WordList) {
        let mut q = query("noun");
        q.class_filter = vec![vec![rule("furniture", true)]];
        assert_eq!(run(&words, &q, &[]).as_deref(), Some("table"));

        q.class_filter = vec![vec![rule("animal", true)], vec![rule("pet", false)]];
        for seed in 0..20 {
            let word = words.query(&q, &[], &mut CarrierState::default(), &mut Rng::new(seed));
            assert_ne!(word.as_deref(), Some("cat"));
        }
    }

    #[rstest]
    fn exclusive_queries_reject_unmentioned_classes(words: WordList) {
        let mut q = query("noun");
        q.exclusive = true;
        q.class_filter = vec![vec![rule("animal", true)]];
        assert_eq!(run(&words, &q, &[]).as_deref(), Some("dog"));
    }

    #[rstest]
    fn subtypes_regexes_and_syllables(words: WordList) {
        let regexes = vec![ProgramRegex {
            source: "^e".into(),
            regex: Regex::new("^e").unwrap(),
        }];
        let mut q = query("noun");
        q.subtype = Some("plural".into());
        q.regex_filters = vec![RegexFilter {
            include: true,
            regex: 0,
        }];
        assert_eq!(run(&words, &q, &regexes).as_deref(), Some("elephants"));

        let mut q = query("noun");
        q.syllables = Some(SyllableRange {
            min: Some(2),
            max: Some(2),
        });
        assert_eq!(run(&words, &q, &[]).as_deref(), Some("table"));

        q.subtype = Some("dual".into());
        assert_eq!(run(&words, &q, &[]), None);
    }

    #[rstest]
    fn match_and_unique_carriers(words: WordList) {
        let mut carriers = CarrierState::default();
        let mut rng = Rng::new(5);
        let mut q = query("noun");
        q.carrier = vec![CarrierComponent {
            kind: CarrierKind::Match,
            id: "a".into(),
        }];
        let first = words.query(&q, &[], &mut carriers, &mut rng);
        for _ in 0..10 {
            assert_eq!(words.query(&q, &[], &mut carriers, &mut rng), first);
        }

        let mut q = query("noun");
        q.carrier = vec![CarrierComponent {
            kind: CarrierKind::Unique,
            id: "u".into(),
        }];
        let mut seen = HashSet::new();
        for _ in 0..4 {
            let word = words.query(&q, &[], &mut carriers, &mut rng);
            assert!(seen.insert(word.clone().unwrap()));
        }
        assert_eq!(words.query(&q, &[], &mut carriers, &mut rng), None);
        carriers.delete(&q.carrier);
        assert!(words.query(&q, &[], &mut carriers, &mut rng).is_some());
    }

    #[rstest]
    #[case("dog", 1)]
    #[case("table", 2)]
    #[case("elephant", 3)]
    #[case("shape", 1)]
    fn syllables(#[case] word: &str, #[case] expected: u32) {
        assert_eq!(count_syllables(word), expected);
    }
}
