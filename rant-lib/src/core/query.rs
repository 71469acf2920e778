//! Compiled dictionary queries, as produced by the query parselet

use serde::{Deserialize, Serialize};

/// `<table$ -class|other -!neg (1-3) ?//re// .subtype ::=carrier>`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Query {
    /// None for a carrier delete query
    pub table: Option<String>,
    pub exclusive: bool,
    /// each inner list is one rule switch, an entry passes it if any rule of the switch matches
    pub class_filter: Vec<Vec<ClassRule>>,
    pub regex_filters: Vec<RegexFilter>,
    pub syllables: Option<SyllableRange>,
    pub subtype: Option<String>,
    pub carrier: Vec<CarrierComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRule {
    pub class: String,
    /// false for `!class`
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexFilter {
    /// true for `?`, false for `?!`
    pub include: bool,
    /// index into the regex table of the program
    pub regex: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyllableRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl SyllableRange {
    pub fn contains(&self, count: u32) -> bool {
        self.min.map_or(true, |min| count >= min) && self.max.map_or(true, |max| count <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierKind {
    Match,
    Associative,
    Dissociative,
    Divergent,
    Relational,
    MatchAssociative,
    MatchDissociative,
    MatchDivergent,
    MatchRelational,
    Unique,
    MatchUnique,
    Rhyme,
}

impl CarrierKind {
    /// the `@=` form of an association kind
    pub fn matching(self) -> Self {
        match self {
            CarrierKind::Associative => CarrierKind::MatchAssociative,
            CarrierKind::Dissociative => CarrierKind::MatchDissociative,
            CarrierKind::Divergent => CarrierKind::MatchDivergent,
            CarrierKind::Relational => CarrierKind::MatchRelational,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierComponent {
    pub kind: CarrierKind,
    pub id: String,
}
