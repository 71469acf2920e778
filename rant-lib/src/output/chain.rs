use std::collections::HashMap;

use derive_more::Display;
use strum_macros::EnumString;

use super::article::{first_word, indefinite_article, Article};
use super::format::{Capitalization, CaseFormatter};

/// Who gets to see what is written to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    /// also written to main, unless an internal channel is in between
    #[display(fmt = "public")]
    Public,
    /// only written to the channel itself
    #[display(fmt = "private")]
    Private,
    /// written to the enclosing channel, but never to main
    #[display(fmt = "internal")]
    Internal,
}

impl Visibility {
    pub fn to_byte(self) -> u8 {
        match self {
            Visibility::Public => 0,
            Visibility::Private => 1,
            Visibility::Internal => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Visibility::Public),
            1 => Some(Visibility::Private),
            2 => Some(Visibility::Internal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArticleCase {
    Lower,
    Capital,
    Upper,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// resolved once the next word is printed
    Article {
        resolved: Option<Article>,
        case: ArticleCase,
    },
    /// replaced by the current content of the named target when the chain is finished
    Target(String),
}

/// A named output stream.
///
/// Text goes into the current segment. Inserting an article slot or a target seals the current
/// segment, sealed segments are never touched again, except for resolving a pending article.
#[derive(Debug, Clone)]
pub struct OutputChain {
    pub name: String,
    pub visibility: Visibility,
    sealed: Vec<Segment>,
    current: String,
    pending_article: Option<usize>,
    targets: HashMap<String, String>,
    case: CaseFormatter,
}

impl OutputChain {
    pub fn new(name: &str, visibility: Visibility, case: Capitalization) -> Self {
        OutputChain {
            name: name.to_owned(),
            visibility,
            sealed: vec![],
            current: String::new(),
            pending_article: None,
            targets: HashMap::new(),
            case: CaseFormatter::new(case),
        }
    }

    pub fn print(&mut self, text: &str) {
        let text = self.case.apply(text);
        if let Some(idx) = self.pending_article {
            if let Some(word) = first_word(&text) {
                if let Some(Segment::Article { resolved, .. }) = self.sealed.get_mut(idx) {
                    *resolved = Some(indefinite_article(word));
                }
                self.pending_article = None;
            }
        }
        self.current.push_str(&text);
    }

    pub fn set_case(&mut self, mode: Capitalization) {
        self.case.set_mode(mode);
    }

    fn seal(&mut self) {
        if !self.current.is_empty() {
            self.sealed
                .push(Segment::Text(std::mem::take(&mut self.current)));
        }
    }

    pub fn insert_article(&mut self) {
        // the article is printed text, so it moves the formatter on like any other word
        let case = if self.case.mode == Capitalization::Upper {
            ArticleCase::Upper
        } else if self.case.apply("a") == "A" {
            ArticleCase::Capital
        } else {
            ArticleCase::Lower
        };
        self.seal();
        self.sealed.push(Segment::Article {
            resolved: None,
            case,
        });
        self.pending_article = Some(self.sealed.len() - 1);
    }

    pub fn insert_target(&mut self, name: &str) {
        self.seal();
        self.targets.entry(name.to_owned()).or_default();
        self.sealed.push(Segment::Target(name.to_owned()));
    }

    pub fn write_target(&mut self, name: &str, text: &str, overwrite: bool) {
        let target = self.targets.entry(name.to_owned()).or_default();
        if overwrite {
            target.clear();
        }
        target.push_str(text);
    }

    pub fn clear_target(&mut self, name: &str) {
        if let Some(target) = self.targets.get_mut(name) {
            target.clear();
        }
    }

    /// the text this chain currently renders to
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.sealed {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Article { resolved, case } => {
                    let article = resolved.unwrap_or(Article::A).as_str();
                    match case {
                        ArticleCase::Lower => out.push_str(article),
                        ArticleCase::Upper => out.push_str(&article.to_uppercase()),
                        ArticleCase::Capital => {
                            let mut chars = article.chars();
                            if let Some(first) = chars.next() {
                                out.extend(first.to_uppercase());
                            }
                            out.push_str(chars.as_str());
                        }
                    }
                }
                Segment::Target(name) => {
                    if let Some(text) = self.targets.get(name) {
                        out.push_str(text);
                    }
                }
            }
        }
        out.push_str(&self.current);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> OutputChain {
        OutputChain::new("main", Visibility::Public, Capitalization::None)
    }

    #[test]
    fn article_waits_for_a_word() {
        let mut c = chain();
        c.insert_article();
        c.print(" ");
        assert_eq!(c.render(), "a ");
        c.print("apple");
        assert_eq!(c.render(), "an apple");
    }

    #[test]
    fn unresolved_article_defaults_to_a() {
        let mut c = chain();
        c.print("just ");
        c.insert_article();
        assert_eq!(c.render(), "just a");
    }

    #[test]
    fn article_takes_the_chain_case() {
        let mut c = OutputChain::new("main", Visibility::Public, Capitalization::First);
        c.insert_article();
        c.print(" owl");
        assert_eq!(c.render(), "An owl");
    }

    #[test]
    fn article_moves_the_case_state_on() {
        let mut c = OutputChain::new("main", Visibility::Public, Capitalization::Sentence);
        c.insert_article();
        c.print(" owl. ");
        c.insert_article();
        c.print(" hen");
        assert_eq!(c.render(), "An owl. A hen");

        let mut c = OutputChain::new("main", Visibility::Public, Capitalization::Upper);
        c.insert_article();
        c.print(" owl");
        assert_eq!(c.render(), "AN OWL");

        let mut c = OutputChain::new("main", Visibility::Public, Capitalization::Word);
        c.print("see ");
        c.insert_article();
        c.print(" owl");
        assert_eq!(c.render(), "See An Owl");
    }

    #[test]
    fn targets_are_filled_in_later() {
        let mut c = chain();
        c.print("Dear ");
        c.insert_target("name");
        c.print(", welcome.");
        c.write_target("name", "Bob", false);
        assert_eq!(c.render(), "Dear Bob, welcome.");
        c.write_target("name", "Alice", true);
        assert_eq!(c.render(), "Dear Alice, welcome.");
        c.clear_target("name");
        assert_eq!(c.render(), "Dear , welcome.");
    }

    #[test]
    fn visibility_bytes() {
        for v in [Visibility::Public, Visibility::Private, Visibility::Internal] {
            assert_eq!(Visibility::from_byte(v.to_byte()), Some(v));
        }
        assert_eq!(Visibility::from_byte(9), None);
    }
}
