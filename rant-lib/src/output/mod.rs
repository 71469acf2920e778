//! The output model: named channels, the stack of active channels, and the final result
//!
//! Every print goes through the visibility walk in [OutputWriter::print_targets], which picks
//! the chains a write lands in.

use std::collections::{BTreeMap, HashMap};

pub mod article;
pub mod chain;
pub mod format;

pub use chain::{OutputChain, Visibility};
pub use format::{Capitalization, FormatOptions, NumberFormat};

pub const MAIN_CHANNEL: &str = "main";
const MAIN: usize = 0;

#[derive(Debug, Clone)]
pub struct OutputWriter {
    chains: Vec<OutputChain>,
    by_name: HashMap<String, usize>,
    active: Vec<usize>,
    chars_written: usize,
    default_case: Capitalization,
}

impl OutputWriter {
    pub fn new(default_case: Capitalization) -> Self {
        OutputWriter {
            chains: vec![OutputChain::new(
                MAIN_CHANNEL,
                Visibility::Public,
                default_case,
            )],
            by_name: HashMap::from([(MAIN_CHANNEL.to_owned(), MAIN)]),
            active: vec![MAIN],
            chars_written: 0,
            default_case,
        }
    }

    /// Makes `name` the active channel, creating it on first use.
    /// Opening a channel that is already active does nothing.
    pub fn open_channel(&mut self, name: &str, visibility: Visibility) {
        let idx = match self.by_name.get(name) {
            Some(&idx) => {
                if self.active.contains(&idx) {
                    return;
                }
                self.chains[idx].visibility = visibility;
                idx
            }
            None => {
                self.chains
                    .push(OutputChain::new(name, visibility, self.default_case));
                let idx = self.chains.len() - 1;
                self.by_name.insert(name.to_owned(), idx);
                idx
            }
        };
        self.active.push(idx);
    }

    /// Closes the innermost channel. Returns false if only main is left, which is never closed.
    pub fn close_channel(&mut self) -> bool {
        if self.active.len() <= 1 {
            return false;
        }
        self.active.pop();
        true
    }

    /// The chains a write to the active channel ends up in
    pub fn print_targets(&self) -> Vec<usize> {
        let mut targets = vec![];
        let mut internal = false;
        for &idx in self.active.iter().rev() {
            if internal && idx == MAIN {
                break;
            }
            targets.push(idx);
            match self.chains[idx].visibility {
                Visibility::Public => {
                    if !internal && idx != MAIN {
                        targets.push(MAIN);
                    }
                    break;
                }
                Visibility::Private => break,
                Visibility::Internal => internal = true,
            }
        }
        targets
    }

    fn for_targets(&mut self, mut f: impl FnMut(&mut OutputChain)) {
        for idx in self.print_targets() {
            f(&mut self.chains[idx]);
        }
    }

    pub fn print(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.chars_written += text.chars().count();
        self.for_targets(|chain| chain.print(text));
    }

    pub fn insert_article(&mut self) {
        self.for_targets(OutputChain::insert_article);
    }

    pub fn set_case(&mut self, mode: Capitalization) {
        self.for_targets(|chain| chain.set_case(mode));
    }

    pub fn insert_target(&mut self, name: &str) {
        self.for_targets(|chain| chain.insert_target(name));
    }

    pub fn write_target(&mut self, name: &str, text: &str, overwrite: bool) {
        self.for_targets(|chain| chain.write_target(name, text, overwrite));
    }

    pub fn clear_target(&mut self, name: &str) {
        self.for_targets(|chain| chain.clear_target(name));
    }

    /// number of chars printed so far, each print counted once
    pub fn chars_written(&self) -> usize {
        self.chars_written
    }

    pub fn main_text(&self) -> String {
        self.chains[MAIN].render()
    }

    pub fn finish(self, seed: u64) -> Output {
        let channels = self
            .chains
            .iter()
            .map(|chain| {
                (
                    chain.name.clone(),
                    OutputEntry {
                        name: chain.name.clone(),
                        text: chain.render(),
                        visibility: chain.visibility,
                    },
                )
            })
            .collect();
        Output { seed, channels }
    }
}

/// The final text of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub name: String,
    pub text: String,
    pub visibility: Visibility,
}

/// The result of running a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub seed: u64,
    channels: BTreeMap<String, OutputEntry>,
}

impl Output {
    /// text of the main channel
    pub fn main(&self) -> &str {
        self.channels
            .get(MAIN_CHANNEL)
            .map_or("", |entry| entry.text.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&OutputEntry> {
        self.channels.get(name)
    }

    pub fn channels(&self) -> impl Iterator<Item = &OutputEntry> {
        self.channels.values()
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.main())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> OutputWriter {
        OutputWriter::new(Capitalization::None)
    }

    fn text(out: &Output, name: &str) -> String {
        out.get(name).map(|e| e.text.clone()).unwrap_or_default()
    }

    #[test]
    fn private_channels_stay_out_of_main() {
        let mut w = writer();
        w.print("a");
        w.open_channel("x", Visibility::Private);
        w.print("b");
        assert!(w.close_channel());
        w.print("c");
        let out = w.finish(0);
        assert_eq!(out.main(), "ac");
        assert_eq!(text(&out, "x"), "b");
    }

    #[test]
    fn public_channels_mirror_to_main() {
        let mut w = writer();
        w.open_channel("x", Visibility::Public);
        w.print("b");
        let out = w.finish(0);
        assert_eq!(out.main(), "b");
        assert_eq!(text(&out, "x"), "b");
    }

    #[test]
    fn internal_channels_write_to_their_parent_only() {
        let mut w = writer();
        w.open_channel("outer", Visibility::Private);
        w.open_channel("inner", Visibility::Internal);
        w.print("z");
        let out = w.finish(0);
        assert_eq!(text(&out, "inner"), "z");
        assert_eq!(text(&out, "outer"), "z");
        assert_eq!(out.main(), "");

        let mut w = writer();
        w.open_channel("inner", Visibility::Internal);
        w.print("z");
        assert_eq!(w.finish(0).main(), "");
    }

    #[test]
    fn public_below_internal_does_not_reach_main() {
        let mut w = writer();
        w.open_channel("p", Visibility::Public);
        w.open_channel("i", Visibility::Internal);
        w.print("q");
        let out = w.finish(0);
        assert_eq!(text(&out, "i"), "q");
        assert_eq!(text(&out, "p"), "q");
        assert_eq!(out.main(), "");
    }

    #[test]
    fn closing_main_is_refused() {
        let mut w = writer();
        assert!(!w.close_channel());
        w.print("still here");
        assert_eq!(w.main_text(), "still here");
    }

    #[test]
    fn reopening_an_active_channel_is_a_no_op() {
        let mut w = writer();
        w.open_channel("x", Visibility::Private);
        w.open_channel("x", Visibility::Private);
        assert!(w.close_channel());
        assert!(!w.close_channel());
    }

    #[test]
    fn channels_are_reused() {
        let mut w = writer();
        w.open_channel("x", Visibility::Private);
        w.print("1");
        w.close_channel();
        w.open_channel("x", Visibility::Private);
        w.print("2");
        assert_eq!(text(&w.finish(0), "x"), "12");
    }

    #[test]
    fn counts_chars_once_per_print() {
        let mut w = writer();
        w.open_channel("x", Visibility::Public);
        w.print("héllo");
        assert_eq!(w.chars_written(), 5);
    }
}
