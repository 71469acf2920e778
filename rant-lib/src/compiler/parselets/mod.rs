//! The parselets, resumable parsers that each handle one construct
//!
//! A parselet that needs a nested pattern compiled returns [Step::Push] with the child and is
//! resumed once the child is done. The driver owns the stack, so the nesting depth of a pattern
//! is limited by memory only.

use crate::compiler::{CompileResult, Compiler};
use crate::core::Token;

mod block;
mod escape;
mod pattern;
mod query;
mod tag;

pub use block::BlockParselet;
pub use pattern::{PatternParselet, Terminator};
pub use query::QueryParselet;
pub use tag::TagParselet;

pub enum Parselet {
    Pattern(PatternParselet),
    Escape(Token),
    Query(QueryParselet),
    Tag(TagParselet),
    Block(BlockParselet),
}

pub enum Step {
    Done,
    Push(Parselet),
}

impl Parselet {
    fn resume(&mut self, compiler: &mut Compiler) -> CompileResult<Step> {
        match self {
            Parselet::Pattern(p) => p.resume(compiler),
            Parselet::Escape(token) => escape::compile(compiler, token),
            Parselet::Query(p) => p.resume(compiler),
            Parselet::Tag(p) => p.resume(compiler),
            Parselet::Block(p) => p.resume(compiler),
        }
    }
}

/// compiles the whole token stream as the root pattern
pub fn run(compiler: &mut Compiler) -> CompileResult<()> {
    let mut stack = vec![Parselet::Pattern(PatternParselet::new(Terminator::Root))];
    while let Some(top) = stack.last_mut() {
        match top.resume(compiler)? {
            Step::Push(child) => stack.push(child),
            Step::Done => {
                stack.pop();
            }
        }
    }
    Ok(())
}
