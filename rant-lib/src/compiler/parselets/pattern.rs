use crate::compiler::lexer::unquote;
use crate::compiler::parselets::{BlockParselet, Parselet, QueryParselet, Step, TagParselet};
use crate::compiler::{compilation_error, CompileErrorKind, CompileResult, Compiler, StringOp};
use crate::core::TokenKind;

/// what ends a pattern, the terminating token is left for the parent to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// end of input
    Root,
    /// `;` or `]`
    Argument,
    /// `|` or `}`
    BlockItem,
    /// `*`
    Weight,
}

impl Terminator {
    fn ends_at(self, kind: TokenKind) -> bool {
        use TokenKind::*;
        match self {
            Terminator::Root => false,
            Terminator::Argument => matches!(kind, Semicolon | RightSquare),
            Terminator::BlockItem => matches!(kind, Pipe | RightCurly),
            Terminator::Weight => kind == Asterisk,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Terminator::Root => "end of pattern",
            Terminator::Argument => "';' or ']'",
            Terminator::BlockItem => "'|' or '}'",
            Terminator::Weight => "'*'",
        }
    }
}

/// A sequence of text and constructs
pub struct PatternParselet {
    terminator: Terminator,
}

impl PatternParselet {
    pub fn new(terminator: Terminator) -> Self {
        PatternParselet { terminator }
    }

    pub fn resume(&mut self, compiler: &mut Compiler) -> CompileResult<Step> {
        loop {
            let Some(kind) = compiler.reader.peek_kind() else {
                if self.terminator == Terminator::Root {
                    return Ok(Step::Done);
                }
                return Err(compiler.error(
                    compiler.reader.position(),
                    CompileErrorKind::UnexpectedEnd(self.terminator.expected().into()),
                ));
            };
            if self.terminator.ends_at(kind) {
                return Ok(Step::Done);
            }
            let token = compiler.reader.read("pattern")?;
            use TokenKind::*;
            let child = match token.kind {
                RightSquare => {
                    compilation_error!(compiler, token.pos, Unexpected("function terminator".into()))
                }
                RightCurly => {
                    compilation_error!(compiler, token.pos, Unexpected("block terminator".into()))
                }
                RightAngle => {
                    compilation_error!(compiler, token.pos, Unexpected("query terminator".into()))
                }
                LeftSquare => Parselet::Tag(TagParselet::new(token.pos)),
                LeftCurly => Parselet::Block(BlockParselet::new(token.pos)),
                LeftAngle => Parselet::Query(QueryParselet::new(token.pos)),
                EscapeSequence => Parselet::Escape(token.clone()),
                ConstantLiteral => {
                    compiler
                        .gen
                        .add_string_ref(StringOp::Print, &unquote(&token.text));
                    continue;
                }
                Undefined => {
                    let what = if token.text.starts_with('\\') {
                        compilation_error!(compiler, token.pos, InvalidEscape(token.text))
                    } else if token.text.starts_with('"') {
                        "constant literal"
                    } else {
                        "regular expression"
                    };
                    compilation_error!(compiler, token.pos, UnexpectedEnd(format!("end of {}", what)))
                }
                _ => {
                    compiler.gen.add_string_ref(StringOp::Print, &token.text);
                    continue;
                }
            };
            compiler.gen.add_debug(token.pos);
            return Ok(Step::Push(child));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{compile, CompileErrorKind};

    #[test]
    fn punctuation_prints_verbatim() {
        let program = compile("test", "a | b; c* d: e!", false).unwrap();
        assert_eq!(program.strings, vec!["a | b; c* d: e!".to_owned()]);
    }

    #[test]
    fn constant_literals_are_unquoted() {
        let program = compile("test", r#"say "[not a tag]""#, false).unwrap();
        assert_eq!(program.strings, vec!["say [not a tag]".to_owned()]);
    }

    #[test]
    fn unterminated_literal() {
        let err = compile("test", r#"say "oops"#, false).unwrap_err();
        assert_eq!(
            err.kind,
            CompileErrorKind::UnexpectedEnd("end of constant literal".into())
        );
    }

    #[test]
    fn deep_nesting_does_not_overflow() {
        let depth = 5000;
        let src = format!("{}x{}", "{".repeat(depth), "}".repeat(depth));
        let program = compile("test", &src, false).unwrap();
        assert_eq!(program.blocks.len(), depth);
    }
}
