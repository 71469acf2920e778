//! A cursor over the token stream
//!
//! The loose variants skip whitespace before looking at the next token. Reading past the end
//! is an error, check [TokenReader::at_end] first where running out of tokens is fine.

use crate::compiler::lexer::unquote;
use crate::compiler::{CompileError, CompileErrorKind};
use crate::core::{SourcePos, Token, TokenKind};

pub struct TokenReader {
    source_name: String,
    tokens: Vec<Token>,
    idx: usize,
    end: SourcePos,
}

pub type ReadResult<T> = Result<T, CompileError>;

impl TokenReader {
    pub fn new(source_name: &str, tokens: Vec<Token>, end: SourcePos) -> Self {
        TokenReader {
            source_name: source_name.to_owned(),
            tokens,
            idx: 0,
            end,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn error(&self, pos: SourcePos, kind: CompileErrorKind) -> CompileError {
        CompileError {
            source_name: self.source_name.clone(),
            line: pos.line,
            column: pos.column,
            kind,
        }
    }

    fn unexpected_end(&self, expected: &str) -> CompileError {
        self.error(
            self.end,
            CompileErrorKind::UnexpectedEnd(expected.to_owned()),
        )
    }

    pub fn at_end(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    /// position of the next token, or the end of the source
    pub fn position(&self) -> SourcePos {
        self.tokens.get(self.idx).map_or(self.end, |t| t.pos)
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    pub fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    pub fn read(&mut self, expected: &str) -> ReadResult<Token> {
        let token = self
            .tokens
            .get(self.idx)
            .cloned()
            .ok_or_else(|| self.unexpected_end(expected))?;
        self.idx += 1;
        Ok(token)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_kind() == Some(TokenKind::Whitespace) {
            self.idx += 1;
        }
    }

    pub fn peek_loose(&mut self) -> Option<&Token> {
        self.skip_whitespace();
        self.peek()
    }

    pub fn peek_loose_kind(&mut self) -> Option<TokenKind> {
        self.peek_loose().map(|t| t.kind)
    }

    pub fn read_loose(&mut self, expected: &str) -> ReadResult<Token> {
        self.skip_whitespace();
        self.read(expected)
    }

    /// reads the next token, failing unless it is of `kind`
    pub fn expect(&mut self, kind: TokenKind, description: &str) -> ReadResult<Token> {
        let token = self.read(description)?;
        if token.kind != kind {
            return Err(self.error(
                token.pos,
                CompileErrorKind::Expected {
                    expected: description.to_owned(),
                    found: token.text,
                },
            ));
        }
        Ok(token)
    }

    pub fn expect_loose(&mut self, kind: TokenKind, description: &str) -> ReadResult<Token> {
        self.skip_whitespace();
        self.expect(kind, description)
    }

    /// consumes the next token if it is of `kind`
    pub fn take(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    pub fn take_loose(&mut self, kind: TokenKind) -> bool {
        self.skip_whitespace();
        self.take(kind)
    }

    /// position of the last consumed token
    pub fn last_position(&self) -> SourcePos {
        self.idx
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(SourcePos::default(), |t| t.pos)
    }

    /// Reads ahead until one of `stops`, and if everything up to it is plain text returns the
    /// text and consumes it. The stop token itself is left in place. Nothing is consumed if the
    /// run contains anything with a meaning of its own, or the input ends first.
    pub fn constant_until(&mut self, stops: &[TokenKind]) -> Option<String> {
        let mut text = String::new();
        for (i, token) in self.tokens.iter().enumerate().skip(self.idx) {
            if stops.contains(&token.kind) {
                self.idx = i;
                return Some(text);
            }
            match token.kind {
                TokenKind::ConstantLiteral => text.push_str(&unquote(&token.text)),
                kind if is_plain(kind) => text.push_str(&token.text),
                _ => return None,
            }
        }
        None
    }
}

/// tokens a pattern prints verbatim, wherever they appear
fn is_plain(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Text | Whitespace
            | Hyphen
            | Subtype
            | Plus
            | Comma
            | Colon
            | DoubleColon
            | Exclamation
            | Question
            | Without
            | Equal
            | Ampersand
            | At
            | Tilde
            | Dollar
            | LeftParen
            | RightParen
            | Pipe
            | Asterisk
    )
}
