//! Tokens produced by the [lexer](crate::compiler::lexer)

use derive_more::Display;

/// Every kind of token the lexer can produce.
///
/// The display form is what error messages show when a kind was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TokenKind {
    #[display(fmt = "text")]
    Text,
    #[display(fmt = "whitespace")]
    Whitespace,
    #[display(fmt = "escape sequence")]
    EscapeSequence,
    #[display(fmt = "constant literal")]
    ConstantLiteral,
    #[display(fmt = "regular expression")]
    Regex,
    #[display(fmt = "'['")]
    LeftSquare,
    #[display(fmt = "']'")]
    RightSquare,
    #[display(fmt = "'{{'")]
    LeftCurly,
    #[display(fmt = "'}}'")]
    RightCurly,
    #[display(fmt = "'<'")]
    LeftAngle,
    #[display(fmt = "'>'")]
    RightAngle,
    #[display(fmt = "'('")]
    LeftParen,
    #[display(fmt = "')'")]
    RightParen,
    #[display(fmt = "'|'")]
    Pipe,
    #[display(fmt = "':'")]
    Colon,
    #[display(fmt = "';'")]
    Semicolon,
    #[display(fmt = "'::'")]
    DoubleColon,
    #[display(fmt = "'@'")]
    At,
    #[display(fmt = "'?'")]
    Question,
    #[display(fmt = "'?!'")]
    Without,
    #[display(fmt = "'!'")]
    Exclamation,
    #[display(fmt = "'$'")]
    Dollar,
    #[display(fmt = "'-'")]
    Hyphen,
    #[display(fmt = "','")]
    Comma,
    #[display(fmt = "'='")]
    Equal,
    #[display(fmt = "'&'")]
    Ampersand,
    #[display(fmt = "'+'")]
    Plus,
    #[display(fmt = "'*'")]
    Asterisk,
    #[display(fmt = "'.'")]
    Subtype,
    #[display(fmt = "'~'")]
    Tilde,
    #[display(fmt = "unknown token")]
    Undefined,
}

/// Position of a token in its source. Lines and columns start at 1, the offset counts chars
/// from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SourcePos,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: SourcePos) -> Self {
        Token {
            kind,
            text: text.into(),
            pos,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}
