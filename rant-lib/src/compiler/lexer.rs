//! Turns source text into tokens
//!
//! The lexer never fails. Input it can't make sense of (an unterminated literal, a `\` at the
//! very end) becomes an [Undefined](TokenKind::Undefined) token, and the parselets decide
//! what to make of it.

use crate::core::{SourcePos, Token, TokenKind};

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    column: usize,
}

pub fn tokenize(src: &str) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: src.chars().collect(),
        idx: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = vec![];
    while let Some(token) = lexer.next_token() {
        tokens.push(token);
    }
    log::trace!("lexed {} tokens from {} chars", tokens.len(), lexer.chars.len());
    tokens
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '\\' | '[' | ']' | '{' | '}' | '<' | '>' | '(' | ')' | '|' | ':' | ';' | '@' | '?' | '!'
            | '$' | '-' | ',' | '"' | '=' | '&' | '+' | '*' | '.' | '~'
    )
}

impl Lexer {
    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.idx + ahead).copied()
    }

    fn pos(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
            offset: self.idx,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_at(0)?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_n(&mut self, n: usize) -> String {
        (0..n).filter_map(|_| self.bump()).collect()
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_at(0).filter(|c| pred(*c)) {
            self.bump();
            out.push(c);
        }
        out
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn next_token(&mut self) -> Option<Token> {
        let c = self.peek_at(0)?;
        let pos = self.pos();
        let token = |kind, text: String| Some(Token::new(kind, text, pos));

        if c.is_whitespace() {
            let text = self.bump_while(char::is_whitespace);
            return token(TokenKind::Whitespace, text);
        }
        if self.starts_with("//") {
            return self.regex(pos);
        }
        if !is_special(c) {
            let text = self.text();
            return token(TokenKind::Text, text);
        }

        let two_char = match (c, self.peek_at(1)) {
            (':', Some(':')) => Some(TokenKind::DoubleColon),
            ('?', Some('!')) => Some(TokenKind::Without),
            _ => None,
        };
        if let Some(kind) = two_char {
            let text = self.bump_n(2);
            return token(kind, text);
        }

        let kind = match c {
            '\\' => return self.escape(pos),
            '"' => return self.constant_literal(pos),
            '[' => TokenKind::LeftSquare,
            ']' => TokenKind::RightSquare,
            '{' => TokenKind::LeftCurly,
            '}' => TokenKind::RightCurly,
            '<' => TokenKind::LeftAngle,
            '>' => TokenKind::RightAngle,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '|' => TokenKind::Pipe,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '@' => TokenKind::At,
            '?' => TokenKind::Question,
            '!' => TokenKind::Exclamation,
            '$' => TokenKind::Dollar,
            '-' => TokenKind::Hyphen,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Equal,
            '&' => TokenKind::Ampersand,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Asterisk,
            '.' => TokenKind::Subtype,
            '~' => TokenKind::Tilde,
            _ => TokenKind::Undefined,
        };
        let text = self.bump_n(1);
        token(kind, text)
    }

    /// a single `/` is part of the text, two of them start a regex
    fn text(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_at(0) {
            if c.is_whitespace() || is_special(c) || self.starts_with("//") {
                break;
            }
            self.bump();
            out.push(c);
        }
        out
    }

    /// `\c`, `\4,c`, `\u00e9`
    fn escape(&mut self, pos: SourcePos) -> Option<Token> {
        let start = self.idx;
        self.bump();
        let digits_len = (0..)
            .take_while(|i| self.peek_at(*i).map_or(false, |c| c.is_ascii_digit()))
            .count();
        if digits_len > 0 && self.peek_at(digits_len) == Some(',') {
            self.bump_n(digits_len + 1);
        }
        let has_code = self.peek_at(0).is_some();
        match self.peek_at(0) {
            None => {}
            Some('u')
                if (1..=4).all(|i| self.peek_at(i).map_or(false, |c| c.is_ascii_hexdigit())) =>
            {
                self.bump_n(5);
            }
            Some(_) => {
                self.bump();
            }
        }
        let text: String = self.chars[start..self.idx].iter().collect();
        let kind = if !has_code {
            TokenKind::Undefined
        } else {
            TokenKind::EscapeSequence
        };
        Some(Token::new(kind, text, pos))
    }

    /// `"text"`, with `""` standing for a single quote
    fn constant_literal(&mut self, pos: SourcePos) -> Option<Token> {
        let mut text = self.bump_n(1);
        loop {
            match self.bump() {
                None => return Some(Token::new(TokenKind::Undefined, text, pos)),
                Some('"') if self.peek_at(0) == Some('"') => {
                    self.bump();
                    text.push_str("\"\"");
                }
                Some('"') => {
                    text.push('"');
                    return Some(Token::new(TokenKind::ConstantLiteral, text, pos));
                }
                Some(c) => text.push(c),
            }
        }
    }

    /// `//pattern//flags`, `\/` escapes a slash inside the pattern
    fn regex(&mut self, pos: SourcePos) -> Option<Token> {
        let mut text = self.bump_n(2);
        loop {
            if self.starts_with("//") {
                text += &self.bump_n(2);
                text += &self.bump_while(|c| c.is_ascii_alphabetic());
                return Some(Token::new(TokenKind::Regex, text, pos));
            }
            match self.bump() {
                None => return Some(Token::new(TokenKind::Undefined, text, pos)),
                Some('\\') if self.peek_at(0) == Some('/') => {
                    self.bump();
                    text.push_str("\\/");
                }
                Some(c) => text.push(c),
            }
        }
    }
}

/// the value of a constant literal token, without quotes
pub fn unquote(literal: &str) -> String {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);
    inner.replace("\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use TokenKind::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn k(kind: TokenKind, text: &str) -> (TokenKind, String) {
        (kind, text.to_owned())
    }

    #[rstest]
    #[case("hello world", vec![k(Text, "hello"), k(Whitespace, " "), k(Text, "world")])]
    #[case("[rep:3]", vec![k(LeftSquare, "["), k(Text, "rep"), k(Colon, ":"), k(Text, "3"), k(RightSquare, "]")])]
    #[case("<noun::=a>", vec![k(LeftAngle, "<"), k(Text, "noun"), k(DoubleColon, "::"), k(Equal, "="), k(Text, "a"), k(RightAngle, ">")])]
    #[case("?!//^un//i", vec![k(Without, "?!"), k(Regex, "//^un//i")])]
    #[case(r"\32,x\n", vec![k(EscapeSequence, r"\32,x"), k(EscapeSequence, r"\n")])]
    #[case(r"\u00e9!", vec![k(EscapeSequence, r"\u00e9"), k(Exclamation, "!")])]
    #[case(r#""say ""hi""""#, vec![k(ConstantLiteral, r#""say ""hi""""#)])]
    #[case("and/or", vec![k(Text, "and/or")])]
    #[case("a.b", vec![k(Text, "a"), k(Subtype, "."), k(Text, "b")])]
    fn tokens(#[case] src: &str, #[case] expected: Vec<(TokenKind, String)>) {
        assert_eq!(kinds(src), expected);
    }

    #[rstest]
    #[case(r#""open"#)]
    #[case("//never closed")]
    #[case("\\")]
    #[case(r"\12,")]
    fn unterminated_input_is_undefined(#[case] src: &str) {
        let tokens = tokenize(src);
        assert_eq!(tokens.last().map(|t| t.kind), Some(Undefined));
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = tokenize("ab\n  [x]");
        let bracket = &tokens[2];
        assert_eq!(bracket.kind, LeftSquare);
        assert_eq!(
            bracket.pos,
            SourcePos {
                line: 2,
                column: 3,
                offset: 5
            }
        );
    }

    #[test]
    fn unquoting() {
        assert_eq!(unquote(r#""say ""hi""""#), r#"say "hi""#);
    }
}
