use crate::compiler::parselets::Step;
use crate::compiler::{
    compilation_error, compiler_bug, CompileErrorKind, CompileResult, Compiler,
};
use crate::core::{
    CarrierComponent, CarrierKind, ClassRule, Query, RegexFilter, SourcePos, SyllableRange,
    TokenKind,
};
use crate::opcode::OpCode;

/// `<noun$ -animal|-plant (2-3) ?//^a//i .plural ::=a !u>`
pub struct QueryParselet {
    pos: SourcePos,
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// regex source of a `//pattern//flags` token, flags become an inline group
pub fn regex_source(literal: &str) -> Option<String> {
    let body = literal.strip_prefix("//")?;
    let end = body.rfind("//")?;
    let pattern = body[..end].replace("\\/", "/");
    let flags = &body[end + 2..];
    Some(if flags.is_empty() {
        pattern
    } else {
        format!("(?{}){}", flags, pattern)
    })
}

impl QueryParselet {
    pub fn new(pos: SourcePos) -> Self {
        QueryParselet { pos }
    }

    pub fn resume(&mut self, compiler: &mut Compiler) -> CompileResult<Step> {
        let mut query = Query::default();

        if compiler.reader.peek_loose_kind() != Some(TokenKind::DoubleColon) {
            let name = compiler.reader.expect_loose(TokenKind::Text, "table name")?;
            if !valid_table_name(&name.text) {
                compilation_error!(compiler, name.pos, InvalidArgument {
                    what: "table name".into(),
                    value: name.text
                });
            }
            query.table = Some(name.text);
        }
        query.exclusive = compiler.reader.take(TokenKind::Dollar);

        loop {
            let token = compiler.reader.read_loose("'>'")?;
            match token.kind {
                TokenKind::RightAngle => break,
                TokenKind::Subtype => {
                    let subtype = compiler.reader.expect_loose(TokenKind::Text, "subtype")?;
                    query.subtype = Some(subtype.text);
                }
                TokenKind::Hyphen => {
                    let switch = self.class_switch(compiler, query.exclusive)?;
                    query.class_filter.push(switch);
                }
                TokenKind::LeftParen => {
                    query.syllables = Some(self.syllables(compiler, token.pos)?);
                }
                TokenKind::Question | TokenKind::Without => {
                    let regex = self.regex(compiler)?;
                    query.regex_filters.push(RegexFilter {
                        include: token.kind == TokenKind::Question,
                        regex,
                    });
                }
                TokenKind::DoubleColon => self.carrier(compiler, &mut query.carrier)?,
                _ => compilation_error!(compiler, token.pos, InvalidQueryToken(token.text)),
            }
        }

        if query.table.is_none() && query.carrier.is_empty() {
            compilation_error!(compiler, self.pos, CarrierDeleteWithoutCarriers);
        }
        let idx = compiler.gen.add_query(query);
        compiler.gen.add_generic(OpCode::Query(idx));
        Ok(Step::Done)
    }

    /// `-a|!b|c`, an entry passes if any of the rules holds
    fn class_switch(&self, compiler: &mut Compiler, exclusive: bool) -> CompileResult<Vec<ClassRule>> {
        let mut rules = vec![];
        loop {
            let negative = compiler.reader.take(TokenKind::Exclamation);
            if exclusive && negative {
                compilation_error!(compiler, compiler.reader.last_position(), NegativeClassInExclusive);
            }
            let class = compiler.reader.expect_loose(TokenKind::Text, "class name")?;
            rules.push(ClassRule {
                class: class.text,
                required: !negative,
            });
            if !compiler.reader.take_loose(TokenKind::Pipe) {
                return Ok(rules);
            }
        }
    }

    /// `(n)`, `(n-)`, `(-n)` or `(n-m)`, the opening paren is already read
    fn syllables(&self, compiler: &mut Compiler, pos: SourcePos) -> CompileResult<SyllableRange> {
        let mut parts = vec![];
        loop {
            let token = compiler.reader.read_loose("')'")?;
            match token.kind {
                TokenKind::RightParen => break,
                TokenKind::Text | TokenKind::Hyphen => parts.push(token),
                _ => compilation_error!(compiler, token.pos, InvalidQueryToken(token.text)),
            }
        }
        let number = |text: &str| text.parse::<u32>().ok();
        use TokenKind::{Hyphen, Text};
        let kinds: Vec<TokenKind> = parts.iter().map(|t| t.kind).collect();
        let range = match kinds.as_slice() {
            [Text] => number(&parts[0].text).map(|n| SyllableRange {
                min: Some(n),
                max: Some(n),
            }),
            [Text, Hyphen] => number(&parts[0].text).map(|n| SyllableRange {
                min: Some(n),
                max: None,
            }),
            [Hyphen, Text] => number(&parts[1].text).map(|n| SyllableRange {
                min: None,
                max: Some(n),
            }),
            [Text, Hyphen, Text] => number(&parts[0].text)
                .zip(number(&parts[2].text))
                .map(|(min, max)| SyllableRange {
                    min: Some(min),
                    max: Some(max),
                }),
            _ => None,
        };
        match range {
            Some(range) => Ok(range),
            None => {
                let text: String = parts.iter().map(|t| t.text.as_str()).collect();
                compilation_error!(compiler, pos, SyllableRange(format!("({})", text)))
            }
        }
    }

    fn regex(&self, compiler: &mut Compiler) -> CompileResult<u32> {
        let token = compiler.reader.expect_loose(TokenKind::Regex, "regex")?;
        let Some(source) = regex_source(&token.text) else {
            compiler_bug!(compiler, token.pos, "malformed regex token {}", token.text);
        };
        match compiler.gen.add_regex(&source) {
            Ok(idx) => Ok(idx),
            Err(e) => compilation_error!(compiler, token.pos, InvalidRegex {
                pattern: source,
                message: e.to_string()
            }),
        }
    }

    fn carrier(&self, compiler: &mut Compiler, carrier: &mut Vec<CarrierComponent>) -> CompileResult<()> {
        use TokenKind::*;
        loop {
            let pos = compiler.reader.position();
            let Some(kind) = compiler.reader.peek_loose_kind() else {
                return Err(compiler.error(pos, CompileErrorKind::UnexpectedEnd("'>'".into())));
            };
            let kind = match kind {
                RightAngle | Subtype | Hyphen | LeftParen | Question | Without => {
                    if carrier.is_empty() {
                        compilation_error!(compiler, pos, EmptyCarrier);
                    }
                    return Ok(());
                }
                Equal => CarrierKind::Match,
                At => {
                    compiler.reader.read("carrier")?;
                    let kind = match compiler.reader.peek_loose_kind() {
                        Some(Exclamation) => CarrierKind::Dissociative,
                        Some(Plus) => CarrierKind::Divergent,
                        Some(Question) => CarrierKind::Relational,
                        _ => CarrierKind::Associative,
                    };
                    if kind != CarrierKind::Associative {
                        compiler.reader.read("carrier")?;
                    }
                    if compiler.reader.take_loose(Equal) {
                        kind.matching()
                    } else {
                        kind
                    }
                }
                Exclamation => {
                    compiler.reader.read("carrier")?;
                    if compiler.reader.take(Equal) {
                        CarrierKind::MatchUnique
                    } else {
                        CarrierKind::Unique
                    }
                }
                Ampersand => CarrierKind::Rhyme,
                _ => {
                    let token = compiler.reader.read("carrier")?;
                    compilation_error!(compiler, token.pos, InvalidCarrierToken(token.text))
                }
            };
            if matches!(kind, CarrierKind::Match | CarrierKind::Rhyme) {
                compiler.reader.read("carrier")?;
            }
            let id = compiler
                .reader
                .expect_loose(Text, "carrier identifier")?;
            carrier.push(CarrierComponent { kind, id: id.text });
        }
    }
}
