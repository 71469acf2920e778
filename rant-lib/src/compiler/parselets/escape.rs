//! `\n`, `\4,x`, `\u00e9`, `\a` ...

use crate::compiler::parselets::Step;
use crate::compiler::{compilation_error, CompileErrorKind, CompileResult, Compiler, StringOp};
use crate::core::Token;
use crate::opcode::OpCode;

/// character classes for `PrintChars`, the operand is the escape letter itself
pub const CHAR_CLASSES: &[char] = &['c', 'C', 'd', 'D', 'w', 'W', 'x', 'X'];

/// static escapes are expanded into the string table, so their count is bounded
pub const MAX_STATIC_REPEAT: u32 = 1 << 16;

enum Escape {
    Static(char),
    Chars(char),
    Article,
}

fn parse(code: &str) -> Option<Escape> {
    let mut chars = code.chars();
    let first = chars.next()?;
    if first == 'u' && code.len() == 5 {
        let value = u32::from_str_radix(&code[1..], 16).ok()?;
        return char::from_u32(value).map(Escape::Static);
    }
    if chars.next().is_some() {
        return None;
    }
    Some(match first {
        'n' | 'N' => Escape::Static('\n'),
        'r' => Escape::Static('\r'),
        't' => Escape::Static('\t'),
        'f' => Escape::Static('\u{0c}'),
        'v' => Escape::Static('\u{0b}'),
        'b' => Escape::Static('\u{08}'),
        's' => Escape::Static(' '),
        '0' => Escape::Static('\0'),
        'a' => Escape::Article,
        c if CHAR_CLASSES.contains(&c) => Escape::Chars(c),
        c if !c.is_alphanumeric() => Escape::Static(c),
        _ => return None,
    })
}

/// splits `\12,x` into the count and the code
fn split(text: &str) -> Option<(u32, &str)> {
    let body = text.strip_prefix('\\')?;
    match body.split_once(',') {
        Some((count, code))
            if !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()) && !code.is_empty() =>
        {
            Some((count.parse().ok()?, code))
        }
        _ => Some((1, body)),
    }
}

pub fn compile(compiler: &mut Compiler, token: &Token) -> CompileResult<Step> {
    let Some((count, escape)) = split(&token.text).and_then(|(n, code)| Some((n, parse(code)?)))
    else {
        compilation_error!(compiler, token.pos, InvalidEscape(token.text.clone()));
    };
    match escape {
        Escape::Static(_) if count > MAX_STATIC_REPEAT => {
            compilation_error!(compiler, token.pos, Limit(format!(
                "escape repeats {} times, at most {} allowed",
                count, MAX_STATIC_REPEAT
            )));
        }
        Escape::Static(c) => {
            let text: String = std::iter::repeat(c).take(count as usize).collect();
            if !text.is_empty() {
                compiler.gen.add_string_ref(StringOp::Print, &text);
            }
        }
        Escape::Chars(class) => {
            let Ok(count) = i32::try_from(count) else {
                compilation_error!(compiler, token.pos, InvalidArgument {
                    what: "character count".into(),
                    value: count.to_string()
                });
            };
            compiler
                .gen
                .add_generic(OpCode::PrintChars((class as u8, count)));
        }
        Escape::Article => {
            compiler.gen.add_generic(OpCode::Article);
        }
    }
    Ok(Step::Done)
}
