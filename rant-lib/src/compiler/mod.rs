//! Turns pattern source into a [Program]
//!
//! The pipeline is lexer → [TokenReader] → parselets → [BytecodeGenerator]. The parselets run on
//! an explicit stack (see [parselets]), so deeply nested patterns can't overflow the native stack.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::core::{Program, Scopes, SourcePos};
use crate::vm::built_ins::FunctionRegistry;

pub mod generator;
pub mod lexer;
pub mod parselets;
pub mod reader;

pub use generator::{BytecodeGenerator, StringOp};
pub use reader::TokenReader;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source_name} @ Ln {line}, Col {column}: {kind}")]
pub struct CompileError {
    pub source_name: String,
    pub line: usize,
    pub column: usize,
    pub kind: CompileErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    #[error("Unexpected end of pattern, expected {0}")]
    UnexpectedEnd(String),

    #[error("Expected {expected}, found '{found}'")]
    Expected { expected: String, found: String },

    #[error("Unexpected {0}")]
    Unexpected(String),

    #[error("Invalid escape sequence '{0}'")]
    InvalidEscape(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} arguments, got {found}")]
    ArgumentCount {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("Invalid token in query: '{0}'")]
    InvalidQueryToken(String),

    #[error("Invalid token in query carrier: '{0}'")]
    InvalidCarrierToken(String),

    #[error("Empty query carrier")]
    EmptyCarrier,

    #[error("Carrier delete query specified without any carriers")]
    CarrierDeleteWithoutCarriers,

    #[error("You can't define a negative class filter in an exclusive query")]
    NegativeClassInExclusive,

    #[error("Unknown syllable range syntax '{0}'")]
    SyllableRange(String),

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Invalid {what}: '{value}'")]
    InvalidArgument { what: String, value: String },

    #[error("Unknown subroutine '{0}'")]
    UnknownSubroutine(String),

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Unknown import '{0}'")]
    UnknownImport(String),

    #[error("Program too large: {0}")]
    Limit(String),

    #[error("A compiler bug was detected: {0}")]
    CompilerBug(String),
}

macro_rules! compilation_error {
    ($compiler:expr, $pos:expr, $($err:tt)+) => {
        return Err($compiler.error($pos, CompileErrorKind::$($err)*))
    };
}
pub(crate) use compilation_error;

macro_rules! compiler_bug {
    ($compiler:expr, $pos:expr, $msg:literal $(, $args: expr)*) => {
        return Err($compiler.error($pos, CompileErrorKind::CompilerBug(format!($msg $(, $args)*))))
    };
}
pub(crate) use compiler_bug;

pub type CompileResult<T> = Result<T, CompileError>;

/// Everything a compilation needs besides the source
pub struct CompileContext<'a> {
    /// interleave debug markers, so runtime errors can report source positions
    pub debug: bool,
    pub registry: &'a FunctionRegistry,
    /// programs `[import:name]` can refer to
    pub imports: &'a HashMap<String, Arc<Program>>,
}

/// where a name visible to `[get]`, `[set]` or `[arg]` lives at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Local { frame: usize, index: u16 },
    Argument { frame: usize, index: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subroutine {
    pub address: usize,
    pub arity: usize,
}

/// The state shared by all parselets of one compilation
pub struct Compiler<'a> {
    pub reader: TokenReader,
    pub gen: BytecodeGenerator,
    pub ctx: &'a CompileContext<'a>,
    pub slots: Scopes<String, Slot>,
    pub subroutines: Scopes<String, Subroutine>,
    /// number of locals allocated in each open frame, the last entry is the innermost frame
    frame_locals: Vec<u16>,
}

impl<'a> Compiler<'a> {
    pub fn new(source_name: &str, src: &str, ctx: &'a CompileContext<'a>) -> Self {
        let tokens = lexer::tokenize(src);
        let end = end_position(src);
        Compiler {
            reader: TokenReader::new(source_name, tokens, end),
            gen: BytecodeGenerator::new(ctx.debug),
            ctx,
            slots: Scopes::default(),
            subroutines: Scopes::default(),
            frame_locals: vec![0],
        }
    }

    pub fn error(&self, pos: SourcePos, kind: CompileErrorKind) -> CompileError {
        self.reader.error(pos, kind)
    }

    fn frame(&self) -> usize {
        self.frame_locals.len()
    }

    /// subroutine bodies run in their own frame, with fresh locals
    pub fn open_frame(&mut self) {
        self.slots.open_new();
        self.subroutines.open_new();
        self.frame_locals.push(0);
    }

    pub fn close_frame(&mut self) {
        self.slots.collapse_innermost();
        self.subroutines.collapse_innermost();
        if self.frame_locals.len() > 1 {
            self.frame_locals.pop();
        }
    }

    pub fn local(&self, name: &str) -> Option<u16> {
        match self.slots.find_entry(name) {
            Some(Slot::Local { frame, index }) if *frame == self.frame() => Some(*index),
            _ => None,
        }
    }

    pub fn argument(&self, name: &str) -> Option<u8> {
        match self.slots.find_entry(name) {
            Some(Slot::Argument { frame, index }) if *frame == self.frame() => Some(*index),
            _ => None,
        }
    }

    /// the slot of local `name`, allocated on first use
    pub fn declare_local(&mut self, name: &str, pos: SourcePos) -> CompileResult<u16> {
        if let Some(index) = self.local(name) {
            return Ok(index);
        }
        let frame = self.frame();
        let Some(&index) = self.frame_locals.last() else {
            compiler_bug!(self, pos, "no frame open while declaring '{}'", name);
        };
        let Some(next) = index.checked_add(1) else {
            compilation_error!(self, pos, Limit("too many locals".into()));
        };
        if let Some(count) = self.frame_locals.last_mut() {
            *count = next;
        }
        self.slots.add_entry(name.to_owned(), Slot::Local { frame, index });
        Ok(index)
    }

    pub fn declare_argument(&mut self, name: &str, index: u8) {
        let frame = self.frame();
        self.slots
            .add_entry(name.to_owned(), Slot::Argument { frame, index });
    }

    fn finish(self, source_name: &str) -> CompileResult<Program> {
        if i32::try_from(self.gen.code_len()).is_err() {
            compilation_error!(self, self.reader.position(), Limit("bytecode exceeds 2 GiB".into()));
        }
        Ok(self.gen.build(source_name))
    }
}

fn end_position(src: &str) -> SourcePos {
    let mut pos = SourcePos {
        line: 1,
        column: 1,
        offset: 0,
    };
    for c in src.chars() {
        pos.offset += 1;
        if c == '\n' {
            pos.line += 1;
            pos.column = 1;
        } else {
            pos.column += 1;
        }
    }
    pos
}

/// compiles with the standard function library and no imports
pub fn compile(source_name: &str, src: &str, debug: bool) -> CompileResult<Program> {
    let imports = HashMap::new();
    let ctx = CompileContext {
        debug,
        registry: FunctionRegistry::standard(),
        imports: &imports,
    };
    compile_with(source_name, src, &ctx)
}

pub fn compile_with(source_name: &str, src: &str, ctx: &CompileContext) -> CompileResult<Program> {
    log::debug!("compiling '{}' ({} bytes)", source_name, src.len());
    let mut compiler = Compiler::new(source_name, src, ctx);
    parselets::run(&mut compiler)?;
    let program = compiler.finish(source_name)?;
    log::debug!(
        "compiled '{}': {} bytes of code, {} strings, {} blocks",
        source_name,
        program.bytecode.len(),
        program.strings.len(),
        program.blocks.len()
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{ByteCursor, OpCode};
    use rstest::rstest;

    fn ops(src: &str) -> Vec<OpCode> {
        let program = compile("test", src, false).unwrap();
        let mut cursor = ByteCursor::new(&program.bytecode);
        let mut out = vec![];
        while !cursor.is_at_end() {
            out.push(OpCode::decode(&mut cursor).unwrap());
        }
        out
    }

    fn error(src: &str) -> CompileErrorKind {
        compile("test", src, false).unwrap_err().kind
    }

    #[test]
    fn text_is_merged_into_one_print() {
        let program = compile("test", "hello, world!", false).unwrap();
        assert_eq!(program.strings, vec!["hello, world!".to_owned()]);
        assert_eq!(ops("hello, world!"), vec![OpCode::PrintString(0)]);
    }

    #[test]
    fn constant_arithmetic_is_folded() {
        assert_eq!(ops("[add:1;2]"), vec![OpCode::PrintNumber(3.0)]);
    }

    #[test]
    fn division_by_constant_zero_is_kept() {
        assert_eq!(
            ops("[div:1;0]"),
            vec![
                OpCode::PushNumber(1.0),
                OpCode::PushNumber(0.0),
                OpCode::Divide,
                OpCode::Print
            ]
        );
    }

    #[test]
    fn locals_get_slots() {
        assert_eq!(
            ops("[set:x;a][get:x]"),
            vec![
                OpCode::PushString(0),
                OpCode::SetLocal(0),
                OpCode::LoadLocal(0),
                OpCode::Print
            ]
        );
    }

    #[test]
    fn debug_builds_carry_positions() {
        let program = compile("test", "a\n[close]", true).unwrap();
        let mut cursor = ByteCursor::new(&program.bytecode);
        let mut debug = vec![];
        while !cursor.is_at_end() {
            if let OpCode::Debug(pos) = OpCode::decode(&mut cursor).unwrap() {
                debug.push(pos);
            }
        }
        assert_eq!(debug, vec![(2, 1, 2)]);
    }

    #[rstest]
    #[case("[nope]", CompileErrorKind::UnknownFunction("nope".into()))]
    #[case("a]", CompileErrorKind::Unexpected("function terminator".into()))]
    #[case("a}", CompileErrorKind::Unexpected("block terminator".into()))]
    #[case("a>", CompileErrorKind::Unexpected("query terminator".into()))]
    #[case(r"\q", CompileErrorKind::InvalidEscape(r"\q".into()))]
    #[case("[get:y]", CompileErrorKind::UnknownVariable("y".into()))]
    #[case("[$nope]", CompileErrorKind::UnknownSubroutine("nope".into()))]
    #[case("[import:lib]", CompileErrorKind::UnknownImport("lib".into()))]
    #[case("{a|b", CompileErrorKind::UnexpectedEnd("'|' or '}'".into()))]
    #[case("[rep:1;2]", CompileErrorKind::ArgumentCount { name: "rep".into(), expected: "1".into(), found: 2 })]
    fn compile_errors(#[case] src: &str, #[case] expected: CompileErrorKind) {
        assert_eq!(error(src), expected);
    }

    #[test]
    fn errors_carry_the_position() {
        let err = compile("greeting", "hi\n  [nope]", false).unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
        assert_eq!(
            err.to_string(),
            "greeting @ Ln 2, Col 3: Unknown function 'nope'"
        );
    }
}
