//! `[name]` and `[name:arg;arg]`, covering intrinsics, subroutines, imports and natives
//!
//! Intrinsics compile to dedicated instructions. Everything else is looked up in the function
//! registry and compiled to a `NativeCall`, with the arguments prepared according to the
//! parameter kinds of the function.

use std::str::FromStr;

use crate::compiler::parselets::{Parselet, PatternParselet, Step, Terminator};
use crate::compiler::{
    compilation_error, compiler_bug, CompileErrorKind, CompileResult, Compiler, StringOp,
    Subroutine,
};
use crate::core::{RuntimeObject, SourcePos, TokenKind};
use crate::opcode::OpCode;
use crate::output::Visibility;
use crate::vm::built_ins::ParamKind;

#[derive(Debug, Clone)]
enum TagKind {
    Open,
    Close,
    Set,
    Get,
    Swap,
    Arithmetic(OpCode),
    Concat,
    /// the jump taken when the comparison holds
    Compare { jump: OpCode, numeric: bool },
    Zero(OpCode),
    Argument,
    Call(Subroutine),
    Define { skip: usize },
    Import,
    Native { id: u16, params: Vec<ParamKind> },
}

/// how an argument is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgMode {
    /// constant text, consumed at compile time
    Name,
    /// pushed as a String
    Captured,
    /// pushed as a Number
    Number,
    /// printed where it stands
    Inline,
    /// compiled out of line and pushed as a Pointer
    OutOfLine,
}

#[derive(Debug, Clone)]
struct Tag {
    name: String,
    kind: TagKind,
    min: usize,
    max: usize,
}

impl Tag {
    fn new(name: &str, kind: TagKind, min: usize, max: usize) -> Self {
        Tag {
            name: name.to_owned(),
            kind,
            min,
            max,
        }
    }

    fn intrinsic(name: &str) -> Option<Self> {
        use OpCode::*;
        let compare = |jump, numeric| TagKind::Compare { jump, numeric };
        let (kind, min, max) = match name {
            "open" => (TagKind::Open, 1, 2),
            "close" => (TagKind::Close, 0, 0),
            "set" => (TagKind::Set, 2, 2),
            "get" => (TagKind::Get, 1, 1),
            "swap" => (TagKind::Swap, 2, 2),
            "add" => (TagKind::Arithmetic(Add), 2, 2),
            "sub" => (TagKind::Arithmetic(Subtract), 2, 2),
            "mul" => (TagKind::Arithmetic(Multiply), 2, 2),
            "div" => (TagKind::Arithmetic(Divide), 2, 2),
            "mod" => (TagKind::Arithmetic(Modulo), 2, 2),
            "cat" => (TagKind::Concat, 2, 2),
            "eq" => (compare(JumpEqual(0), false), 3, 4),
            "neq" => (compare(JumpNotEqual(0), false), 3, 4),
            "gt" => (compare(JumpGreater(0), true), 3, 4),
            "ge" => (compare(JumpGreaterEqual(0), true), 3, 4),
            "lt" => (compare(JumpLess(0), true), 3, 4),
            "le" => (compare(JumpLessEqual(0), true), 3, 4),
            "zero" => (TagKind::Zero(JumpZero(0)), 2, 3),
            "nonzero" => (TagKind::Zero(JumpNotZero(0)), 2, 3),
            "arg" => (TagKind::Argument, 1, 1),
            "import" => (TagKind::Import, 1, 1),
            _ => return None,
        };
        Some(Tag::new(name, kind, min, max))
    }

    fn mode(&self, index: usize) -> ArgMode {
        use ArgMode::*;
        match &self.kind {
            TagKind::Open
            | TagKind::Close
            | TagKind::Get
            | TagKind::Swap
            | TagKind::Argument
            | TagKind::Import => Name,
            TagKind::Set => [Name, Captured][index.min(1)],
            TagKind::Arithmetic(_) => Number,
            TagKind::Concat | TagKind::Call(_) => Captured,
            TagKind::Compare { numeric, .. } => match index {
                0 | 1 if *numeric => Number,
                0 | 1 => Captured,
                _ => Inline,
            },
            TagKind::Zero(_) => [Number, Inline][index.min(1)],
            TagKind::Define { .. } => Inline,
            TagKind::Native { params, .. } => match params.get(index) {
                Some(ParamKind::Number) => Number,
                Some(ParamKind::Pattern) => OutOfLine,
                _ => Captured,
            },
        }
    }
}

/// what to emit once a child pattern compiled an argument
#[derive(Debug, Clone, Copy)]
enum After {
    Capture,
    CaptureNumber,
    Inline,
    OutOfLine { skip: usize, start: usize },
}

pub struct TagParselet {
    pos: SourcePos,
    tag: Option<Tag>,
    /// index of the argument being compiled
    index: usize,
    pending: Option<After>,
    names: Vec<String>,
    /// a constant first operand of an arithmetic tag, held back in case both fold
    deferred: Option<f64>,
    folded: bool,
    /// jump to the else branch of a comparison
    else_jump: Option<usize>,
    /// jump from the end of the then branch over the else branch
    end_jump: Option<usize>,
}

fn push_number(compiler: &mut Compiler, n: f64) {
    compiler.gen.add_generic(OpCode::PushNumber(n));
}

impl TagParselet {
    pub fn new(pos: SourcePos) -> Self {
        TagParselet {
            pos,
            tag: None,
            index: 0,
            pending: None,
            names: vec![],
            deferred: None,
            folded: false,
            else_jump: None,
            end_jump: None,
        }
    }

    pub fn resume(&mut self, compiler: &mut Compiler) -> CompileResult<Step> {
        let tag = match self.tag.take() {
            Some(tag) => tag,
            None => {
                let tag = self.start(compiler)?;
                if !compiler.reader.take_loose(TokenKind::Colon) {
                    compiler
                        .reader
                        .expect_loose(TokenKind::RightSquare, "':' or ']'")?;
                    self.finish(compiler, &tag)?;
                    return Ok(Step::Done);
                }
                tag
            }
        };
        let step = self.arguments(compiler, &tag);
        self.tag = Some(tag);
        step
    }

    /// reads the name and resolves what the tag is
    fn start(&mut self, compiler: &mut Compiler) -> CompileResult<Tag> {
        let first = compiler.reader.read_loose("function name")?;
        match first.kind {
            TokenKind::Dollar if compiler.reader.take(TokenKind::LeftSquare) => {
                self.define(compiler)
            }
            TokenKind::Dollar => {
                let name = compiler.reader.expect(TokenKind::Text, "subroutine name")?;
                match compiler.subroutines.find_entry(name.text.as_str()) {
                    Some(sub) => {
                        let sub = *sub;
                        Ok(Tag::new(&name.text, TagKind::Call(sub), sub.arity, sub.arity))
                    }
                    None => compilation_error!(compiler, self.pos, UnknownSubroutine(name.text)),
                }
            }
            TokenKind::Text => {
                if let Some(tag) = Tag::intrinsic(&first.text) {
                    return Ok(tag);
                }
                match compiler.ctx.registry.lookup(&first.text) {
                    Some((id, function)) => {
                        let params = function.params.clone();
                        let arity = params.len();
                        Ok(Tag::new(&first.text, TagKind::Native { id, params }, arity, arity))
                    }
                    None => compilation_error!(compiler, self.pos, UnknownFunction(first.text)),
                }
            }
            _ => compilation_error!(compiler, first.pos, Expected {
                expected: "function name".into(),
                found: first.text
            }),
        }
    }

    /// `[$[name:a;b]:body]`, everything up to the body
    fn define(&mut self, compiler: &mut Compiler) -> CompileResult<Tag> {
        let name = compiler
            .reader
            .expect_loose(TokenKind::Text, "subroutine name")?;
        let mut params = vec![];
        if compiler.reader.take_loose(TokenKind::Colon) {
            loop {
                let param = compiler
                    .reader
                    .expect_loose(TokenKind::Text, "parameter name")?;
                params.push(param);
                if !compiler.reader.take_loose(TokenKind::Semicolon) {
                    break;
                }
            }
        }
        compiler.reader.expect_loose(TokenKind::RightSquare, "']'")?;
        if params.len() > u8::MAX as usize {
            compilation_error!(compiler, name.pos, Limit("too many parameters".into()));
        }

        let skip = compiler.gen.add_generic(OpCode::Jump(0));
        let sub = Subroutine {
            address: compiler.gen.position(),
            arity: params.len(),
        };
        compiler.subroutines.add_entry(name.text.clone(), sub);
        compiler.open_frame();
        for (index, param) in params.iter().enumerate() {
            compiler.declare_argument(&param.text, index as u8);
        }
        log::trace!("subroutine '{}' at {}", name.text, sub.address);
        Ok(Tag::new(&name.text, TagKind::Define { skip }, 1, 1))
    }

    fn arguments(&mut self, compiler: &mut Compiler, tag: &Tag) -> CompileResult<Step> {
        if let Some(after) = self.pending.take() {
            self.after_arg(compiler, after);
            if self.end_arg(compiler, tag)? {
                return Ok(Step::Done);
            }
        }
        loop {
            if let Some(child) = self.begin_arg(compiler, tag)? {
                return Ok(Step::Push(child));
            }
            if self.end_arg(compiler, tag)? {
                return Ok(Step::Done);
            }
        }
    }

    fn flush_deferred(&mut self, compiler: &mut Compiler) {
        if let Some(n) = self.deferred.take() {
            push_number(compiler, n);
        }
    }

    /// compiles constant arguments right away, returns a child for everything else
    fn begin_arg(&mut self, compiler: &mut Compiler, tag: &Tag) -> CompileResult<Option<Parselet>> {
        if self.index >= tag.max {
            compilation_error!(compiler, self.pos, ArgumentCount {
                name: tag.name.clone(),
                expected: arity(tag),
                found: self.index + 1
            });
        }
        let stops = [TokenKind::Semicolon, TokenKind::RightSquare];
        let child = || Parselet::Pattern(PatternParselet::new(Terminator::Argument));
        let after = match tag.mode(self.index) {
            ArgMode::Name => {
                let pos = compiler.reader.position();
                match compiler.reader.constant_until(&stops) {
                    Some(text) => self.names.push(text.trim().to_owned()),
                    None => {
                        let found = compiler
                            .reader
                            .peek_loose()
                            .map_or(String::new(), |t| t.text.clone());
                        compilation_error!(compiler, pos, Expected {
                            expected: "a constant name".into(),
                            found
                        })
                    }
                }
                return Ok(None);
            }
            ArgMode::Captured => {
                if let Some(text) = compiler.reader.constant_until(&stops) {
                    compiler.gen.add_string_ref(StringOp::Push, &text);
                    return Ok(None);
                }
                compiler.gen.add_generic(OpCode::NewOutput);
                After::Capture
            }
            ArgMode::Number => {
                if let Some(text) = compiler.reader.constant_until(&stops) {
                    self.constant_number(compiler, tag, &text);
                    return Ok(None);
                }
                self.flush_deferred(compiler);
                compiler.gen.add_generic(OpCode::NewOutput);
                After::CaptureNumber
            }
            ArgMode::Inline => After::Inline,
            ArgMode::OutOfLine => {
                let skip = compiler.gen.add_generic(OpCode::Jump(0));
                After::OutOfLine {
                    skip,
                    start: compiler.gen.position(),
                }
            }
        };
        self.pending = Some(after);
        Ok(Some(child()))
    }

    fn constant_number(&mut self, compiler: &mut Compiler, tag: &Tag, text: &str) {
        let Ok(n) = text.trim().parse::<f64>() else {
            self.flush_deferred(compiler);
            compiler.gen.add_string_ref(StringOp::Push, text);
            compiler.gen.add_generic(OpCode::ToNumber);
            return;
        };
        if let TagKind::Arithmetic(op) = tag.kind {
            if self.index == 0 {
                self.deferred = Some(n);
                return;
            }
            if let Some(a) = self.deferred {
                if let Some(result) = fold(op, a, n) {
                    self.deferred = None;
                    self.folded = true;
                    compiler.gen.add_generic(OpCode::PrintNumber(result));
                    return;
                }
            }
        }
        self.flush_deferred(compiler);
        push_number(compiler, n);
    }

    fn after_arg(&mut self, compiler: &mut Compiler, after: After) {
        match after {
            After::Capture => {
                compiler.gen.add_generic(OpCode::ReturnOutput);
            }
            After::CaptureNumber => {
                compiler.gen.add_generic(OpCode::ReturnOutput);
                compiler.gen.add_generic(OpCode::ToNumber);
            }
            After::Inline => {}
            After::OutOfLine { skip, start } => {
                compiler.gen.add_generic(OpCode::Return);
                let here = compiler.gen.position();
                compiler.gen.patch_jump(skip, here);
                compiler.gen.add_generic(OpCode::PushAddress(start as i32));
            }
        }
    }

    /// reads the `;` or `]` after an argument, returns true once the tag is complete
    fn end_arg(&mut self, compiler: &mut Compiler, tag: &Tag) -> CompileResult<bool> {
        let terminator = compiler.reader.read("';' or ']'")?;
        let more = terminator.kind == TokenKind::Semicolon;
        self.branch(compiler, tag, more);
        self.index += 1;
        if !more {
            self.finish(compiler, tag)?;
        }
        Ok(!more)
    }

    /// the jumps between the operands and branches of comparisons
    fn branch(&mut self, compiler: &mut Compiler, tag: &Tag, more: bool) {
        let (jump, operands) = match tag.kind {
            TagKind::Compare { jump, .. } => (jump, 2),
            TagKind::Zero(jump) => (jump, 1),
            _ => return,
        };
        if self.index + 1 == operands {
            if operands == 1 {
                push_number(compiler, 0.0);
            }
            compiler.gen.add_generic(OpCode::Compare);
            let then_jump = compiler.gen.add_generic(jump);
            self.else_jump = Some(compiler.gen.add_generic(OpCode::Jump(0)));
            let here = compiler.gen.position();
            compiler.gen.patch_jump(then_jump, here);
        } else if self.index == operands && more {
            self.end_jump = Some(compiler.gen.add_generic(OpCode::Jump(0)));
            self.patch_else(compiler);
        }
    }

    fn patch_else(&mut self, compiler: &mut Compiler) {
        if let Some(at) = self.else_jump.take() {
            let here = compiler.gen.position();
            compiler.gen.patch_jump(at, here);
        }
    }

    fn name(&self, compiler: &Compiler, index: usize) -> CompileResult<&str> {
        match self.names.get(index) {
            Some(name) => Ok(name),
            None => compiler_bug!(compiler, self.pos, "name argument {} missing", index),
        }
    }

    fn local(&self, compiler: &Compiler, index: usize) -> CompileResult<u16> {
        let name = self.name(compiler, index)?;
        match compiler.local(name) {
            Some(slot) => Ok(slot),
            None => compilation_error!(compiler, self.pos, UnknownVariable(name.to_owned())),
        }
    }

    /// checks the argument count and emits what follows the arguments
    fn finish(&mut self, compiler: &mut Compiler, tag: &Tag) -> CompileResult<()> {
        let count = self.index;
        if count < tag.min || count > tag.max {
            compilation_error!(compiler, self.pos, ArgumentCount {
                name: tag.name.clone(),
                expected: arity(tag),
                found: count
            });
        }
        let gen = |compiler: &mut Compiler, op| {
            compiler.gen.add_generic(op);
        };
        match &tag.kind {
            TagKind::Open => {
                let visibility = match self.names.get(1).map(String::as_str) {
                    None | Some("") => Visibility::Public,
                    Some(v) => match Visibility::from_str(v) {
                        Ok(v) => v,
                        Err(_) => compilation_error!(compiler, self.pos, InvalidArgument {
                            what: "visibility".into(),
                            value: v.to_owned()
                        }),
                    },
                };
                let name = self.name(compiler, 0)?.to_owned();
                compiler
                    .gen
                    .add_string_ref(StringOp::OpenChannel(visibility), &name);
            }
            TagKind::Close => gen(compiler, OpCode::CloseChannel),
            TagKind::Set => {
                let name = self.name(compiler, 0)?.to_owned();
                let slot = compiler.declare_local(&name, self.pos)?;
                gen(compiler, OpCode::SetLocal(slot));
            }
            TagKind::Get => {
                let slot = self.local(compiler, 0)?;
                gen(compiler, OpCode::LoadLocal(slot));
                gen(compiler, OpCode::Print);
            }
            TagKind::Swap => {
                let a = self.local(compiler, 0)?;
                let b = self.local(compiler, 1)?;
                gen(compiler, OpCode::Swap((a, b)));
            }
            TagKind::Arithmetic(op) => {
                if !self.folded {
                    gen(compiler, *op);
                    gen(compiler, OpCode::Print);
                }
            }
            TagKind::Concat => {
                gen(compiler, OpCode::Concat);
                gen(compiler, OpCode::Print);
            }
            TagKind::Compare { .. } | TagKind::Zero(_) => {
                self.patch_else(compiler);
                if let Some(at) = self.end_jump.take() {
                    let here = compiler.gen.position();
                    compiler.gen.patch_jump(at, here);
                }
            }
            TagKind::Argument => {
                let name = self.name(compiler, 0)?;
                match compiler.argument(name) {
                    Some(index) => gen(compiler, OpCode::LoadArgument(index)),
                    None => compilation_error!(compiler, self.pos, UnknownVariable(name.to_owned())),
                }
                gen(compiler, OpCode::Print);
            }
            TagKind::Call(sub) => {
                gen(compiler, OpCode::Call((sub.address as i32, count as u8)));
            }
            TagKind::Define { skip } => {
                gen(compiler, OpCode::Return);
                let here = compiler.gen.position();
                compiler.gen.patch_jump(*skip, here);
                compiler.close_frame();
            }
            TagKind::Import => {
                let name = self.name(compiler, 0)?.to_owned();
                let Some(program) = compiler.ctx.imports.get(&name).cloned() else {
                    compilation_error!(compiler, self.pos, UnknownImport(name));
                };
                let idx = compiler.gen.add_reference(&name, program);
                gen(compiler, OpCode::CallProgram(idx));
            }
            TagKind::Native { id, .. } => {
                gen(compiler, OpCode::NativeCall((*id, count as u8)));
            }
        }
        Ok(())
    }
}

fn arity(tag: &Tag) -> String {
    if tag.min == tag.max {
        tag.min.to_string()
    } else {
        format!("{}-{}", tag.min, tag.max)
    }
}

/// the result of `a op b`, if it can be computed ahead of time
fn fold(op: OpCode, a: f64, b: f64) -> Option<f64> {
    let (a, b) = (RuntimeObject::Number(a), RuntimeObject::Number(b));
    let result = match op {
        OpCode::Add => a.add(&b),
        OpCode::Subtract => a.sub(&b),
        OpCode::Multiply => a.mul(&b),
        OpCode::Divide => a.div(&b).ok()?,
        OpCode::Modulo => a.rem(&b).ok()?,
        _ => return None,
    };
    result.as_number()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::opcode::ByteCursor;
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
    fn comparison_layout() {
        use OpCode::*;
        assert_eq!(
            ops("[eq:a;b;yes;no]"),
            vec![
                PushString(0),
                PushString(1),
                Compare,
                JumpEqual(21),
                Jump(31),
                PrintString(2),
                Jump(36),
                PrintString(3),
            ]
        );
    }

    #[test]
    fn comparison_without_else() {
        use OpCode::*;
        assert_eq!(
            ops("[zero:0;none]"),
            vec![
                PushNumber(0.0),
                PushNumber(0.0),
                Compare,
                JumpZero(29),
                Jump(34),
                PrintString(0),
            ]
        );
    }

    #[test]
    fn subroutines() {
        use OpCode::*;
        assert_eq!(
            ops("[$[greet:who]:hi [arg:who]][$greet:bob]"),
            vec![
                Jump(14),
                PrintString(0),
                LoadArgument(0),
                Print,
                Return,
                PushString(1),
                Call((5, 1)),
            ]
        );
    }

    #[test]
    fn pattern_arguments_are_out_of_line() {
        use OpCode::*;
        let ops = ops("[pool:p;k;x]");
        assert_eq!(
            &ops[2..],
            &[Jump(21), PrintString(2), Return, PushAddress(15), NativeCall((4, 3))]
        );
    }

    #[test]
    fn captured_arguments() {
        use OpCode::*;
        assert_eq!(
            ops("[cat:{a};b]").first(),
            Some(&NewOutput),
        );
        assert_eq!(
            ops("[add:{1};2]"),
            vec![
                NewOutput,
                Block(0),
                PrintString(0),
                BlockEnd,
                ReturnOutput,
                ToNumber,
                PushNumber(2.0),
                Add,
                Print
            ]
        );
    }

    #[rstest]
    #[case("[get:x]", CompileErrorKind::UnknownVariable("x".into()))]
    #[case("[arg:x]", CompileErrorKind::UnknownVariable("x".into()))]
    #[case("[$[f]:[set:x;1]][get:x]", CompileErrorKind::UnknownVariable("x".into()))]
    #[case("[$[f:a]:x][$f]", CompileErrorKind::ArgumentCount { name: "f".into(), expected: "1".into(), found: 0 })]
    #[case("[close:x]", CompileErrorKind::ArgumentCount { name: "close".into(), expected: "0".into(), found: 1 })]
    #[case("[eq:a]", CompileErrorKind::ArgumentCount { name: "eq".into(), expected: "3-4".into(), found: 1 })]
    #[case("[open:x;secret]", CompileErrorKind::InvalidArgument { what: "visibility".into(), value: "secret".into() })]
    #[case("[open:[get:y]]", CompileErrorKind::Expected { expected: "a constant name".into(), found: "[".into() })]
    fn tag_errors(#[case] src: &str, #[case] expected: CompileErrorKind) {
        assert_eq!(error(src), expected);
    }

    #[test]
    fn open_channels() {
        use OpCode::*;
        assert_eq!(
            ops("[open:notes;private]x[close]"),
            vec![OpenChannel((0, 1)), PrintString(1), CloseChannel]
        );
    }
}
