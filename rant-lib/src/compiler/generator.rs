use std::collections::HashMap;
use std::sync::Arc;

use regex_lite::Regex;

use crate::core::{BlockInfo, Program, ProgramRegex, Query, SourcePos};
use crate::opcode::{ByteCursor, OpCode};
use crate::output::Visibility;

/// Instructions that take a string table index as operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Print,
    Push,
    OpenChannel(Visibility),
}

/// represents byte code while it's being built
///
/// Instructions are encoded right away. Forward jumps are emitted with a dummy target and
/// patched in place once the target is known, which works because operands have a fixed size.
#[derive(Debug, Clone, Default)]
pub struct BytecodeGenerator {
    code: Vec<u8>,
    strings: Vec<String>,
    string_index: HashMap<String, usize>,
    /// how many instructions reference each string
    ref_counts: Vec<usize>,
    /// offset and string index of the last instruction, if it is a PrintString
    last_print: Option<(usize, usize)>,
    debug: bool,
    blocks: Vec<BlockInfo>,
    regexes: Vec<ProgramRegex>,
    queries: Vec<Query>,
    references: Vec<Arc<Program>>,
    reference_names: Vec<String>,
}

impl BytecodeGenerator {
    pub fn new(debug: bool) -> Self {
        BytecodeGenerator {
            debug,
            ..Default::default()
        }
    }

    /// offset the next instruction will be written to
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn add_generic(&mut self, op: OpCode) -> usize {
        let at = self.code.len();
        op.encode(&mut self.code);
        self.last_print = None;
        at
    }

    /// emits a source position marker, only in debug builds
    pub fn add_debug(&mut self, pos: SourcePos) {
        if self.debug {
            let clamp = |v: usize| i32::try_from(v).unwrap_or(i32::MAX);
            self.add_generic(OpCode::Debug((
                clamp(pos.line),
                clamp(pos.column),
                clamp(pos.offset),
            )));
        }
    }

    fn intern(&mut self, value: &str) -> usize {
        let idx = match self.string_index.get(value) {
            Some(&idx) => idx,
            None => {
                self.strings.push(value.to_owned());
                self.ref_counts.push(0);
                let idx = self.strings.len() - 1;
                self.string_index.insert(value.to_owned(), idx);
                idx
            }
        };
        self.ref_counts[idx] += 1;
        idx
    }

    /// Emits an instruction referencing `value` through the string table.
    ///
    /// Printing right after another print is merged into the previous instruction. Its string
    /// is grown in place when nothing else references it, otherwise the merged text becomes a
    /// new entry and the previous print is pointed at it.
    pub fn add_string_ref(&mut self, op: StringOp, value: &str) {
        if op == StringOp::Print {
            if let Some((at, idx)) = self.last_print {
                self.merge_print(at, idx, value);
                return;
            }
        }
        let idx = self.intern(value);
        let operand = idx as i32;
        let at = self.add_generic(match op {
            StringOp::Print => OpCode::PrintString(operand),
            StringOp::Push => OpCode::PushString(operand),
            StringOp::OpenChannel(visibility) => {
                OpCode::OpenChannel((operand, visibility.to_byte()))
            }
        });
        if op == StringOp::Print {
            self.last_print = Some((at, idx));
        }
    }

    fn merge_print(&mut self, at: usize, idx: usize, value: &str) {
        let merged = format!("{}{}", self.strings[idx], value);
        if self.ref_counts[idx] == 1 && !self.string_index.contains_key(&merged) {
            self.string_index.remove(&self.strings[idx]);
            self.string_index.insert(merged.clone(), idx);
            self.strings[idx] = merged;
            return;
        }
        self.ref_counts[idx] -= 1;
        let new_idx = self.intern(&merged);
        self.rewrite(at, OpCode::PrintString(new_idx as i32));
        self.last_print = Some((at, new_idx));
    }

    /// overwrites the instruction at `at` with one of the same size
    fn rewrite(&mut self, at: usize, op: OpCode) {
        let mut bytes = Vec::with_capacity(op.encoded_size());
        op.encode(&mut bytes);
        self.code[at..at + bytes.len()].copy_from_slice(&bytes);
    }

    /// Points the jump at `at` to `target`. A target at the current position is a label, so
    /// the next print can't be merged into one before it.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        if target >= self.code.len() {
            self.last_print = None;
        }
        let mut cursor = ByteCursor::at(&self.code, at);
        if let Ok(op) = OpCode::decode(&mut cursor) {
            if op.jump_target().is_some() {
                self.rewrite(at, op.with_jump_target(target as i32));
            }
        }
    }

    /// Adds an empty entry to the block table, to be filled with [Self::set_block]
    pub fn reserve_block(&mut self) -> i32 {
        self.blocks.push(BlockInfo {
            end_address: 0,
            items: vec![],
        });
        (self.blocks.len() - 1) as i32
    }

    pub fn set_block(&mut self, idx: i32, info: BlockInfo) {
        if let Some(block) = usize::try_from(idx).ok().and_then(|i| self.blocks.get_mut(i)) {
            *block = info;
        }
    }

    /// adds a regex to the regex table, `source` already carries the inline flags
    pub fn add_regex(&mut self, source: &str) -> Result<u32, regex_lite::Error> {
        if let Some(idx) = self.regexes.iter().position(|r| r.source == source) {
            return Ok(idx as u32);
        }
        let regex = Regex::new(source)?;
        self.regexes.push(ProgramRegex {
            source: source.to_owned(),
            regex,
        });
        Ok((self.regexes.len() - 1) as u32)
    }

    pub fn add_query(&mut self, query: Query) -> i32 {
        self.queries.push(query);
        (self.queries.len() - 1) as i32
    }

    /// registers an imported program, importing the same name twice gives the same index
    pub fn add_reference(&mut self, name: &str, program: Arc<Program>) -> u16 {
        if let Some(idx) = self.reference_names.iter().position(|n| n == name) {
            return idx as u16;
        }
        self.reference_names.push(name.to_owned());
        self.references.push(program);
        (self.references.len() - 1) as u16
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Removes strings no instruction references anymore, which merging can leave behind,
    /// and renumbers the operands pointing past them.
    fn drop_unused_strings(&mut self) {
        if self.ref_counts.iter().all(|&count| count > 0) {
            return;
        }
        let mut remap = Vec::with_capacity(self.strings.len());
        let mut kept = Vec::with_capacity(self.strings.len());
        for (value, &count) in self.strings.drain(..).zip(&self.ref_counts) {
            remap.push(kept.len() as i32);
            if count > 0 {
                kept.push(value);
            }
        }
        self.strings = kept;
        self.ref_counts.retain(|&count| count > 0);
        self.string_index = self
            .strings
            .iter()
            .enumerate()
            .map(|(idx, value)| (value.clone(), idx))
            .collect();

        let new_index = |idx: i32| {
            usize::try_from(idx)
                .ok()
                .and_then(|i| remap.get(i).copied())
                .unwrap_or(idx)
        };
        let mut at = 0;
        while at < self.code.len() {
            let mut cursor = ByteCursor::at(&self.code, at);
            let Ok(op) = OpCode::decode(&mut cursor) else {
                break;
            };
            let next = cursor.position();
            let renumbered = match op {
                OpCode::PrintString(idx) => Some(OpCode::PrintString(new_index(idx))),
                OpCode::PushString(idx) => Some(OpCode::PushString(new_index(idx))),
                OpCode::OpenChannel((idx, visibility)) => {
                    Some(OpCode::OpenChannel((new_index(idx), visibility)))
                }
                _ => None,
            };
            if let Some(op) = renumbered {
                self.rewrite(at, op);
            }
            at = next;
        }
        self.last_print = None;
    }

    pub fn build(mut self, name: &str) -> Program {
        self.drop_unused_strings();
        Program {
            name: name.to_owned(),
            bytecode: self.code,
            strings: self.strings,
            blocks: self.blocks,
            regexes: self.regexes,
            queries: self.queries,
            references: self.references,
            reference_names: self.reference_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(program: &Program) -> Vec<OpCode> {
        let mut cursor = ByteCursor::new(&program.bytecode);
        let mut out = vec![];
        while !cursor.is_at_end() {
            out.push(OpCode::decode(&mut cursor).unwrap());
        }
        out
    }

    #[test]
    fn adjacent_prints_are_merged() {
        let mut gen = BytecodeGenerator::new(false);
        gen.add_string_ref(StringOp::Print, "ab");
        gen.add_string_ref(StringOp::Print, "cd");
        let program = gen.build("t");
        assert_eq!(ops(&program), vec![OpCode::PrintString(0)]);
        assert_eq!(program.strings, vec!["abcd".to_owned()]);
    }

    #[test]
    fn shared_strings_are_not_mutated() {
        let mut gen = BytecodeGenerator::new(false);
        gen.add_string_ref(StringOp::Push, "ab");
        gen.add_string_ref(StringOp::Print, "ab");
        gen.add_string_ref(StringOp::Print, "cd");
        let program = gen.build("t");
        assert_eq!(
            ops(&program),
            vec![OpCode::PushString(0), OpCode::PrintString(1)]
        );
        assert_eq!(program.strings, vec!["ab".to_owned(), "abcd".to_owned()]);
    }

    #[test]
    fn strings_left_unreferenced_by_merging_are_dropped() {
        let mut gen = BytecodeGenerator::new(false);
        gen.add_string_ref(StringOp::Push, "abcd");
        gen.add_generic(OpCode::Pop);
        gen.add_string_ref(StringOp::Print, "ab");
        gen.add_string_ref(StringOp::Print, "cd");
        gen.add_string_ref(StringOp::Push, "z");
        let program = gen.build("t");
        assert_eq!(program.strings, vec!["abcd".to_owned(), "z".to_owned()]);
        assert_eq!(
            ops(&program),
            vec![
                OpCode::PushString(0),
                OpCode::Pop,
                OpCode::PrintString(0),
                OpCode::PushString(1)
            ]
        );
    }

    #[test]
    fn strings_are_deduplicated() {
        let mut gen = BytecodeGenerator::new(false);
        gen.add_string_ref(StringOp::Print, "x");
        gen.add_generic(OpCode::Print);
        gen.add_string_ref(StringOp::Print, "x");
        let program = gen.build("t");
        assert_eq!(
            ops(&program),
            vec![OpCode::PrintString(0), OpCode::Print, OpCode::PrintString(0)]
        );
        assert_eq!(program.strings.len(), 1);
    }

    #[test]
    fn other_instructions_break_merging() {
        let mut gen = BytecodeGenerator::new(false);
        gen.add_string_ref(StringOp::Print, "a");
        gen.add_generic(OpCode::CloseChannel);
        gen.add_string_ref(StringOp::Print, "b");
        assert_eq!(gen.build("t").strings, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn debug_markers_only_in_debug_builds() {
        let pos = SourcePos {
            line: 1,
            column: 2,
            offset: 1,
        };
        let mut release = BytecodeGenerator::new(false);
        release.add_debug(pos);
        release.add_string_ref(StringOp::Print, "a");
        let mut debug = BytecodeGenerator::new(true);
        debug.add_debug(pos);
        debug.add_string_ref(StringOp::Print, "a");
        let (release, debug) = (release.build("t"), debug.build("t"));
        assert!(release.bytecode.len() < debug.bytecode.len());
        assert_eq!(ops(&debug)[0], OpCode::Debug((1, 2, 1)));
    }

    #[test]
    fn labels_stop_merging() {
        let mut gen = BytecodeGenerator::new(false);
        let jump = gen.add_generic(OpCode::JumpZero(0));
        gen.add_string_ref(StringOp::Print, "then");
        let here = gen.position();
        gen.patch_jump(jump, here);
        gen.add_string_ref(StringOp::Print, "after");
        assert_eq!(gen.build("t").strings.len(), 2);
    }

    #[test]
    fn jumps_are_patched() {
        let mut gen = BytecodeGenerator::new(false);
        let jump = gen.add_generic(OpCode::JumpEqual(0));
        gen.add_generic(OpCode::Print);
        let target = gen.position();
        gen.patch_jump(jump, target);
        assert_eq!(
            ops(&gen.build("t")),
            vec![OpCode::JumpEqual(target as i32), OpCode::Print]
        );
    }
}
