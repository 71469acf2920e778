//! Human readable listings of compiled programs

use std::fmt::Write;

use crate::core::Program;
use crate::opcode::{ByteCursor, DecodeError, OpCode};

/// decodes the whole code of `program`, with the offset of each instruction
pub fn instructions(program: &Program) -> Result<Vec<(usize, OpCode)>, DecodeError> {
    let mut cursor = ByteCursor::new(&program.bytecode);
    let mut out = vec![];
    while !cursor.is_at_end() {
        let offset = cursor.position();
        out.push((offset, OpCode::decode(&mut cursor)?));
    }
    Ok(out)
}

fn annotation(program: &Program, op: &OpCode) -> Option<String> {
    use OpCode::*;
    match op {
        PrintString(idx) | PushString(idx) | OpenChannel((idx, _)) => {
            program.string(*idx).map(|s| format!("{:?}", s))
        }
        Block(idx) => program.block(*idx).map(|b| {
            let items: Vec<_> = b.items.iter().map(|i| format!("{:04x}", i.offset)).collect();
            format!("items [{}], end {:04x}", items.join(", "), b.end_address)
        }),
        Query(idx) => program
            .query(*idx)
            .map(|q| format!("<{}>", q.table.as_deref().unwrap_or(""))),
        CallProgram(idx) => program.reference_names.get(*idx as usize).cloned(),
        _ => None,
    }
}

/// One line per instruction, followed by the string table. Stops at the first instruction
/// that can't be decoded, and says so.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; {} ({} bytes)", program.name, program.bytecode.len());
    let mut cursor = ByteCursor::new(&program.bytecode);
    while !cursor.is_at_end() {
        let offset = cursor.position();
        match OpCode::decode(&mut cursor) {
            Ok(op) => {
                let _ = match annotation(program, &op) {
                    Some(note) => writeln!(out, "{:04x}  {:<36} ; {}", offset, format!("{:?}", op), note),
                    None => writeln!(out, "{:04x}  {:?}", offset, op),
                };
            }
            Err(e) => {
                let _ = writeln!(out, "{:04x}  ; {}", offset, e);
                break;
            }
        }
    }
    if !program.strings.is_empty() {
        let _ = writeln!(out, "; strings");
        for (i, s) in program.strings.iter().enumerate() {
            let _ = writeln!(out, "{:>4}  {:?}", i, s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    #[test]
    fn listing() {
        let program = compile("demo", "hi {a|b}", false).unwrap();
        let ops = instructions(&program).unwrap();
        assert_eq!(ops[0], (0, OpCode::PrintString(0)));
        assert_eq!(ops[1], (5, OpCode::Block(0)));

        let text = disassemble(&program);
        assert!(text.starts_with("; demo ("));
        assert!(text.contains("0000  PrintString(0)"));
        assert!(text.contains("\"hi \""));
        assert!(text.contains("items [000a, "));
    }

    #[test]
    fn broken_code_is_reported() {
        let mut program = compile("demo", "x", false).unwrap();
        program.bytecode.push(0xee);
        assert_eq!(instructions(&program), Err(DecodeError::UnknownOpCode(0xee)));
        assert!(disassemble(&program).contains("Unknown opcode 0xee"));
    }
}
