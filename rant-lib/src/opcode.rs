//! This file defines the opcodes, and the operand encoding they rely on.
//! There is a lot of code gen going on here by means of the OpCode derive-macro.
//! I consider the macro part of this crate, even though it is technically a sub-crate.
//! Therefore the generated code liberally uses types from here and from [vm](crate::vm),
//! because I know they exist. The vm::* imports are here because of the codegen, btw

use proc_macros::OpCode;
use std::result::Result;
use thiserror::Error;

use crate::vm::*;

/// Representing Opcodes, all variants must have zero or one member.
///
/// Encoded as the discriminant byte followed by the operand in little endian.
/// Addresses are byte offsets into the code of the program that owns the instruction.
#[derive(Debug, Clone, Copy, OpCode, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    /// line, column and char offset of the code that follows
    Debug((i32, i32, i32)) = 0x00,
    /// string table index
    PrintString(i32) = 0x01,
    PrintNumber(f64) = 0x02,
    /// string table index of the channel name, and the visibility byte
    OpenChannel((i32, u8)) = 0x03,
    CloseChannel = 0x04,
    /// block table index
    Block(i32) = 0x05,
    BlockEnd = 0x06,
    /// pops the top of the stack and prints it
    Print = 0x07,
    /// character class and count
    PrintChars((u8, i32)) = 0x08,
    /// function id in the registry and the number of arguments on the stack
    NativeCall((u16, u8)) = 0x09,
    Return = 0x0a,
    NewOutput = 0x0b,
    ReturnOutput = 0x0c,
    PushString(i32) = 0x0d,
    PushNumber(f64) = 0x0e,
    Pop = 0x0f,
    /// subroutine address and the number of arguments on the stack
    Call((i32, u8)) = 0x10,
    LoadArgument(u8) = 0x11,
    /// query table index
    Query(i32) = 0x12,
    Jump(i32) = 0x13,
    Add = 0x14,
    Subtract = 0x15,
    Multiply = 0x16,
    Divide = 0x17,
    Modulo = 0x18,
    Swap((u16, u16)) = 0x19,
    Concat = 0x1a,
    LoadLocal(u16) = 0x1b,
    SetLocal(u16) = 0x1c,
    Compare = 0x1d,
    JumpEqual(i32) = 0x1e,
    JumpNotEqual(i32) = 0x1f,
    JumpGreater(i32) = 0x20,
    JumpGreaterEqual(i32) = 0x21,
    JumpLess(i32) = 0x22,
    JumpLessEqual(i32) = 0x23,
    JumpZero(i32) = 0x24,
    JumpNotZero(i32) = 0x25,
    PushNull = 0x26,
    PushAddress(i32) = 0x27,
    /// leaves a slot for an indefinite article in the output
    Article = 0x28,
    ToNumber = 0x29,
    /// index into the references of the running program
    CallProgram(u16) = 0x2a,
}

impl OpCode {
    /// the jump target, if this is any kind of jump
    pub fn jump_target(&self) -> Option<i32> {
        use OpCode::*;
        match self {
            Jump(a) | JumpEqual(a) | JumpNotEqual(a) | JumpGreater(a) | JumpGreaterEqual(a)
            | JumpLess(a) | JumpLessEqual(a) | JumpZero(a) | JumpNotZero(a) => Some(*a),
            _ => None,
        }
    }

    /// replaces the jump target, used to patch forward jumps
    pub fn with_jump_target(self, target: i32) -> Self {
        use OpCode::*;
        match self {
            Jump(_) => Jump(target),
            JumpEqual(_) => JumpEqual(target),
            JumpNotEqual(_) => JumpNotEqual(target),
            JumpGreater(_) => JumpGreater(target),
            JumpGreaterEqual(_) => JumpGreaterEqual(target),
            JumpLess(_) => JumpLess(target),
            JumpLessEqual(_) => JumpLessEqual(target),
            JumpZero(_) => JumpZero(target),
            JumpNotZero(_) => JumpNotZero(target),
            other => other,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown opcode 0x{0:02x}")]
    UnknownOpCode(u8),

    #[error("Unexpected end of bytecode at {0}")]
    Truncated(usize),
}

/// A bounds checked reader over a byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::at(bytes, 0)
    }

    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        ByteCursor { bytes, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let slice = self
            .pos
            .checked_add(n)
            .and_then(|end| self.bytes.get(self.pos..end))
            .ok_or(DecodeError::Truncated(self.pos))?;
        self.pos += n;
        Ok(slice)
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let start = self.pos;
        self.take(N)?
            .try_into()
            .map_err(|_| DecodeError::Truncated(start))
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }
}

/// A fixed width opcode operand
pub trait Operand: Sized {
    const SIZE: usize;
    fn write(&self, out: &mut Vec<u8>);
    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, DecodeError>;
}

macro_rules! impl_operand_for_primitive {
    ($($t:ty),*) => {$(
        impl Operand for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn write(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, DecodeError> {
                Ok(<$t>::from_le_bytes(cursor.take_array()?))
            }
        }
    )*};
}

impl_operand_for_primitive!(u8, u16, i32, f64);

macro_rules! impl_operand_for_tuple {
    ($($name:ident $var:ident),+) => {
        impl<$($name: Operand),+> Operand for ($($name,)+) {
            const SIZE: usize = 0 $(+ $name::SIZE)+;

            fn write(&self, out: &mut Vec<u8>) {
                let ($($var,)+) = self;
                $($var.write(out);)+
            }

            fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, DecodeError> {
                Ok(($($name::read(cursor)?,)+))
            }
        }
    };
}

impl_operand_for_tuple!(A a, B b);
impl_operand_for_tuple!(A a, B b, C c);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_and_known() {
        let unique: HashSet<_> = OpCode::ALL_CODES.iter().collect();
        assert_eq!(unique.len(), OpCode::ALL_CODES.len());
        for code in OpCode::ALL_CODES {
            assert!(OpCode::mnemonic_of(*code).is_some());
            assert!(OpCode::operand_size_of(*code).is_some());
        }
    }

    #[test]
    fn encoding_is_code_then_little_endian_operand() {
        let mut out = vec![];
        OpCode::OpenChannel((0x0102_0304, 2)).encode(&mut out);
        assert_eq!(out, vec![0x03, 0x04, 0x03, 0x02, 0x01, 0x02]);
        assert_eq!(out.len(), OpCode::OpenChannel((0, 0)).encoded_size());

        let mut cursor = ByteCursor::new(&out);
        assert_eq!(
            OpCode::decode(&mut cursor),
            Ok(OpCode::OpenChannel((0x0102_0304, 2)))
        );
        assert!(cursor.is_at_end());
    }

    #[test]
    fn debug_marker_is_three_words() {
        assert_eq!(OpCode::operand_size_of(OpCode::DEBUG), Some(12));
    }

    #[test]
    fn truncated_operand_is_reported() {
        let bytes = [OpCode::PUSHNUMBER, 0, 0, 0];
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(OpCode::decode(&mut cursor), Err(DecodeError::Truncated(1)));
    }

    #[test]
    fn unknown_code_is_reported() {
        let mut cursor = ByteCursor::new(&[0xff]);
        assert_eq!(
            OpCode::decode(&mut cursor),
            Err(DecodeError::UnknownOpCode(0xff))
        );
    }

    #[test]
    fn jump_targets_can_be_patched() {
        let patched = OpCode::JumpLess(0).with_jump_target(42);
        assert_eq!(patched, OpCode::JumpLess(42));
        assert_eq!(patched.jump_target(), Some(42));
        assert_eq!(OpCode::Print.with_jump_target(3), OpCode::Print);
    }
}
