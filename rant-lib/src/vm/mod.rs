//! contains the exec functions that correspond to the [OpCode](crate::opcode::OpCode) variants
//!
//! Each `exec_` function is called by [OpCode::dispatch](crate::opcode::OpCode::dispatch) with
//! the decoded operand. The instruction pointer has already been moved past the instruction,
//! the returned [ExecOutcome] says where execution continues.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::core::{ArithmeticError, Comparison, Program, RuntimeObject};
use crate::opcode::DecodeError;
use crate::output::{FormatOptions, Output, Visibility};

pub mod built_ins;
mod frame;
mod machine;
mod stack;

pub use frame::Frame;
pub use machine::{Environment, Machine};
pub use stack::Stack;

use built_ins::FunctionRegistry;

/// Runs `program` with the built-in functions, no seed pools and no dictionary.
/// Use an [Engine](crate::engine::Engine) to provide those.
pub fn run(
    program: &Program,
    seed: u64,
    options: &RunOptions,
) -> std::result::Result<Output, RuntimeError> {
    let pools = HashMap::new();
    let env = Environment {
        registry: FunctionRegistry::standard(),
        pools: &pools,
        dictionary: None,
    };
    Machine::new(program, seed, options, env).run()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("Malformed bytecode: {0}")]
    Decode(#[from] DecodeError),

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Stack overflow, more than {0} values")]
    StackOverflow(usize),

    #[error("Call stack overflow, more than {0} frames")]
    CallStackOverflow(usize),

    #[error("Attempted to divide {0} by zero")]
    DivideByZero(f64),

    #[error("Insufficient arguments: expected {expected}, got {actual}")]
    InsufficientArguments { expected: usize, actual: usize },

    #[error("Invalid address {0}")]
    InvalidAddress(i64),

    #[error("Invalid {table} index {index}")]
    InvalidIndex { table: &'static str, index: i64 },

    #[error("Timed out")]
    Timeout,

    #[error("Character limit of {0} exceeded")]
    CharLimitExceeded(usize),

    #[error("A query was run, but no dictionary is attached")]
    NoDictionary,

    #[error("Unknown seed pool '{0}'")]
    UnknownPool(String),

    #[error("Invalid argument for '{function}': {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },

    #[error("Internal VM exception: {0}")]
    Internal(String),
}

impl From<ArithmeticError> for VmError {
    fn from(value: ArithmeticError) -> Self {
        match value {
            ArithmeticError::DivideByZero(n) => VmError::DivideByZero(n),
        }
    }
}

/// A fatal error, with the position of the code that caused it
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Runtime error in {program}{}: {kind}", location(.line, .column, .address))]
pub struct RuntimeError {
    pub program: String,
    /// source position of the last debug marker, if the program carries them
    pub line: Option<usize>,
    pub column: Option<usize>,
    /// offset of the failing instruction
    pub address: usize,
    pub kind: VmError,
}

fn location(line: &Option<usize>, column: &Option<usize>, address: &usize) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" @ Ln {}, Col {} (0x{:04x})", line, column, address),
        _ => format!(" @ 0x{:04x}", address),
    }
}

/// Limits and formatting for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub format: FormatOptions,
    pub timeout: Option<Duration>,
    /// maximum number of chars printed to the output, captured text is counted when printed
    pub char_limit: Option<usize>,
    pub max_call_depth: usize,
    pub max_stack_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            format: FormatOptions::default(),
            timeout: None,
            char_limit: None,
            max_call_depth: 256,
            max_stack_size: 4096,
        }
    }
}

/// returned by all exec_ functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// continue with the following instruction
    Next,
    /// continue at this offset of the current frame's program
    Jump(usize),
    /// leave the current frame
    Return,
}

pub type Result<T> = std::result::Result<T, VmError>;
pub type ExecResult = Result<ExecOutcome>;

macro_rules! rt_err{
    ($msg:literal $(, $args:expr)*) => { VmError::Internal(format!($msg $(, $args)*)) };
}
pub(crate) use rt_err;

macro_rules! bail{
    ($($err:tt)*) => {
        return Err(VmError::$($err)*)
    };
}
pub(crate) use bail;

macro_rules! next {
    () => {
        Ok(ExecOutcome::Next)
    };
}

pub fn exec_debug(vm: &mut Machine<'_>, (line, column, _offset): (i32, i32, i32)) -> ExecResult {
    vm.mark_position(line, column);
    next!()
}

pub fn exec_printstring(vm: &mut Machine<'_>, idx: i32) -> ExecResult {
    let text = vm.string(idx)?;
    vm.print(text)?;
    next!()
}

pub fn exec_printnumber(vm: &mut Machine<'_>, n: f64) -> ExecResult {
    let text = vm.format_number(n);
    vm.print(&text)?;
    next!()
}

pub fn exec_openchannel(vm: &mut Machine<'_>, (idx, visibility): (i32, u8)) -> ExecResult {
    let name = vm.string(idx)?;
    let Some(visibility) = Visibility::from_byte(visibility) else {
        bail!(Internal(format!("unknown visibility {}", visibility)));
    };
    vm.writer().open_channel(name, visibility);
    next!()
}

pub fn exec_closechannel(vm: &mut Machine<'_>) -> ExecResult {
    if !vm.writer().close_channel() {
        log::debug!("ignoring close of the main channel");
    }
    next!()
}

pub fn exec_block(vm: &mut Machine<'_>, idx: i32) -> ExecResult {
    vm.start_block(idx)
}

pub fn exec_blockend(vm: &mut Machine<'_>) -> ExecResult {
    vm.end_block_iteration()
}

pub fn exec_print(vm: &mut Machine<'_>) -> ExecResult {
    let value = vm.pop()?;
    let text = vm.display(&value);
    vm.print(&text)?;
    next!()
}

/// pools for `\c`, `\d`, ...
fn char_class(class: u8) -> Option<&'static str> {
    Some(match class {
        b'c' => "abcdefghijklmnopqrstuvwxyz",
        b'C' => "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
        b'd' => "0123456789",
        b'D' => "123456789",
        b'w' => "abcdefghijklmnopqrstuvwxyz0123456789",
        b'W' => "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
        b'x' => "0123456789abcdef",
        b'X' => "0123456789ABCDEF",
        _ => return None,
    })
}

pub fn exec_printchars(vm: &mut Machine<'_>, (class, count): (u8, i32)) -> ExecResult {
    let Some(pool) = char_class(class) else {
        bail!(Internal(format!("unknown character class '{}'", class as char)));
    };
    let pool = pool.as_bytes();
    let text: String = (0..count.max(0))
        .map(|_| pool[vm.rng.next_below(pool.len())] as char)
        .collect();
    vm.print(&text)?;
    next!()
}

pub fn exec_nativecall(vm: &mut Machine<'_>, (id, argc): (u16, u8)) -> ExecResult {
    let function = vm.native(id)?;
    let args = vm.pop_args(argc as usize)?;
    log::trace!("native call {}({:?})", function.name, args);
    (function.handler)(vm, args)?;
    next!()
}

pub fn exec_return(_vm: &mut Machine<'_>) -> ExecResult {
    Ok(ExecOutcome::Return)
}

pub fn exec_newoutput(vm: &mut Machine<'_>) -> ExecResult {
    vm.push_writer();
    next!()
}

pub fn exec_returnoutput(vm: &mut Machine<'_>) -> ExecResult {
    let text = vm.pop_writer()?;
    vm.push(RuntimeObject::String(text))?;
    next!()
}

pub fn exec_pushstring(vm: &mut Machine<'_>, idx: i32) -> ExecResult {
    let text = vm.string(idx)?;
    vm.push(text.into())?;
    next!()
}

pub fn exec_pushnumber(vm: &mut Machine<'_>, n: f64) -> ExecResult {
    vm.push(n.into())?;
    next!()
}

pub fn exec_pop(vm: &mut Machine<'_>) -> ExecResult {
    vm.pop()?;
    next!()
}

pub fn exec_call(vm: &mut Machine<'_>, (address, argc): (i32, u8)) -> ExecResult {
    let address = vm.address(address)?;
    vm.call(address, argc as usize)?;
    next!()
}

pub fn exec_loadargument(vm: &mut Machine<'_>, idx: u8) -> ExecResult {
    let value = vm.argument(idx)?;
    vm.push(value)?;
    next!()
}

pub fn exec_query(vm: &mut Machine<'_>, idx: i32) -> ExecResult {
    vm.query(idx)?;
    next!()
}

pub fn exec_jump(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    Ok(ExecOutcome::Jump(vm.address(address)?))
}

fn binary(
    vm: &mut Machine<'_>,
    op: impl FnOnce(&RuntimeObject, &RuntimeObject) -> Result<RuntimeObject>,
) -> ExecResult {
    let b = vm.pop()?;
    let a = vm.pop()?;
    let result = op(&a, &b)?;
    vm.push(result)?;
    next!()
}

pub fn exec_add(vm: &mut Machine<'_>) -> ExecResult {
    binary(vm, |a, b| Ok(a.add(b)))
}

pub fn exec_subtract(vm: &mut Machine<'_>) -> ExecResult {
    binary(vm, |a, b| Ok(a.sub(b)))
}

pub fn exec_multiply(vm: &mut Machine<'_>) -> ExecResult {
    binary(vm, |a, b| Ok(a.mul(b)))
}

pub fn exec_divide(vm: &mut Machine<'_>) -> ExecResult {
    binary(vm, |a, b| Ok(a.div(b)?))
}

pub fn exec_modulo(vm: &mut Machine<'_>) -> ExecResult {
    binary(vm, |a, b| Ok(a.rem(b)?))
}

pub fn exec_concat(vm: &mut Machine<'_>) -> ExecResult {
    binary(vm, |a, b| Ok(a.concat(b)))
}

pub fn exec_swap(vm: &mut Machine<'_>, (a, b): (u16, u16)) -> ExecResult {
    let frame = vm.frame_mut()?;
    let first = frame.local(a);
    let second = std::mem::replace(frame.local_mut(b), first);
    *frame.local_mut(a) = second;
    next!()
}

pub fn exec_loadlocal(vm: &mut Machine<'_>, idx: u16) -> ExecResult {
    let value = vm.frame_mut()?.local(idx);
    vm.push(value)?;
    next!()
}

pub fn exec_setlocal(vm: &mut Machine<'_>, idx: u16) -> ExecResult {
    let value = vm.pop()?;
    *vm.frame_mut()?.local_mut(idx) = value;
    next!()
}

pub fn exec_compare(vm: &mut Machine<'_>) -> ExecResult {
    let b = vm.pop()?;
    let a = vm.pop()?;
    vm.comparison = a.compare(&b);
    next!()
}

fn jump_if(vm: &mut Machine<'_>, address: i32, cond: fn(Comparison) -> bool) -> ExecResult {
    if cond(vm.comparison) {
        Ok(ExecOutcome::Jump(vm.address(address)?))
    } else {
        next!()
    }
}

pub fn exec_jumpequal(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, Comparison::is_equal)
}

pub fn exec_jumpnotequal(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, Comparison::is_unequal)
}

pub fn exec_jumpgreater(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, |c| c == Comparison::Greater)
}

pub fn exec_jumpgreaterequal(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, |c| matches!(c, Comparison::Greater | Comparison::Equal))
}

pub fn exec_jumpless(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, |c| c == Comparison::Less)
}

pub fn exec_jumplessequal(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, |c| matches!(c, Comparison::Less | Comparison::Equal))
}

pub fn exec_jumpzero(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, Comparison::is_equal)
}

pub fn exec_jumpnotzero(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    jump_if(vm, address, Comparison::is_unequal)
}

pub fn exec_pushnull(vm: &mut Machine<'_>) -> ExecResult {
    vm.push(RuntimeObject::Null)?;
    next!()
}

pub fn exec_pushaddress(vm: &mut Machine<'_>, address: i32) -> ExecResult {
    let address = vm.address(address)?;
    vm.push(RuntimeObject::Pointer(address))?;
    next!()
}

pub fn exec_article(vm: &mut Machine<'_>) -> ExecResult {
    vm.writer().insert_article();
    next!()
}

pub fn exec_tonumber(vm: &mut Machine<'_>) -> ExecResult {
    let value = vm.pop()?;
    vm.push(value.to_number())?;
    next!()
}

pub fn exec_callprogram(vm: &mut Machine<'_>, idx: u16) -> ExecResult {
    vm.call_program(idx)?;
    next!()
}
