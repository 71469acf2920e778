//! The machine executing programs
//!
//! Execution runs on an explicit frame stack. The root frame runs the entry program from offset
//! 0. Running off the end of a frame's code returns from it, so the run ends once the root
//! frame's code is exhausted.

use std::collections::HashMap;
use std::mem;
use std::ptr;
use std::time::Instant;

use crate::core::{BlockInfo, Comparison, ItemWeight, Program, RuntimeObject};
use crate::opcode::{ByteCursor, OpCode};
use crate::output::format::format_number;
use crate::output::{NumberFormat, Output, OutputWriter};
use crate::rng::{Rng, SeedPool};
use crate::vm::built_ins::{FunctionRegistry, NativeFunction};
use crate::vm::{
    bail, rt_err, ExecOutcome, ExecResult, Frame, Result, RunOptions, RuntimeError, Stack, VmError,
};
use crate::vocab::{CarrierState, Dictionary};

/// the deadline is only checked every this many instructions
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// What a run can reach besides the program itself
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub registry: &'a FunctionRegistry,
    pub pools: &'a HashMap<String, SeedPool>,
    pub dictionary: Option<&'a dyn Dictionary>,
}

/// settings `[rep]` and `[sep]` left for the next block
#[derive(Debug, Clone, Default)]
struct Repeater {
    count: Option<usize>,
    separator: Option<String>,
}

struct ActiveBlock<'a> {
    info: &'a BlockInfo,
    remaining: usize,
    separator: Option<String>,
}

pub struct Machine<'a> {
    entry: &'a Program,
    env: Environment<'a>,
    options: &'a RunOptions,
    seed: u64,
    frames: Vec<Frame<'a>>,
    stack: Stack,
    root: OutputWriter,
    /// outputs opened by `NewOutput`, captured by `ReturnOutput`
    nested: Vec<OutputWriter>,
    blocks: Vec<ActiveBlock<'a>>,
    repeater: Repeater,
    carriers: CarrierState,
    pub rng: Rng,
    pub comparison: Comparison,
    pub number_format: NumberFormat,
    deadline: Option<Instant>,
    executed: u64,
    chars_printed: usize,
    /// program and offset of the instruction being executed
    current: (&'a Program, usize),
    /// program, line and column of the last debug marker
    marker: Option<(&'a Program, usize, usize)>,
}

impl<'a> Machine<'a> {
    pub fn new(
        program: &'a Program,
        seed: u64,
        options: &'a RunOptions,
        env: Environment<'a>,
    ) -> Self {
        Machine {
            entry: program,
            env,
            options,
            seed,
            frames: vec![Frame::new(program, 0, 0, 0)],
            stack: Stack::with_limit(options.max_stack_size),
            root: OutputWriter::new(options.format.capitalization),
            nested: vec![],
            blocks: vec![],
            repeater: Repeater::default(),
            carriers: CarrierState::default(),
            rng: Rng::new(seed),
            comparison: Comparison::default(),
            number_format: options.format.number_format,
            deadline: options.timeout.and_then(|t| Instant::now().checked_add(t)),
            executed: 0,
            chars_printed: 0,
            current: (program, 0),
            marker: None,
        }
    }

    /// runs the program to the end
    pub fn run(mut self) -> std::result::Result<Output, RuntimeError> {
        log::debug!("running '{}' with seed {}", self.entry.name, self.seed);
        if let Err(kind) = self.run_until(0) {
            let err = self.runtime_error(kind);
            log::debug!("{}", err);
            return Err(err);
        }
        log::debug!(
            "'{}' finished after {} instructions",
            self.entry.name,
            self.executed
        );
        Ok(self.root.finish(self.seed))
    }

    fn runtime_error(&self, kind: VmError) -> RuntimeError {
        let (program, address) = self.current;
        let (line, column) = match self.marker {
            Some((marked, line, column)) if ptr::eq(marked, program) => (Some(line), Some(column)),
            _ => (None, None),
        };
        RuntimeError {
            program: program.name.clone(),
            line,
            column,
            address,
            kind,
        }
    }

    /// executes until only `depth` frames are left
    fn run_until(&mut self, depth: usize) -> Result<()> {
        while self.frames.len() > depth {
            let (program, position) = {
                let frame = self.frame()?;
                (frame.program, frame.position)
            };
            if position >= program.bytecode.len() {
                self.leave_frame()?;
                continue;
            }
            self.current = (program, position);
            let mut cursor = ByteCursor::at(&program.bytecode, position);
            let op = OpCode::decode(&mut cursor)?;
            self.frame_mut()?.position = cursor.position();
            self.tick()?;
            log::trace!("{:04x} {:?}", position, op);
            match op.dispatch(self)? {
                ExecOutcome::Next => {}
                ExecOutcome::Jump(address) => self.frame_mut()?.position = address,
                ExecOutcome::Return => self.leave_frame()?,
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.executed += 1;
        if self.executed % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    bail!(Timeout);
                }
            }
        }
        Ok(())
    }

    pub fn frame(&self) -> Result<&Frame<'a>> {
        self.frames.last().ok_or_else(|| rt_err!("no active frame"))
    }

    pub fn frame_mut(&mut self) -> Result<&mut Frame<'a>> {
        self.frames.last_mut().ok_or_else(|| rt_err!("no active frame"))
    }

    fn push_frame(&mut self, mut frame: Frame<'a>) -> Result<()> {
        if self.frames.len() >= self.options.max_call_depth {
            bail!(CallStackOverflow(self.options.max_call_depth));
        }
        frame.blocks = self.blocks.len();
        self.frames.push(frame);
        Ok(())
    }

    /// pops the current frame, keeping the value on top of its stack if it left one
    fn leave_frame(&mut self) -> Result<()> {
        let Some(frame) = self.frames.pop() else {
            bail!(Internal("return without a frame".into()));
        };
        let result = if self.stack.len() > frame.floor() {
            self.stack.pop()
        } else {
            None
        };
        self.stack.truncate(frame.stack_base);
        self.blocks.truncate(frame.blocks);
        if frame.shared {
            if let Some(parent) = self.frames.last_mut() {
                parent.locals = frame.locals;
            }
        }
        if let Some(value) = result {
            self.stack.push(value)?;
        }
        Ok(())
    }

    /// calls the subroutine at `address`, with the top `argc` values as arguments
    pub fn call(&mut self, address: usize, argc: usize) -> Result<()> {
        let frame = self.frame()?;
        let available = self.stack.height_above(frame.floor());
        if available < argc {
            bail!(InsufficientArguments {
                expected: argc,
                actual: available
            });
        }
        let program = frame.program;
        let base = self.stack.len() - argc;
        self.push_frame(Frame::new(program, address, base, argc))
    }

    pub fn call_program(&mut self, idx: u16) -> Result<()> {
        let program = self.frame()?.program;
        let Some(target) = program.reference(idx) else {
            bail!(InvalidIndex {
                table: "reference",
                index: idx as i64
            });
        };
        log::debug!("entering imported program '{}'", target.name);
        let base = self.stack.len();
        self.push_frame(Frame::new(target, 0, base, 0))
    }

    /// Runs the code at `address` on behalf of the current frame, which lends it its locals
    /// and arguments. Returns the value the code left, or Undefined.
    pub fn evaluate_at(&mut self, address: usize) -> Result<RuntimeObject> {
        let address = self.checked_address(address)?;
        if self.frames.len() >= self.options.max_call_depth {
            bail!(CallStackOverflow(self.options.max_call_depth));
        }
        let depth = self.frames.len();
        let base = self.stack.len();
        let parent = self.frame_mut()?;
        let frame = Frame {
            program: parent.program,
            position: address,
            stack_base: base,
            arg_base: parent.arg_base,
            arg_count: parent.arg_count,
            shared: true,
            locals: mem::take(&mut parent.locals),
            blocks: 0,
        };
        self.push_frame(frame)?;
        let current = self.current;
        self.run_until(depth)?;
        self.current = current;
        Ok(if self.stack.len() > base {
            self.stack.pop().unwrap_or(RuntimeObject::Undefined)
        } else {
            RuntimeObject::Undefined
        })
    }

    fn checked_address(&self, address: usize) -> Result<usize> {
        if address > self.frame()?.program.bytecode.len() {
            bail!(InvalidAddress(address as i64));
        }
        Ok(address)
    }

    /// validates a jump or call target of the current program
    pub fn address(&self, address: i32) -> Result<usize> {
        match usize::try_from(address) {
            Ok(address) => self.checked_address(address),
            Err(_) => bail!(InvalidAddress(address as i64)),
        }
    }

    pub fn push(&mut self, value: RuntimeObject) -> Result<()> {
        self.stack.push(value)
    }

    pub fn pop(&mut self) -> Result<RuntimeObject> {
        let floor = self.frame()?.floor();
        self.stack.pop_above(floor)
    }

    /// pops `n` values, in the order they were pushed
    pub fn pop_args(&mut self, n: usize) -> Result<Vec<RuntimeObject>> {
        let available = self.stack.height_above(self.frame()?.floor());
        if available < n {
            bail!(InsufficientArguments {
                expected: n,
                actual: available
            });
        }
        let at = self.stack.len() - n;
        Ok(self.stack.split_off(at))
    }

    pub fn argument(&self, idx: u8) -> Result<RuntimeObject> {
        let frame = self.frame()?;
        let idx = idx as usize;
        if idx >= frame.arg_count {
            bail!(InsufficientArguments {
                expected: idx + 1,
                actual: frame.arg_count
            });
        }
        self.stack
            .get(frame.arg_base + idx)
            .cloned()
            .ok_or(VmError::StackUnderflow)
    }

    pub fn string(&self, idx: i32) -> Result<&'a str> {
        let program = self.frame()?.program;
        program.string(idx).ok_or(VmError::InvalidIndex {
            table: "string",
            index: idx as i64,
        })
    }

    pub fn native(&self, id: u16) -> Result<&'a NativeFunction> {
        let registry = self.env.registry;
        registry.get(id).ok_or(VmError::InvalidIndex {
            table: "function",
            index: id as i64,
        })
    }

    pub fn pool(&self, name: &str) -> Result<&'a SeedPool> {
        let pools = self.env.pools;
        pools
            .get(name)
            .ok_or_else(|| VmError::UnknownPool(name.to_owned()))
    }

    pub fn mark_position(&mut self, line: i32, column: i32) {
        let clamp = |v: i32| usize::try_from(v).unwrap_or(0);
        self.marker = Some((self.current.0, clamp(line), clamp(column)));
    }

    /// the output prints currently go to
    pub fn writer(&mut self) -> &mut OutputWriter {
        self.nested.last_mut().unwrap_or(&mut self.root)
    }

    pub fn push_writer(&mut self) {
        self.nested
            .push(OutputWriter::new(self.options.format.capitalization));
    }

    /// closes the innermost nested output, returning its main text
    pub fn pop_writer(&mut self) -> Result<String> {
        self.nested
            .pop()
            .map(|writer| writer.main_text())
            .ok_or_else(|| rt_err!("no nested output to return"))
    }

    /// Prints to the current output. Only text reaching the root output counts towards the
    /// char limit, captured text is counted once it is printed from the stack.
    pub fn print(&mut self, text: &str) -> Result<()> {
        if self.nested.is_empty() {
            self.chars_printed += text.chars().count();
            if let Some(limit) = self.options.char_limit {
                if self.chars_printed > limit {
                    bail!(CharLimitExceeded(limit));
                }
            }
        }
        self.writer().print(text);
        Ok(())
    }

    pub fn display(&self, value: &RuntimeObject) -> String {
        value.display_with(self.number_format)
    }

    pub fn format_number(&self, n: f64) -> String {
        format_number(n, self.number_format)
    }

    pub fn set_repeat(&mut self, count: usize) {
        self.repeater.count = Some(count);
    }

    pub fn set_separator(&mut self, separator: String) {
        self.repeater.separator = Some(separator);
    }

    fn choose_item(&mut self, info: &'a BlockInfo) -> Result<usize> {
        let mut weights = Vec::with_capacity(info.items.len());
        for item in &info.items {
            let weight = match item.weight {
                ItemWeight::None => 1.0,
                ItemWeight::Constant(w) => w.into_inner(),
                ItemWeight::Interpreted { offset } => self
                    .evaluate_at(offset as usize)?
                    .to_number()
                    .as_number()
                    .unwrap_or(0.0),
            };
            weights.push(if weight.is_finite() && weight > 0.0 {
                weight
            } else {
                0.0
            });
        }
        let choice = self.rng.weighted_choice(&weights);
        match info.items.get(choice) {
            Some(item) => self.checked_address(item.offset as usize),
            None => bail!(Internal(format!("block item {} out of range", choice))),
        }
    }

    pub fn start_block(&mut self, idx: i32) -> ExecResult {
        let program = self.frame()?.program;
        let Some(info) = program.block(idx) else {
            bail!(InvalidIndex {
                table: "block",
                index: idx as i64
            });
        };
        let repeater = mem::take(&mut self.repeater);
        let count = repeater.count.unwrap_or(1);
        if count == 0 || info.items.is_empty() {
            return Ok(ExecOutcome::Jump(
                self.checked_address(info.end_address as usize)?,
            ));
        }
        let item = self.choose_item(info)?;
        self.blocks.push(ActiveBlock {
            info,
            remaining: count - 1,
            separator: repeater.separator,
        });
        Ok(ExecOutcome::Jump(item))
    }

    /// repeats the innermost block if iterations are left, otherwise leaves it
    pub fn end_block_iteration(&mut self) -> ExecResult {
        if self.blocks.len() <= self.frame()?.blocks {
            bail!(Internal("block end outside of a block".into()));
        }
        let Some(block) = self.blocks.last_mut() else {
            bail!(Internal("block end outside of a block".into()));
        };
        if block.remaining == 0 {
            let end = block.info.end_address as usize;
            self.blocks.pop();
            return Ok(ExecOutcome::Jump(self.checked_address(end)?));
        }
        block.remaining -= 1;
        let info = block.info;
        if let Some(separator) = block.separator.clone() {
            self.print(&separator)?;
        }
        Ok(ExecOutcome::Jump(self.choose_item(info)?))
    }

    pub fn query(&mut self, idx: i32) -> Result<()> {
        let program = self.frame()?.program;
        let Some(query) = program.query(idx) else {
            bail!(InvalidIndex {
                table: "query",
                index: idx as i64
            });
        };
        let Some(table) = &query.table else {
            self.carriers.delete(&query.carrier);
            return Ok(());
        };
        let Some(dictionary) = self.env.dictionary else {
            bail!(NoDictionary);
        };
        let word = dictionary.query(query, &program.regexes, &mut self.carriers, &mut self.rng);
        let text = word.unwrap_or_else(|| format!("<missing: {}>", table));
        self.print(&text)
    }
}
