use crate::core::{Program, RuntimeObject};

/// One activation: a subroutine call, an imported program, or code evaluated on behalf of
/// the caller (block weights and pattern arguments).
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub program: &'a Program,
    /// offset of the next instruction
    pub position: usize,
    pub stack_base: usize,
    pub arg_base: usize,
    pub arg_count: usize,
    /// true if the locals and arguments belong to the parent frame
    pub shared: bool,
    pub locals: Vec<RuntimeObject>,
    /// number of active blocks when the frame was entered
    pub blocks: usize,
}

impl<'a> Frame<'a> {
    pub fn new(program: &'a Program, position: usize, stack_base: usize, arg_count: usize) -> Self {
        Frame {
            program,
            position,
            stack_base,
            arg_base: stack_base,
            arg_count,
            shared: false,
            locals: vec![],
            blocks: 0,
        }
    }

    /// the lowest stack height the frame may pop down to
    pub fn floor(&self) -> usize {
        if self.shared {
            self.stack_base
        } else {
            self.stack_base + self.arg_count
        }
    }

    pub fn local(&self, idx: u16) -> RuntimeObject {
        self.locals
            .get(idx as usize)
            .cloned()
            .unwrap_or(RuntimeObject::Undefined)
    }

    pub fn local_mut(&mut self, idx: u16) -> &mut RuntimeObject {
        let idx = idx as usize;
        if self.locals.len() <= idx {
            self.locals.resize(idx + 1, RuntimeObject::Undefined);
        }
        &mut self.locals[idx]
    }
}
