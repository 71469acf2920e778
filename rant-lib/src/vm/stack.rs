//! The operand stack

use std::ops::{Deref, DerefMut};

use crate::core::RuntimeObject;
use crate::vm::VmError;

/// type that is used at runtime to represent the stack
#[derive(Debug, Clone)]
pub struct Stack {
    values: Vec<RuntimeObject>,
    limit: usize,
}

impl Stack {
    pub fn with_limit(limit: usize) -> Self {
        Stack {
            values: vec![],
            limit,
        }
    }

    pub fn push(&mut self, value: RuntimeObject) -> Result<(), VmError> {
        if self.values.len() >= self.limit {
            return Err(VmError::StackOverflow(self.limit));
        }
        self.values.push(value);
        Ok(())
    }

    /// pops the top value, unless that would go below `floor`
    pub fn pop_above(&mut self, floor: usize) -> Result<RuntimeObject, VmError> {
        if self.values.len() <= floor {
            return Err(VmError::StackUnderflow);
        }
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    /// number of values above `floor`
    pub fn height_above(&self, floor: usize) -> usize {
        self.values.len().saturating_sub(floor)
    }
}

impl Deref for Stack {
    type Target = Vec<RuntimeObject>;
    fn deref(&self) -> &Vec<RuntimeObject> {
        &self.values
    }
}

impl DerefMut for Stack {
    fn deref_mut(&mut self) -> &mut Vec<RuntimeObject> {
        &mut self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_is_respected() {
        let mut stack = Stack::with_limit(8);
        stack.push(1.0.into()).unwrap();
        stack.push(2.0.into()).unwrap();
        assert_eq!(stack.pop_above(1), Ok(RuntimeObject::Number(2.0)));
        assert_eq!(stack.pop_above(1), Err(VmError::StackUnderflow));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn limit_is_respected() {
        let mut stack = Stack::with_limit(1);
        stack.push(RuntimeObject::Null).unwrap();
        assert_eq!(
            stack.push(RuntimeObject::Null),
            Err(VmError::StackOverflow(1))
        );
    }
}
