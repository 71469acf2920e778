//! Represents a compiled program

use std::sync::Arc;

use ordered_float::OrderedFloat;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::core::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemWeight {
    None,
    Constant(OrderedFloat<f64>),
    /// address of code that leaves the weight on the stack and returns
    Interpreted { offset: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockItem {
    pub offset: u32,
    pub weight: ItemWeight,
}

/// The alternatives of one block. Every item offset is smaller than `end_address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub end_address: u32,
    pub items: Vec<BlockItem>,
}

/// A regex from the program's regex table, with the source it was compiled from
#[derive(Debug, Clone)]
pub struct ProgramRegex {
    pub source: String,
    pub regex: Regex,
}

impl PartialEq for ProgramRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// A compiled program. Immutable once built, shared between runs through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub bytecode: Vec<u8>,
    pub strings: Vec<String>,
    pub blocks: Vec<BlockInfo>,
    pub regexes: Vec<ProgramRegex>,
    pub queries: Vec<Query>,
    /// programs called through `CallProgram`, by index
    pub references: Vec<Arc<Program>>,
    /// the names the references were imported by
    pub reference_names: Vec<String>,
}

impl Program {
    pub fn string(&self, idx: i32) -> Option<&str> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
    }

    pub fn block(&self, idx: i32) -> Option<&BlockInfo> {
        usize::try_from(idx).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn query(&self, idx: i32) -> Option<&Query> {
        usize::try_from(idx).ok().and_then(|i| self.queries.get(i))
    }

    pub fn reference(&self, idx: u16) -> Option<&Program> {
        self.references.get(idx as usize).map(Arc::as_ref)
    }
}
