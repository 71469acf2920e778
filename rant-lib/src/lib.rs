//! A compiler and virtual machine for Rant-style text patterns.
//!
//! To produce text from a pattern:
//! 1. compile the source with [`compiler::compile`], or with [`engine::Engine::compile`] when
//!    the pattern needs seed pools, a dictionary, imports or own native functions. The
//!    compiler tokenizes with [`compiler::lexer`], parses with the parselet stack in
//!    [`compiler::parselets`] and emits bytecode through [`compiler::BytecodeGenerator`].
//! 1. optionally store the resulting [`core::Program`] with [`assembler::save`] and read it
//!    back with [`assembler::load`] (or [`engine::Engine::load`] to relink imports).
//! 1. run it with [`vm::run`] or [`engine::Engine::run`] and a seed:
//!
//!    ```
//!    use rant_lib::{compiler, vm};
//!
//!    let program = compiler::compile("demo", "{Hello|Hi}, world", false).unwrap();
//!    let output = vm::run(&program, 42, &vm::RunOptions::default()).unwrap();
//!    assert!(output.main().ends_with(", world"));
//!    ```
//!
//! The same program run with the same seed always produces the same [`output::Output`].
pub mod assembler;
pub mod compiler;
pub mod core;
pub mod disasm;
pub mod engine;
pub mod opcode;
pub mod output;
pub mod rng;
pub mod vm;
pub mod vocab;

pub use compiler::compile;
pub use engine::Engine;
pub use vm::run;
