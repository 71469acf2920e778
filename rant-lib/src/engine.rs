//! Everything a program can reach at runtime, bundled for repeated compiles and runs

use std::collections::HashMap;
use std::sync::Arc;

use crate::assembler::{self, LoadError};
use crate::compiler::{compile_with, CompileContext, CompileError};
use crate::core::Program;
use crate::output::Output;
use crate::rng::SeedPool;
use crate::vm::built_ins::FunctionRegistry;
use crate::vm::{Environment, Machine, RunOptions, RuntimeError};
use crate::vocab::Dictionary;

/// Holds the function registry, named seed pools, the dictionary and the programs that can be
/// imported. Programs must be run by the engine that compiled or loaded them, since function ids
/// and imports are resolved against it.
pub struct Engine {
    registry: FunctionRegistry,
    pools: HashMap<String, SeedPool>,
    dictionary: Option<Arc<dyn Dictionary>>,
    programs: HashMap<String, Arc<Program>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            registry: FunctionRegistry::with_standard(),
            pools: HashMap::new(),
            dictionary: None,
            programs: HashMap::new(),
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// for registering own native functions before compiling
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn add_pool(&mut self, name: &str, pool: SeedPool) {
        self.pools.insert(name.to_owned(), pool);
    }

    pub fn set_dictionary(&mut self, dictionary: impl Dictionary + 'static) {
        self.dictionary = Some(Arc::new(dictionary));
    }

    /// makes `program` importable as `name`
    pub fn add_program(&mut self, name: &str, program: Program) -> Arc<Program> {
        let program = Arc::new(program);
        self.programs.insert(name.to_owned(), program.clone());
        program
    }

    pub fn program(&self, name: &str) -> Option<&Arc<Program>> {
        self.programs.get(name)
    }

    pub fn compile(&self, source_name: &str, src: &str, debug: bool) -> Result<Program, CompileError> {
        let ctx = CompileContext {
            debug,
            registry: &self.registry,
            imports: &self.programs,
        };
        compile_with(source_name, src, &ctx)
    }

    /// loads a saved program and links its imports to the programs of this engine
    pub fn load(&self, bytes: &[u8]) -> Result<Program, LoadError> {
        let mut program = assembler::load(bytes)?;
        program.references = program
            .reference_names
            .iter()
            .map(|name| {
                self.programs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| LoadError::UnresolvedImport(name.clone()))
            })
            .collect::<Result<_, _>>()?;
        Ok(program)
    }

    pub fn run(&self, program: &Program, seed: u64, options: &RunOptions) -> Result<Output, RuntimeError> {
        let env = Environment {
            registry: &self.registry,
            pools: &self.pools,
            dictionary: self.dictionary.as_deref(),
        };
        Machine::new(program, seed, options, env).run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::save;
    use crate::vm::VmError;
    use crate::vocab::{Table, WordList};
    use rstest::{fixture, rstest};

    #[fixture]
    fn engine() -> Engine {
        let mut engine = Engine::new();
        engine.add_pool("thing", SeedPool::new(42, 16));
        engine.set_dictionary(
            WordList::new().with_table(
                Table::new("noun", &["singular", "plural"])
                    .entry(&["owl", "owls"], &["bird"])
                    .entry(&["hawk", "hawks"], &["bird"]),
            ),
        );
        let greeting = engine.compile("greeting", "Hello", false).unwrap();
        engine.add_program("greeting", greeting);
        engine
    }

    fn output(engine: &Engine, src: &str, seed: u64) -> String {
        let program = engine.compile("test", src, false).unwrap();
        engine
            .run(&program, seed, &RunOptions::default())
            .unwrap()
            .main()
            .to_owned()
    }

    #[rstest]
    fn pools_ignore_the_driving_seed(engine: Engine) {
        let src = "[pool:thing;B;\\32,x]";
        let first = output(&engine, src, 0);
        assert_eq!(first.len(), 32);
        for seed in 1..16 {
            assert_eq!(output(&engine, src, seed), first);
        }
        assert_ne!(output(&engine, "[pool:thing;C;\\32,x]", 0), first);
    }

    #[rstest]
    fn pools_restore_the_run_rng(engine: Engine) {
        let with_pool = output(&engine, "[pool:thing;B;x]\\16,x", 5);
        let without = output(&engine, "x\\16,x", 5);
        assert_eq!(with_pool, without);
    }

    #[rstest]
    fn imports(engine: Engine) {
        assert_eq!(output(&engine, "[import:greeting], world", 0), "Hello, world");

        let program = engine.compile("test", "[import:greeting]!", false).unwrap();
        let bytes = save(&program).unwrap();
        let loaded = engine.load(&bytes).unwrap();
        let out = engine.run(&loaded, 0, &RunOptions::default()).unwrap();
        assert_eq!(out.main(), "Hello!");

        assert_eq!(
            Engine::new().load(&bytes),
            Err(LoadError::UnresolvedImport("greeting".into()))
        );
    }

    #[rstest]
    fn queries_use_the_dictionary(engine: Engine) {
        for seed in 0..8 {
            let text = output(&engine, "\\a <noun>", seed);
            assert!(text == "an owl" || text == "a hawk", "{}", text);
        }
        assert_eq!(output(&engine, "<noun.dual>", 0), "<missing: noun>");
        assert_eq!(output(&engine, "<verb>", 0), "<missing: verb>");
    }

    #[rstest]
    fn own_functions(mut engine: Engine) {
        fn shout(vm: &mut Machine<'_>, args: Vec<crate::core::RuntimeObject>) -> crate::vm::Result<()> {
            let text = args
                .iter()
                .map(|a| vm.display(a).to_uppercase())
                .collect::<String>();
            vm.print(&text)
        }
        engine
            .registry_mut()
            .register("shout", &[crate::vm::built_ins::ParamKind::Text], shout);
        assert_eq!(output(&engine, "[shout:hey]", 0), "HEY");

        let program = engine.compile("test", "[pool:nowhere;k;x]", false).unwrap();
        let err = engine.run(&program, 0, &RunOptions::default()).unwrap_err();
        assert_eq!(err.kind, VmError::UnknownPool("nowhere".into()));
    }
}
