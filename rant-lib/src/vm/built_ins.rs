//! The native functions callable from patterns
//!
//! A tag that is not an intrinsic is looked up in a [FunctionRegistry] at compile time. The
//! compiler prepares the arguments according to the function's [ParamKind]s and emits a
//! `NativeCall` with the function's id, so the registry used to run a program must assign the
//! same ids as the one it was compiled with.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::core::RuntimeObject;
use crate::output::{Capitalization, NumberFormat};
use crate::vm::{bail, Machine, Result, VmError};

/// How the compiler prepares an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// the argument's output, captured to a String
    Text,
    /// captured, then converted with `ToNumber`
    Number,
    /// compiled out of line and passed as a Pointer, the handler decides when to run it
    Pattern,
}

pub type Handler = fn(&mut Machine<'_>, Vec<RuntimeObject>) -> Result<()>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub params: Vec<ParamKind>,
    pub handler: Handler,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Maps function names to ids and handlers. Ids are assigned in registration order.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<NativeFunction>,
    by_name: HashMap<&'static str, u16>,
}

static STANDARD: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::with_standard);

impl FunctionRegistry {
    /// an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// the shared table of built-in functions
    pub fn standard() -> &'static FunctionRegistry {
        &STANDARD
    }

    /// a registry containing the built-ins, to be extended with own functions
    pub fn with_standard() -> Self {
        use ParamKind::*;
        let mut registry = Self::new();
        registry.register("rep", &[Number], rep);
        registry.register("sep", &[Text], sep);
        registry.register("case", &[Text], case);
        registry.register("num", &[Number, Number], num);
        registry.register("pool", &[Text, Text, Pattern], pool);
        registry.register("target", &[Text], target);
        registry.register("send", &[Text, Text], send);
        registry.register("append", &[Text, Text], append);
        registry.register("clear", &[Text], clear);
        registry.register("len", &[Text], len);
        registry.register("numfmt", &[Text], numfmt);
        registry.register("rev", &[Text], rev);
        registry
    }

    /// Adds a function and returns its id. A name that is registered again shadows the
    /// earlier function for programs compiled afterwards.
    pub fn register(&mut self, name: &'static str, params: &[ParamKind], handler: Handler) -> u16 {
        debug_assert!(self.functions.len() < u16::MAX as usize);
        let id = self.functions.len() as u16;
        self.functions.push(NativeFunction {
            name,
            params: params.to_vec(),
            handler,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn get(&self, id: u16) -> Option<&NativeFunction> {
        self.functions.get(id as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<(u16, &NativeFunction)> {
        let id = *self.by_name.get(name)?;
        self.get(id).map(|function| (id, function))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn expect_args<const N: usize>(args: Vec<RuntimeObject>) -> Result<[RuntimeObject; N]> {
    args.try_into()
        .map_err(|args: Vec<RuntimeObject>| VmError::InsufficientArguments {
            expected: N,
            actual: args.len(),
        })
}

fn number(function: &'static str, value: &RuntimeObject) -> Result<f64> {
    match value.as_number() {
        Some(n) if n.is_finite() => Ok(n),
        _ => bail!(InvalidArgument {
            function,
            message: format!("expected a number, got {}", value.type_name()),
        }),
    }
}

fn text(vm: &Machine<'_>, value: &RuntimeObject) -> String {
    match value {
        RuntimeObject::String(s) => s.clone(),
        other => vm.display(other),
    }
}

fn mode<T: FromStr>(function: &'static str, name: &str) -> Result<T> {
    match T::from_str(name.trim()) {
        Ok(mode) => Ok(mode),
        Err(_) => bail!(InvalidArgument {
            function,
            message: format!("unknown mode '{}'", name),
        }),
    }
}

fn rep(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [count] = expect_args(args)?;
    let count = number("rep", &count)?;
    vm.set_repeat(count.max(0.0) as usize);
    Ok(())
}

fn sep(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [separator] = expect_args(args)?;
    let separator = text(vm, &separator);
    vm.set_separator(separator);
    Ok(())
}

fn case(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name] = expect_args(args)?;
    let mode: Capitalization = mode("case", &text(vm, &name))?;
    vm.writer().set_case(mode);
    Ok(())
}

fn num(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [min, max] = expect_args(args)?;
    let min = number("num", &min)?;
    let max = number("num", &max)?;
    let n = vm.rng.int_range(min as i64, max as i64);
    let text = vm.format_number(n as f64);
    vm.print(&text)
}

/// runs the pattern with the rng of the pool slot `key` selects
fn pool(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name, key, pattern] = expect_args(args)?;
    let address = match pattern {
        RuntimeObject::Pointer(address) => address,
        other => bail!(InvalidArgument {
            function: "pool",
            message: format!("expected a pattern, got {}", other.type_name()),
        }),
    };
    let pool = vm.pool(&text(vm, &name))?;
    let rng = pool.rng_for(&text(vm, &key));
    let saved = std::mem::replace(&mut vm.rng, rng);
    let result = vm.evaluate_at(address);
    vm.rng = saved;
    result.map(|_| ())
}

fn target(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name] = expect_args(args)?;
    let name = text(vm, &name);
    vm.writer().insert_target(&name);
    Ok(())
}

fn send(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name, value] = expect_args(args)?;
    let (name, value) = (text(vm, &name), text(vm, &value));
    vm.writer().write_target(&name, &value, true);
    Ok(())
}

fn append(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name, value] = expect_args(args)?;
    let (name, value) = (text(vm, &name), text(vm, &value));
    vm.writer().write_target(&name, &value, false);
    Ok(())
}

fn clear(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name] = expect_args(args)?;
    let name = text(vm, &name);
    vm.writer().clear_target(&name);
    Ok(())
}

fn len(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [value] = expect_args(args)?;
    let count = text(vm, &value).chars().count();
    let text = vm.format_number(count as f64);
    vm.print(&text)
}

fn numfmt(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [name] = expect_args(args)?;
    vm.number_format = mode::<NumberFormat>("numfmt", &text(vm, &name))?;
    Ok(())
}

fn rev(vm: &mut Machine<'_>, args: Vec<RuntimeObject>) -> Result<()> {
    let [value] = expect_args(args)?;
    let reversed: String = text(vm, &value).chars().rev().collect();
    vm.print(&reversed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::vm::{run, RunOptions, VmError};
    use rstest::rstest;

    fn output(src: &str) -> String {
        let program = compile("test", src, false).unwrap();
        run(&program, 7, &RunOptions::default()).unwrap().main().to_owned()
    }

    #[test]
    fn standard_ids_follow_registration_order() {
        let registry = FunctionRegistry::standard();
        let names: Vec<_> = (0..registry.len() as u16)
            .map(|id| registry.get(id).unwrap().name)
            .collect();
        assert_eq!(
            names,
            ["rep", "sep", "case", "num", "pool", "target", "send", "append", "clear", "len", "numfmt", "rev"]
        );
        let (id, pool) = registry.lookup("pool").unwrap();
        assert_eq!(id, 4);
        assert_eq!(pool.params, [ParamKind::Text, ParamKind::Text, ParamKind::Pattern]);
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn registering_again_shadows() {
        fn nothing(_: &mut Machine<'_>, _: Vec<RuntimeObject>) -> Result<()> {
            Ok(())
        }
        let mut registry = FunctionRegistry::with_standard();
        let id = registry.register("rev", &[], nothing);
        assert_eq!(id, 12);
        assert_eq!(registry.lookup("rev").unwrap().0, 12);
        assert_eq!(registry.get(11).unwrap().name, "rev");
    }

    #[test]
    fn argument_count_is_checked() {
        let args = vec![RuntimeObject::Null];
        assert_eq!(
            expect_args::<2>(args),
            Err(VmError::InsufficientArguments {
                expected: 2,
                actual: 1
            })
        );
    }

    #[rstest]
    #[case("[rep:3]{x}", "xxx")]
    #[case("[rep:3][sep:, ]{x}", "x, x, x")]
    #[case("[rep:0]{x}y", "y")]
    #[case("[case:upper]abc", "ABC")]
    #[case("[len:hello]", "5")]
    #[case("[rev:abc]", "cba")]
    #[case("[numfmt:group-commas][add:1000;234]", "1,234")]
    #[case("Dear [target:name], hi[send:name;Bob]", "Dear Bob, hi")]
    #[case("[target:t][append:t;a][append:t;b]", "ab")]
    #[case("[target:t][send:t;a][clear:t]", "")]
    #[case("[num:4;4]", "4")]
    fn built_ins(#[case] src: &str, #[case] expected: &str) {
        assert_eq!(output(src), expected);
    }

    #[test]
    fn num_stays_in_range() {
        for seed in 0..50 {
            let program = compile("test", "[num:1;3]", false).unwrap();
            let out = run(&program, seed, &RunOptions::default()).unwrap();
            let n: i64 = out.main().parse().unwrap();
            assert!((1..=3).contains(&n));
        }
    }

    #[test]
    fn bad_modes_fail() {
        let program = compile("test", "[case:sideways]", false).unwrap();
        let err = run(&program, 0, &RunOptions::default()).unwrap_err();
        assert!(matches!(
            err.kind,
            VmError::InvalidArgument {
                function: "case",
                ..
            }
        ));
    }

    #[test]
    fn pool_needs_a_registered_pool() {
        let program = compile("test", "[pool:missing;k;x]", false).unwrap();
        let err = run(&program, 0, &RunOptions::default()).unwrap_err();
        assert_eq!(err.kind, VmError::UnknownPool("missing".into()));
    }
}
