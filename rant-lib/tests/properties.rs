use rant_lib::assembler::{load, save, LoadError};
use rant_lib::compiler::CompileErrorKind;
use rant_lib::core::RuntimeObject;
use rant_lib::opcode::OpCode;
use rant_lib::output::Visibility;
use rant_lib::rng::SeedPool;
use rant_lib::vm::{RunOptions, VmError};
use rant_lib::{compile, disasm, run, Engine};

fn output(src: &str, seed: u64) -> String {
    let program = compile("test", src, false).unwrap();
    run(&program, seed, &RunOptions::default())
        .unwrap()
        .main()
        .to_owned()
}

#[test]
fn runs_are_deterministic_per_seed() {
    let src = "{The|A} {quick|slow|lazy} {fox|dog|cat} {ran|sat}. \\8,x [num:1;100]";
    for seed in 0..32 {
        assert_eq!(output(src, seed), output(src, seed));
    }
}

#[test]
fn seed_pools_synchronize_runs() {
    let mut engine = Engine::new();
    engine.add_pool("thing", SeedPool::new(7, 4));
    let program = engine.compile("test", "[pool:thing;B;\\32,x]", false).unwrap();
    let options = RunOptions::default();
    let first = engine.run(&program, 0, &options).unwrap();
    for seed in 1..=16 {
        assert_eq!(engine.run(&program, seed, &options).unwrap().main(), first.main());
    }
}

#[test]
fn adjacent_text_is_one_print() {
    let program = compile("test", "ab\\ncd", false).unwrap();
    let ops = disasm::instructions(&program).unwrap();
    assert_eq!(ops, vec![(0, OpCode::PrintString(0))]);
    assert_eq!(program.strings, ["ab\ncd"]);
}

#[test]
fn saved_programs_behave_the_same() {
    let src = "{a|b|c}[rep:4][sep:,]{x|y|z} [open:side]s[close]";
    let program = compile("test", src, false).unwrap();
    let loaded = load(&save(&program).unwrap()).unwrap();
    for seed in 0..16 {
        let options = RunOptions::default();
        assert_eq!(
            run(&program, seed, &options).unwrap(),
            run(&loaded, seed, &options).unwrap()
        );
    }
}

#[test]
fn only_rptn_containers_load() {
    assert_eq!(load(b"\x7fELF\x02\x01"), Err(LoadError::NotAProgram));
    assert_eq!(load(b""), Err(LoadError::NotAProgram));
}

#[test]
fn coercion() {
    assert_eq!(output("[add:2;3]", 0), "5");
    assert_eq!(output("[add:{2};3]", 0), "5");
    assert_eq!(output("[add:{a};3]", 0), "???");
    assert_eq!(output("[cat:1;2]", 0), "12");
    assert_eq!(output("[sub:{a};3]", 0), "???");

    let a = RuntimeObject::String("ab".into());
    assert_eq!(a.mul(&3.0.into()), RuntimeObject::String("ababab".into()));
    assert_eq!(a.mul(&(-1.0).into()), RuntimeObject::String("".into()));
    assert_eq!(RuntimeObject::from(3.0).mul(&a), RuntimeObject::Undefined);
}

#[test]
fn division_by_zero_is_fatal() {
    for src in ["[div:1;0]", "[mod:1;0]", "a[div:{5};{0}]"] {
        let program = compile("test", src, false).unwrap();
        let err = run(&program, 0, &RunOptions::default()).unwrap_err();
        assert!(matches!(err.kind, VmError::DivideByZero(_)), "{}", src);
    }
}

#[test]
fn channel_visibility() {
    let program = compile(
        "test",
        "[open:hidden;private]p[close][open:shown;public]q[close]",
        false,
    )
    .unwrap();
    let out = run(&program, 0, &RunOptions::default()).unwrap();
    assert_eq!(out.main(), "q");
    let hidden = out.get("hidden").unwrap();
    assert_eq!((hidden.text.as_str(), hidden.visibility), ("p", Visibility::Private));
    assert_eq!(out.get("shown").unwrap().text, "q");
}

#[test]
fn indefinite_articles() {
    assert_eq!(output("\\a elephant", 0), "an elephant");
    assert_eq!(output("\\a hotel", 0), "a hotel");
    assert_eq!(output("\\a men", 0), "the men");
    assert_eq!(output("\\a {apple}", 0), "an apple");
}

#[test]
fn compile_errors_have_positions() {
    let err = compile("story", "one\n two [nope:x]", false).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnknownFunction("nope".into()));
    assert_eq!((err.line, err.column), (2, 6));
    assert!(err.to_string().starts_with("story @ Ln 2, Col 6"));
}
