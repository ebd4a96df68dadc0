//! Whole-program scenarios covering the compiler's major observable
//! behaviours end to end. These assert structural properties of the
//! compiled output (labels present, exit behaviour of the pipeline itself)
//! rather than actual SPIM execution, which needs an external
//! `spim`/`qtspim` binary this crate doesn't shell out to.

use coolc::{CompileOutput, CompilerConfig};
use std::io::Write;

fn compile_ok(src: &str) -> String {
    match coolc::compile_program(src) {
        Ok(CompileOutput::Assembly(asm)) => asm,
        Ok(other) => panic!("expected assembly, got {other:?}"),
        Err(diags) => panic!("expected successful compile, got diagnostics: {diags:?}"),
    }
}

#[test]
fn scenario_1_hello_world_emits_out_string_call() {
    let asm = compile_ok(
        r#"
        class Main inherits IO {
            main(): Object { out_string("Hello, World.\n") };
        };
        "#,
    );
    assert!(asm.contains("_method_Main_main:"));
    assert!(asm.contains("jal\t_method_IO_out_string"));
    assert!(asm.contains("\"Hello, World.\\n\""));
}

#[test]
fn scenario_2_arithmetic_main_returns_int() {
    let asm = compile_ok("class Main { main(): Int { 3 + 4 * 5 }; };");
    assert!(asm.contains("_method_Main_main:"));
    assert!(asm.contains("_protObj_Int"));
}

#[test]
fn scenario_3_inheritance_cycle_is_one_semantic_error() {
    let src = r#"
    class B inherits A { };
    class A inherits B { };
    class Main { main(): Object { 0 }; };
    "#;
    let diags = match coolc::compile_program(src) {
        Err(diags) => diags,
        Ok(out) => panic!("expected an inheritance-cycle error, compiled to {out:?}"),
    };
    let cycle_errors = diags.iter().filter(|d| d.code == "E0303").count();
    assert_eq!(cycle_errors, 1, "expected exactly one inheritance-cycle diagnostic, got {diags:?}");
}

#[test]
fn scenario_4_incomparable_equality_is_a_type_error() {
    let src = r#"class Main { main(): Object { "a" = 1 }; };"#;
    match coolc::compile_program(src) {
        Err(diags) => assert!(!diags.is_empty(), "expected a type error for comparing String and Int"),
        Ok(out) => panic!("expected a type error, compiled to {out:?}"),
    }
}

#[test]
fn scenario_5_nested_let_desugars_and_type_checks() {
    let asm = compile_ok(
        r#"
        class Main {
            main(): Int {
                let x : Int <- 5, y : Int <- x + 1 in y
            };
        };
        "#,
    );
    assert!(asm.contains("_method_Main_main:"));
}

#[test]
fn scenario_6_case_and_static_dispatch() {
    let asm = compile_ok(
        r#"
        class Cons { head(): Int { 0 }; };
        class Nil inherits Cons { };
        class Main {
            pick(x : Cons): Int {
                case x of
                    n : Nil => 0;
                    c : Cons => c@Cons.head();
                esac
            };
            main(): Int { pick(new Nil) };
        };
        "#,
    );
    assert!(asm.contains("_class_parent_table:"));
    assert!(asm.contains("jal\t_method_Cons_head"));
}

#[test]
fn no_codegen_flag_stops_before_ir_lowering() {
    let src = "class Main { main(): Object { 0 }; };";
    match coolc::compile_program_with_config(src, CompilerConfig::new().with_no_codegen(true)) {
        Ok(CompileOutput::NoCodegen) => {}
        other => panic!("expected NoCodegen, got {other:?}"),
    }
}

#[test]
fn multi_file_sources_compile_as_one_program() {
    let mut a = tempfile::Builder::new().suffix(".cl").tempfile().unwrap();
    write!(a, "class Greeter inherits IO {{ greet(): Object {{ out_string(\"hi\\n\") }}; }};").unwrap();
    let mut b = tempfile::Builder::new().suffix(".cl").tempfile().unwrap();
    write!(b, "class Main inherits IO {{ main(): Object {{ (new Greeter).greet() }}; }};").unwrap();

    let sources = vec![
        (a.path().to_path_buf(), std::fs::read_to_string(a.path()).unwrap()),
        (b.path().to_path_buf(), std::fs::read_to_string(b.path()).unwrap()),
    ];
    let (text, units) = coolc::concat_sources(&sources);
    assert_eq!(units.len(), 2);
    assert_eq!(coolc::owner_path(&units, 1), a.path());

    match coolc::compile_program(&text) {
        Ok(CompileOutput::Assembly(asm)) => assert!(asm.contains("_method_Greeter_greet:")),
        other => panic!("expected assembly, got {other:?}"),
    }
}
