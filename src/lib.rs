//! Coolc Compiler Library
//!
//! Ahead-of-time compiler from COOL (Classroom Object Oriented Language)
//! source to MIPS32 assembly runnable under SPIM. Provides the whole
//! pipeline, lexing, parsing, semantic analysis, IR construction and
//! optimisation, and code generation, as a library so `main.rs` (and any
//! other embedder) only has to do file I/O and diagnostic rendering.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod optimize;
pub mod parser;
pub mod sem;

pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, Span};

use std::path::{Path, PathBuf};

/// What a successful compile produced, depending on which dump flag (if
/// any) `CompilerConfig` requested.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutput {
    Tokens(String),
    Ast(String),
    Semantics(String),
    /// `--no-codegen` was set: the program type-checked and nothing further
    /// ran.
    NoCodegen,
    Assembly(String),
}

/// One `.cl` file as handed to `concat_sources`, plus where its lines ended
/// up in the concatenated text, needed to attribute a diagnostic's line
/// number back to the file it came from, since the lexer/parser/semantic
/// analyser only ever see one merged token stream — multiple `.cl` files
/// passed on the command line compile together as a single program.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub first_line: u32,
}

/// Concatenates `files` in order into one source text, recording the line
/// each file starts at. Each file is given a trailing newline if it lacks
/// one, so the next file's `first_line` is exact.
pub fn concat_sources(files: &[(PathBuf, String)]) -> (String, Vec<SourceUnit>) {
    let mut text = String::new();
    let mut units = Vec::with_capacity(files.len());
    let mut line = 1u32;
    for (path, content) in files {
        units.push(SourceUnit { path: path.clone(), first_line: line });
        text.push_str(content);
        if !content.ends_with('\n') {
            text.push('\n');
        }
        line += content.lines().count().max(1) as u32;
    }
    (text, units)
}

/// Finds which source file a (global, post-concatenation) line number came
/// from.
pub fn owner_path(units: &[SourceUnit], line: u32) -> &Path {
    units
        .iter()
        .rev()
        .find(|u| u.first_line <= line)
        .map(|u| u.path.as_path())
        .unwrap_or_else(|| units[0].path.as_path())
}

/// Compiles `source` with default settings (full pipeline through codegen).
pub fn compile_program(source: &str) -> Result<CompileOutput, Vec<Diagnostic>> {
    compile_program_with_config(source, CompilerConfig::new())
}

/// Runs the full pipeline, stopping early if `config` requests a dump or
/// skips codegen. Any stage producing errors aborts the pipeline before the
/// next stage runs: any stage producing diagnostics aborts before the next
/// stage runs rather than feeding it a possibly-malformed result.
pub fn compile_program_with_config(source: &str, config: CompilerConfig) -> Result<CompileOutput, Vec<Diagnostic>> {
    tracing::debug!("lexing");
    let lexed = lexer::lex(source);
    if !lexed.errors.is_empty() {
        return Err(lexed.errors.into_iter().map(|e| Diagnostic::new(e.span(), e.code(), e.to_string())).collect());
    }
    if config.dump_tokens {
        return Ok(CompileOutput::Tokens(render_tokens(&lexed.tokens)));
    }

    tracing::debug!("parsing");
    let program = parser::parse(lexed.tokens)
        .map_err(|errors| errors.into_iter().map(|e| Diagnostic::new(e.span, e.code(), e.to_string())).collect::<Vec<_>>())?;
    if config.dump_ast {
        return Ok(CompileOutput::Ast(format!("{program:#?}")));
    }

    tracing::debug!("running semantic analysis");
    let typed = sem::check(program)
        .map_err(|errors| errors.into_iter().map(|e| Diagnostic::new(e.span(), e.code(), e.to_string())).collect::<Vec<_>>())?;
    if config.dump_semantics {
        return Ok(CompileOutput::Semantics(format!("{:#?}", typed.classes)));
    }
    if config.no_codegen {
        return Ok(CompileOutput::NoCodegen);
    }

    tracing::debug!("lowering to IR");
    let (ir_program, overflowing_literals) = ir::lower_program(&typed);
    if let Some(lit) = overflowing_literals.into_iter().next() {
        let err = codegen::CodegenError::IntegerOutOfRange(lit);
        return Err(vec![Diagnostic::new(Span::default(), err.code(), err.to_string())]);
    }

    tracing::debug!("optimising IR");
    let ir_program = optimize::optimize(ir_program);

    tracing::debug!("generating code");
    let asm = codegen::generate(&ir_program, &typed.classes)
        .map_err(|e| vec![Diagnostic::new(Span::default(), e.code(), e.to_string())])?;

    Ok(CompileOutput::Assembly(asm))
}

fn render_tokens(tokens: &[lexer::Token]) -> String {
    let mut out = String::new();
    for tok in tokens {
        out.push_str(&format!("{} {:?}\n", tok.span, tok.kind));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_compiles_to_assembly() {
        let src = r#"
        class Main inherits IO {
            main(): Object { out_string("Hello, World.\n") };
        };
        "#;
        match compile_program(src) {
            Ok(CompileOutput::Assembly(asm)) => {
                assert!(asm.contains("_method_Main_main:"));
                assert!(asm.contains(".data"));
            }
            other => panic!("expected assembly, got {other:?}"),
        }
    }

    #[test]
    fn dump_tokens_stops_before_parsing() {
        let src = "class Main { main(): Object { 0 }; };";
        match compile_program_with_config(src, CompilerConfig::new().with_dump_tokens(true)) {
            Ok(CompileOutput::Tokens(text)) => assert!(text.contains("Class")),
            other => panic!("expected token dump, got {other:?}"),
        }
    }

    #[test]
    fn no_codegen_stops_after_semantic_analysis() {
        let src = "class Main { main(): Object { 0 }; };";
        match compile_program_with_config(src, CompilerConfig::new().with_no_codegen(true)) {
            Ok(CompileOutput::NoCodegen) => {}
            other => panic!("expected NoCodegen, got {other:?}"),
        }
    }

    #[test]
    fn inheritance_cycle_is_a_single_semantic_error() {
        let src = r#"
        class A inherits B { };
        class B inherits A { };
        class Main { main(): Object { 0 }; };
        "#;
        match compile_program(src) {
            Err(diags) => {
                let cycle_errors = diags.iter().filter(|d| d.code == "E0303").count();
                assert_eq!(cycle_errors, 1, "expected exactly one inheritance-cycle diagnostic, got {diags:?}");
            }
            Ok(out) => panic!("expected an inheritance-cycle error, compiled to {out:?}"),
        }
    }

    #[test]
    fn concat_sources_tracks_file_boundaries() {
        let files = vec![
            (PathBuf::from("a.cl"), "class A { };\n".to_string()),
            (PathBuf::from("b.cl"), "class B { };\n".to_string()),
        ];
        let (text, units) = concat_sources(&files);
        assert_eq!(text, "class A { };\nclass B { };\n");
        assert_eq!(owner_path(&units, 1), Path::new("a.cl"));
        assert_eq!(owner_path(&units, 2), Path::new("b.cl"));
    }
}
