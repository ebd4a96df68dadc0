//! Coolc CLI
//!
//! Command-line driver: reads `.cl` source files, runs them through
//! `coolc::compile_program_with_config`, and either writes the generated
//! assembly, prints a requested dump, or reports diagnostics and exits
//! non-zero. Everything that isn't file I/O or argument parsing lives in
//! the library.

use clap::Parser as ClapParser;
use coolc::{CompileOutput, CompilerConfig};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(name = "coolc")]
#[command(about = "Ahead-of-time compiler for COOL, targeting MIPS32/SPIM", long_about = None)]
struct Cli {
    /// One or more `.cl` source files, compiled together as one program.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output assembly path (default: first source's basename + `.s`).
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Dump the token stream and exit.
    #[arg(long)]
    tokens: bool,

    /// Dump the parsed AST and exit.
    #[arg(long)]
    ast: bool,

    /// Dump the resolved class table and exit.
    #[arg(long)]
    semantics: bool,

    /// Run through semantic analysis only; skip IR/codegen.
    #[arg(long)]
    no_codegen: bool,

    /// Enable verbose stage-boundary logging (same as `RUST_LOG=debug`).
    #[arg(short, long)]
    verbose: bool,
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_LEX_PARSE_ERROR: u8 = 1;
const EXIT_SEMANTIC_ERROR: u8 = 2;
const EXIT_IO_ERROR: u8 = 3;
const EXIT_INTERNAL_ERROR: u8 = 4;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut sources = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        match fs::read_to_string(path) {
            Ok(content) => sources.push((path.clone(), content)),
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                return ExitCode::from(EXIT_IO_ERROR);
            }
        }
    }

    let (text, units) = coolc::concat_sources(&sources);
    let config = CompilerConfig::new()
        .with_dump_tokens(cli.tokens)
        .with_dump_ast(cli.ast)
        .with_dump_semantics(cli.semantics)
        .with_no_codegen(cli.no_codegen);

    match coolc::compile_program_with_config(&text, config) {
        Ok(CompileOutput::Tokens(dump)) | Ok(CompileOutput::Ast(dump)) | Ok(CompileOutput::Semantics(dump)) => {
            println!("{dump}");
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(CompileOutput::NoCodegen) => ExitCode::from(EXIT_SUCCESS),
        Ok(CompileOutput::Assembly(asm)) => {
            let out_path = cli.outfile.unwrap_or_else(|| default_outfile(&cli.inputs[0]));
            match fs::write(&out_path, asm) {
                Ok(()) => ExitCode::from(EXIT_SUCCESS),
                Err(e) => {
                    eprintln!("{}: {e}", out_path.display());
                    ExitCode::from(EXIT_IO_ERROR)
                }
            }
        }
        Err(diagnostics) => {
            let is_internal = diagnostics.iter().any(|d| d.code.starts_with("E04"));
            for diag in &diagnostics {
                let path = coolc::owner_path(&units, diag.span.line);
                eprintln!("{}", diag.render(&path.display().to_string()));
            }
            if is_internal {
                ExitCode::from(EXIT_INTERNAL_ERROR)
            } else if diagnostics.iter().any(|d| d.code.starts_with("E03")) {
                ExitCode::from(EXIT_SEMANTIC_ERROR)
            } else {
                ExitCode::from(EXIT_LEX_PARSE_ERROR)
            }
        }
    }
}

fn default_outfile(first_input: &std::path::Path) -> PathBuf {
    first_input.with_extension("s")
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
