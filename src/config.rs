//! Compiler configuration for embedders.
//!
//! Mirrors the CLI's own dump toggles so `compile_program_with_config` is
//! usable both by `main.rs` and by anything embedding `coolc` as a library
//! (a test harness, an IDE plugin) without going through argument parsing.

/// Which stage(s) to stop after, and whether to skip codegen.
///
/// `CompilerConfig::new()` runs the full pipeline through codegen; the
/// `with_*` setters request an early dump instead (mutually exclusive in
/// practice, the CLI only ever sets one of `--tokens`/`--ast`/`--semantics`
/// at a time, but nothing here enforces that, the library just honours
/// whichever flags are set, highest-priority first).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerConfig {
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub dump_semantics: bool,
    pub no_codegen: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_dump_tokens(mut self, value: bool) -> Self {
        self.dump_tokens = value;
        self
    }

    pub fn with_dump_ast(mut self, value: bool) -> Self {
        self.dump_ast = value;
        self
    }

    pub fn with_dump_semantics(mut self, value: bool) -> Self {
        self.dump_semantics = value;
        self
    }

    pub fn with_no_codegen(mut self, value: bool) -> Self {
        self.no_codegen = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_each_toggle_independently() {
        let config = CompilerConfig::new().with_dump_tokens(true).with_no_codegen(true);
        assert!(config.dump_tokens);
        assert!(config.no_codegen);
        assert!(!config.dump_ast);
        assert!(!config.dump_semantics);
    }
}
