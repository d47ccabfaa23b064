#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod builtins;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod compiler;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod vm;

use compiler::CompiledProgram;
use error::CompileError;

/// Compile program text into a `CompiledProgram` ready for VM execution.
///
/// This is the primary public entry point for the DSL pipeline:
/// source → lex → parse → resolve names & compile → `CompiledProgram`.
/// Nothing in the program runs during compilation.
pub fn compile_source(source: &str) -> Result<CompiledProgram, Vec<CompileError>> {
    let tokens = lexer::lex(source)?;
    let program = parser::parse(tokens)?;
    compiler::compile(&program)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lexer_errors_surface() {
        let errs = compile_source("return 1 # 2").unwrap_err();
        assert_eq!(errs[0].kind, error::ErrorKind::Lexer);
    }

    #[test]
    fn parser_errors_surface() {
        let errs = compile_source("return (1").unwrap_err();
        assert_eq!(errs[0].kind, error::ErrorKind::Parser);
    }

    #[test]
    fn name_errors_surface_with_location() {
        let src = "let a = 1\nreturn b";
        let errs = compile_source(src).unwrap_err();
        assert_eq!(
            errs[0].format_with_source(src),
            "[name] line 2:8: 'b' is not defined"
        );
    }

    #[test]
    fn fiddle_style_program_compiles() {
        let src = r"
            // rooms on a coarse grid
            v.cell = math.floor(x / 16)
            v.n = q.noise(v.worldx * 0.05, v.worldz * 0.05)
            v.floor_color = { r: 0.2, g: 0.15, b: 0.1 }
            if (v.n > 0.2 &&
                math.mod(v.cell, 2) == 0) {
                v.floor_color.r += 0.02
            }
            v.floor_color.g *= 1.5
            return v.n < -0.3
                ? { r: 0, g: 0, b: 0.4 }
                : v.floor_color
        ";
        assert!(compile_source(src).is_ok());
    }
}
