use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::color::Color;
use crate::config::NoiseConfig;
use crate::dsl::compiler::{CompiledProgram, NAME_B, NAME_G, NAME_R};
use crate::dsl::vm::{self, Value, VmBuffers, VmContext};
use crate::dsl::{compile_source, error::format_all};
use crate::error::RunError;
use crate::noise::ValueNoise;
use crate::protocol::PixelBuffer;

/// Per-run state. Created fresh for every run and dropped when it ends.
pub struct ExecutionContext {
    noise: ValueNoise,
    rng: StdRng,
}

impl ExecutionContext {
    /// Fresh noise table from `noise` and an entropy-seeded random source.
    pub fn new(noise: &NoiseConfig) -> Self {
        Self::with_rng(noise, StdRng::from_entropy())
    }

    /// Same as `new` with a caller-supplied random source.
    pub fn with_rng(noise: &NoiseConfig, rng: StdRng) -> Self {
        Self { noise: noise.build(), rng }
    }
}

/// Compile `source`, rendering diagnostics into a `RunError`.
pub fn compile(source: &str) -> Result<CompiledProgram, RunError> {
    compile_source(source).map_err(|errors| RunError::Compile {
        message: format_all(&errors, source),
        count: errors.len(),
    })
}

/// Evaluate `program` once per pixel, row by row, into a packed RGBA buffer.
///
/// The first pixel that fails aborts the run; no partial buffer escapes.
pub fn render(
    program: &CompiledProgram,
    grid_size: u32,
    ctx: &mut ExecutionContext,
) -> Result<PixelBuffer, RunError> {
    let side = grid_size as usize;
    let mut data = Vec::with_capacity(side * side * 4);
    let mut buffers = VmBuffers::new();

    for y in 0..grid_size {
        for x in 0..grid_size {
            let mut vm_ctx = VmContext {
                x: f64::from(x),
                y: f64::from(y),
                noise: &ctx.noise,
                rng: &mut ctx.rng,
            };
            let value = vm::execute_reuse(program, &mut vm_ctx, &mut buffers).map_err(|e| {
                RunError::Runtime {
                    message: e.message,
                    x,
                    y,
                }
            })?;
            data.extend_from_slice(&normalize(&value).to_array());
        }
    }

    PixelBuffer::new(grid_size, data)
        .ok_or_else(|| RunError::internal("pixel buffer length mismatch"))
}

/// Convert a program result into a color sample.
pub fn normalize(value: &Value) -> Color {
    match value {
        Value::Number(n) => Color::gray(*n),
        Value::Object(obj) => {
            let obj = obj.borrow();
            let channel = |name| obj.get(name).map_or(0.0, channel_number);
            Color::from_unit(channel(NAME_R), channel(NAME_G), channel(NAME_B))
        }
        Value::Undefined | Value::Null | Value::Bool(_) => Color::BLACK,
    }
}

fn channel_number(value: &Value) -> f64 {
    if value.is_nullish() {
        0.0
    } else {
        value.to_number()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn run(source: &str, grid_size: u32) -> Result<PixelBuffer, RunError> {
        let program = compile(source)?;
        let mut ctx = ExecutionContext::with_rng(&NoiseConfig::default(), StdRng::seed_from_u64(1));
        render(&program, grid_size, &mut ctx)
    }

    fn assert_uniform(buffer: &PixelBuffer, expected: [u8; 4]) {
        for px in buffer.as_bytes().chunks_exact(4) {
            assert_eq!(px, expected);
        }
    }

    #[test]
    fn constant_gray_fills_every_size() {
        for size in [1, 2, 512] {
            let buffer = run("return 0.5", size).unwrap();
            assert_eq!(buffer.as_bytes().len(), (size * size * 4) as usize);
            assert_uniform(&buffer, [128, 128, 128, 255]);
        }
    }

    #[test]
    fn red_object() {
        let buffer = run("return { r: 1, g: 0, b: 0 }", 4).unwrap();
        assert_uniform(&buffer, [255, 0, 0, 255]);
    }

    #[test]
    fn missing_return_is_black() {
        let buffer = run("let a = 1", 2).unwrap();
        assert_uniform(&buffer, [0, 0, 0, 255]);
    }

    #[test]
    fn non_color_results_are_black() {
        for src in ["return true", "return null", "return undefined", "return"] {
            let buffer = run(src, 2).unwrap();
            assert_uniform(&buffer, [0, 0, 0, 255]);
        }
    }

    #[test]
    fn object_channels_default_and_clamp() {
        let buffer = run("return { r: 2, b: null }", 1).unwrap();
        assert_eq!(buffer.pixel(0, 0), Some(Color::rgb(255, 0, 0)));

        let buffer = run("return { r: -1, g: 0.5, b: true }", 1).unwrap();
        assert_eq!(buffer.pixel(0, 0), Some(Color::rgb(0, 128, 255)));
    }

    #[test]
    fn nan_scalar_is_black() {
        let buffer = run("return math.sqrt(-1)", 1).unwrap();
        assert_eq!(buffer.pixel(0, 0), Some(Color::BLACK));
    }

    #[test]
    fn row_major_order() {
        // x varies fastest within a row.
        let buffer = run("return x / 3", 4).unwrap();
        let bytes = buffer.as_bytes();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[4], 85);
        assert_eq!(bytes[12], 255);
        assert_eq!(buffer.pixel(3, 2), Some(Color::WHITE));
        assert_eq!(buffer.pixel(0, 3), Some(Color::BLACK));
    }

    #[test]
    fn syntax_error_fails_without_pixels() {
        let err = run("return (1 +", 8).unwrap_err();
        assert!(matches!(err, RunError::Compile { count, .. } if count >= 1));
    }

    #[test]
    fn deeply_nested_program_is_a_compile_error() {
        let parens = format!("return {}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let negations = format!("return {}1", "- ".repeat(10_000));
        let chain = format!("return 0{}", " + x".repeat(10_000));
        for src in [parens, negations, chain] {
            let err = run(&src, 2).unwrap_err();
            assert!(matches!(err, RunError::Compile { .. }), "{err:?}");
        }
    }

    #[test]
    fn long_sums_still_render() {
        let src = format!("return (0{}) / 100", " + 0.5".repeat(200));
        let buffer = run(&src, 1).unwrap();
        assert_eq!(buffer.pixel(0, 0), Some(Color::WHITE));
    }

    #[test]
    fn runtime_error_aborts_whole_run() {
        let err = run("if (x == 3 && y == 3) { math.explode() }\nreturn 1", 8).unwrap_err();
        match err {
            RunError::Runtime { message, x, y } => {
                assert_eq!((x, y), (3, 3));
                assert!(message.contains("math.explode"));
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn deterministic_program_is_reproducible() {
        let src = "return q.noise(x * 0.1, y * 0.1) * 0.5 + 0.5";
        let a = run(src, 32).unwrap();
        let b = run(src, 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fresh_context_per_run_rebuilds_noise() {
        let program = compile("return q.noise(x, y) * 0.5 + 0.5").unwrap();
        let mut first = ExecutionContext::new(&NoiseConfig::default());
        let mut second = ExecutionContext::new(&NoiseConfig::default());
        let a = render(&program, 16, &mut first).unwrap();
        let b = render(&program, 16, &mut second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn variable_namespace_is_per_pixel() {
        let src = "v.count = (v.count || 0) + 1\nreturn v.count";
        let buffer = run(src, 3).unwrap();
        assert_uniform(&buffer, [255, 255, 255, 255]);
    }

    #[test]
    fn demo_programs_render() {
        for src in [
            include_str!("../demos/damascus.js"),
            include_str!("../demos/dungeon.js"),
        ] {
            let buffer = run(src, 16).unwrap();
            assert_eq!(buffer.as_bytes().len(), 16 * 16 * 4);
            assert!(buffer.as_bytes().chunks_exact(4).all(|px| px[3] == 255));
        }
    }
}
