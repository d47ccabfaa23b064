use std::f64::consts::{PI, TAU};

use rand::{Rng, RngCore};

use crate::noise::ValueNoise;

/// Functions of the `math` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Abs,
    Sin,
    Cos,
    Clamp,
    Ceil,
    Floor,
    Trunc,
    Round,
    Mod,
    Pow,
    Sqrt,
    Exp,
    Max,
    Min,
    MinAngle,
    Asin,
    Acos,
    Atan,
    Atan2,
    Random,
    RandomInteger,
    DieRoll,
    DieRollInteger,
    HermiteBlend,
    Lerp,
    Lerprotate,
    Ln,
}

/// Functions of the `query` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFn {
    Noise,
}

/// What a namespace member call dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Math(MathFn),
    Query(QueryFn),
}

/// Built-in function: single source of truth for name, parameters, AND dispatch.
/// Adding a builtin means adding ONE entry here; compiler and reference docs
/// both read from this.
#[derive(Debug, Clone)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub params: &'static [&'static str],
    /// Accepts any number of arguments (`max`, `min`).
    pub variadic: bool,
    pub func: Builtin,
    pub description: &'static str,
}

/// Numeric constant exposed as a namespace member (`math.pi`).
#[derive(Debug, Clone)]
pub struct BuiltinConst {
    pub name: &'static str,
    pub value: f64,
    pub description: &'static str,
}

macro_rules! math {
    ($name:literal, [$($p:literal),*], $f:ident, $desc:literal) => {
        BuiltinFn {
            name: $name, params: &[$($p),*], variadic: false,
            func: Builtin::Math(MathFn::$f), description: $desc,
        }
    };
}

/// The `math` namespace.
pub static MATH: &[BuiltinFn] = &[
    math!("abs", ["x"], Abs, "Absolute value"),
    math!("sin", ["x"], Sin, "Sine"),
    math!("cos", ["x"], Cos, "Cosine"),
    math!("clamp", ["value", "min", "max"], Clamp, "Clamp value into [min, max]; NaN propagates"),
    math!("ceil", ["x"], Ceil, "Round up"),
    math!("floor", ["x"], Floor, "Round down"),
    math!("trunc", ["x"], Trunc, "Round toward zero"),
    math!("round", ["x"], Round, "Round to nearest, halves toward +infinity"),
    math!("mod", ["value", "denominator"], Mod, "Remainder; the sign follows the dividend"),
    math!("pow", ["base", "exp"], Pow, "Power"),
    math!("sqrt", ["x"], Sqrt, "Square root"),
    math!("exp", ["x"], Exp, "e^x (exponential)"),
    BuiltinFn {
        name: "max", params: &["values"], variadic: true,
        func: Builtin::Math(MathFn::Max), description: "Largest argument; -infinity with no arguments",
    },
    BuiltinFn {
        name: "min", params: &["values"], variadic: true,
        func: Builtin::Math(MathFn::Min), description: "Smallest argument; +infinity with no arguments",
    },
    math!("min_angle", ["angle"], MinAngle, "Normalize radians into (-pi, pi]"),
    math!("asin", ["x"], Asin, "Arc sine"),
    math!("acos", ["x"], Acos, "Arc cosine"),
    math!("atan", ["x"], Atan, "Arc tangent"),
    math!("atan2", ["y", "x"], Atan2, "Angle of the vector (x, y)"),
    math!("random", ["low", "high"], Random, "Uniform random number in [low, high)"),
    math!("random_integer", ["low", "high"], RandomInteger, "Uniform random integer in [low, high]"),
    math!("die_roll", ["count", "low", "high"], DieRoll, "Mean of count uniform draws in [low, high)"),
    math!("die_roll_integer", ["count", "low", "high"], DieRollInteger, "Floor of the mean of count integer draws in [low, high]"),
    math!("hermite_blend", ["t"], HermiteBlend, "Smoothstep: t * t * (3 - 2t)"),
    math!("lerp", ["start", "end", "t"], Lerp, "Linear interpolation: start + (end - start) * t"),
    math!("lerprotate", ["start", "end", "t"], Lerprotate, "Interpolate angles along the shortest arc"),
    math!("ln", ["x"], Ln, "Natural logarithm"),
];

/// Numeric members of the `math` namespace.
pub static MATH_CONSTANTS: &[BuiltinConst] = &[
    BuiltinConst { name: "pi", value: PI, description: "3.14159..." },
];

/// The `query` namespace.
pub static QUERY: &[BuiltinFn] = &[
    BuiltinFn {
        name: "noise", params: &["x", "y"], variadic: false,
        func: Builtin::Query(QueryFn::Noise),
        description: "Seeded 2D coherent noise. Returns [-1, 1]",
    },
];

pub fn lookup_math(name: &str) -> Option<&'static BuiltinFn> {
    MATH.iter().find(|b| b.name == name)
}

pub fn lookup_math_const(name: &str) -> Option<&'static BuiltinConst> {
    MATH_CONSTANTS.iter().find(|c| c.name == name)
}

pub fn lookup_query(name: &str) -> Option<&'static BuiltinFn> {
    QUERY.iter().find(|b| b.name == name)
}

/// Reads a positional argument; absent arguments are NaN.
fn arg(args: &[f64], i: usize) -> f64 {
    args.get(i).copied().unwrap_or(f64::NAN)
}

/// `max`/`min` over all arguments; any NaN makes the result NaN.
fn fold_nan(args: &[f64], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for &a in args {
        if a.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, a);
    }
    acc
}

fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

/// Round half toward +infinity.
pub fn round_half_up(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// Power with scripting-language edge cases: a NaN exponent is always NaN,
/// and `(±1) ** ±infinity` is NaN.
pub fn js_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exp)
    }
}

pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    js_max(lo, js_min(hi, value))
}

pub fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

pub fn hermite_blend(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// Normalize an angle in radians into `(-pi, pi]`.
pub fn min_angle(value: f64) -> f64 {
    let mut angle = value % TAU;
    if angle > PI {
        angle -= TAU;
    } else if angle <= -PI {
        angle += TAU;
    }
    angle
}

pub fn lerprotate(start: f64, end: f64, t: f64) -> f64 {
    start + min_angle(end - start) * t
}

fn random(rng: &mut dyn RngCore, low: f64, high: f64) -> f64 {
    rng.gen::<f64>() * (high - low) + low
}

fn random_integer(rng: &mut dyn RngCore, low: f64, high: f64) -> f64 {
    (rng.gen::<f64>() * (high - low + 1.0)).floor() + low
}

fn die_roll(rng: &mut dyn RngCore, count: f64, low: f64, high: f64, draw: fn(&mut dyn RngCore, f64, f64) -> f64) -> f64 {
    let mut sum = 0.0;
    let mut i = 0.0;
    while i < count {
        sum += draw(rng, low, high);
        i += 1.0;
    }
    sum / count
}

impl MathFn {
    /// Evaluate with already-coerced numeric arguments.
    pub fn eval(self, args: &[f64], rng: &mut dyn RngCore) -> f64 {
        let a = arg(args, 0);
        match self {
            Self::Abs => a.abs(),
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Clamp => clamp(a, arg(args, 1), arg(args, 2)),
            Self::Ceil => a.ceil(),
            Self::Floor => a.floor(),
            Self::Trunc => a.trunc(),
            Self::Round => round_half_up(a),
            Self::Mod => a % arg(args, 1),
            Self::Pow => js_pow(a, arg(args, 1)),
            Self::Sqrt => a.sqrt(),
            Self::Exp => a.exp(),
            Self::Max => fold_nan(args, f64::NEG_INFINITY, js_max),
            Self::Min => fold_nan(args, f64::INFINITY, js_min),
            Self::MinAngle => min_angle(a),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Atan2 => a.atan2(arg(args, 1)),
            Self::Random => random(rng, a, arg(args, 1)),
            Self::RandomInteger => random_integer(rng, a, arg(args, 1)),
            Self::DieRoll => die_roll(rng, a, arg(args, 1), arg(args, 2), random),
            Self::DieRollInteger => die_roll(rng, a, arg(args, 1), arg(args, 2), random_integer).floor(),
            Self::HermiteBlend => hermite_blend(a),
            Self::Lerp => lerp(a, arg(args, 1), arg(args, 2)),
            Self::Lerprotate => lerprotate(a, arg(args, 1), arg(args, 2)),
            Self::Ln => a.ln(),
        }
    }
}

impl QueryFn {
    pub fn eval(self, args: &[f64], noise: &ValueNoise) -> f64 {
        match self {
            // A missing y samples the x axis.
            Self::Noise => noise.sample(arg(args, 0), args.get(1).copied().unwrap_or(0.0)),
        }
    }
}

/// Human-readable builtin reference generated from the registries.
pub fn reference() -> String {
    let mut out = String::new();
    let mut section = |title: &str, ns: &str, fns: &[BuiltinFn], consts: &[BuiltinConst]| {
        out.push_str(title);
        out.push('\n');
        for c in consts {
            out.push_str(&format!("  {ns}.{:<28} {}\n", c.name, c.description));
        }
        for f in fns {
            let params = if f.variadic {
                format!("...{}", f.params.join(", "))
            } else {
                f.params.join(", ")
            };
            let sig = format!("{}({params})", f.name);
            out.push_str(&format!("  {ns}.{sig:<28} {}\n", f.description));
        }
    };
    section("math (scalar math)", "math", MATH, MATH_CONSTANTS);
    section("query (alias q)", "query", QUERY, &[]);
    out
}
