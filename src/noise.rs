//! Seeded multi-octave lattice value noise.
//!
//! The lattice is a 4096-entry table of uniform values filled from a 32-bit
//! linear congruential generator, so a given seed always produces the same
//! field. Rows of the lattice are 16 entries apart; successive octaves double
//! the frequency and scale the amplitude by the falloff.

use std::f64::consts::PI;

const SIZE: usize = 4096;
const MASK: i32 = 4095;
const YWRAP_BITS: u32 = 4;
const YWRAP: i32 = 1 << YWRAP_BITS;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u32 = 12345;
pub const DEFAULT_OCTAVES: u32 = 4;
pub const DEFAULT_FALLOFF: f64 = 0.5;

/// Numerical Recipes LCG.
struct Lcg {
    state: u64,
}

impl Lcg {
    const M: u64 = 1 << 32;
    const A: u64 = 1_664_525;
    const C: u64 = 1_013_904_223;

    fn new(seed: u32) -> Self {
        Self { state: u64::from(seed) }
    }

    #[allow(clippy::cast_precision_loss)]
    fn next_unit(&mut self) -> f64 {
        self.state = (Self::A * self.state + Self::C) % Self::M;
        self.state as f64 / Self::M as f64
    }
}

/// A noise field: the lattice table plus the octave parameters.
#[derive(Clone)]
pub struct ValueNoise {
    table: Vec<f64>,
    octaves: u32,
    falloff: f64,
}

impl std::fmt::Debug for ValueNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueNoise")
            .field("octaves", &self.octaves)
            .field("falloff", &self.falloff)
            .finish_non_exhaustive()
    }
}

impl Default for ValueNoise {
    fn default() -> Self {
        Self::new(DEFAULT_SEED, DEFAULT_OCTAVES, DEFAULT_FALLOFF)
    }
}

impl ValueNoise {
    pub fn new(seed: u32, octaves: u32, falloff: f64) -> Self {
        let mut lcg = Lcg::new(seed);
        let table = (0..SIZE).map(|_| lcg.next_unit()).collect();
        Self {
            table,
            octaves,
            falloff,
        }
    }

    /// Sum of the octave amplitudes, the upper bound of `sample01`.
    pub fn amplitude_sum(octaves: u32, falloff: f64) -> f64 {
        let mut amp = 0.5;
        let mut total = 0.0;
        for _ in 0..octaves {
            total += amp;
            amp *= falloff;
        }
        total
    }

    #[allow(clippy::indexing_slicing, clippy::cast_sign_loss)]
    fn at(&self, offset: i32) -> f64 {
        // Masked offset is always within 0..SIZE.
        self.table[(offset & MASK) as usize]
    }

    /// Noise in `[0, amplitude_sum)`. Negative coordinates are mirrored.
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample01(&self, x: f64, y: f64) -> f64 {
        let x = x.abs();
        let y = y.abs();

        // Lattice arithmetic wraps like 32-bit integers.
        let mut xi = x.floor() as i64 as i32;
        let mut yi = y.floor() as i64 as i32;
        let mut xf = x - x.floor();
        let mut yf = y - y.floor();

        let mut r = 0.0;
        let mut amp = 0.5;

        for _ in 0..self.octaves {
            let of = xi.wrapping_add(yi.wrapping_shl(YWRAP_BITS));

            let rxf = scaled_cosine(xf);
            let ryf = scaled_cosine(yf);

            let mut n1 = self.at(of);
            n1 += rxf * (self.at(of.wrapping_add(1)) - n1);
            let mut n2 = self.at(of.wrapping_add(YWRAP));
            n2 += rxf * (self.at(of.wrapping_add(YWRAP + 1)) - n2);
            n1 += ryf * (n2 - n1);

            r += n1 * amp;
            amp *= self.falloff;

            xi = xi.wrapping_shl(1);
            xf *= 2.0;
            yi = yi.wrapping_shl(1);
            yf *= 2.0;

            if xf >= 1.0 {
                xi = xi.wrapping_add(1);
                xf -= 1.0;
            }
            if yf >= 1.0 {
                yi = yi.wrapping_add(1);
                yf -= 1.0;
            }
        }
        r
    }

    /// Noise remapped to `[-1, 1]`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        self.sample01(x, y) * 2.0 - 1.0
    }
}

fn scaled_cosine(t: f64) -> f64 {
    0.5 * (1.0 - (t * PI).cos())
}
