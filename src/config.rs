use std::path::Path;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::noise::{ValueNoise, DEFAULT_FALLOFF, DEFAULT_OCTAVES, DEFAULT_SEED};

const MAX_OCTAVES: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How the sandbox treats requests that arrive while a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Scheduling {
    /// Run every request in arrival order.
    #[default]
    Queue,
    /// Only the newest waiting request runs; older waiting ones are superseded.
    Latest,
}

/// Parameters of the coherent noise behind `query.noise`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct NoiseConfig {
    pub seed: u32,
    pub octaves: u32,
    pub falloff: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            octaves: DEFAULT_OCTAVES,
            falloff: DEFAULT_FALLOFF,
        }
    }
}

impl NoiseConfig {
    /// Build the noise table. Called once per run so every run sees the same field.
    pub fn build(&self) -> ValueNoise {
        ValueNoise::new(self.seed, self.octaves, self.falloff)
    }
}

/// Runtime configuration, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct FiddleConfig {
    pub default_grid_size: u32,
    pub max_grid_size: u32,
    pub scheduling: Scheduling,
    pub noise: NoiseConfig,
}

impl Default for FiddleConfig {
    fn default() -> Self {
        Self {
            default_grid_size: 512,
            max_grid_size: 4096,
            scheduling: Scheduling::Queue,
            noise: NoiseConfig::default(),
        }
    }
}

impl FiddleConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_grid_size == 0 {
            return Err(ConfigError::Invalid("max_grid_size must be positive".into()));
        }
        if self.default_grid_size == 0 || self.default_grid_size > self.max_grid_size {
            return Err(ConfigError::Invalid(format!(
                "default_grid_size must be in 1..={}",
                self.max_grid_size
            )));
        }
        let noise = &self.noise;
        if noise.octaves == 0 || noise.octaves > MAX_OCTAVES {
            return Err(ConfigError::Invalid(format!(
                "noise.octaves must be in 1..={MAX_OCTAVES}"
            )));
        }
        if !(noise.falloff > 0.0 && noise.falloff <= 1.0) {
            return Err(ConfigError::Invalid("noise.falloff must be in (0, 1]".into()));
        }
        // Keeps query.noise inside [-1, 1].
        if ValueNoise::amplitude_sum(noise.octaves, noise.falloff) > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "noise.octaves {} with falloff {} exceeds unit amplitude",
                noise.octaves, noise.falloff
            )));
        }
        Ok(())
    }
}
