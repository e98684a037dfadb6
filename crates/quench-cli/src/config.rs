//! Run configuration.
//!
//! Serde-based TOML parsing for full simulation descriptions, mirroring
//! the command-line flags. A config file fully specifies a run; `--param`
//! overrides still apply on top of it.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use quench_core::{Grid, Integrator};

/// Root configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub grid: GridConfig,

    pub run: RunConfig,

    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub nx: usize,
    #[serde(default = "one")]
    pub ny: usize,
    #[serde(default = "one")]
    pub nz: usize,
    #[serde(default = "unit_spacing")]
    pub dx: f64,
    #[serde(default = "unit_spacing")]
    pub dy: f64,
    #[serde(default = "unit_spacing")]
    pub dz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub dt: f64,
    pub steps: usize,
    #[serde(default = "default_write_every")]
    pub write_every: usize,
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_integrator")]
    pub integrator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name: `diffusion`, `model_a` or `model_b`.
    pub name: String,
    /// Model parameters; unset keys fall back to per-model defaults.
    #[serde(default)]
    pub params: HashMap<String, f64>,
}

fn one() -> usize {
    1
}

fn unit_spacing() -> f64 {
    1.0
}

fn default_write_every() -> usize {
    100
}

fn default_out_dir() -> String {
    "data".to_string()
}

fn default_integrator() -> String {
    "euler".to_string()
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file '{}'", path))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content).context("invalid TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.run.dt <= 0.0 {
            bail!("run.dt must be > 0, got {}", self.run.dt);
        }
        if self.run.write_every == 0 {
            bail!("run.write_every must be >= 1");
        }
        self.integrator()?;
        Ok(())
    }

    pub fn grid(&self) -> Result<Grid> {
        let g = &self.grid;
        Grid::new_3d(g.nx, g.ny, g.nz, g.dx, g.dy, g.dz)
            .context("invalid [grid] section")
    }

    pub fn integrator(&self) -> Result<Integrator> {
        match self.run.integrator.as_str() {
            "euler" => Ok(Integrator::Euler),
            "rk2" => Ok(Integrator::Rk2),
            "rk4" => Ok(Integrator::Rk4),
            other => bail!("unknown integrator '{}' (expected euler, rk2 or rk4)", other),
        }
    }
}

/// Parses `key=value` pairs from `--param` flags into overrides.
pub fn parse_param_overrides(pairs: &[String]) -> Result<HashMap<String, f64>> {
    let mut out = HashMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--param expects key=value, got '{}'", pair);
        };
        let value: f64 = value
            .parse()
            .with_context(|| format!("--param {}: '{}' is not a number", key, value))?;
        out.insert(key.trim().to_string(), value);
    }
    Ok(out)
}
