//! Built-in model definitions.
//!
//! Each builder declares a named model on an evolver: fields, implicit
//! operators, nonlinear terms and stochastic forcing. Parameters come
//! from the `[model.params]` table with per-model defaults.

use std::collections::HashMap;

use anyhow::{bail, Result};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quench_core::{Evolver, FieldId, SpectralBackend, SpectralOperator};

use crate::config::ModelConfig;

/// Known model names, for error messages and `--list-models`.
pub const MODEL_NAMES: &[&str] = &["diffusion", "model_a", "model_b"];

struct Params<'a> {
    table: &'a HashMap<String, f64>,
}

impl<'a> Params<'a> {
    fn get(&self, key: &str, default: f64) -> f64 {
        self.table.get(key).copied().unwrap_or(default)
    }
}

/// Builds `model` on the evolver and returns the handle of its primary
/// field.
pub fn build<B: SpectralBackend>(
    ev: &mut Evolver<B>,
    model: &ModelConfig,
    seed: Option<u64>,
) -> Result<FieldId> {
    let params = Params {
        table: &model.params,
    };
    match model.name.as_str() {
        "diffusion" => diffusion(ev, &params, seed),
        "model_a" => model_a(ev, &params, seed),
        "model_b" => model_b(ev, &params, seed),
        other => bail!(
            "unknown model '{}' (available: {})",
            other,
            MODEL_NAMES.join(", ")
        ),
    }
}

/// Plain diffusion, `dφ/dt = D ∇²φ`. Fully implicit; mostly a smoke
/// test and a baseline for timing.
fn diffusion<B: SpectralBackend>(
    ev: &mut Evolver<B>,
    params: &Params,
    seed: Option<u64>,
) -> Result<FieldId> {
    let d = params.get("D", 1.0);
    ev.add_parameter("D", d);

    let phi = ev.create_field("phi", true)?;
    ev.field_mut(phi)
        .add_implicit(SpectralOperator::laplacian_power(-d, 1));
    random_initial(ev, phi, params, seed);
    ev.set_output_field("phi", true)?;
    Ok(phi)
}

/// Non-conserved relaxational dynamics (Allen-Cahn):
/// `dφ/dt = -(a φ + b φ³ - k ∇²φ) + √(2D) ξ`.
///
/// The linear part `-a - k q²` is implicit; the cubic term is explicit.
fn model_a<B: SpectralBackend>(
    ev: &mut Evolver<B>,
    params: &Params,
    seed: Option<u64>,
) -> Result<FieldId> {
    let a = params.get("a", -1.0);
    let b = params.get("b", 1.0);
    let k = params.get("k", 1.0);
    let temperature = params.get("D", 0.0);
    for (name, value) in [("a", a), ("b", b), ("k", k), ("D", temperature)] {
        ev.add_parameter(name, value);
    }

    let phi = ev.create_field("phi", true)?;
    ev.field_mut(phi).add_implicit(SpectralOperator::constant(-a));
    ev.field_mut(phi)
        .add_implicit(SpectralOperator::laplacian_power(-k, 1));
    ev.add_term(
        "phi",
        vec![SpectralOperator::constant(-b)],
        &["phi", "phi", "phi"],
    )?;
    if temperature > 0.0 {
        ev.field_mut(phi)
            .set_noisy(SpectralOperator::constant((2.0 * temperature).sqrt()));
    }
    random_initial(ev, phi, params, seed);
    ev.set_output_field("phi", true)?;
    Ok(phi)
}

/// Conserved dynamics (Cahn-Hilliard):
/// `dφ/dt = ∇²(a φ + b φ³ - k ∇²φ) + √(2D) ∇·ξ`.
///
/// The linear part `-a q² - k q⁴` is implicit; the cubic term carries a
/// `-b q²` prefactor. The conserved forcing amplitude grows as `|q|`, so
/// the spatial mean of φ is exact to machine precision.
fn model_b<B: SpectralBackend>(
    ev: &mut Evolver<B>,
    params: &Params,
    seed: Option<u64>,
) -> Result<FieldId> {
    let a = params.get("a", -1.0);
    let b = params.get("b", 1.0);
    let k = params.get("k", 1.0);
    let temperature = params.get("D", 0.0);
    for (name, value) in [("a", a), ("b", b), ("k", k), ("D", temperature)] {
        ev.add_parameter(name, value);
    }

    let phi = ev.create_field("phi", true)?;
    ev.field_mut(phi)
        .add_implicit(SpectralOperator::laplacian_power(-a, 1));
    ev.field_mut(phi)
        .add_implicit(SpectralOperator::laplacian_power(-k, 2));
    ev.add_term(
        "phi",
        vec![SpectralOperator::laplacian_power(-b, 1)],
        &["phi", "phi", "phi"],
    )?;
    if temperature > 0.0 {
        ev.field_mut(phi)
            .set_noisy(SpectralOperator::inv_q((2.0 * temperature).sqrt(), -1));
    }
    random_initial(ev, phi, params, seed);
    ev.set_output_field("phi", true)?;
    Ok(phi)
}

/// Uniform background plus small uniform-random fluctuations, the usual
/// quench initial condition. `mean` and `amplitude` are model params.
fn random_initial<B: SpectralBackend>(
    ev: &mut Evolver<B>,
    id: FieldId,
    params: &Params,
    seed: Option<u64>,
) {
    let mean = params.get("mean", 0.0);
    let amplitude = params.get("amplitude", 0.1);
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or(0x5eed));
    for v in ev.field_mut(id).host_real_mut() {
        *v = Complex64::new(mean + amplitude * rng.gen_range(-1.0..1.0), 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quench_core::Grid;

    fn model_cfg(name: &str, params: &[(&str, f64)]) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    fn evolver() -> Evolver<quench_core::CpuBackend> {
        let grid = Grid::new_2d(16, 16, 1.0, 1.0).unwrap();
        Evolver::cpu_seeded(grid, 0.01, 100, 1).unwrap()
    }

    #[test]
    fn unknown_model_is_rejected() {
        let mut ev = evolver();
        let cfg = model_cfg("swift_hohenberg", &[]);
        assert!(build(&mut ev, &cfg, None).is_err());
    }

    #[test]
    fn diffusion_declares_one_implicit_field() {
        let mut ev = evolver();
        let phi = build(&mut ev, &model_cfg("diffusion", &[("D", 0.5)]), Some(3)).unwrap();
        assert_eq!(ev.lookup("phi"), Some(phi));
        assert_eq!(ev.parameter("D"), Some(0.5));
        assert!(ev.field(phi).terms().is_empty());
        assert_eq!(ev.field(phi).implicit.len(), 1);
        assert!(!ev.field(phi).needs_aliasing);
    }

    #[test]
    fn model_a_cubic_term_flags_dealiasing() {
        let mut ev = evolver();
        let phi = build(
            &mut ev,
            &model_cfg("model_a", &[("D", 0.1)]),
            Some(3),
        )
        .unwrap();
        let f = ev.field(phi);
        assert_eq!(f.terms().len(), 1);
        assert_eq!(f.terms()[0].order(), 3);
        assert!(f.needs_aliasing);
        assert_eq!(f.aliasing_order, 3);
        assert!(f.is_noisy);
    }

    #[test]
    fn model_b_without_temperature_is_deterministic() {
        let mut ev = evolver();
        let phi = build(&mut ev, &model_cfg("model_b", &[]), Some(3)).unwrap();
        let f = ev.field(phi);
        assert!(!f.is_noisy);
        assert_eq!(f.implicit.len(), 2);
    }

    #[test]
    fn seeded_initial_conditions_repeat() {
        let mut ev1 = evolver();
        let p1 = build(&mut ev1, &model_cfg("model_a", &[]), Some(9)).unwrap();
        let mut ev2 = evolver();
        let p2 = build(&mut ev2, &model_cfg("model_a", &[]), Some(9)).unwrap();
        assert_eq!(ev1.field(p1).host_real(), ev2.field(p2).host_real());
    }

    #[test]
    fn model_b_runs_a_few_steps_without_blowing_up() {
        let mut ev = evolver();
        let dir = std::env::temp_dir().join(format!("quench-modelb-{}", std::process::id()));
        ev.set_out_dir(&dir);
        let phi = build(&mut ev, &model_cfg("model_b", &[]), Some(3)).unwrap();
        ev.prepare_problem().unwrap();
        ev.run(20).unwrap();
        ev.sync_host().unwrap();
        assert!(ev.field(phi).host_real().iter().all(|v| v.re.is_finite()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
