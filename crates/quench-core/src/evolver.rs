//! Simulation orchestration.
//!
//! The evolver owns the grid, the timestep, and the field arena, and
//! drives the per-step sequence: output epoch (download + NaN check +
//! snapshots + observers), non-dynamic fields (terms, then algebraic
//! redefinition), dynamic fields (terms, then one integrator step), then
//! the time counters.
//!
//! Non-dynamic fields are updated before dynamic ones so that dynamic
//! equations read algebraic quantities computed at the current step.
//! Reverse dependencies (a non-dynamic field reading a dynamic one) see
//! last step's values. There is no fixed-point iteration within a step.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use num_complex::Complex64;

use crate::backend::SpectralBackend;
use crate::cpu::CpuBackend;
use crate::dealias;
use crate::errors::{QuenchError, Result};
use crate::field::{DealiasState, Field, FieldId, Integrator, NoiseState, StepScratch};
use crate::grid::Grid;
use crate::operator::{self, SpectralOperator};
use crate::output;

/// Process exit status used when numerical blow-up (NaN) is detected at
/// an output epoch.
pub const BLOWUP_EXIT_CODE: i32 = 3;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Owns and advances a set of fields sharing one grid.
pub struct Evolver<B: SpectralBackend> {
    grid: Grid,
    backend: B,
    dt: f64,
    dt_sqrt: f64,
    write_every: usize,
    out_dir: PathBuf,
    current_time: f64,
    current_step: usize,
    fields: Vec<Field<B>>,
    parameters: HashMap<String, f64>,
    prepared: bool,
}

impl Evolver<CpuBackend> {
    /// Evolver on the host backend, seeded from OS entropy.
    pub fn cpu(grid: Grid, dt: f64, write_every: usize) -> Result<Self> {
        Evolver::new(CpuBackend::new(grid), grid, dt, write_every)
    }

    /// Evolver on the host backend with a fixed noise seed.
    pub fn cpu_seeded(grid: Grid, dt: f64, write_every: usize, seed: u64) -> Result<Self> {
        Evolver::new(CpuBackend::with_seed(grid, seed), grid, dt, write_every)
    }
}

impl<B: SpectralBackend> Evolver<B> {
    pub fn new(backend: B, grid: Grid, dt: f64, write_every: usize) -> Result<Self> {
        if dt <= 0.0 {
            return Err(QuenchError::config(format!("timestep must be > 0, got {}", dt)));
        }
        if write_every == 0 {
            return Err(QuenchError::config("output cadence must be >= 1 step"));
        }
        Ok(Evolver {
            grid,
            backend,
            dt,
            dt_sqrt: dt.sqrt(),
            write_every,
            out_dir: PathBuf::from("data"),
            current_time: 0.0,
            current_step: 0,
            fields: Vec::new(),
            parameters: HashMap::new(),
            prepared: false,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Output directory for field snapshots (default `data/`).
    pub fn set_out_dir(&mut self, dir: impl Into<PathBuf>) {
        self.out_dir = dir.into();
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Registers a named field. A duplicate name is refused and reported;
    /// exactly one field of that name stays registered.
    pub fn create_field(&mut self, name: &str, dynamic: bool) -> Result<FieldId> {
        if self.lookup(name).is_some() {
            log::error!("trying to create field '{}' which already exists", name);
            return Err(QuenchError::config(format!(
                "field '{}' already exists",
                name
            )));
        }
        let field = Field::new(&mut self.backend, self.grid, name.to_string(), dynamic)?;
        self.fields.push(field);
        Ok(FieldId(self.fields.len() - 1))
    }

    /// Handle of the field called `name`, if registered.
    pub fn lookup(&self, name: &str) -> Option<FieldId> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(FieldId)
    }

    pub fn field(&self, id: FieldId) -> &Field<B> {
        &self.fields[id.0]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut Field<B> {
        &mut self.fields[id.0]
    }

    pub fn fields(&self) -> &[Field<B>] {
        &self.fields
    }

    /// Registers a named scalar parameter. This is the interface an
    /// external equation parser populates; the engine itself only stores
    /// the values.
    pub fn add_parameter(&mut self, name: &str, value: f64) {
        self.parameters.insert(name.to_string(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    /// Adds a nonlinear term to `target`: the real-space product of
    /// `operands` weighted by the summed `prefactors`.
    ///
    /// An unknown target is refused. An unknown operand name is dropped
    /// from the product with a warning; the term still evaluates with
    /// the remaining factors. A product of order ≥ 2 flags the target
    /// and its operands for dealiasing at that order.
    pub fn add_term(
        &mut self,
        target: &str,
        prefactors: Vec<SpectralOperator>,
        operands: &[&str],
    ) -> Result<()> {
        let Some(target_id) = self.lookup(target) else {
            log::error!("field '{}' not found trying to create term", target);
            return Err(QuenchError::unknown_field(target));
        };
        let mut resolved = Vec::with_capacity(operands.len());
        for name in operands {
            match self.lookup(name) {
                Some(id) => resolved.push(id),
                None => {
                    log::warn!(
                        "term operand '{}' matches no field; dropping it from the product",
                        name
                    );
                }
            }
        }
        let order = resolved.len() as u32;
        let term = crate::term::Term::new(
            &mut self.backend,
            self.grid.len(),
            resolved.clone(),
            prefactors,
        )?;
        if order >= 2 {
            self.fields[target_id.0].flag_aliasing(order);
            for id in &resolved {
                self.fields[id.0].flag_aliasing(order);
            }
        }
        self.fields[target_id.0].terms.push(term);
        Ok(())
    }

    /// Marks a field for snapshot output by name.
    pub fn set_output_field(&mut self, name: &str, output: bool) -> Result<()> {
        match self.lookup(name) {
            Some(id) => {
                self.fields[id.0].output_to_file = output;
                Ok(())
            }
            None => {
                log::error!("set_output_field: '{}' not found", name);
                Err(QuenchError::unknown_field(name))
            }
        }
    }

    /// One-time setup before the step loop: output directory, initial
    /// host → backend upload and forward transform, conditional buffer
    /// allocation (noise, dealiasing, multi-stage scratch), and
    /// propagator/prefactor table precomputation.
    pub fn prepare_problem(&mut self) -> Result<()> {
        if let Err(e) = output::ensure_output_dir(&self.out_dir) {
            // Snapshot writes will fail on their own; keep running.
            log::error!(
                "cannot create output directory '{}': {} (is there a file with that name?)",
                self.out_dir.display(),
                e
            );
        }
        let backend = &mut self.backend;
        for f in &mut self.fields {
            prepare_field(backend, &self.grid, self.dt, f)?;
        }
        self.prepared = true;
        log::info!(
            "prepared {} field(s) on a {}x{}x{} grid, dt = {}",
            self.fields.len(),
            self.grid.sx,
            self.grid.sy,
            self.grid.sz,
            self.dt
        );
        Ok(())
    }

    /// Changes the timestep and rebuilds every propagator table.
    pub fn set_dt(&mut self, dt: f64) -> Result<()> {
        if dt <= 0.0 {
            return Err(QuenchError::config(format!("timestep must be > 0, got {}", dt)));
        }
        self.dt = dt;
        self.dt_sqrt = dt.sqrt();
        if self.prepared {
            let backend = &mut self.backend;
            for f in &mut self.fields {
                build_propagators(backend, &self.grid, dt, f)?;
            }
        }
        Ok(())
    }

    /// Advances the whole system by one timestep.
    pub fn advance_time(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(QuenchError::config(
                "prepare_problem() must be called before advance_time()",
            ));
        }
        if self.current_step % self.write_every == 0 {
            self.write_out()?;
        }
        for i in 0..self.fields.len() {
            if !self.fields[i].dynamic {
                self.update_terms(i)?;
                self.assemble_rhs(i)?;
                self.set_algebraic(i)?;
            }
        }
        for i in 0..self.fields.len() {
            if self.fields[i].dynamic {
                self.step_field(i)?;
            }
        }
        self.current_time += self.dt;
        self.current_step += 1;
        Ok(())
    }

    /// Runs `steps` timesteps.
    pub fn run(&mut self, steps: usize) -> Result<()> {
        for _ in 0..steps {
            self.advance_time()?;
        }
        Ok(())
    }

    /// True when the first sample of the first field's host mirror is NaN.
    /// Meaningful right after a download (output epochs).
    pub fn has_blown_up(&self) -> bool {
        self.fields
            .first()
            .and_then(|f| f.host_real.first())
            .map_or(false, |v| v.re.is_nan())
    }

    /// Synchronizes every field's host mirror with its backend-resident
    /// real-space state. Called automatically at output epochs; available
    /// for callers that need up-to-date host data in between.
    pub fn sync_host(&mut self) -> Result<()> {
        self.backend.synchronize()?;
        let backend = &mut self.backend;
        for f in &mut self.fields {
            backend.download(&f.real, &mut f.host_real)?;
        }
        Ok(())
    }

    /// Output epoch: synchronize, download, NaN check, snapshots,
    /// observers. Detected blow-up halts the process with
    /// [`BLOWUP_EXIT_CODE`]; the failing step is not persisted.
    fn write_out(&mut self) -> Result<()> {
        self.sync_host()?;
        if self.has_blown_up() {
            log::error!("NaN detected at step {}, exiting!", self.current_step);
            std::process::exit(BLOWUP_EXIT_CODE);
        }
        for f in &self.fields {
            if f.output_to_file {
                if let Err(e) = output::write_snapshot(
                    &self.out_dir,
                    &f.name,
                    self.current_step,
                    &self.grid,
                    &f.host_real,
                ) {
                    log::error!("failed to write snapshot for '{}': {}", f.name, e);
                }
            }
        }
        let grid = self.grid;
        let step = self.current_step;
        let mut comp_host = vec![ZERO; grid.len()];
        for i in 0..self.fields.len() {
            if self.fields[i].observers.is_empty() {
                continue;
            }
            {
                let backend = &mut self.backend;
                backend.download(&self.fields[i].comp, &mut comp_host)?;
            }
            let f = &mut self.fields[i];
            for obs in &mut f.observers {
                obs.on_output(&f.name, &f.host_real, &grid, step);
                obs.on_output_fourier(&f.name, &comp_host, &grid, step);
            }
        }
        Ok(())
    }

    /// Recomputes every term of field `i` into the terms' output buffers.
    fn update_terms(&mut self, i: usize) -> Result<()> {
        let use_dealiased = self.fields[i].needs_aliasing;
        if use_dealiased {
            let mut operand_ids: Vec<usize> = self.fields[i]
                .terms
                .iter()
                .flat_map(|t| t.operands().iter().map(|id| id.0))
                .collect();
            operand_ids.sort_unstable();
            operand_ids.dedup();
            for oid in operand_ids {
                self.refresh_dealias(oid)?;
            }
        }
        let mut terms = std::mem::take(&mut self.fields[i].terms);
        let mut result = Ok(());
        for term in &mut terms {
            result = term.evaluate(&self.fields, &mut self.backend, use_dealiased);
            if result.is_err() {
                break;
            }
        }
        self.fields[i].terms = terms;
        result
    }

    /// `rhs = Σ table_t ⊙ out_t` over the field's terms.
    fn assemble_rhs(&mut self, i: usize) -> Result<()> {
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        backend.fill(&mut f.rhs, ZERO)?;
        for t in &f.terms {
            backend.mul_add(&mut f.rhs, &t.table, &t.out)?;
        }
        Ok(())
    }

    /// Refreshes a field's truncated real-space copy from its spectrum.
    fn refresh_dealias(&mut self, i: usize) -> Result<()> {
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        if let Some(d) = f.dealias.as_mut() {
            backend.copy(&f.comp, &mut d.comp)?;
            backend.pointwise_mul(&mut d.comp, &d.mask)?;
            backend.copy(&d.comp, &mut d.real)?;
            backend.fft_inverse(&mut d.real)?;
        }
        Ok(())
    }

    /// Draws a fresh unit-variance sample and weights it per mode.
    fn generate_noise(&mut self, i: usize) -> Result<()> {
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        if !(f.is_noisy && f.dynamic) {
            return Ok(());
        }
        let noise = f
            .noise
            .as_mut()
            .ok_or_else(|| QuenchError::internal("noise buffers missing; was prepare_problem run?"))?;
        backend.random_normal(&mut noise.real)?;
        backend.copy(&noise.real, &mut noise.fourier)?;
        backend.fft_forward(&mut noise.fourier)?;
        backend.pointwise_mul(&mut noise.fourier, &noise.amp_table)?;
        Ok(())
    }

    /// Algebraic redefinition for non-dynamic fields:
    /// `û = rhs / (1 − L(q))`, then back to real space.
    fn set_algebraic(&mut self, i: usize) -> Result<()> {
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        backend.copy(&f.rhs, &mut f.comp)?;
        backend.pointwise_mul(&mut f.comp, &f.propagator)?;
        backend.copy(&f.comp, &mut f.real)?;
        backend.fft_inverse(&mut f.real)
    }

    /// One integrator step for a dynamic field. The Fourier buffer is
    /// fully overwritten at the end of the step.
    fn step_field(&mut self, i: usize) -> Result<()> {
        match self.fields[i].integrator {
            Integrator::Euler => {
                self.update_terms(i)?;
                self.assemble_rhs(i)?;
                self.generate_noise(i)?;
                let (dt, dts) = (self.dt, self.dt_sqrt);
                let backend = &mut self.backend;
                let f = &mut self.fields[i];
                backend.pointwise_mul(&mut f.comp, &f.propagator)?;
                backend.axpy(dt, &f.rhs, &mut f.comp)?;
                if let Some(noise) = f.noise.as_ref() {
                    backend.axpy(dts, &noise.fourier, &mut f.comp)?;
                }
                backend.copy(&f.comp, &mut f.real)?;
                backend.fft_inverse(&mut f.real)
            }
            Integrator::Rk2 => {
                self.save_state(i)?;
                self.rk_stage(i, true, 0.5)?;
                self.rk_stage(i, false, 1.0)
            }
            Integrator::Rk4 => {
                self.save_state(i)?;
                self.update_terms(i)?;
                self.assemble_rhs(i)?;
                self.generate_noise(i)?;
                self.accumulate_slope(i, 1.0, true)?;
                self.apply_stage(i, true, 0.5)?;

                self.update_terms(i)?;
                self.assemble_rhs(i)?;
                self.generate_noise(i)?;
                self.accumulate_slope(i, 2.0, false)?;
                self.apply_stage(i, true, 0.5)?;

                self.update_terms(i)?;
                self.assemble_rhs(i)?;
                self.generate_noise(i)?;
                self.accumulate_slope(i, 2.0, false)?;
                self.apply_stage(i, false, 1.0)?;

                self.update_terms(i)?;
                self.assemble_rhs(i)?;
                self.generate_noise(i)?;
                self.accumulate_slope(i, 1.0, false)?;
                self.finish_rk4(i)
            }
        }
    }

    /// Saves the Fourier state at the start of a multi-stage step.
    fn save_state(&mut self, i: usize) -> Result<()> {
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        let scratch = f
            .scratch
            .as_mut()
            .ok_or_else(|| QuenchError::internal("step scratch missing; was prepare_problem run?"))?;
        backend.copy(&f.comp, &mut scratch.comp0)
    }

    /// Full RK stage: recompute terms and noise from the current state,
    /// then move to `P ⊙ û₀ + frac·dt·R̂ + √dt·N̂`.
    fn rk_stage(&mut self, i: usize, half: bool, frac: f64) -> Result<()> {
        self.update_terms(i)?;
        self.assemble_rhs(i)?;
        self.generate_noise(i)?;
        self.apply_stage(i, half, frac)
    }

    fn apply_stage(&mut self, i: usize, half: bool, frac: f64) -> Result<()> {
        let (dt, dts) = (self.dt, self.dt_sqrt);
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        let scratch = f
            .scratch
            .as_ref()
            .ok_or_else(|| QuenchError::internal("step scratch missing; was prepare_problem run?"))?;
        backend.copy(&scratch.comp0, &mut f.comp)?;
        let propagator = if half {
            &scratch.propagator_half
        } else {
            &f.propagator
        };
        backend.pointwise_mul(&mut f.comp, propagator)?;
        backend.axpy(frac * dt, &f.rhs, &mut f.comp)?;
        if let Some(noise) = f.noise.as_ref() {
            backend.axpy(dts, &noise.fourier, &mut f.comp)?;
        }
        backend.copy(&f.comp, &mut f.real)?;
        backend.fft_inverse(&mut f.real)
    }

    /// `kacc = rhs` (reset) or `kacc += weight·rhs`.
    fn accumulate_slope(&mut self, i: usize, weight: f64, reset: bool) -> Result<()> {
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        let scratch = f
            .scratch
            .as_mut()
            .ok_or_else(|| QuenchError::internal("step scratch missing; was prepare_problem run?"))?;
        if reset {
            backend.copy(&f.rhs, &mut scratch.kacc)
        } else {
            backend.axpy(weight, &f.rhs, &mut scratch.kacc)
        }
    }

    /// Final RK4 combine: `û = P ⊙ û₀ + (dt/6)·kacc + √dt·N̂`.
    fn finish_rk4(&mut self, i: usize) -> Result<()> {
        let (dt, dts) = (self.dt, self.dt_sqrt);
        let backend = &mut self.backend;
        let f = &mut self.fields[i];
        let scratch = f
            .scratch
            .as_ref()
            .ok_or_else(|| QuenchError::internal("step scratch missing; was prepare_problem run?"))?;
        backend.copy(&scratch.comp0, &mut f.comp)?;
        backend.pointwise_mul(&mut f.comp, &f.propagator)?;
        backend.axpy(dt / 6.0, &scratch.kacc, &mut f.comp)?;
        if let Some(noise) = f.noise.as_ref() {
            backend.axpy(dts, &noise.fourier, &mut f.comp)?;
        }
        backend.copy(&f.comp, &mut f.real)?;
        backend.fft_inverse(&mut f.real)
    }

    /// Logs a human-readable description of the model: each field's
    /// equation, integrator, noise and dealiasing settings.
    pub fn log_summary(&self) {
        if self.grid.sy == 1 && self.grid.sz == 1 {
            log::info!(
                "1-dimensional system of size N = {} (L = {}, dx = {})",
                self.grid.sx,
                self.grid.sx as f64 * self.grid.dx,
                self.grid.dx
            );
        } else {
            log::info!(
                "{}-dimensional system of size {}x{}x{}",
                self.grid.dim(),
                self.grid.sx,
                self.grid.sy,
                self.grid.sz
            );
        }
        log::info!("there are {} field(s):", self.fields.len());
        for f in &self.fields {
            log::info!("{}", self.equation_line(f));
            if f.needs_aliasing {
                log::info!(
                    "  dealiased for a nonlinearity of order {}",
                    f.aliasing_order
                );
            }
            log::info!(
                "  dynamic: {}, integrator: {:?}, {} term(s), {} implicit monomial(s)",
                f.dynamic,
                f.integrator,
                f.terms.len(),
                f.implicit.len()
            );
        }
    }

    /// Renders one field's equation: `(d/dt)u = [L]u + [...](..)` for a
    /// dynamic field, `u = [L]u + [...](..)` for a non-dynamic one. The
    /// field name follows the implicit bracket in both cases, since the
    /// implicit operator acts on the field itself.
    fn equation_line(&self, f: &Field<B>) -> String {
        let mut line = String::new();
        if f.dynamic {
            line.push_str(&format!("(d/dt){} = ", f.name));
        } else {
            line.push_str(&format!("{} = ", f.name));
        }
        if !f.implicit.is_empty() {
            line.push('[');
            for (idx, op) in f.implicit.iter().enumerate() {
                if idx > 0 {
                    line.push_str(" + ");
                }
                line.push_str(&describe_operator(op));
            }
            line.push(']');
            line.push_str(&f.name);
            line.push_str(" + ");
        }
        for (t_idx, term) in f.terms.iter().enumerate() {
            if t_idx > 0 {
                line.push_str(" + ");
            }
            line.push('[');
            for (p_idx, op) in term.prefactors().iter().enumerate() {
                if p_idx > 0 {
                    line.push_str(" + ");
                }
                line.push_str(&describe_operator(op));
            }
            line.push_str("](");
            for id in term.operands() {
                line.push(' ');
                line.push_str(&self.fields[id.0].name);
            }
            line.push_str(" )");
        }
        if f.is_noisy {
            line.push_str(&format!(
                " + [{}] x noise",
                describe_operator(&f.noise_amplitude)
            ));
        }
        line
    }
}

fn describe_operator(op: &SpectralOperator) -> String {
    let mut s = format!("({})", op.coeff);
    if op.iqx != 0 {
        s.push_str(&format!("(iqx)^({})", op.iqx));
    }
    if op.iqy != 0 {
        s.push_str(&format!("(iqy)^({})", op.iqy));
    }
    if op.q2n != 0 {
        s.push_str(&format!("(q^2)^({})", op.q2n));
    }
    if op.invq != 0 {
        s.push_str(&format!("(1/|q|)^({})", op.invq));
    }
    s
}

/// Uploads a field's initial condition and builds every table it needs.
fn prepare_field<B: SpectralBackend>(
    backend: &mut B,
    grid: &Grid,
    dt: f64,
    f: &mut Field<B>,
) -> Result<()> {
    let n = grid.len();

    backend.upload(&f.host_real, &mut f.real)?;
    backend.copy(&f.real, &mut f.comp)?;
    backend.fft_forward(&mut f.comp)?;

    let mask_host = if f.needs_aliasing {
        Some(dealias::build_mask(grid, f.aliasing_order))
    } else {
        None
    };

    if let Some(mask_host) = &mask_host {
        if f.dealias.is_none() {
            let mut mask = backend.alloc(n)?;
            backend.upload(mask_host, &mut mask)?;
            f.dealias = Some(DealiasState {
                mask,
                comp: backend.alloc(n)?,
                real: backend.alloc(n)?,
            });
        }
    }

    if f.is_noisy && f.dynamic && f.noise.is_none() {
        let amp_host = operator::build_table(std::slice::from_ref(&f.noise_amplitude), grid);
        let mut amp_table = backend.alloc(n)?;
        backend.upload(&amp_host, &mut amp_table)?;
        f.noise = Some(NoiseState {
            real: backend.alloc(n)?,
            fourier: backend.alloc(n)?,
            amp_table,
        });
    }

    if f.dynamic && f.scratch.is_none() {
        f.scratch = Some(StepScratch {
            comp0: backend.alloc(n)?,
            kacc: backend.alloc(n)?,
            propagator_half: backend.alloc(n)?,
        });
    }

    for term in &mut f.terms {
        let mut table = operator::build_table(term.prefactors(), grid);
        if let Some(mask_host) = &mask_host {
            for (t, m) in table.iter_mut().zip(mask_host.iter()) {
                *t *= m;
            }
        }
        backend.upload(&table, &mut term.table)?;
    }

    build_propagators(backend, grid, dt, f)
}

/// Converts the implicit operator list and the timestep into per-mode
/// propagator tables: `1/(1 − dt·L(q))` for dynamic fields (plus the
/// half-step variant for multi-stage integrators), `1/(1 − L(q))` for
/// non-dynamic fields. Rerun whenever `dt` changes.
fn build_propagators<B: SpectralBackend>(
    backend: &mut B,
    grid: &Grid,
    dt: f64,
    f: &mut Field<B>,
) -> Result<()> {
    let ell = operator::build_table(&f.implicit, grid);
    let effective_dt = if f.dynamic { dt } else { 1.0 };
    let full: Vec<Complex64> = ell.iter().map(|l| ONE / (ONE - effective_dt * l)).collect();
    check_finite(&full, &f.name)?;
    backend.upload(&full, &mut f.propagator)?;

    if f.dynamic {
        if let Some(scratch) = f.scratch.as_mut() {
            let half: Vec<Complex64> = ell.iter().map(|l| ONE / (ONE - 0.5 * dt * l)).collect();
            check_finite(&half, &f.name)?;
            backend.upload(&half, &mut scratch.propagator_half)?;
        }
    }
    Ok(())
}

fn check_finite(table: &[Complex64], name: &str) -> Result<()> {
    if table.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
        return Err(QuenchError::numerical(format!(
            "implicit propagator for '{}' is singular at some mode (1 - dt·L(q) = 0)",
            name
        )));
    }
    Ok(())
}
