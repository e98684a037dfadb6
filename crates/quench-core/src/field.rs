//! Fields: the central stateful entities of a simulation.
//!
//! A field owns its real- and Fourier-space buffers (backend-resident,
//! with a host mirror synced at load and output epochs), its nonlinear
//! terms, its implicit operator list and the propagator tables derived
//! from it, plus optional noise and dealiasing state. Fields are created
//! and stored by the [`Evolver`](crate::evolver::Evolver); everything
//! else refers to them through [`FieldId`] handles.

use num_complex::Complex64;

use crate::backend::SpectralBackend;
use crate::errors::Result;
use crate::grid::Grid;
use crate::observer::Observer;
use crate::operator::SpectralOperator;
use crate::term::Term;

/// Handle into the evolver's field arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub(crate) usize);

impl FieldId {
    /// Position in field-insertion order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Time-integration scheme, selected per dynamic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integrator {
    /// Semi-implicit explicit Euler.
    #[default]
    Euler,
    /// Two-stage IMEX midpoint Runge–Kutta.
    Rk2,
    /// Four-stage IMEX Runge–Kutta with classic 1/6 weights.
    Rk4,
}

pub(crate) struct NoiseState<B: SpectralBackend> {
    /// Fresh unit-variance real Gaussian samples.
    pub real: B::Buf,
    /// Transform of `real`, weighted by the amplitude table.
    pub fourier: B::Buf,
    /// Noise-amplitude operator evaluated per mode.
    pub amp_table: B::Buf,
}

pub(crate) struct DealiasState<B: SpectralBackend> {
    /// 0/1 truncation mask for this field's `aliasing_order`.
    pub mask: B::Buf,
    /// Truncated spectrum scratch.
    pub comp: B::Buf,
    /// Real-space image of the truncated spectrum, read by products.
    pub real: B::Buf,
}

/// Per-step scratch for multi-stage integrators and saved state.
pub(crate) struct StepScratch<B: SpectralBackend> {
    /// Fourier state at the start of the step.
    pub comp0: B::Buf,
    /// Weighted Runge–Kutta slope accumulator.
    pub kacc: B::Buf,
    /// `1/(1 − (dt/2)·L(q))`, for intermediate stages.
    pub propagator_half: B::Buf,
}

/// A named field on the evolver's grid.
pub struct Field<B: SpectralBackend> {
    pub name: String,
    /// Integrates a time derivative when true; redefined algebraically
    /// from its terms every step when false.
    pub dynamic: bool,
    pub integrator: Integrator,
    /// Written to disk at output epochs.
    pub output_to_file: bool,
    /// Adds spectrally-weighted Gaussian forcing each stage (dynamic
    /// fields only).
    pub is_noisy: bool,
    /// Amplitude operator for the stochastic forcing, evaluated per mode.
    pub noise_amplitude: SpectralOperator,
    /// Truncate aliased modes when evaluating this field's products.
    pub needs_aliasing: bool,
    /// Highest nonlinearity order among terms targeting this field.
    pub aliasing_order: u32,
    /// Linear/implicit operator, treated through precomputed propagators.
    pub implicit: Vec<SpectralOperator>,

    pub(crate) grid: Grid,
    pub(crate) terms: Vec<Term<B>>,
    pub(crate) observers: Vec<Box<dyn Observer>>,

    /// Host mirror of the real-space state; authoritative only right
    /// after construction (initial condition) and at output epochs.
    pub(crate) host_real: Vec<Complex64>,

    pub(crate) real: B::Buf,
    pub(crate) comp: B::Buf,
    /// Sum of term outputs for the current stage.
    pub(crate) rhs: B::Buf,
    /// `1/(1 − dt·L(q))` (dynamic) or `1/(1 − L(q))` (non-dynamic).
    pub(crate) propagator: B::Buf,

    pub(crate) noise: Option<NoiseState<B>>,
    pub(crate) dealias: Option<DealiasState<B>>,
    pub(crate) scratch: Option<StepScratch<B>>,
}

impl<B: SpectralBackend> Field<B> {
    pub(crate) fn new(backend: &mut B, grid: Grid, name: String, dynamic: bool) -> Result<Self> {
        let n = grid.len();
        Ok(Field {
            name,
            dynamic,
            integrator: Integrator::Euler,
            output_to_file: false,
            is_noisy: false,
            noise_amplitude: SpectralOperator::constant(0.0),
            needs_aliasing: false,
            aliasing_order: 1,
            implicit: Vec::new(),
            grid,
            terms: Vec::new(),
            observers: Vec::new(),
            host_real: vec![Complex64::new(0.0, 0.0); n],
            real: backend.alloc(n)?,
            comp: backend.alloc(n)?,
            rhs: backend.alloc(n)?,
            propagator: backend.alloc(n)?,
            noise: None,
            dealias: None,
            scratch: None,
        })
    }

    /// Sets the initial condition from a function of grid coordinates.
    ///
    /// Takes effect on the next `prepare_problem`, which uploads the host
    /// state and transforms it.
    pub fn set_initial<F>(&mut self, f: F)
    where
        F: Fn(usize, usize, usize) -> f64,
    {
        for (i, j, k) in self.grid.coords() {
            self.host_real[self.grid.index(i, j, k)] = Complex64::new(f(i, j, k), 0.0);
        }
    }

    /// Uniform initial condition.
    pub fn set_uniform(&mut self, value: f64) {
        self.set_initial(|_, _, _| value);
    }

    /// Host-side view of the real-space state. Stale between output
    /// epochs unless the caller synchronizes through the evolver.
    pub fn host_real(&self) -> &[Complex64] {
        &self.host_real
    }

    /// Mutable host-side state, for loading arbitrary initial data.
    pub fn host_real_mut(&mut self) -> &mut [Complex64] {
        &mut self.host_real
    }

    /// Registers an output observer fired at every output epoch.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Adds one monomial to the implicit operator list.
    pub fn add_implicit(&mut self, op: SpectralOperator) {
        self.implicit.push(op);
    }

    /// Enables stochastic forcing with the given amplitude operator.
    pub fn set_noisy(&mut self, amplitude: SpectralOperator) {
        self.is_noisy = true;
        self.noise_amplitude = amplitude;
    }

    /// Terms targeting this field.
    pub fn terms(&self) -> &[Term<B>] {
        &self.terms
    }

    /// The buffer product evaluation should read for this field.
    pub(crate) fn real_for_products(&self, use_dealiased: bool) -> &B::Buf {
        match (use_dealiased, &self.dealias) {
            (true, Some(d)) => &d.real,
            _ => &self.real,
        }
    }

    /// Marks this field as requiring dealiasing at order `order` or its
    /// current order, whichever is higher.
    pub(crate) fn flag_aliasing(&mut self, order: u32) {
        if order >= 2 {
            self.needs_aliasing = true;
            self.aliasing_order = self.aliasing_order.max(order);
        }
    }
}
