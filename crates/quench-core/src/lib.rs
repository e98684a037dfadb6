//! # quench-core
//!
//! Pseudo-spectral stochastic PDE engine: fields on a periodic rectangular
//! grid, evolved by semi-implicit (IMEX) integrators with the linear part
//! solved exactly per Fourier mode and nonlinear products formed in real
//! space.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Evolver    │  ← owns the grid, timestep and field arena
//! └──────┬───────┘
//!        │ drives
//! ┌──────▼───────┐      ┌──────────────────┐
//! │   Field      │──────│ Term / Operator  │
//! └──────┬───────┘      └──────────────────┘
//!        │ buffers + FFTs through
//! ┌──────▼─────────────┐
//! │  SpectralBackend   │  ← CpuBackend here; CUDA in quench-gpu
//! └────────────────────┘
//! ```
//!
//! A model is declared by creating fields, attaching implicit operators
//! and nonlinear terms, then calling [`Evolver::prepare_problem`] once and
//! [`Evolver::advance_time`] in a loop.

pub mod backend;
pub mod cpu;
pub mod dealias;
pub mod errors;
pub mod evolver;
pub mod field;
pub mod grid;
pub mod observer;
pub mod operator;
pub mod output;
pub mod term;

// Re-export commonly used items
pub use backend::SpectralBackend;
pub use cpu::CpuBackend;
pub use errors::{QuenchError, Result};
pub use evolver::{Evolver, BLOWUP_EXIT_CODE};
pub use field::{Field, FieldId, Integrator};
pub use grid::Grid;
pub use observer::Observer;
pub use operator::SpectralOperator;
pub use term::Term;
