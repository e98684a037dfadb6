//! Output-epoch observers.
//!
//! Registered per field, invoked after device state has been copied back
//! to the host at an output epoch. Replaces raw callback function
//! pointers with a small capability trait.

use num_complex::Complex64;

use crate::grid::Grid;

/// A hook fired with a field's freshly-downloaded state at each output
/// epoch.
pub trait Observer {
    /// Called with the field's real-space buffer (imaginary parts are
    /// transform residue and should be ignored), the grid, and the step
    /// index.
    fn on_output(&mut self, name: &str, real: &[Complex64], grid: &Grid, step: usize);

    /// Fourier-side hook; default does nothing.
    fn on_output_fourier(&mut self, _name: &str, _comp: &[Complex64], _grid: &Grid, _step: usize) {}
}

impl<F> Observer for F
where
    F: FnMut(&str, &[Complex64], &Grid, usize),
{
    fn on_output(&mut self, name: &str, real: &[Complex64], grid: &Grid, step: usize) {
        self(name, real, grid, step)
    }
}
