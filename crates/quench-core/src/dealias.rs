//! Dealiasing masks.
//!
//! Evaluating a degree-`p` product on a finite grid folds energy from
//! wavenumbers above the Nyquist limit back into resolved modes. The
//! standard truncation rule keeps only modes whose per-axis index
//! magnitude is within `2/(p+1)` of Nyquist (the 2/3 rule for quadratic
//! nonlinearities). The mask is a per-mode 0/1 table applied elementwise
//! by the backend; applying it twice is the same as applying it once.

use num_complex::Complex64;

use crate::grid::Grid;

/// Fraction of the Nyquist index retained for a nonlinearity of order `p`.
pub fn cutoff_fraction(order: u32) -> f64 {
    2.0 / (order as f64 + 1.0)
}

/// Builds the truncation mask for a nonlinearity of order `order`.
///
/// An axis of size 1 carries no resolved wavenumbers and is never masked.
pub fn build_mask(grid: &Grid, order: u32) -> Vec<Complex64> {
    let frac = cutoff_fraction(order.max(1));
    let keep = |idx: usize, n: usize| -> bool {
        if n == 1 {
            return true;
        }
        let signed = if idx <= n / 2 {
            idx as f64
        } else {
            idx as f64 - n as f64
        };
        signed.abs() <= frac * (n as f64 / 2.0)
    };

    let mut mask = Vec::with_capacity(grid.len());
    for (i, j, k) in grid.coords() {
        let kept = keep(i, grid.sx) && keep(j, grid.sy) && keep(k, grid.sz);
        mask.push(Complex64::new(if kept { 1.0 } else { 0.0 }, 0.0));
    }
    mask
}
