//! Periodic grid geometry shared by every field of an evolver.
//!
//! Real-space cells are `dx × dy × dz`; the conjugate Fourier grid has
//! wavenumber steps `2π/(N·d)` per axis. Linear storage is x-fastest:
//! `index = (k·sy + j)·sx + i`.

use std::f64::consts::PI;

use crate::errors::{QuenchError, Result};

/// Immutable grid geometry. `sy == 1` (and `sz == 1`) collapse the
/// corresponding axis, so the same code drives 1-D, 2-D and 3-D runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub sx: usize,
    pub sy: usize,
    pub sz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Grid {
    /// One-dimensional grid of `sx` cells of size `dx`.
    pub fn new_1d(sx: usize, dx: f64) -> Result<Self> {
        Self::new_3d(sx, 1, 1, dx, 1.0, 1.0)
    }

    /// Two-dimensional `sx × sy` grid.
    pub fn new_2d(sx: usize, sy: usize, dx: f64, dy: f64) -> Result<Self> {
        Self::new_3d(sx, sy, 1, dx, dy, 1.0)
    }

    /// Three-dimensional `sx × sy × sz` grid.
    pub fn new_3d(sx: usize, sy: usize, sz: usize, dx: f64, dy: f64, dz: f64) -> Result<Self> {
        if sx == 0 || sy == 0 || sz == 0 {
            return Err(QuenchError::config(format!(
                "grid sizes must be >= 1, got {}x{}x{}",
                sx, sy, sz
            )));
        }
        if dx <= 0.0 || dy <= 0.0 || dz <= 0.0 {
            return Err(QuenchError::config(format!(
                "grid spacings must be > 0, got {}x{}x{}",
                dx, dy, dz
            )));
        }
        Ok(Grid { sx, sy, sz, dx, dy, dz })
    }

    /// Total number of grid points (= number of Fourier modes).
    pub fn len(&self) -> usize {
        self.sx * self.sy * self.sz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-collapsed axes.
    pub fn dim(&self) -> usize {
        1 + usize::from(self.sy > 1) + usize::from(self.sz > 1)
    }

    /// Fourier wavenumber step along x: `2π/(sx·dx)`.
    pub fn step_qx(&self) -> f64 {
        2.0 * PI / (self.sx as f64 * self.dx)
    }

    /// Fourier wavenumber step along y.
    pub fn step_qy(&self) -> f64 {
        2.0 * PI / (self.sy as f64 * self.dy)
    }

    /// Fourier wavenumber step along z.
    pub fn step_qz(&self) -> f64 {
        2.0 * PI / (self.sz as f64 * self.dz)
    }

    /// Linear index of the point `(i, j, k)`.
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.sy + j) * self.sx + i
    }

    /// Signed wavevector of the mode at integer coordinates `(i, j, k)`.
    ///
    /// Indices above `N/2` wrap to negative wavenumbers, matching the
    /// layout produced by an unshifted FFT.
    pub fn wavevector(&self, i: usize, j: usize, k: usize) -> (f64, f64, f64) {
        (
            Self::signed_mode(i, self.sx) * self.step_qx(),
            Self::signed_mode(j, self.sy) * self.step_qy(),
            Self::signed_mode(k, self.sz) * self.step_qz(),
        )
    }

    fn signed_mode(idx: usize, n: usize) -> f64 {
        if idx <= n / 2 {
            idx as f64
        } else {
            idx as f64 - n as f64
        }
    }

    /// Iterate all mode coordinates `(i, j, k)` in storage order.
    pub fn coords(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let (sx, sy, sz) = (self.sx, self.sy, self.sz);
        (0..sz).flat_map(move |k| (0..sy).flat_map(move |j| (0..sx).map(move |i| (i, j, k))))
    }
}
