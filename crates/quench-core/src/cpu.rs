//! Host compute backend: rustfft transforms, sequential elementwise loops,
//! and a seedable `StdRng` Gaussian source.

use std::sync::Arc;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rustfft::{Fft, FftPlanner};

use crate::backend::SpectralBackend;
use crate::errors::{QuenchError, Result};
use crate::grid::Grid;

struct AxisPlan {
    axis: usize,
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

/// CPU implementation of [`SpectralBackend`].
///
/// Multi-dimensional transforms are composed from 1-D plans applied along
/// each non-collapsed axis; off-axis lines are gathered into a contiguous
/// scratch line, transformed, and scattered back.
pub struct CpuBackend {
    grid: Grid,
    axes: Vec<AxisPlan>,
    line: Vec<Complex64>,
    scratch: Vec<Complex64>,
    rng: StdRng,
}

impl CpuBackend {
    /// Backend seeded from OS entropy.
    pub fn new(grid: Grid) -> Self {
        Self::build(grid, StdRng::from_entropy())
    }

    /// Backend with a fixed noise seed, for reproducible runs and tests.
    pub fn with_seed(grid: Grid, seed: u64) -> Self {
        Self::build(grid, StdRng::seed_from_u64(seed))
    }

    fn build(grid: Grid, rng: StdRng) -> Self {
        let mut planner = FftPlanner::new();
        let mut axes = Vec::new();
        for (axis, len) in [(0, grid.sx), (1, grid.sy), (2, grid.sz)] {
            if len > 1 {
                axes.push(AxisPlan {
                    axis,
                    len,
                    forward: planner.plan_fft_forward(len),
                    inverse: planner.plan_fft_inverse(len),
                });
            }
        }
        let max_line = axes.iter().map(|a| a.len).max().unwrap_or(1);
        let max_scratch = axes
            .iter()
            .map(|a| {
                a.forward
                    .get_inplace_scratch_len()
                    .max(a.inverse.get_inplace_scratch_len())
            })
            .max()
            .unwrap_or(0);
        CpuBackend {
            grid,
            axes,
            line: vec![Complex64::new(0.0, 0.0); max_line],
            scratch: vec![Complex64::new(0.0, 0.0); max_scratch],
            rng,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn check_grid_len(&self, buf: &[Complex64], context: &str) -> Result<()> {
        if buf.len() != self.grid.len() {
            return Err(QuenchError::backend(
                context,
                format!("buffer length {} != grid length {}", buf.len(), self.grid.len()),
            ));
        }
        Ok(())
    }

    fn transform(&mut self, buf: &mut [Complex64], forward: bool) -> Result<()> {
        self.check_grid_len(buf, if forward { "fft_forward" } else { "fft_inverse" })?;
        let Grid { sx, sy, sz, .. } = self.grid;
        for plan in &self.axes {
            let fft = if forward { &plan.forward } else { &plan.inverse };
            match plan.axis {
                0 => {
                    for line in buf.chunks_exact_mut(sx) {
                        fft.process_with_scratch(line, &mut self.scratch);
                    }
                }
                1 => {
                    for k in 0..sz {
                        for i in 0..sx {
                            let base = k * sy * sx + i;
                            for j in 0..sy {
                                self.line[j] = buf[base + j * sx];
                            }
                            fft.process_with_scratch(&mut self.line[..sy], &mut self.scratch);
                            for j in 0..sy {
                                buf[base + j * sx] = self.line[j];
                            }
                        }
                    }
                }
                _ => {
                    let plane = sx * sy;
                    for j in 0..sy {
                        for i in 0..sx {
                            let base = j * sx + i;
                            for k in 0..sz {
                                self.line[k] = buf[base + k * plane];
                            }
                            fft.process_with_scratch(&mut self.line[..sz], &mut self.scratch);
                            for k in 0..sz {
                                buf[base + k * plane] = self.line[k];
                            }
                        }
                    }
                }
            }
        }
        if !forward {
            let norm = 1.0 / self.grid.len() as f64;
            for v in buf.iter_mut() {
                *v *= norm;
            }
        }
        Ok(())
    }
}

fn check_same_len(a: &[Complex64], b: &[Complex64], context: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(QuenchError::backend(
            context,
            format!("buffer lengths differ: {} vs {}", a.len(), b.len()),
        ));
    }
    Ok(())
}

impl SpectralBackend for CpuBackend {
    type Buf = Vec<Complex64>;

    fn alloc(&mut self, len: usize) -> Result<Self::Buf> {
        Ok(vec![Complex64::new(0.0, 0.0); len])
    }

    fn upload(&mut self, host: &[Complex64], dev: &mut Self::Buf) -> Result<()> {
        check_same_len(host, dev, "upload")?;
        dev.copy_from_slice(host);
        Ok(())
    }

    fn download(&mut self, dev: &Self::Buf, host: &mut [Complex64]) -> Result<()> {
        check_same_len(dev, host, "download")?;
        host.copy_from_slice(dev);
        Ok(())
    }

    fn copy(&mut self, src: &Self::Buf, dst: &mut Self::Buf) -> Result<()> {
        check_same_len(src, dst, "copy")?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn fill(&mut self, buf: &mut Self::Buf, value: Complex64) -> Result<()> {
        for v in buf.iter_mut() {
            *v = value;
        }
        Ok(())
    }

    fn fft_forward(&mut self, buf: &mut Self::Buf) -> Result<()> {
        self.transform(buf, true)
    }

    fn fft_inverse(&mut self, buf: &mut Self::Buf) -> Result<()> {
        self.transform(buf, false)
    }

    fn pointwise_mul(&mut self, acc: &mut Self::Buf, src: &Self::Buf) -> Result<()> {
        check_same_len(acc, src, "pointwise_mul")?;
        for (a, s) in acc.iter_mut().zip(src.iter()) {
            *a *= s;
        }
        Ok(())
    }

    fn mul_add(&mut self, acc: &mut Self::Buf, table: &Self::Buf, src: &Self::Buf) -> Result<()> {
        check_same_len(acc, table, "mul_add")?;
        check_same_len(acc, src, "mul_add")?;
        for ((a, t), s) in acc.iter_mut().zip(table.iter()).zip(src.iter()) {
            *a += t * s;
        }
        Ok(())
    }

    fn axpy(&mut self, alpha: f64, x: &Self::Buf, y: &mut Self::Buf) -> Result<()> {
        check_same_len(x, y, "axpy")?;
        for (yi, xi) in y.iter_mut().zip(x.iter()) {
            *yi += alpha * xi;
        }
        Ok(())
    }

    fn scale(&mut self, buf: &mut Self::Buf, alpha: f64) -> Result<()> {
        for v in buf.iter_mut() {
            *v *= alpha;
        }
        Ok(())
    }

    fn random_normal(&mut self, buf: &mut Self::Buf) -> Result<()> {
        for v in buf.iter_mut() {
            let sample: f64 = self.rng.sample(StandardNormal);
            *v = Complex64::new(sample, 0.0);
        }
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_err(a: &[Complex64], b: &[Complex64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn forward_of_constant_is_a_zero_mode_spike() {
        let grid = Grid::new_1d(8, 1.0).unwrap();
        let mut be = CpuBackend::with_seed(grid, 1);
        let mut buf = be.alloc(8).unwrap();
        be.fill(&mut buf, Complex64::new(3.0, 0.0)).unwrap();
        be.fft_forward(&mut buf).unwrap();
        assert!((buf[0] - Complex64::new(24.0, 0.0)).norm() < 1e-12);
        for v in &buf[1..] {
            assert!(v.norm() < 1e-12);
        }
    }

    #[test]
    fn round_trip_is_identity_2d() {
        let grid = Grid::new_2d(8, 4, 1.0, 0.5).unwrap();
        let mut be = CpuBackend::with_seed(grid, 7);
        let mut buf = be.alloc(grid.len()).unwrap();
        be.random_normal(&mut buf).unwrap();
        let original = buf.clone();
        be.fft_forward(&mut buf).unwrap();
        be.fft_inverse(&mut buf).unwrap();
        assert!(max_err(&buf, &original) < 1e-12);
    }

    #[test]
    fn round_trip_is_identity_3d() {
        let grid = Grid::new_3d(4, 6, 2, 1.0, 1.0, 2.0).unwrap();
        let mut be = CpuBackend::with_seed(grid, 11);
        let mut buf = be.alloc(grid.len()).unwrap();
        be.random_normal(&mut buf).unwrap();
        let original = buf.clone();
        be.fft_forward(&mut buf).unwrap();
        be.fft_inverse(&mut buf).unwrap();
        assert!(max_err(&buf, &original) < 1e-12);
    }

    #[test]
    fn plane_wave_lands_on_its_mode() {
        let grid = Grid::new_1d(16, 1.0).unwrap();
        let mut be = CpuBackend::with_seed(grid, 3);
        let mut buf = be.alloc(16).unwrap();
        let host: Vec<Complex64> = (0..16)
            .map(|i| {
                let x = 2.0 * std::f64::consts::PI * 3.0 * i as f64 / 16.0;
                Complex64::new(x.cos(), 0.0)
            })
            .collect();
        be.upload(&host, &mut buf).unwrap();
        be.fft_forward(&mut buf).unwrap();
        // cos(3·2πx/L) splits between modes 3 and 13, each N/2.
        assert!((buf[3] - Complex64::new(8.0, 0.0)).norm() < 1e-10);
        assert!((buf[13] - Complex64::new(8.0, 0.0)).norm() < 1e-10);
        for (i, v) in buf.iter().enumerate() {
            if i != 3 && i != 13 {
                assert!(v.norm() < 1e-10, "mode {} = {}", i, v);
            }
        }
    }

    #[test]
    fn elementwise_ops() {
        let grid = Grid::new_1d(4, 1.0).unwrap();
        let mut be = CpuBackend::with_seed(grid, 5);
        let mut acc = vec![Complex64::new(1.0, 0.0); 4];
        let table = vec![Complex64::new(0.0, 1.0); 4];
        let src = vec![Complex64::new(2.0, 0.0); 4];
        be.mul_add(&mut acc, &table, &src).unwrap();
        assert!((acc[0] - Complex64::new(1.0, 2.0)).norm() < 1e-14);
        be.axpy(-0.5, &src, &mut acc).unwrap();
        assert!((acc[1] - Complex64::new(0.0, 2.0)).norm() < 1e-14);
        be.scale(&mut acc, 2.0).unwrap();
        assert!((acc[2] - Complex64::new(0.0, 4.0)).norm() < 1e-14);
        be.pointwise_mul(&mut acc, &table).unwrap();
        assert!((acc[3] - Complex64::new(-4.0, 0.0)).norm() < 1e-14);
    }

    #[test]
    fn length_mismatch_is_a_backend_error() {
        let grid = Grid::new_1d(4, 1.0).unwrap();
        let mut be = CpuBackend::with_seed(grid, 5);
        let mut a = vec![Complex64::new(0.0, 0.0); 4];
        let b = vec![Complex64::new(0.0, 0.0); 5];
        assert!(be.axpy(1.0, &b, &mut a).is_err());
        let mut short = vec![Complex64::new(0.0, 0.0); 3];
        assert!(be.fft_forward(&mut short).is_err());
    }

    #[test]
    fn gaussian_samples_have_unit_variance() {
        let grid = Grid::new_1d(8192, 1.0).unwrap();
        let mut be = CpuBackend::with_seed(grid, 42);
        let mut buf = be.alloc(8192).unwrap();
        be.random_normal(&mut buf).unwrap();
        let n = buf.len() as f64;
        let mean: f64 = buf.iter().map(|v| v.re).sum::<f64>() / n;
        let var: f64 = buf.iter().map(|v| (v.re - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.08, "var {}", var);
        assert!(buf.iter().all(|v| v.im == 0.0));
    }
}
