//! Spectral-operator algebra.
//!
//! A [`SpectralOperator`] is one monomial in the Fourier wavevector:
//!
//! ```text
//! coeff · (i·qx)^iqx · (i·qy)^iqy · (|q|²)^q2n · (1/|q|)^invq
//! ```
//!
//! A `&[SpectralOperator]` combines by summation and represents a general
//! linear differential operator (a field's implicit part) or a multi-part
//! prefactor of a nonlinear term. Evaluation is pure; per-mode tables are
//! precomputed once with [`build_table`] and applied elementwise by the
//! compute backend.

use num_complex::Complex64;

use crate::grid::Grid;

/// A monomial coefficient function of the Fourier wavevector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralOperator {
    /// Scalar coefficient.
    pub coeff: f64,
    /// Exponent of `(i·qx)`.
    pub iqx: i32,
    /// Exponent of `(i·qy)`.
    pub iqy: i32,
    /// Exponent of `(|q|²)`.
    pub q2n: i32,
    /// Exponent of `(1/|q|)`.
    pub invq: i32,
}

impl SpectralOperator {
    /// Pure coefficient, no wavevector dependence.
    pub const fn constant(coeff: f64) -> Self {
        SpectralOperator { coeff, iqx: 0, iqy: 0, q2n: 0, invq: 0 }
    }

    /// `coeff · (|q|²)^n`, the n-th Laplacian power up to sign.
    pub const fn laplacian_power(coeff: f64, n: i32) -> Self {
        SpectralOperator { coeff, iqx: 0, iqy: 0, q2n: n, invq: 0 }
    }

    /// `coeff · (i·qx)^n`, an x-gradient power.
    pub const fn grad_x(coeff: f64, n: i32) -> Self {
        SpectralOperator { coeff, iqx: n, iqy: 0, q2n: 0, invq: 0 }
    }

    /// `coeff · (i·qy)^n`, a y-gradient power.
    pub const fn grad_y(coeff: f64, n: i32) -> Self {
        SpectralOperator { coeff, iqx: 0, iqy: n, q2n: 0, invq: 0 }
    }

    /// `coeff · (1/|q|)^n`.
    pub const fn inv_q(coeff: f64, n: i32) -> Self {
        SpectralOperator { coeff, iqx: 0, iqy: 0, q2n: 0, invq: n }
    }

    /// Evaluates the monomial at the wavevector `(qx, qy, qz)`.
    ///
    /// At the zero wavevector any `|q|`-dependent factor that would divide
    /// by zero makes the whole monomial vanish instead: operators carrying
    /// inverse powers of `|q|` are projections that exclude the uniform
    /// mode. An exponent of zero means the factor is absent entirely, so a
    /// pure coefficient survives at `q = 0`.
    pub fn evaluate(&self, qx: f64, qy: f64, qz: f64) -> Complex64 {
        let q2 = qx * qx + qy * qy + qz * qz;
        if q2 == 0.0 && (self.invq != 0 || self.q2n < 0) {
            return Complex64::new(0.0, 0.0);
        }
        let mut value = Complex64::new(self.coeff, 0.0);
        if self.iqx != 0 {
            value *= Complex64::new(0.0, qx).powi(self.iqx);
        }
        if self.iqy != 0 {
            value *= Complex64::new(0.0, qy).powi(self.iqy);
        }
        if self.q2n != 0 {
            value *= q2.powi(self.q2n);
        }
        if self.invq != 0 {
            // (1/|q|)^invq = q2^(-invq/2)
            value *= q2.powf(-0.5 * self.invq as f64);
        }
        value
    }
}

/// Sum of a list of monomials at one wavevector.
pub fn evaluate_sum(ops: &[SpectralOperator], qx: f64, qy: f64, qz: f64) -> Complex64 {
    ops.iter()
        .map(|op| op.evaluate(qx, qy, qz))
        .fold(Complex64::new(0.0, 0.0), |acc, v| acc + v)
}

/// Per-mode table of the summed operator over the whole grid, in the
/// grid's storage order.
pub fn build_table(ops: &[SpectralOperator], grid: &Grid) -> Vec<Complex64> {
    let mut table = Vec::with_capacity(grid.len());
    for (i, j, k) in grid.coords() {
        let (qx, qy, qz) = grid.wavevector(i, j, k);
        table.push(evaluate_sum(ops, qx, qy, qz));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_survives_zero_mode() {
        let op = SpectralOperator::constant(2.5);
        assert_eq!(op.evaluate(0.0, 0.0, 0.0), Complex64::new(2.5, 0.0));
        assert_eq!(op.evaluate(1.0, -2.0, 0.5), Complex64::new(2.5, 0.0));
    }

    #[test]
    fn gradient_powers_match_closed_form() {
        // (i·qx)^1 at qx = 3 is 3i.
        let op = SpectralOperator::grad_x(1.0, 1);
        let v = op.evaluate(3.0, 0.0, 0.0);
        assert!((v - Complex64::new(0.0, 3.0)).norm() < 1e-14);

        // (i·qx)^2 = -qx².
        let op = SpectralOperator::grad_x(1.0, 2);
        let v = op.evaluate(3.0, 0.0, 0.0);
        assert!((v - Complex64::new(-9.0, 0.0)).norm() < 1e-14);

        // Mixed: -2 (i·qx)(i·qy) = 2 qx qy.
        let op = SpectralOperator { coeff: -2.0, iqx: 1, iqy: 1, q2n: 0, invq: 0 };
        let v = op.evaluate(2.0, 5.0, 0.0);
        assert!((v - Complex64::new(20.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn laplacian_power_is_real() {
        let op = SpectralOperator::laplacian_power(-1.0, 2);
        let v = op.evaluate(1.0, 2.0, 2.0); // |q|² = 9
        assert!((v - Complex64::new(-81.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn inverse_q_vanishes_at_zero_mode() {
        let proj = SpectralOperator::inv_q(1.0, 2);
        assert_eq!(proj.evaluate(0.0, 0.0, 0.0), Complex64::new(0.0, 0.0));
        // |q| = 2 → (1/|q|)² = 0.25
        let v = proj.evaluate(2.0, 0.0, 0.0);
        assert!((v - Complex64::new(0.25, 0.0)).norm() < 1e-14);

        // Negative exponent is a positive power of |q|: also zero at q = 0.
        let amp = SpectralOperator::inv_q(1.0, -1);
        assert_eq!(amp.evaluate(0.0, 0.0, 0.0), Complex64::new(0.0, 0.0));
        let v = amp.evaluate(0.0, 3.0, 4.0);
        assert!((v - Complex64::new(5.0, 0.0)).norm() < 1e-12);

        // Inverse Laplacian guards the same way.
        let invlap = SpectralOperator::laplacian_power(1.0, -1);
        assert_eq!(invlap.evaluate(0.0, 0.0, 0.0), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn sums_combine_by_addition() {
        let ops = [
            SpectralOperator::constant(1.0),
            SpectralOperator::laplacian_power(-0.5, 1),
        ];
        let v = evaluate_sum(&ops, 2.0, 0.0, 0.0);
        assert!((v - Complex64::new(1.0 - 2.0, 0.0)).norm() < 1e-14);
    }

    #[test]
    fn table_covers_grid_in_order() {
        let grid = Grid::new_1d(4, 1.0).unwrap();
        let ops = [SpectralOperator::laplacian_power(1.0, 1)];
        let table = build_table(&ops, &grid);
        assert_eq!(table.len(), 4);
        let dq = grid.step_qx();
        assert!((table[0].re - 0.0).abs() < 1e-14);
        assert!((table[1].re - dq * dq).abs() < 1e-12);
        assert!((table[2].re - 4.0 * dq * dq).abs() < 1e-12);
        // index 3 wraps to -dq
        assert!((table[3].re - dq * dq).abs() < 1e-12);
    }
}
