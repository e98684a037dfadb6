//! Nonlinear terms.
//!
//! A [`Term`] is one contribution to a field's explicit right-hand side:
//! the pointwise real-space product of its operand fields, transformed to
//! Fourier space, then weighted by the summed prefactor table. Operands
//! are arena handles into the evolver's field collection; a term never
//! owns or mutates the fields it reads.

use num_complex::Complex64;

use crate::backend::SpectralBackend;
use crate::errors::Result;
use crate::field::{Field, FieldId};
use crate::operator::SpectralOperator;

/// One weighted product of fields, owned by its target field.
pub struct Term<B: SpectralBackend> {
    /// Factors of the real-space product, in evaluation order.
    pub(crate) operands: Vec<FieldId>,
    /// Prefactor monomials, summed per mode into `table` at prepare time.
    pub(crate) prefactors: Vec<SpectralOperator>,
    /// Per-mode prefactor sum; folds in the target's dealias mask.
    pub(crate) table: B::Buf,
    /// Fourier transform of the operand product (this step's value).
    pub(crate) out: B::Buf,
}

impl<B: SpectralBackend> Term<B> {
    pub(crate) fn new(
        backend: &mut B,
        len: usize,
        operands: Vec<FieldId>,
        prefactors: Vec<SpectralOperator>,
    ) -> Result<Self> {
        Ok(Term {
            operands,
            prefactors,
            table: backend.alloc(len)?,
            out: backend.alloc(len)?,
        })
    }

    /// Nonlinearity order of this term (number of product factors).
    pub fn order(&self) -> usize {
        self.operands.len()
    }

    pub fn operands(&self) -> &[FieldId] {
        &self.operands
    }

    pub fn prefactors(&self) -> &[SpectralOperator] {
        &self.prefactors
    }

    /// Recomputes `out` = FFT of the operand product.
    ///
    /// Reads are against the operands' current real-space state, their
    /// dealiased copies when `use_dealiased` is set and the operand
    /// carries them. An empty product evaluates to a uniform unit field,
    /// so a term with no operands is a pure source set by its prefactors.
    pub(crate) fn evaluate(
        &mut self,
        fields: &[Field<B>],
        backend: &mut B,
        use_dealiased: bool,
    ) -> Result<()> {
        if self.operands.is_empty() {
            backend.fill(&mut self.out, Complex64::new(1.0, 0.0))?;
        } else {
            let first = self.operands[0];
            backend.copy(fields[first.0].real_for_products(use_dealiased), &mut self.out)?;
            for id in &self.operands[1..] {
                backend.pointwise_mul(&mut self.out, fields[id.0].real_for_products(use_dealiased))?;
            }
        }
        backend.fft_forward(&mut self.out)
    }
}
