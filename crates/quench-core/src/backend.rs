//! The compute-backend seam.
//!
//! Everything the engine needs from a compute runtime is captured by
//! [`SpectralBackend`]: complex buffers, forward/inverse transforms,
//! elementwise arithmetic, and unit-variance Gaussian generation. The
//! evolver, fields and terms are generic over the backend, so the CPU
//! path (rustfft, sequential) and the CUDA path (cuFFT + device kernels)
//! run the exact same stepping algorithm.
//!
//! Buffers may live in device memory; host code only sees them through
//! `upload`/`download`, which the evolver calls at well-defined points
//! (initial-condition load, output epochs). In between, host mirrors are
//! allowed to be stale.

use num_complex::Complex64;

use crate::errors::Result;

/// Elementwise complex compute over grid-sized buffers.
///
/// All operations are dense over the full buffer; length mismatches are
/// backend errors. `fft_inverse` includes the `1/N` normalization, so a
/// forward/inverse round trip is the identity.
pub trait SpectralBackend {
    /// A grid-sized complex buffer, possibly device-resident.
    type Buf;

    /// Allocates a zeroed buffer of `len` complex elements.
    fn alloc(&mut self, len: usize) -> Result<Self::Buf>;

    /// Host → buffer copy.
    fn upload(&mut self, host: &[Complex64], dev: &mut Self::Buf) -> Result<()>;

    /// Buffer → host copy. Blocks until the data is visible to the host.
    fn download(&mut self, dev: &Self::Buf, host: &mut [Complex64]) -> Result<()>;

    /// `dst = src`.
    fn copy(&mut self, src: &Self::Buf, dst: &mut Self::Buf) -> Result<()>;

    /// Sets every element to `value`.
    fn fill(&mut self, buf: &mut Self::Buf, value: Complex64) -> Result<()>;

    /// In-place forward transform, real space → Fourier space.
    fn fft_forward(&mut self, buf: &mut Self::Buf) -> Result<()>;

    /// In-place inverse transform, Fourier space → real space, normalized.
    fn fft_inverse(&mut self, buf: &mut Self::Buf) -> Result<()>;

    /// `acc[i] *= src[i]`.
    fn pointwise_mul(&mut self, acc: &mut Self::Buf, src: &Self::Buf) -> Result<()>;

    /// `acc[i] += table[i] · src[i]`, the elementwise multiply-accumulate
    /// used to apply precomputed operator tables.
    fn mul_add(&mut self, acc: &mut Self::Buf, table: &Self::Buf, src: &Self::Buf) -> Result<()>;

    /// `y[i] += alpha · x[i]`.
    fn axpy(&mut self, alpha: f64, x: &Self::Buf, y: &mut Self::Buf) -> Result<()>;

    /// `buf[i] *= alpha`.
    fn scale(&mut self, buf: &mut Self::Buf, alpha: f64) -> Result<()>;

    /// Fills the real parts with fresh independent `N(0, 1)` samples and
    /// zeroes the imaginary parts. Amplitude and `√dt` scaling are the
    /// stepper's job, not the generator's.
    fn random_normal(&mut self, buf: &mut Self::Buf) -> Result<()>;

    /// Blocks until all issued work is complete. A no-op on host backends.
    fn synchronize(&mut self) -> Result<()>;
}
