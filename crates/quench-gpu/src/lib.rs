//! # quench-gpu
//!
//! CUDA backend for the quench pseudo-spectral engine: device-resident
//! interleaved complex buffers, cuFFT Z2Z transforms, NVRTC-compiled
//! elementwise kernels and cuRAND Gaussian forcing.
//!
//! Everything here is behind the `cuda` feature so that the default
//! workspace build never needs a CUDA toolkit. Construct a
//! [`CudaSpectralBackend`] and hand it to
//! `quench_core::Evolver::new` to run the same models the CPU backend
//! runs, unchanged.

#[cfg(feature = "cuda")]
pub mod cufft_sys;

#[cfg(feature = "cuda")]
mod backend;

#[cfg(feature = "cuda")]
pub use backend::CudaSpectralBackend;

/// True when CUDA support was compiled in and device 0 initializes.
pub fn cuda_available() -> bool {
    #[cfg(feature = "cuda")]
    {
        cudarc::driver::CudaContext::new(0).is_ok()
    }
    #[cfg(not(feature = "cuda"))]
    {
        false
    }
}

#[cfg(all(test, not(feature = "cuda")))]
mod tests {
    #[test]
    fn cuda_is_reported_unavailable_without_the_feature() {
        assert!(!super::cuda_available());
    }
}
