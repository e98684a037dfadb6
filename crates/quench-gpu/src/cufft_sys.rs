//! cuFFT FFI bindings for device-side transforms.
//!
//! Minimal double-precision (Z2Z) bindings to NVIDIA's cuFFT library.
//! cuFFT ships with the CUDA toolkit, so this links directly rather than
//! pulling in an external wrapper crate.

use std::ffi::c_int;
use std::os::raw::c_void;

/// cuFFT plan handle
pub type CufftHandle = c_int;

/// cuFFT complex number (double precision, interleaved layout)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CufftDoubleComplex {
    pub x: f64, // Real part
    pub y: f64, // Imaginary part
}

// Safety: CufftDoubleComplex is a POD type
unsafe impl cudarc::driver::DeviceRepr for CufftDoubleComplex {}
unsafe impl cudarc::driver::ValidAsZeroBits for CufftDoubleComplex {}

/// cuFFT result codes
pub type CufftResult = c_int;

pub const CUFFT_SUCCESS: CufftResult = 0;
pub const CUFFT_INVALID_PLAN: CufftResult = 1;
pub const CUFFT_ALLOC_FAILED: CufftResult = 2;
pub const CUFFT_INVALID_TYPE: CufftResult = 3;
pub const CUFFT_INVALID_VALUE: CufftResult = 4;
pub const CUFFT_INTERNAL_ERROR: CufftResult = 5;
pub const CUFFT_EXEC_FAILED: CufftResult = 6;
pub const CUFFT_SETUP_FAILED: CufftResult = 7;
pub const CUFFT_INVALID_SIZE: CufftResult = 8;
pub const CUFFT_UNALIGNED_DATA: CufftResult = 9;

/// Complex-to-complex double-precision transform type
pub const CUFFT_Z2Z: c_int = 0x69;

/// Transform directions for `cufftExecZ2Z`
pub const CUFFT_FORWARD: c_int = -1;
pub const CUFFT_INVERSE: c_int = 1;

#[link(name = "cufft")]
extern "C" {
    /// Create a 1D FFT plan
    pub fn cufftPlan1d(
        plan: *mut CufftHandle,
        nx: c_int,
        type_: c_int,
        batch: c_int,
    ) -> CufftResult;

    /// Create a 2D FFT plan (`nx` is the slowest-varying dimension)
    pub fn cufftPlan2d(plan: *mut CufftHandle, nx: c_int, ny: c_int, type_: c_int) -> CufftResult;

    /// Create a 3D FFT plan (`nx` is the slowest-varying dimension)
    pub fn cufftPlan3d(
        plan: *mut CufftHandle,
        nx: c_int,
        ny: c_int,
        nz: c_int,
        type_: c_int,
    ) -> CufftResult;

    /// Destroy an FFT plan
    pub fn cufftDestroy(plan: CufftHandle) -> CufftResult;

    /// Execute a double-precision complex-to-complex FFT (in-place when
    /// `idata == odata`)
    pub fn cufftExecZ2Z(
        plan: CufftHandle,
        idata: *mut CufftDoubleComplex,
        odata: *mut CufftDoubleComplex,
        direction: c_int,
    ) -> CufftResult;

    /// Set the CUDA stream for FFT execution
    pub fn cufftSetStream(plan: CufftHandle, stream: *mut c_void) -> CufftResult;
}

/// Convert cuFFT error code to human-readable string
pub fn cufft_error_string(result: CufftResult) -> &'static str {
    match result {
        CUFFT_SUCCESS => "CUFFT_SUCCESS",
        CUFFT_INVALID_PLAN => "CUFFT_INVALID_PLAN",
        CUFFT_ALLOC_FAILED => "CUFFT_ALLOC_FAILED",
        CUFFT_INVALID_TYPE => "CUFFT_INVALID_TYPE",
        CUFFT_INVALID_VALUE => "CUFFT_INVALID_VALUE",
        CUFFT_INTERNAL_ERROR => "CUFFT_INTERNAL_ERROR",
        CUFFT_EXEC_FAILED => "CUFFT_EXEC_FAILED",
        CUFFT_SETUP_FAILED => "CUFFT_SETUP_FAILED",
        CUFFT_INVALID_SIZE => "CUFFT_INVALID_SIZE",
        CUFFT_UNALIGNED_DATA => "CUFFT_UNALIGNED_DATA",
        _ => "CUFFT_UNKNOWN_ERROR",
    }
}
