//! CUDA implementation of the engine's compute seam.
//!
//! Buffers are device-resident `f64` slices holding interleaved complex
//! data (`[re0, im0, re1, im1, ...]`), the layout cuFFT's Z2Z transforms
//! consume directly. Elementwise arithmetic runs as NVRTC-compiled
//! kernels; Gaussian generation uses cuRAND with a pack kernel placing
//! samples into the real lanes.

use std::sync::Arc;

use cudarc::curand::CudaRng;
use cudarc::driver::{
    CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, DevicePtrMut, DeviceSlice,
    LaunchConfig, PushKernelArg,
};
use num_complex::Complex64;

use quench_core::errors::{QuenchError, Result};
use quench_core::{Grid, SpectralBackend};

use crate::cufft_sys::{
    cufft_error_string, CufftDoubleComplex, CufftHandle, CUFFT_FORWARD, CUFFT_INVERSE,
    CUFFT_SUCCESS, CUFFT_Z2Z,
};

const THREADS: u32 = 256;

/// Elementwise complex kernels over interleaved double buffers.
const KERNEL_SOURCE: &str = r#"
extern "C" __global__ void cplx_pointwise_mul(double* acc, const double* src, int n) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        double ar = acc[2 * i],     ai = acc[2 * i + 1];
        double br = src[2 * i],     bi = src[2 * i + 1];
        acc[2 * i]     = ar * br - ai * bi;
        acc[2 * i + 1] = ar * bi + ai * br;
    }
}

extern "C" __global__ void cplx_mul_add(double* acc, const double* table, const double* src, int n) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        double tr = table[2 * i], ti = table[2 * i + 1];
        double sr = src[2 * i],   si = src[2 * i + 1];
        acc[2 * i]     += tr * sr - ti * si;
        acc[2 * i + 1] += tr * si + ti * sr;
    }
}

// A real alpha acts on both lanes independently.
extern "C" __global__ void real_axpy(double* y, const double* x, double alpha, int m) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < m) {
        y[i] += alpha * x[i];
    }
}

extern "C" __global__ void real_scale(double* buf, double alpha, int m) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < m) {
        buf[i] *= alpha;
    }
}

extern "C" __global__ void cplx_fill(double* buf, double re, double im, int n) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        buf[2 * i]     = re;
        buf[2 * i + 1] = im;
    }
}

extern "C" __global__ void pack_real(double* dst, const double* samples, int n) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        dst[2 * i]     = samples[i];
        dst[2 * i + 1] = 0.0;
    }
}
"#;

fn cuda_err(context: &str, e: impl std::fmt::Display) -> QuenchError {
    QuenchError::backend(context, e.to_string())
}

fn cufft_err(context: &str, result: i32) -> QuenchError {
    QuenchError::backend(context, cufft_error_string(result))
}

/// CUDA implementation of [`SpectralBackend`].
pub struct CudaSpectralBackend {
    #[allow(dead_code)]
    context: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    #[allow(dead_code)]
    module: Arc<CudaModule>,
    grid: Grid,
    plan: CufftHandle,
    rng: CudaRng,
    /// cuRAND output, `grid.len()` raw samples before lane packing.
    noise_scratch: CudaSlice<f64>,
    /// Host staging for interleaved transfers.
    staging: Vec<f64>,

    pointwise_mul_kernel: CudaFunction,
    mul_add_kernel: CudaFunction,
    axpy_kernel: CudaFunction,
    scale_kernel: CudaFunction,
    fill_kernel: CudaFunction,
    pack_kernel: CudaFunction,
}

impl CudaSpectralBackend {
    /// Backend on CUDA device 0 with the given cuRAND seed.
    pub fn new(grid: Grid, seed: u64) -> Result<Self> {
        let context = CudaContext::new(0).map_err(|e| cuda_err("cuda context", e))?;
        Self::with_context(context, grid, seed)
    }

    /// Backend on an existing context, for sharing a device between
    /// engines.
    pub fn with_context(context: Arc<CudaContext>, grid: Grid, seed: u64) -> Result<Self> {
        let stream = context.default_stream();

        log::info!(
            "initializing CUDA spectral backend: {}x{}x{} grid",
            grid.sx,
            grid.sy,
            grid.sz
        );

        let ptx = cudarc::nvrtc::compile_ptx(KERNEL_SOURCE)
            .map_err(|e| cuda_err("nvrtc compile", e))?;
        let module = context
            .load_module(ptx)
            .map_err(|e| cuda_err("module load", e))?;
        let load = |name: &str| -> Result<CudaFunction> {
            module
                .load_function(name)
                .map_err(|e| cuda_err(name, e))
        };
        let pointwise_mul_kernel = load("cplx_pointwise_mul")?;
        let mul_add_kernel = load("cplx_mul_add")?;
        let axpy_kernel = load("real_axpy")?;
        let scale_kernel = load("real_scale")?;
        let fill_kernel = load("cplx_fill")?;
        let pack_kernel = load("pack_real")?;

        let plan = create_plan(&grid)?;
        let rng = CudaRng::new(seed, stream.clone()).map_err(|e| cuda_err("curand init", e))?;
        let noise_scratch = stream
            .alloc_zeros::<f64>(grid.len())
            .map_err(|e| cuda_err("noise scratch alloc", e))?;

        Ok(CudaSpectralBackend {
            context,
            stream,
            module,
            grid,
            plan,
            rng,
            noise_scratch,
            staging: vec![0.0; 2 * grid.len()],
            pointwise_mul_kernel,
            mul_add_kernel,
            axpy_kernel,
            scale_kernel,
            fill_kernel,
            pack_kernel,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn launch_cfg(count: usize) -> LaunchConfig {
        let blocks = (count as u32).div_ceil(THREADS);
        LaunchConfig {
            grid_dim: (blocks, 1, 1),
            block_dim: (THREADS, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    fn check_len(&self, buf: &CudaSlice<f64>, context: &str) -> Result<()> {
        if buf.len() != 2 * self.grid.len() {
            return Err(QuenchError::backend(
                context,
                format!(
                    "buffer holds {} complex elements, grid has {}",
                    buf.len() / 2,
                    self.grid.len()
                ),
            ));
        }
        Ok(())
    }

    fn exec_fft(&mut self, buf: &mut CudaSlice<f64>, direction: i32, context: &str) -> Result<()> {
        self.check_len(buf, context)?;
        unsafe {
            let (ptr, _sync) = buf.device_ptr_mut(&self.stream);
            let data = ptr as *mut CufftDoubleComplex;
            let result = crate::cufft_sys::cufftExecZ2Z(self.plan, data, data, direction);
            if result != CUFFT_SUCCESS {
                return Err(cufft_err(context, result));
            }
        }
        Ok(())
    }
}

impl SpectralBackend for CudaSpectralBackend {
    type Buf = CudaSlice<f64>;

    fn alloc(&mut self, len: usize) -> Result<Self::Buf> {
        self.stream
            .alloc_zeros::<f64>(2 * len)
            .map_err(|e| cuda_err("alloc", e))
    }

    fn upload(&mut self, host: &[Complex64], dev: &mut Self::Buf) -> Result<()> {
        if dev.len() != 2 * host.len() {
            return Err(QuenchError::backend(
                "upload",
                format!("host {} vs device {} complex elements", host.len(), dev.len() / 2),
            ));
        }
        self.staging.resize(2 * host.len(), 0.0);
        for (pair, v) in self.staging.chunks_exact_mut(2).zip(host.iter()) {
            pair[0] = v.re;
            pair[1] = v.im;
        }
        self.stream
            .memcpy_htod(&self.staging, dev)
            .map_err(|e| cuda_err("upload", e))
    }

    fn download(&mut self, dev: &Self::Buf, host: &mut [Complex64]) -> Result<()> {
        if dev.len() != 2 * host.len() {
            return Err(QuenchError::backend(
                "download",
                format!("host {} vs device {} complex elements", host.len(), dev.len() / 2),
            ));
        }
        self.staging.resize(dev.len(), 0.0);
        self.stream
            .memcpy_dtoh(dev, &mut self.staging)
            .map_err(|e| cuda_err("download", e))?;
        for (v, pair) in host.iter_mut().zip(self.staging.chunks_exact(2)) {
            *v = Complex64::new(pair[0], pair[1]);
        }
        Ok(())
    }

    fn copy(&mut self, src: &Self::Buf, dst: &mut Self::Buf) -> Result<()> {
        if src.len() != dst.len() {
            return Err(QuenchError::backend(
                "copy",
                format!("buffer lengths differ: {} vs {}", src.len(), dst.len()),
            ));
        }
        self.stream
            .memcpy_dtod(src, dst)
            .map_err(|e| cuda_err("copy", e))
    }

    fn fill(&mut self, buf: &mut Self::Buf, value: Complex64) -> Result<()> {
        let n = (buf.len() / 2) as i32;
        let cfg = Self::launch_cfg(n as usize);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.fill_kernel);
            builder.arg(buf);
            builder.arg(&value.re);
            builder.arg(&value.im);
            builder.arg(&n);
            builder.launch(cfg).map_err(|e| cuda_err("fill", e))?;
        }
        Ok(())
    }

    fn fft_forward(&mut self, buf: &mut Self::Buf) -> Result<()> {
        self.exec_fft(buf, CUFFT_FORWARD, "fft_forward")
    }

    fn fft_inverse(&mut self, buf: &mut Self::Buf) -> Result<()> {
        self.exec_fft(buf, CUFFT_INVERSE, "fft_inverse")?;
        // cuFFT leaves the inverse unnormalized
        self.scale(buf, 1.0 / self.grid.len() as f64)
    }

    fn pointwise_mul(&mut self, acc: &mut Self::Buf, src: &Self::Buf) -> Result<()> {
        let n = (acc.len() / 2) as i32;
        let cfg = Self::launch_cfg(n as usize);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.pointwise_mul_kernel);
            builder.arg(acc);
            builder.arg(src);
            builder.arg(&n);
            builder
                .launch(cfg)
                .map_err(|e| cuda_err("pointwise_mul", e))?;
        }
        Ok(())
    }

    fn mul_add(&mut self, acc: &mut Self::Buf, table: &Self::Buf, src: &Self::Buf) -> Result<()> {
        let n = (acc.len() / 2) as i32;
        let cfg = Self::launch_cfg(n as usize);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.mul_add_kernel);
            builder.arg(acc);
            builder.arg(table);
            builder.arg(src);
            builder.arg(&n);
            builder.launch(cfg).map_err(|e| cuda_err("mul_add", e))?;
        }
        Ok(())
    }

    fn axpy(&mut self, alpha: f64, x: &Self::Buf, y: &mut Self::Buf) -> Result<()> {
        let m = y.len() as i32;
        let cfg = Self::launch_cfg(m as usize);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.axpy_kernel);
            builder.arg(y);
            builder.arg(x);
            builder.arg(&alpha);
            builder.arg(&m);
            builder.launch(cfg).map_err(|e| cuda_err("axpy", e))?;
        }
        Ok(())
    }

    fn scale(&mut self, buf: &mut Self::Buf, alpha: f64) -> Result<()> {
        let m = buf.len() as i32;
        let cfg = Self::launch_cfg(m as usize);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.scale_kernel);
            builder.arg(buf);
            builder.arg(&alpha);
            builder.arg(&m);
            builder.launch(cfg).map_err(|e| cuda_err("scale", e))?;
        }
        Ok(())
    }

    fn random_normal(&mut self, buf: &mut Self::Buf) -> Result<()> {
        self.check_len(buf, "random_normal")?;
        self.rng
            .fill_with_normal(&mut self.noise_scratch, 0.0, 1.0)
            .map_err(|e| cuda_err("curand normal", e))?;
        let n = self.grid.len() as i32;
        let cfg = Self::launch_cfg(n as usize);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.pack_kernel);
            builder.arg(buf);
            builder.arg(&self.noise_scratch);
            builder.arg(&n);
            builder
                .launch(cfg)
                .map_err(|e| cuda_err("random_normal", e))?;
        }
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| cuda_err("synchronize", e))
    }
}

impl Drop for CudaSpectralBackend {
    fn drop(&mut self) {
        unsafe {
            crate::cufft_sys::cufftDestroy(self.plan);
        }
        log::debug!("cuFFT plan destroyed");
    }
}

/// One Z2Z plan matching the grid's row-major layout (x fastest, so the
/// slowest-varying cuFFT dimension is z).
fn create_plan(grid: &Grid) -> Result<CufftHandle> {
    let mut plan: CufftHandle = 0;
    let result = unsafe {
        if grid.sz > 1 {
            crate::cufft_sys::cufftPlan3d(
                &mut plan,
                grid.sz as i32,
                grid.sy as i32,
                grid.sx as i32,
                CUFFT_Z2Z,
            )
        } else if grid.sy > 1 {
            crate::cufft_sys::cufftPlan2d(&mut plan, grid.sy as i32, grid.sx as i32, CUFFT_Z2Z)
        } else {
            crate::cufft_sys::cufftPlan1d(&mut plan, grid.sx as i32, CUFFT_Z2Z, 1)
        }
    };
    if result != CUFFT_SUCCESS {
        return Err(cufft_err("cufft plan", result));
    }
    Ok(plan)
}
