//! quench CLI entry point.
//!
//! Runs built-in pseudo-spectral field models from command-line flags or
//! a TOML config file, on the CPU backend or (with the `cuda` feature)
//! on a CUDA device.

use anyhow::{bail, Context, Result};
use clap::Parser;

use quench_core::{Evolver, SpectralBackend};

mod config;
mod models;

use config::{GridConfig, ModelConfig, RunConfig, SimConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "quench")]
#[command(version = VERSION)]
#[command(about = "Pseudo-spectral stochastic PDE solver", long_about = None)]
struct Args {
    /// TOML config file; overrides the grid/run/model flags below
    #[arg(short, long)]
    config: Option<String>,

    /// Model to run: diffusion, model_a, model_b
    #[arg(short, long, default_value = "model_a")]
    model: String,

    /// Model parameter override, key=value (repeatable)
    ///
    /// Example: --param a=-0.8 --param D=0.05
    #[arg(short, long)]
    param: Vec<String>,

    /// Grid points along x
    #[arg(long, default_value = "128")]
    nx: usize,

    /// Grid points along y (1 collapses the axis)
    #[arg(long, default_value = "128")]
    ny: usize,

    /// Grid points along z (1 collapses the axis)
    #[arg(long, default_value = "1")]
    nz: usize,

    /// Grid spacing along x
    #[arg(long, default_value = "1.0")]
    dx: f64,

    /// Grid spacing along y
    #[arg(long, default_value = "1.0")]
    dy: f64,

    /// Grid spacing along z
    #[arg(long, default_value = "1.0")]
    dz: f64,

    /// Timestep
    #[arg(long, default_value = "0.01")]
    dt: f64,

    /// Number of timesteps
    #[arg(short, long, default_value = "10000")]
    steps: usize,

    /// Snapshot cadence, in steps
    #[arg(short, long, default_value = "100")]
    write_every: usize,

    /// Output directory for field snapshots
    #[arg(short, long, default_value = "data", env = "QUENCH_OUT_DIR")]
    out_dir: String,

    /// Noise and initial-condition seed (omit for OS entropy)
    #[arg(long, env = "QUENCH_SEED")]
    seed: Option<u64>,

    /// Integrator: euler, rk2, rk4
    #[arg(short, long, default_value = "euler")]
    integrator: String,

    /// Run on a CUDA device (requires building with --features cuda)
    #[arg(long)]
    gpu: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn to_sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_file(path)?,
            None => SimConfig {
                grid: GridConfig {
                    nx: self.nx,
                    ny: self.ny,
                    nz: self.nz,
                    dx: self.dx,
                    dy: self.dy,
                    dz: self.dz,
                },
                run: RunConfig {
                    dt: self.dt,
                    steps: self.steps,
                    write_every: self.write_every,
                    out_dir: self.out_dir.clone(),
                    seed: self.seed,
                    integrator: self.integrator.clone(),
                },
                model: ModelConfig {
                    name: self.model.clone(),
                    params: Default::default(),
                },
            },
        };
        let overrides = config::parse_param_overrides(&self.param)?;
        config.model.params.extend(overrides);
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    log::info!("quench {} starting", VERSION);
    let config = args.to_sim_config()?;
    let grid = config.grid()?;

    if args.gpu {
        run_gpu(grid, &config)
    } else {
        let dt = config.run.dt;
        let write_every = config.run.write_every;
        let ev = match config.run.seed {
            Some(seed) => Evolver::cpu_seeded(grid, dt, write_every, seed)?,
            None => Evolver::cpu(grid, dt, write_every)?,
        };
        run_simulation(ev, &config)
    }
}

#[cfg(feature = "cuda")]
fn run_gpu(grid: quench_core::Grid, config: &SimConfig) -> Result<()> {
    if !quench_gpu::cuda_available() {
        bail!("no CUDA device responded");
    }
    let seed = config.run.seed.unwrap_or_else(rand::random);
    let backend = quench_gpu::CudaSpectralBackend::new(grid, seed)?;
    let ev = Evolver::new(backend, grid, config.run.dt, config.run.write_every)?;
    run_simulation(ev, config)
}

#[cfg(not(feature = "cuda"))]
fn run_gpu(_grid: quench_core::Grid, _config: &SimConfig) -> Result<()> {
    bail!("this build has no CUDA support; rebuild with --features cuda");
}

fn run_simulation<B: SpectralBackend>(mut ev: Evolver<B>, config: &SimConfig) -> Result<()> {
    ev.set_out_dir(config.run.out_dir.clone());
    let phi = models::build(&mut ev, &config.model, config.run.seed)?;
    ev.field_mut(phi).integrator = config.integrator()?;

    ev.prepare_problem()
        .context("failed to prepare the problem")?;
    ev.log_summary();

    let steps = config.run.steps;
    let started = std::time::Instant::now();
    ev.run(steps).context("simulation failed")?;
    let elapsed = started.elapsed();
    log::info!(
        "completed {} steps in {:.2}s ({:.1} steps/s), simulated time {:.4}",
        steps,
        elapsed.as_secs_f64(),
        steps as f64 / elapsed.as_secs_f64().max(1e-9),
        ev.current_time()
    );
    Ok(())
}
