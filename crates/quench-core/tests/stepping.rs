//! Deterministic stepping tests against closed-form solutions.

use std::f64::consts::PI;
use std::path::PathBuf;

use num_complex::Complex64;
use quench_core::{Evolver, Grid, Integrator, SpectralOperator};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("quench-step-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn evolver(grid: Grid, dt: f64, tag: &str) -> Evolver<quench_core::CpuBackend> {
    let mut ev = Evolver::cpu_seeded(grid, dt, 1_000_000, 99).unwrap();
    ev.set_out_dir(scratch_dir(tag));
    ev
}

#[test]
fn duplicate_field_name_is_refused() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let mut ev = evolver(grid, 0.01, "dup");
    let first = ev.create_field("phi", true).unwrap();
    ev.field_mut(first).set_uniform(2.5);
    assert!(ev.create_field("phi", false).is_err());
    // the original registration survives untouched
    let id = ev.lookup("phi").unwrap();
    assert_eq!(id, first);
    assert_eq!(ev.fields().len(), 1);
    assert_eq!(ev.field(id).host_real()[0].re, 2.5);
}

#[test]
fn unknown_term_target_is_an_error() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let mut ev = evolver(grid, 0.01, "target");
    ev.create_field("u", true).unwrap();
    let err = ev.add_term("ghost", vec![SpectralOperator::constant(1.0)], &["u"]);
    assert!(err.is_err());
}

#[test]
fn unknown_operand_is_dropped_from_the_product() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let dt = 0.1;
    let mut ev = evolver(grid, dt, "operand");
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u).set_uniform(1.0);
    // "ghost" matches nothing, so this is effectively -1 * u
    ev.add_term("u", vec![SpectralOperator::constant(-1.0)], &["u", "ghost"])
        .unwrap();
    assert_eq!(ev.field(u).terms()[0].order(), 1);
    ev.prepare_problem().unwrap();
    ev.advance_time().unwrap();
    ev.sync_host().unwrap();
    for v in ev.field(u).host_real() {
        assert!((v.re - (1.0 - dt)).abs() < 1e-12);
    }
}

#[test]
fn uniform_state_is_a_fixed_point_of_diffusion() {
    let grid = Grid::new_2d(8, 8, 1.0, 1.0).unwrap();
    let mut ev = evolver(grid, 0.05, "uniform");
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u).set_uniform(4.2);
    ev.field_mut(u)
        .add_implicit(SpectralOperator::laplacian_power(-1.0, 1));
    ev.prepare_problem().unwrap();
    ev.run(10).unwrap();
    ev.sync_host().unwrap();
    for v in ev.field(u).host_real() {
        assert!((v.re - 4.2).abs() < 1e-10);
    }
}

#[test]
fn implicit_diffusion_damps_a_cosine_mode() {
    let n = 16;
    let dt = 0.05;
    let grid = Grid::new_1d(n, 1.0).unwrap();
    let mut ev = evolver(grid, dt, "cosine");
    let u = ev.create_field("u", true).unwrap();
    let mode = 3.0;
    ev.field_mut(u)
        .set_initial(|i, _, _| (2.0 * PI * mode * i as f64 / n as f64).cos());
    // du/dt = ∇²u, i.e. L(q) = -q²: each mode shrinks by 1/(1 + dt q²)
    ev.field_mut(u)
        .add_implicit(SpectralOperator::laplacian_power(-1.0, 1));
    ev.prepare_problem().unwrap();
    ev.advance_time().unwrap();
    ev.sync_host().unwrap();

    let q = mode * grid.step_qx();
    let factor = 1.0 / (1.0 + dt * q * q);
    for (i, v) in ev.field(u).host_real().iter().enumerate() {
        let expected = factor * (2.0 * PI * mode * i as f64 / n as f64).cos();
        assert!(
            (v.re - expected).abs() < 1e-12,
            "site {}: {} vs {}",
            i,
            v.re,
            expected
        );
    }
}

#[test]
fn non_dynamic_field_tracks_its_definition() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let mut ev = evolver(grid, 0.01, "algebraic");
    let a = ev.create_field("a", true).unwrap();
    ev.field_mut(a).set_uniform(1.5);
    let b = ev.create_field("b", false).unwrap();
    // b = 2a, evaluated every step before dynamic fields advance
    ev.add_term("b", vec![SpectralOperator::constant(2.0)], &["a"])
        .unwrap();
    ev.prepare_problem().unwrap();
    ev.advance_time().unwrap();
    ev.sync_host().unwrap();
    for v in ev.field(b).host_real() {
        assert!((v.re - 3.0).abs() < 1e-12);
    }
}

#[test]
fn trivial_field_is_a_fixed_point_of_every_integrator() {
    // No terms, no implicit operator, no noise: the propagator is 1 and
    // the right-hand side is 0, so any state must survive unchanged.
    for integrator in [Integrator::Euler, Integrator::Rk2, Integrator::Rk4] {
        let grid = Grid::new_1d(8, 1.0).unwrap();
        let mut ev = evolver(grid, 0.1, "trivial");
        let u = ev.create_field("u", true).unwrap();
        ev.field_mut(u)
            .set_initial(|i, _, _| 1.0 + 0.5 * (i as f64).sin());
        ev.field_mut(u).integrator = integrator;
        ev.prepare_problem().unwrap();
        let before: Vec<f64> = ev.field(u).host_real().iter().map(|v| v.re).collect();
        ev.run(5).unwrap();
        ev.sync_host().unwrap();
        for (b, a) in before.iter().zip(ev.field(u).host_real()) {
            assert!(
                (a.re - b).abs() < 1e-12,
                "{:?}: {} vs {}",
                integrator,
                a.re,
                b
            );
        }
    }
}

// Explicit linear decay du/dt = -u exercises each integrator's stage
// arithmetic exactly: one step must land on the scheme's truncation of
// exp(-dt).
fn decay_after_one_step(integrator: Integrator, dt: f64, tag: &str) -> f64 {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let mut ev = evolver(grid, dt, tag);
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u).set_uniform(1.0);
    ev.field_mut(u).integrator = integrator;
    ev.add_term("u", vec![SpectralOperator::constant(-1.0)], &["u"])
        .unwrap();
    ev.prepare_problem().unwrap();
    ev.advance_time().unwrap();
    ev.sync_host().unwrap();
    ev.field(u).host_real()[0].re
}

#[test]
fn euler_decay_matches_first_order_truncation() {
    let dt = 0.1;
    let got = decay_after_one_step(Integrator::Euler, dt, "euler");
    assert!((got - (1.0 - dt)).abs() < 1e-13, "got {}", got);
}

#[test]
fn rk2_decay_matches_second_order_truncation() {
    let dt = 0.1;
    let got = decay_after_one_step(Integrator::Rk2, dt, "rk2");
    let expected = 1.0 - dt + dt * dt / 2.0;
    assert!((got - expected).abs() < 1e-13, "got {}", got);
}

#[test]
fn rk4_decay_matches_fourth_order_truncation() {
    let dt = 0.1;
    let got = decay_after_one_step(Integrator::Rk4, dt, "rk4");
    let expected = 1.0 - dt + dt.powi(2) / 2.0 - dt.powi(3) / 6.0 + dt.powi(4) / 24.0;
    assert!((got - expected).abs() < 1e-13, "got {}", got);
    // and it is a much better approximation of exp(-dt) than Euler
    assert!((got - (-dt).exp()).abs() < 1e-7);
}

#[test]
fn set_dt_rebuilds_the_propagators() {
    let n = 16;
    let grid = Grid::new_1d(n, 1.0).unwrap();
    let mut ev = evolver(grid, 0.05, "setdt");
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u)
        .set_initial(|i, _, _| (2.0 * PI * 3.0 * i as f64 / n as f64).cos());
    ev.field_mut(u)
        .add_implicit(SpectralOperator::laplacian_power(-1.0, 1));
    ev.prepare_problem().unwrap();

    let dt = 0.2;
    ev.set_dt(dt).unwrap();
    assert_eq!(ev.dt(), dt);
    ev.advance_time().unwrap();
    ev.sync_host().unwrap();

    let q = 3.0 * grid.step_qx();
    let factor = 1.0 / (1.0 + dt * q * q);
    let expected = factor * 1.0; // site 0: cos(0) = 1
    assert!((ev.field(u).host_real()[0].re - expected).abs() < 1e-12);
}

#[test]
fn quadratic_term_flags_dealiasing_on_target_and_operands() {
    let grid = Grid::new_1d(16, 1.0).unwrap();
    let mut ev = evolver(grid, 0.01, "alias");
    let u = ev.create_field("u", true).unwrap();
    let v = ev.create_field("v", true).unwrap();
    ev.add_term("u", vec![SpectralOperator::constant(1.0)], &["v", "v"])
        .unwrap();
    assert!(ev.field(u).needs_aliasing);
    assert!(ev.field(v).needs_aliasing);
    assert_eq!(ev.field(u).aliasing_order, 2);
    // linear terms never flag anything
    let w = ev.create_field("w", true).unwrap();
    ev.add_term("w", vec![SpectralOperator::constant(1.0)], &["u"])
        .unwrap();
    assert!(!ev.field(w).needs_aliasing);
}

#[test]
fn quadratic_decay_of_a_uniform_state() {
    // du/dt = -u² on a uniform state has no aliased content, so the
    // dealiased path must reproduce plain Euler: u1 = u0 - dt u0².
    let grid = Grid::new_1d(16, 1.0).unwrap();
    let dt = 0.02;
    let mut ev = evolver(grid, dt, "quad");
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u).set_uniform(2.0);
    ev.add_term("u", vec![SpectralOperator::constant(-1.0)], &["u", "u"])
        .unwrap();
    ev.prepare_problem().unwrap();
    ev.advance_time().unwrap();
    ev.sync_host().unwrap();
    let expected = 2.0 - dt * 4.0;
    for v in ev.field(u).host_real() {
        assert!((v.re - expected).abs() < 1e-12);
    }
}

#[test]
fn source_term_with_no_operands_is_a_constant_drive() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let dt = 0.1;
    let mut ev = evolver(grid, dt, "source");
    let u = ev.create_field("u", true).unwrap();
    // du/dt = 3
    ev.add_term("u", vec![SpectralOperator::constant(3.0)], &[])
        .unwrap();
    ev.prepare_problem().unwrap();
    ev.run(5).unwrap();
    ev.sync_host().unwrap();
    for v in ev.field(u).host_real() {
        assert!((v.re - 5.0 * dt * 3.0).abs() < 1e-12);
    }
}

#[test]
fn advance_before_prepare_is_refused() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let mut ev = evolver(grid, 0.01, "unprepared");
    ev.create_field("u", true).unwrap();
    assert!(ev.advance_time().is_err());
}

#[test]
fn nan_initial_condition_is_visible_as_blow_up() {
    let grid = Grid::new_1d(8, 1.0).unwrap();
    let mut ev = evolver(grid, 0.01, "nan");
    let u = ev.create_field("u", true).unwrap();
    assert!(!ev.has_blown_up());
    ev.field_mut(u).set_uniform(f64::NAN);
    assert!(ev.has_blown_up());
}

#[test]
fn snapshots_are_written_at_the_output_cadence() {
    let grid = Grid::new_1d(4, 1.0).unwrap();
    let dir = scratch_dir("files");
    let mut ev = Evolver::cpu_seeded(grid, 0.01, 2, 7).unwrap();
    ev.set_out_dir(dir.clone());
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u).set_uniform(1.0);
    ev.set_output_field("u", true).unwrap();
    ev.prepare_problem().unwrap();
    ev.run(4).unwrap();
    // cadence 2 over steps 0..3 → epochs at 0 and 2
    assert!(dir.join("u.csv.0").is_file());
    assert!(dir.join("u.csv.2").is_file());
    assert!(!dir.join("u.csv.1").exists());
    assert!(!dir.join("u.csv.3").exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn observers_fire_at_output_epochs_with_host_data() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let grid = Grid::new_1d(4, 1.0).unwrap();
    let mut ev = Evolver::cpu_seeded(grid, 0.01, 2, 7).unwrap();
    ev.set_out_dir(scratch_dir("observer"));
    let u = ev.create_field("u", true).unwrap();
    ev.field_mut(u).set_uniform(1.5);

    let seen: Rc<RefCell<Vec<(String, usize, f64)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    ev.field_mut(u).add_observer(Box::new(
        move |name: &str, real: &[Complex64], _grid: &Grid, step: usize| {
            sink.borrow_mut().push((name.to_string(), step, real[0].re));
        },
    ));
    ev.prepare_problem().unwrap();
    ev.run(4).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("u".to_string(), 0, 1.5));
    assert_eq!(seen[1].1, 2);
}
