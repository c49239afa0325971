//! Transient turn-on of a PN diode: charge storage and automatic step
//! control.

use semifvm_rs::assembly::driver::TimeContext;
use semifvm_rs::config::{
    LinearSolverType, SolverConfig, SolverType, TransientSpec, TsType,
};
use semifvm_rs::devices::diode::{build_pn_diode, DiodeSpec};
use semifvm_rs::numerics::{newton, transient};
use semifvm_rs::solution::Variable;

/// Integrate `dy/dt = -k y` to `t_end` with constant-step BDF2, starting
/// from one exact step so the history is second-order clean.
fn bdf2_decay_error(k: f64, t_end: f64, steps: usize) -> f64 {
    let dt = t_end / steps as f64;
    let (a0, a1, a2) = TimeContext::bdf_coefficients(dt, dt, false);
    let mut y_prev = 1.0;
    let mut y = (-k * dt).exp();
    for _ in 1..steps {
        // (a0 y_new + a1 y + a2 y_prev)/dt + k y_new = 0.
        let y_new = -(a1 * y + a2 * y_prev) / (a0 + k * dt);
        y_prev = y;
        y = y_new;
    }
    (y - (-k * t_end).exp()).abs()
}

#[test]
fn bdf2_is_second_order_on_a_linear_decay() {
    let (k, t_end) = (3.0, 1.0);
    let coarse = bdf2_decay_error(k, t_end, 40);
    let fine = bdf2_decay_error(k, t_end, 80);
    let finest = bdf2_decay_error(k, t_end, 160);

    // Halving the step must quarter the error.
    let r1 = coarse / fine;
    let r2 = fine / finest;
    assert!((3.3..4.7).contains(&r1), "order ratio {r1}, want ~4");
    assert!((3.5..4.5).contains(&r2), "order ratio {r2}, want ~4");
    // And the absolute error is already small at the coarse step.
    assert!(coarse < 1e-3);
}

#[test]
fn diode_turn_on_stores_charge() {
    let mut sys = build_pn_diode(&DiodeSpec {
        nx: 24,
        ..DiodeSpec::default()
    })
    .unwrap();

    let mut cfg = SolverConfig::steady(SolverType::Ddml1);
    cfg.linear_solver = LinearSolverType::Lu;
    newton::run_steady(&mut sys, &cfg).expect("equilibrium");

    // Minority electron density on the p side before the step.
    let probe = (0..sys.graph.n_fvm_nodes())
        .find(|&f| {
            let x = sys.mesh.nodes[sys.graph.fvm_nodes[f].root].position.x;
            (0.4e-4..0.6e-4).contains(&x)
        })
        .expect("probe CV on the p side");
    let n_before = sys.graph.node_data[probe].get(Variable::Electron);

    // Step the anode to 0.3 V at t = 0 and integrate.
    let anode = sys.bc_by_name("anode").unwrap();
    sys.bcs[anode].v_app = 0.3 / sys.scaling.v;

    cfg.max_iteration = 60;
    cfg.transient = Some(TransientSpec {
        ts_type: TsType::Bdf2,
        t_start: 0.0,
        t_stop: 2.0e-9,
        t_step: 2.0e-11,
        t_step_max: 4.0e-10,
        auto_step: true,
        predict: true,
        ts_rtol: 5e-2,
        ts_atol: 1e-4,
    });

    let mut times = Vec::new();
    let report = transient::run_transient(&mut sys, &cfg, |t, _, result| {
        times.push((t, result.iterations));
    })
    .expect("transient turn-on");

    assert!(report.accepted > 0);
    assert!(report.final_time >= 2.0e-9 * (1.0 - 1e-9));

    // Injected minority carriers pile up: the stored-charge tail.
    let n_after = sys.graph.node_data[probe].get(Variable::Electron);
    assert!(
        n_after > n_before * 10.0,
        "no injection: {n_before} -> {n_after}"
    );

    // Accepted step sizes never grow by more than the factor-two cap.
    let accepted_times: Vec<f64> = times.iter().map(|x| x.0).collect();
    let mut prev_dt = accepted_times[0];
    for w in accepted_times.windows(2) {
        let dt = w[1] - w[0];
        assert!(
            dt <= 2.0 * prev_dt * (1.0 + 1e-9),
            "step grew from {prev_dt} to {dt}"
        );
        prev_dt = dt;
    }
}
