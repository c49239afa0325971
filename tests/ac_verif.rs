//! AC small-signal verification: parallel-plate capacitance of a
//! dielectric slab and the MOS capacitor C-V trend.

use semifvm_rs::config::{AcSweep, LinearSolverType, SolverConfig, SolverType};
use semifvm_rs::devices::mos::{
    build_mos_capacitor, build_oxide_slab, MosCapSpec, OxideSlabSpec,
};
use semifvm_rs::numerics::ac::run_ac_sweep;
use semifvm_rs::physics::units::EPS0;

fn ac_cfg(electrode: &str, freq: f64) -> SolverConfig {
    let mut cfg = SolverConfig::steady(SolverType::Ddmac);
    cfg.linear_solver = LinearSolverType::Lu;
    cfg.max_iteration = 100;
    cfg.ac = Some(AcSweep {
        electrode: electrode.into(),
        v_ac: 1e-3,
        f_start: freq,
        f_multiple: 10.0,
        f_stop: freq,
    });
    cfg
}

/// Walk the gate bias up in steps so every DC solve starts close by.
fn bias_gate(sys: &mut semifvm_rs::SimulationSystem, target: f64) {
    let gate = sys.bc_by_name("gate").unwrap();
    let mut cfg = SolverConfig::steady(SolverType::Ddml1);
    cfg.linear_solver = LinearSolverType::Lu;
    cfg.max_iteration = 100;
    let steps = (target.abs() / 0.25).ceil().max(1.0) as usize;
    for k in 1..=steps {
        let v = target * k as f64 / steps as f64;
        sys.bcs[gate].v_app = v / sys.scaling.v;
        semifvm_rs::numerics::newton::run_steady(sys, &cfg).expect("gate bias step");
    }
}

#[test]
fn oxide_slab_matches_parallel_plate_capacitance() {
    let spec = OxideSlabSpec::default();
    let mut sys = build_oxide_slab(&spec).unwrap();

    let points = run_ac_sweep(&mut sys, &ac_cfg("top", 1e6)).expect("ac sweep");
    assert_eq!(points.len(), 1);

    let area = spec.width * spec.width;
    let c_expected = 3.9 * EPS0 * area / spec.thickness;
    let c = points[0].c;
    assert!(
        (c - c_expected).abs() / c_expected < 0.02,
        "slab capacitance {c} vs {c_expected}"
    );
    // A dielectric conducts nothing at DC.
    assert!(points[0].y.re.abs() < points[0].y.im.abs() * 1e-3);

    let out = std::env::temp_dir().join("semifvm_slab_ac.csv");
    semifvm_rs::processing::csv_writer::write_ac(&out, &points).unwrap();
    assert!(out.exists());
}

#[test]
fn mos_capacitor_cv_trend() {
    let spec = MosCapSpec::default();
    let area = spec.width * spec.width;
    let c_ox = 3.9 * EPS0 * area / spec.t_ox;

    // Strong accumulation: the oxide dominates.
    let mut sys = build_mos_capacitor(&spec).unwrap();
    bias_gate(&mut sys, -2.0);
    let acc = run_ac_sweep(&mut sys, &ac_cfg("gate", 1e6)).expect("accumulation point")[0];

    // Mid-depletion: the series depletion capacitance shrinks the total.
    let mut sys = build_mos_capacitor(&spec).unwrap();
    bias_gate(&mut sys, -0.4);
    let dep = run_ac_sweep(&mut sys, &ac_cfg("gate", 1e6)).expect("depletion point")[0];

    assert!(
        (acc.c - c_ox).abs() / c_ox < 0.25,
        "accumulation capacitance {} vs oxide {}",
        acc.c,
        c_ox
    );
    assert!(
        dep.c < 0.8 * acc.c,
        "depletion {} must fall below accumulation {}",
        dep.c,
        acc.c
    );
    assert!(dep.c > 0.0);
}
