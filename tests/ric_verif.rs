//! Radiation response of an oxide slab: steady radiation-induced
//! conduction and total-dose trap buildup.

use semifvm_rs::config::{
    LinearSolverType, SolverConfig, SolverType, TransientSpec, TsType,
};
use semifvm_rs::devices::mos::{build_oxide_slab, OxideSlabSpec};
use semifvm_rs::numerics::{newton, transient};
use semifvm_rs::solution::Variable;

/// The steady carrier profile under uniform generation with both faces
/// swept clean is the diffusion parabola `p(x) = G x (L - x) / (2 D)`.
#[test]
fn ric_carrier_profile_is_diffusion_limited() {
    let spec = OxideSlabSpec {
        nx: 16,
        ..OxideSlabSpec::default()
    };
    let mut sys = build_oxide_slab(&spec).unwrap();

    let mut cfg = SolverConfig::steady(SolverType::Ric);
    cfg.linear_solver = LinearSolverType::Lu;
    cfg.dose_rate = 1.0e6;
    newton::run_steady(&mut sys, &cfg).expect("steady RIC solve");

    // Normalized generation rate matching the RIC kernel.
    let s = &sys.scaling;
    let density = sys.regions[0].material.density;
    let g_norm = 0.8 * 8.1e12 * density * cfg.dose_rate * s.t / s.n;
    let d_norm = sys.regions[0].material.mu_n * s.v / s.d;
    let l_norm = spec.thickness / s.l;

    // Mid-plane CV.
    let mid = (0..sys.graph.n_fvm_nodes())
        .min_by(|&a, &b| {
            let xa = (sys.mesh.nodes[sys.graph.fvm_nodes[a].root].position.x
                - spec.thickness / 2.0)
                .abs();
            let xb = (sys.mesh.nodes[sys.graph.fvm_nodes[b].root].position.x
                - spec.thickness / 2.0)
                .abs();
            xa.total_cmp(&xb)
        })
        .unwrap();

    let p_mid = sys.graph.node_data[mid].get(Variable::Hole);
    let p_expected = g_norm * l_norm * l_norm / (8.0 * d_norm);
    let rel = (p_mid - p_expected).abs() / p_expected;
    assert!(
        rel < 0.1,
        "RIC mid-plane density {p_mid} vs parabola {p_expected} (rel {rel})"
    );

    // Contacts sweep the carriers out.
    let first = sys.graph.node_data[0].get(Variable::Hole);
    assert!(first.abs() < p_mid);
}

#[test]
fn tid_traps_build_up_monotonically() {
    let spec = OxideSlabSpec {
        nx: 10,
        ..OxideSlabSpec::default()
    };
    let mut sys = build_oxide_slab(&spec).unwrap();

    let mut cfg = SolverConfig::steady(SolverType::TidDrift);
    cfg.linear_solver = LinearSolverType::Lu;
    cfg.dose_rate = 1.0e6;
    cfg.max_iteration = 60;
    cfg.transient = Some(TransientSpec {
        ts_type: TsType::Bdf2,
        t_start: 0.0,
        t_stop: 1.0e-6,
        t_step: 2.0e-8,
        t_step_max: 2.0e-7,
        auto_step: true,
        predict: true,
        ts_rtol: 5e-2,
        ts_atol: 1e-6,
    });

    let mid = (0..sys.graph.n_fvm_nodes())
        .min_by(|&a, &b| {
            let xa = (sys.mesh.nodes[sys.graph.fvm_nodes[a].root].position.x
                - spec.thickness / 2.0)
                .abs();
            let xb = (sys.mesh.nodes[sys.graph.fvm_nodes[b].root].position.x
                - spec.thickness / 2.0)
                .abs();
            xa.total_cmp(&xb)
        })
        .unwrap();
    let mut history = Vec::new();
    let report = transient::run_transient(&mut sys, &cfg, |t, sys, _| {
        history.push((t, sys.graph.node_data[mid].get(Variable::TrappedCharge)));
    })
    .expect("TID transient");

    assert!(report.accepted > 0);
    assert!(history.last().unwrap().1 > 0.0, "no trapped charge built up");
    for w in history.windows(2) {
        assert!(w[1].1 >= w[0].1 - 1e-30, "trapped charge must not anneal");
    }

    // In the capture-limited regime nearly every generated hole traps:
    // N_t ~ G t in the slab interior.
    let s = &sys.scaling;
    let density = sys.regions[0].material.density;
    let g_norm = 0.8 * 8.1e12 * density * cfg.dose_rate * s.t / s.n;
    let (t_end, nt_end) = *history.last().unwrap();
    let expected = g_norm * s.time_norm(t_end);
    assert!(
        nt_end > 0.3 * expected && nt_end < 1.5 * expected,
        "trapped charge {nt_end} vs generated {expected}"
    );
}
