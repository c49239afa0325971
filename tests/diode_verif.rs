//! PN diode verification: thermal equilibrium, forward conduction and
//! interface continuity.

use semifvm_rs::config::{LinearSolverType, SolverConfig, SolverType, VoltageSweep};
use semifvm_rs::devices::diode::{build_pn_diode, build_pn_diode_split, DiodeSpec};
use semifvm_rs::numerics::{newton, sweep};
use semifvm_rs::solution::Variable;

fn test_cfg(solver: SolverType) -> SolverConfig {
    let mut cfg = SolverConfig::steady(solver);
    cfg.linear_solver = LinearSolverType::Lu;
    cfg
}

#[test]
fn equilibrium_mass_action_law() {
    let mut sys = build_pn_diode(&DiodeSpec {
        nx: 32,
        ..DiodeSpec::default()
    })
    .unwrap();

    let mut cfg = test_cfg(SolverType::Ddml1);
    cfg.poisson_abs_toler = 1e-10;
    cfg.elec_continuity_abs_toler = 1e-10;
    cfg.hole_continuity_abs_toler = 1e-10;
    cfg.max_iteration = 50;
    newton::run_steady(&mut sys, &cfg).expect("equilibrium solve");

    let ni = sys.scaling.ni_norm(sys.regions[0].material.ni);
    for fid in 0..sys.graph.n_fvm_nodes() {
        let data = &sys.graph.node_data[fid];
        let n = data.get(Variable::Electron);
        let p = data.get(Variable::Hole);
        let rel = (n * p / (ni * ni) - 1.0).abs();
        assert!(rel < 1e-6, "np != ni^2 at CV {fid}: rel {rel}");
    }

    // The built-in potential of a 1e17/1e17 abrupt silicon junction is
    // around 0.82 V at room temperature.
    let psi_min = (0..sys.graph.n_fvm_nodes())
        .map(|f| sys.graph.node_data[f].get(Variable::Potential))
        .fold(f64::INFINITY, f64::min);
    let psi_max = (0..sys.graph.n_fvm_nodes())
        .map(|f| sys.graph.node_data[f].get(Variable::Potential))
        .fold(f64::NEG_INFINITY, f64::max);
    let v_bi = (psi_max - psi_min) * sys.scaling.v;
    assert!(
        (0.7..0.95).contains(&v_bi),
        "built-in potential {v_bi} out of range"
    );

    // The potential rises monotonically from the p side to the n side:
    // walk the CVs along the axis in x order.
    let mut axis: Vec<(f64, f64)> = (0..sys.graph.n_fvm_nodes())
        .filter_map(|fid| {
            let pos = sys.mesh.nodes[sys.graph.fvm_nodes[fid].root].position;
            if pos.y != 0.0 || pos.z != 0.0 {
                return None;
            }
            Some((pos.x, sys.graph.node_data[fid].get(Variable::Potential)))
        })
        .collect();
    axis.sort_by(|a, b| a.0.total_cmp(&b.0));
    assert!(axis.len() > 2);
    for w in axis.windows(2) {
        assert!(
            w[1].1 >= w[0].1 - 1e-8,
            "psi not monotone across the junction: {} -> {} at x = {}",
            w[0].1,
            w[1].1,
            w[1].0
        );
    }
}

#[test]
fn forward_sweep_follows_the_diode_law() {
    let mut sys = build_pn_diode(&DiodeSpec {
        nx: 32,
        ..DiodeSpec::default()
    })
    .unwrap();

    // Equilibrium first, then ramp the anode.
    newton::run_steady(&mut sys, &test_cfg(SolverType::Ddml1)).expect("equilibrium");

    let mut cfg = test_cfg(SolverType::Ddml1);
    cfg.vsweep = Some(VoltageSweep {
        electrodes: vec!["anode".into()],
        v_start: 0.0,
        v_step: 0.05,
        v_step_max: 0.05,
        v_stop: 0.5,
    });
    let result = sweep::run_dc_sweep(&mut sys, &cfg).expect("forward sweep");

    let at = |v: f64| {
        result
            .points
            .iter()
            .find(|p| (p.v - v).abs() < 1e-9)
            .unwrap_or_else(|| panic!("no bias point at {v}"))
            .i
    };

    // Near-zero current in equilibrium.
    assert!(at(0.0).abs() < 1e-12);
    // Forward current is positive into the anode and grows exponentially:
    // 0.1 V is about four thermal voltages.
    let (i3, i4, i5) = (at(0.3), at(0.4), at(0.5));
    assert!(i3 > 0.0);
    let r1 = i4 / i3;
    let r2 = i5 / i4;
    assert!(
        (5.0..2000.0).contains(&r1),
        "current ratio per 0.1 V: {r1}"
    );
    assert!(
        (5.0..2000.0).contains(&r2),
        "current ratio per 0.1 V: {r2}"
    );
    // An ideality factor near one keeps the two decades comparable.
    assert!(r2 < r1 * 3.0 && r1 < r2 * 30.0);
}

#[test]
fn schottky_contact_rectifies() {
    use glam::DVec3;
    use semifvm_rs::bc::{BcKind, BoundaryCondition};
    use semifvm_rs::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
    use semifvm_rs::system::SimulationSystem;

    let length = 2.0e-4;
    let build = || {
        let mesh = MeshBuilder::new(32, 1, 1, DVec3::new(length, 1e-4, 1e-4)).build(
            vec![RegionSpec {
                name: "bulk".into(),
                material: "Si".into(),
                kind: RegionKind::Semiconductor,
            }],
            |_| 0,
            |c, _| {
                if c.x < 1e-30 {
                    Some("anode".into())
                } else if c.x > length * (1.0 - 1e-9) {
                    Some("cathode".into())
                } else {
                    None
                }
            },
        );
        let mut sys = SimulationSystem::build(mesh, |_| (1e16, 0.0)).unwrap();
        let anode = sys.mesh.boundary_id("anode").unwrap();
        let nodes = sys.graph.boundary_nodes[anode].clone();
        sys.add_bc(BoundaryCondition::new(
            &nodes,
            "anode",
            anode,
            BcKind::SchottkyContact { barrier: 0.6 },
        ));
        let cathode = sys.mesh.boundary_id("cathode").unwrap();
        let nodes = sys.graph.boundary_nodes[cathode].clone();
        sys.add_bc(BoundaryCondition::new(
            &nodes,
            "cathode",
            cathode,
            BcKind::OhmicContact,
        ));
        sys
    };

    let run = |target: f64| -> f64 {
        let mut sys = build();
        let mut cfg = test_cfg(SolverType::Ddml1);
        cfg.max_iteration = 120;
        newton::run_steady(&mut sys, &cfg).expect("equilibrium");
        cfg.vsweep = Some(VoltageSweep {
            electrodes: vec!["anode".into()],
            v_start: 0.0,
            v_step: 0.05,
            v_step_max: 0.05,
            v_stop: target,
        });
        let result = sweep::run_dc_sweep(&mut sys, &cfg).expect("schottky sweep");
        result.points.last().unwrap().i
    };

    let i_fwd = run(0.2);
    let i_rev = run(-0.2);
    assert!(i_fwd > 0.0, "forward Schottky current must be positive");
    assert!(
        i_fwd.abs() > 5.0 * i_rev.abs(),
        "no rectification: forward {i_fwd}, reverse {i_rev}"
    );
}

#[test]
fn homojunction_interface_is_bit_equal() {
    let mut sys = build_pn_diode_split(&DiodeSpec {
        nx: 16,
        nt: 2,
        ..DiodeSpec::default()
    })
    .unwrap();

    newton::run_steady(&mut sys, &test_cfg(SolverType::Ddml1)).expect("equilibrium");

    let mut split_nodes = 0;
    for fids in &sys.graph.by_root {
        if fids.len() < 2 {
            continue;
        }
        split_nodes += 1;
        let a = &sys.graph.node_data[fids[0]];
        for &other in &fids[1..] {
            let b = &sys.graph.node_data[other];
            for var in [Variable::Potential, Variable::Electron, Variable::Hole] {
                assert_eq!(
                    a.get(var).to_bits(),
                    b.get(var).to_bits(),
                    "{var:?} differs across the interface"
                );
            }
        }
    }
    assert!(split_nodes > 0, "the split junction must share nodes");
}
