//! Energy-balance (EBM3) verification on a uniform silicon resistor bar:
//! carrier temperatures sit at the lattice temperature in equilibrium and
//! rise above it under a driving field.

use glam::DVec3;
use semifvm_rs::bc::{BcKind, BoundaryCondition};
use semifvm_rs::config::{LinearSolverType, SolverConfig, SolverType};
use semifvm_rs::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
use semifvm_rs::numerics::newton;
use semifvm_rs::solution::Variable;
use semifvm_rs::system::SimulationSystem;

const LENGTH: f64 = 2.0e-4;

/// Uniform n-type bar with ohmic contacts at both ends.
fn build_bar() -> SimulationSystem {
    let mesh = MeshBuilder::new(40, 1, 1, DVec3::new(LENGTH, 1e-4, 1e-4)).build(
        vec![RegionSpec {
            name: "bulk".into(),
            material: "Si".into(),
            kind: RegionKind::Semiconductor,
        }],
        |_| 0,
        |c, _| {
            if c.x < 1e-30 {
                Some("left".into())
            } else if c.x > LENGTH * (1.0 - 1e-9) {
                Some("right".into())
            } else {
                None
            }
        },
    );
    let mut sys = SimulationSystem::build(mesh, |_| (1e16, 0.0)).unwrap();
    for name in ["left", "right"] {
        let id = sys.mesh.boundary_id(name).unwrap();
        let nodes = sys.graph.boundary_nodes[id].clone();
        sys.add_bc(BoundaryCondition::new(&nodes, name, id, BcKind::OhmicContact));
    }
    sys
}

fn ebm3_cfg() -> SolverConfig {
    let mut cfg = SolverConfig::steady(SolverType::Ebm3);
    cfg.linear_solver = LinearSolverType::Lu;
    cfg.max_iteration = 80;
    cfg
}

/// Extremes of a nodal variable over the whole device.
fn var_range(sys: &SimulationSystem, var: Variable) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for fid in 0..sys.graph.n_fvm_nodes() {
        let v = sys.graph.node_data[fid].get(var);
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (lo, hi)
}

#[test]
fn carrier_temperatures_relax_to_lattice_in_equilibrium() {
    let mut sys = build_bar();
    let cfg = ebm3_cfg();
    newton::run_steady(&mut sys, &cfg).expect("EBM3 equilibrium solve");

    // Zero field, zero current: both carrier gases sit at the lattice
    // temperature, and the lattice at ambient.
    for var in [Variable::LatticeTemp, Variable::ElecTemp, Variable::HoleTemp] {
        let (lo, hi) = var_range(&sys, var);
        assert!(
            (lo - 1.0).abs() < 1e-6 && (hi - 1.0).abs() < 1e-6,
            "{var:?} must equal the ambient temperature at equilibrium: [{lo}, {hi}]"
        );
    }

    // The carrier solution itself stays the DDM1 equilibrium.
    let ni = sys.scaling.ni_norm(sys.regions[0].material.ni);
    for fid in 0..sys.graph.n_fvm_nodes() {
        let data = &sys.graph.node_data[fid];
        let rel = (data.get(Variable::Electron) * data.get(Variable::Hole) / (ni * ni) - 1.0)
            .abs();
        assert!(rel < 1e-4, "np != ni^2 at CV {fid}: rel {rel}");
    }
}

#[test]
fn electrons_heat_up_in_a_driven_bar() {
    let mut sys = build_bar();
    let cfg = ebm3_cfg();
    newton::run_steady(&mut sys, &cfg).expect("equilibrium");

    // Step the bias up, then repeat the final point once so the field
    // heating sees the converged field of the full bias.
    let left = sys.bc_by_name("left").unwrap();
    for v in [0.25, 0.5, 0.5] {
        sys.bcs[left].v_app = v / sys.scaling.v;
        newton::run_steady(&mut sys, &cfg).expect("biased solve");
    }

    // 0.5 V across 2 um is ~2.5 kV/cm: electrons run a few percent above
    // the lattice in the bulk, holes are too sparse to matter but their
    // temperature must stay physical.
    let (_, tn_max) = var_range(&sys, Variable::ElecTemp);
    assert!(
        tn_max > 1.01,
        "no hot electrons under a 2.5 kV/cm field: max Tn {tn_max}"
    );
    assert!(tn_max < 1.5, "implausible electron heating: max Tn {tn_max}");

    let (tp_min, tp_max) = var_range(&sys, Variable::HoleTemp);
    assert!(tp_min >= 0.9 && tp_max < 1.5, "hole temperature out of range");

    // Contacts pin the carrier gases at ambient.
    let contact_nodes = sys.bcs[left].nodes.clone();
    for &node in &contact_nodes {
        for &fid in &sys.graph.by_root[node] {
            let tn = sys.graph.node_data[fid].get(Variable::ElecTemp);
            assert!((tn - 1.0).abs() < 1e-8, "contact Tn must stay ambient");
        }
    }

    // The lattice warms (or at worst stays ambient) but never cools.
    let (tl_min, _) = var_range(&sys, Variable::LatticeTemp);
    assert!(tl_min > 1.0 - 1e-6);
}
