//! Control-volume graph invariants on a real device structure.

use semifvm_rs::devices::diode::{build_pn_diode_split, DiodeSpec};
use semifvm_rs::physics::{level_ops, region_variable_table};
use semifvm_rs::config::SolverType;
use semifvm_rs::solution::layout::DofLayout;

#[test]
fn ghost_links_mutual_with_matching_area() {
    let sys = build_pn_diode_split(&DiodeSpec {
        nx: 8,
        nt: 2,
        ..DiodeSpec::default()
    })
    .unwrap();

    let mut pairs = 0;
    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        for g in &node.ghosts {
            let Some(peer) = g.fvm else { continue };
            pairs += 1;
            let back = sys.graph.fvm_nodes[peer]
                .ghosts
                .iter()
                .find(|h| h.fvm == Some(fid))
                .expect("ghost linkage must be mutual");
            assert!(
                (back.area - g.area).abs() <= 1e-12 * g.area.abs().max(1e-300),
                "asymmetric interface area"
            );
        }
    }
    // One split plane of 3x3 nodes, counted from both sides.
    assert_eq!(pairs, 18);
}

#[test]
fn cv_surfaces_close() {
    let sys = build_pn_diode_split(&DiodeSpec {
        nx: 8,
        nt: 2,
        ..DiodeSpec::default()
    })
    .unwrap();

    for node in &sys.graph.fvm_nodes {
        let neighbors: f64 = node.neighbors.iter().map(|n| n.area).sum();
        let outside = node.outside_boundary_surface_area();
        let total = node.total_cv_boundary_area();
        assert!((neighbors + outside - total).abs() < 1e-12 * total);
        // Every CV of a bounded device has a closed surface.
        assert!(total > 0.0);
    }
}

#[test]
fn dof_layout_has_no_gaps() {
    let mut sys = build_pn_diode_split(&DiodeSpec {
        nx: 8,
        nt: 2,
        ..DiodeSpec::default()
    })
    .unwrap();

    let ops = level_ops(SolverType::Ddml1);
    let kinds = sys.region_kinds();
    let vars = region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout = DofLayout::build(&mut sys.graph, &sys.mesh, vars, &extras);

    let mut covered = vec![false; layout.n_dofs];
    for node in &sys.graph.fvm_nodes {
        assert!(node.is_valid());
        let m = layout.n_vars(node.region);
        for k in 0..m {
            assert!(!covered[node.global_offset + k], "overlapping DOF block");
            covered[node.global_offset + k] = true;
        }
    }
    for off in layout.bc_offsets.iter().flatten() {
        covered[*off] = true;
    }
    assert!(covered.into_iter().all(|c| c), "gap in the DOF layout");
}
