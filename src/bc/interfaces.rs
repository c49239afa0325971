//! Interface boundary operators: homojunction, heterojunction,
//! insulator-semiconductor, insulator-insulator and the outer Neumann
//! surface.
//!
//! Interfaces use the fold discipline: the volume balance of every
//! secondary CV at a shared node is summed into the primary CV's row
//! (flux continuity across the interface), the secondary row is cleared,
//! and a continuity equation takes its place. Heterojunction carriers
//! exchange through a thermionic emission flux instead of being folded.

use super::{BcKind, BoundaryCondition};
use crate::assembly::driver::Preprocess;
use crate::assembly::matrix::{SparsityPattern, SystemMatrix, SystemVector};
use crate::error::Result;
use crate::physics::units::Q;
use crate::physics::LevelOps;
use crate::solution::layout::DofLayout;
use crate::solution::Variable;
use crate::system::SimulationSystem;

/// Thermionic exchange velocity across a heterojunction [cm/s].
const HETERO_VSURF: f64 = 1.0e7;

/// Variables whose rows fold across this interface kind.
fn folded_vars(kind: &BcKind) -> &'static [Variable] {
    use Variable::*;
    match kind {
        BcKind::HomoInterface => &[Potential, Electron, Hole, LatticeTemp],
        BcKind::HeteroInterface => &[Potential, LatticeTemp],
        BcKind::InsulatorInterface { .. } | BcKind::InsulatorInsulatorInterface => {
            &[Potential, LatticeTemp]
        }
        _ => &[],
    }
}

/// Interface area between two CVs sharing a root node.
fn ghost_area(sys: &SimulationSystem, a: usize, b: usize) -> f64 {
    sys.graph.fvm_nodes[a]
        .ghosts
        .iter()
        .find(|g| g.fvm == Some(b))
        .map_or(0.0, |g| g.area)
}

pub fn interface_preprocess(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    out: &mut Preprocess,
) {
    for &node in &bc.nodes {
        let fids = &sys.graph.by_root[node];
        let Some((&primary, rest)) = fids.split_first() else {
            continue;
        };
        for &sec in rest {
            for &var in folded_vars(&bc.kind) {
                let (Some(src), Some(dst)) = (
                    layout.dof(&sys.graph, sec, var),
                    layout.dof(&sys.graph, primary, var),
                ) else {
                    continue;
                };
                out.src_dst.push((src, dst));
            }
        }
    }
}

pub fn interface_reserve(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    pattern: &mut SparsityPattern,
) {
    for &node in &bc.nodes {
        let fids = &sys.graph.by_root[node];
        let Some((&primary, rest)) = fids.split_first() else {
            continue;
        };
        for &sec in rest {
            for &var in folded_vars(&bc.kind) {
                let (Some(src), Some(dst)) = (
                    layout.dof(&sys.graph, sec, var),
                    layout.dof(&sys.graph, primary, var),
                ) else {
                    continue;
                };
                // Continuity equation couples the cleared row to the peer;
                // the fold pushes the secondary row's stencil into the
                // primary row.
                pattern.reserve(src, dst);
                pattern.reserve_row_union(src, dst);
            }
            if matches!(bc.kind, BcKind::HeteroInterface) {
                // Thermionic carrier exchange couples the two CV blocks.
                let p_cv = &sys.graph.fvm_nodes[primary];
                let s_cv = &sys.graph.fvm_nodes[sec];
                pattern.reserve_block(
                    p_cv.global_offset,
                    layout.n_vars(p_cv.region),
                    s_cv.global_offset,
                    layout.n_vars(s_cv.region),
                );
                pattern.reserve_block(
                    s_cv.global_offset,
                    layout.n_vars(s_cv.region),
                    p_cv.global_offset,
                    layout.n_vars(p_cv.region),
                );
            }
        }
    }
}

pub fn interface_function(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    x: &[f64],
    f: &mut SystemVector,
) -> Result<()> {
    for &node in &bc.nodes {
        let fids = &sys.graph.by_root[node];
        let Some((&primary, rest)) = fids.split_first() else {
            continue;
        };
        for &sec in rest {
            // Continuity: the secondary value equals the primary value.
            for &var in folded_vars(&bc.kind) {
                let (Some(src), Some(dst)) = (
                    layout.dof(&sys.graph, sec, var),
                    layout.dof(&sys.graph, primary, var),
                ) else {
                    continue;
                };
                f.insert(src, x[src] - x[dst]);
            }

            match &bc.kind {
                BcKind::InsulatorInterface { qf } => {
                    // Fixed interface charge enters the surviving Poisson
                    // row as surface charge.
                    let s = &sys.scaling;
                    let qf_norm = qf / (Q * s.n * s.l);
                    if qf_norm != 0.0 {
                        if let Some(psi_row) =
                            layout.dof(&sys.graph, primary, Variable::Potential)
                        {
                            let area = ghost_area(sys, primary, sec);
                            f.add(psi_row, -qf_norm * area);
                        }
                    }
                }
                BcKind::HeteroInterface => {
                    hetero_thermionic(bc, sys, layout, primary, sec, x, |row, v| {
                        f.add(row, v)
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

pub fn interface_jacobian(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    x: &[f64],
    jac: &mut SystemMatrix,
) -> Result<()> {
    for &node in &bc.nodes {
        let fids = &sys.graph.by_root[node];
        let Some((&primary, rest)) = fids.split_first() else {
            continue;
        };
        for &sec in rest {
            for &var in folded_vars(&bc.kind) {
                let (Some(src), Some(dst)) = (
                    layout.dof(&sys.graph, sec, var),
                    layout.dof(&sys.graph, primary, var),
                ) else {
                    continue;
                };
                jac.add(src, src, 1.0)?;
                jac.add(src, dst, -1.0)?;
            }

            if matches!(bc.kind, BcKind::HeteroInterface) {
                hetero_thermionic_jacobian(bc, sys, layout, primary, sec, x, jac)?;
            }
        }
    }
    Ok(())
}

/// Thermionic emission exchange for one heterojunction node pair:
/// `F = v_t A (n_sec - n_prim exp(-dEc))`, leaving the secondary side.
fn hetero_thermionic(
    _bc: &BoundaryCondition,
    sys: &SimulationSystem,
    layout: &DofLayout,
    primary: usize,
    sec: usize,
    x: &[f64],
    mut add: impl FnMut(usize, f64),
) {
    let s = &sys.scaling;
    let v_t = HETERO_VSURF * s.l / s.d;
    let area = ghost_area(sys, primary, sec);
    if area == 0.0 {
        return;
    }

    let aff_p = sys.graph.node_data[primary].aux.affinity;
    let aff_s = sys.graph.node_data[sec].aux.affinity;
    // Conduction-band step seen by electrons crossing sec -> primary.
    let dec = ((aff_p - aff_s) / s.v).max(0.0);
    let dev = ((aff_s - aff_p) / s.v).max(0.0);

    let pairs = [
        (Variable::Electron, dec),
        (Variable::Hole, dev),
    ];
    for (var, barrier) in pairs {
        let (Some(row_p), Some(row_s)) = (
            layout.dof(&sys.graph, primary, var),
            layout.dof(&sys.graph, sec, var),
        ) else {
            continue;
        };
        let flux = v_t * area * (x[row_s] - x[row_p] * (-barrier).exp());
        add(row_s, flux);
        add(row_p, -flux);
    }
}

fn hetero_thermionic_jacobian(
    _bc: &BoundaryCondition,
    sys: &SimulationSystem,
    layout: &DofLayout,
    primary: usize,
    sec: usize,
    _x: &[f64],
    jac: &mut SystemMatrix,
) -> Result<()> {
    let s = &sys.scaling;
    let v_t = HETERO_VSURF * s.l / s.d;
    let area = ghost_area(sys, primary, sec);
    if area == 0.0 {
        return Ok(());
    }

    let aff_p = sys.graph.node_data[primary].aux.affinity;
    let aff_s = sys.graph.node_data[sec].aux.affinity;
    let dec = ((aff_p - aff_s) / s.v).max(0.0);
    let dev = ((aff_s - aff_p) / s.v).max(0.0);

    for (var, barrier) in [(Variable::Electron, dec), (Variable::Hole, dev)] {
        let (Some(row_p), Some(row_s)) = (
            layout.dof(&sys.graph, primary, var),
            layout.dof(&sys.graph, sec, var),
        ) else {
            continue;
        };
        let g = v_t * area;
        let gb = g * (-barrier).exp();
        jac.add(row_s, row_s, g)?;
        jac.add(row_s, row_p, -gb)?;
        jac.add(row_p, row_s, -g)?;
        jac.add(row_p, row_p, gb)?;
    }
    Ok(())
}

/// Outer Neumann surface: natural (zero flux) for carriers and potential,
/// Robin heat exchange `h (T - T_ext) A` when a heat equation is active.
#[allow(clippy::too_many_arguments)]
pub fn neumann_function(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    h: f64,
    t_ext: f64,
    x: &[f64],
    f: &mut SystemVector,
) -> Result<()> {
    if h == 0.0 {
        return Ok(());
    }
    let coeff = sys.scaling.h_norm(h) * sys.scaling.thermal_diffusivity();
    let t_ext_norm = t_ext / sys.scaling.t_k;
    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let Some(t_row) = layout.dof(&sys.graph, fid, Variable::LatticeTemp) else {
                continue;
            };
            let area = sys.graph.boundary_area(bc.boundary_id, fid);
            f.add(t_row, coeff * (x[t_row] - t_ext_norm) * area);
        }
    }
    Ok(())
}

pub fn neumann_jacobian(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    h: f64,
    _x: &[f64],
    jac: &mut SystemMatrix,
) -> Result<()> {
    if h == 0.0 {
        return Ok(());
    }
    let coeff = sys.scaling.h_norm(h) * sys.scaling.thermal_diffusivity();
    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let Some(t_row) = layout.dof(&sys.graph, fid, Variable::LatticeTemp) else {
                continue;
            };
            let area = sys.graph.boundary_area(bc.boundary_id, fid);
            jac.add(t_row, t_row, coeff * area)?;
        }
    }
    Ok(())
}
