//! Contact boundary operators: Ohmic, Schottky and lumped gate stacks,
//! plus electrode current extraction and the external-circuit equation.
//!
//! Contacts replace nodal equations: the preprocess phase reports the rows
//! to clear, the function phase inserts the contact equations, and the
//! Jacobian phase adds their derivatives into the zeroed rows. An
//! electrode with an external circuit solves its own potential in an extra
//! DOF whose row balances the lumped circuit against the integrated
//! contact current.

use nalgebra::{Dyn, U1};
use num_dual::Derivative;

use super::BoundaryCondition;
use crate::assembly::driver::Preprocess;
use crate::assembly::matrix::{SparsityPattern, SystemMatrix, SystemVector};
use crate::config::SolverConfig;
use crate::discretization::mesh::RegionKind;
use crate::error::Result;
use crate::physics::sg::{electron_flux, hole_flux};
use crate::physics::units::Q;
use crate::physics::{Ad, LevelOps};
use crate::solution::layout::DofLayout;
use crate::solution::Variable;
use crate::system::SimulationSystem;

/// Thermionic surface recombination velocity [cm/s].
const SCHOTTKY_VSURF: f64 = 1.0e7;

/// Applied electrode potential, normalized: either the solved circuit DOF
/// or the bias set by the sweep controller.
fn electrode_potential(
    bc: &BoundaryCondition,
    layout: &DofLayout,
    bc_index: usize,
    x: &[f64],
) -> f64 {
    match layout.bc_offsets[bc_index] {
        Some(off) => x[off],
        None => bc.v_app,
    }
}

/// Rows a contact node surrenders to the contact equations. Ohmic
/// contacts replace every nodal equation; Schottky contacts keep the
/// carrier continuity equations (they only gain a thermionic surface
/// flux) and replace potential and temperatures.
pub fn contact_preprocess(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    out: &mut Preprocess,
) {
    let schottky = matches!(bc.kind, super::BcKind::SchottkyContact { .. });
    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let region = sys.graph.fvm_nodes[fid].region;
            let semiconductor = sys.regions[region].kind == RegionKind::Semiconductor;
            for &var in layout.region_vars[region].iter() {
                if schottky
                    && semiconductor
                    && matches!(var, Variable::Electron | Variable::Hole)
                {
                    continue;
                }
                if let Some(dof) = layout.dof(&sys.graph, fid, var) {
                    out.clear.push(dof);
                }
            }
        }
    }
}

pub fn contact_reserve(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    bc_index: usize,
    pattern: &mut SparsityPattern,
) {
    let Some(e_row) = layout.bc_offsets[bc_index] else {
        // Without a circuit the electrode potential is a known bias and no
        // extra couplings appear.
        return;
    };
    pattern.reserve(e_row, e_row);
    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let m = layout.n_vars(cv.region);
            // Node rows feel the electrode potential...
            pattern.reserve_block(cv.global_offset, m, e_row, 1);
            // ...and the electrode row feels the contact node and every
            // neighbor the contact current flows through.
            pattern.reserve_block(e_row, 1, cv.global_offset, m);
            for nb in &cv.neighbors {
                let nb_cv = &sys.graph.fvm_nodes[nb.fvm];
                pattern.reserve_block(e_row, 1, nb_cv.global_offset, layout.n_vars(nb_cv.region));
            }
        }
    }
}

/// Normalized conduction current from the contact into the device,
/// together with its derivatives w.r.t. the involved DOFs when `seeds` is
/// provided.
fn contact_current_ad(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    layout: &DofLayout,
    x: &[f64],
    mut on_derivative: Option<&mut dyn FnMut(usize, f64)>,
) -> f64 {
    let mut current = 0.0;
    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let region = &sys.regions[cv.region];
            if region.kind != RegionKind::Semiconductor {
                continue;
            }
            let m = layout.n_vars(cv.region);
            let off_i = cv.global_offset;
            let s = &sys.scaling;
            let dn = region.material.mu_n * s.v / s.d;
            let dp = region.material.mu_p * s.v / s.d;

            let i_n = layout.var_index(cv.region, Variable::Electron);
            let i_p = layout.var_index(cv.region, Variable::Hole);
            let (Some(i_n), Some(i_p)) = (i_n, i_p) else {
                continue;
            };

            for nb in &cv.neighbors {
                // Skip edges between two contact nodes: no net current
                // crosses the equipotential surface along them.
                if bc.nodes.binary_search(&nb.node).is_ok() {
                    continue;
                }
                let off_j = sys.graph.fvm_nodes[nb.fvm].global_offset;
                let geom = nb.area / nb.distance;

                let seed = |k: usize, v: f64| {
                    Ad::new(v, Derivative::derivative_generic(Dyn(2 * m), U1, k))
                };
                let psi_i = seed(0, x[off_i]);
                let psi_j = seed(m, x[off_j]);
                let n_i = seed(i_n, x[off_i + i_n]);
                let n_j = seed(m + i_n, x[off_j + i_n]);
                let p_i = seed(i_p, x[off_i + i_p]);
                let p_j = seed(m + i_p, x[off_j + i_p]);

                let dpsi = psi_j - psi_i;
                let f_n = electron_flux(dn * geom, &dpsi, &n_i, &n_j);
                let f_p = hole_flux(dp * geom, &dpsi, &p_i, &p_j);
                // Conventional current into the device: holes carry +q
                // along their particle flux, electrons -q.
                let i_edge = f_p - f_n;

                current += i_edge.re;
                if let Some(cb) = on_derivative.as_mut() {
                    let d = i_edge.eps.unwrap_generic(Dyn(2 * m), U1);
                    for k in 0..m {
                        if d[(k, 0)] != 0.0 {
                            cb(off_i + k, d[(k, 0)]);
                        }
                        if d[(m + k, 0)] != 0.0 {
                            cb(off_j + k, d[(m + k, 0)]);
                        }
                    }
                }
            }
        }
    }
    current
}

/// Electrode conduction current in amperes at the state `x`.
pub fn electrode_current(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    layout: &DofLayout,
    x: &[f64],
) -> f64 {
    sys.scaling
        .current(contact_current_ad(bc, sys, layout, x, None))
}

/// Sensitivity of the normalized conduction current to every involved
/// DOF, `dI/dx`, at the state `x`. Feeds the AC admittance extraction and
/// the circuit-cosimulation load export.
pub fn conduction_sensitivity(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    layout: &DofLayout,
    x: &[f64],
) -> Vec<(usize, f64)> {
    let mut entries = Vec::new();
    contact_current_ad(
        bc,
        sys,
        layout,
        x,
        Some(&mut |dof, di| entries.push((dof, di))),
    );
    entries
}

/// Normalized external-circuit equation residual with its sensitivities
/// to the electrode current and voltage:
/// `L dI/dt + R I + V_e + q_c / C - V_src = 0` in solver units, or a
/// plain current balance for a current-driven electrode.
fn circuit_residual(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    v_e: f64,
    current: f64,
) -> (f64, f64, f64) {
    let circuit = bc.circuit.as_ref().expect("circuit row without circuit");
    let s = &sys.scaling;
    let i_scale = Q * s.n * s.d * s.l;

    if circuit.i_src != 0.0 {
        return (current - circuit.i_src / i_scale, 1.0, 0.0);
    }

    let r_norm = circuit.r * i_scale / s.v;
    let mut residual = v_e + r_norm * current - circuit.v_src / s.v;
    let mut di_coeff = r_norm;
    if circuit.dt > 0.0 {
        if circuit.l > 0.0 {
            let l_norm = circuit.l * i_scale / (s.v * s.t);
            residual += l_norm * (current - circuit.i_last / i_scale) / circuit.dt;
            di_coeff += l_norm / circuit.dt;
        }
        if circuit.c > 0.0 {
            // q_c is kept in coulombs by the transient controller.
            residual += circuit.q_c / (circuit.c * s.v);
        }
    }
    (residual, di_coeff, 1.0)
}

#[allow(clippy::too_many_arguments)]
pub fn ohmic_function(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    _cfg: &SolverConfig,
    bc_index: usize,
    x: &[f64],
    f: &mut SystemVector,
) -> Result<()> {
    let v_e = electrode_potential(bc, layout, bc_index, x);

    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let kind = sys.regions[cv.region].kind;
            let off = cv.global_offset;

            match kind {
                RegionKind::Semiconductor => {
                    let psi_b = sys.ohmic_potential(fid);
                    let (n_eq, p_eq) = sys.ohmic_carriers(fid);
                    for (k, &var) in layout.region_vars[cv.region].iter().enumerate() {
                        let value = match var {
                            Variable::Potential => x[off + k] - psi_b - v_e,
                            Variable::Electron => x[off + k] - n_eq,
                            Variable::Hole => x[off + k] - p_eq,
                            // Contacts sit at the ambient temperature.
                            _ => x[off + k] - 1.0,
                        };
                        f.insert(off + k, value);
                    }
                }
                _ => {
                    for (k, &var) in layout.region_vars[cv.region].iter().enumerate() {
                        let value = match var {
                            Variable::Potential => x[off + k] - v_e,
                            Variable::LatticeTemp => x[off + k] - 1.0,
                            // Radiation carriers and trapped charge vanish
                            // at an electrode.
                            _ => x[off + k],
                        };
                        f.insert(off + k, value);
                    }
                }
            }
        }
    }

    if let Some(e_row) = layout.bc_offsets[bc_index] {
        let current = contact_current_ad(bc, sys, layout, x, None);
        let (residual, _, _) = circuit_residual(bc, sys, v_e, current);
        f.insert(e_row, residual);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn ohmic_jacobian(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    _cfg: &SolverConfig,
    bc_index: usize,
    x: &[f64],
    jac: &mut SystemMatrix,
) -> Result<()> {
    let e_row = layout.bc_offsets[bc_index];

    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let off = cv.global_offset;
            for (k, &var) in layout.region_vars[cv.region].iter().enumerate() {
                jac.add(off + k, off + k, 1.0)?;
                if var == Variable::Potential {
                    if let Some(e) = e_row {
                        jac.add(off + k, e, -1.0)?;
                    }
                }
            }
        }
    }

    if let Some(e) = e_row {
        let v_e = electrode_potential(bc, layout, bc_index, x);
        let mut entries: Vec<(usize, f64)> = Vec::new();
        let current = contact_current_ad(
            bc,
            sys,
            layout,
            x,
            Some(&mut |dof, di| entries.push((dof, di))),
        );
        let (_, di_coeff, dv_coeff) = circuit_residual(bc, sys, v_e, current);
        jac.add(e, e, dv_coeff)?;
        for (dof, di) in entries {
            jac.add(e, dof, di_coeff * di)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn schottky_function(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    _cfg: &SolverConfig,
    bc_index: usize,
    barrier: f64,
    x: &[f64],
    f: &mut SystemVector,
) -> Result<()> {
    let v_e = electrode_potential(bc, layout, bc_index, x);
    let s = &sys.scaling;
    let phi_b = barrier / s.v;
    let v_surf = SCHOTTKY_VSURF * s.l / s.d;

    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let kind = sys.regions[cv.region].kind;
            let off = cv.global_offset;
            let area = sys.graph.boundary_area(bc.boundary_id, fid);

            if kind != RegionKind::Semiconductor {
                for (k, &var) in layout.region_vars[cv.region].iter().enumerate() {
                    let value = match var {
                        Variable::Potential => x[off + k] - v_e,
                        _ => x[off + k] - 1.0,
                    };
                    f.insert(off + k, value);
                }
                continue;
            }

            let ni = s.ni_norm(sys.regions[cv.region].material.ni);
            let n_b0 = ni * (-phi_b).exp();
            let p_b0 = ni * phi_b.exp();

            for (k, &var) in layout.region_vars[cv.region].iter().enumerate() {
                match var {
                    // Pinned surface potential under the barrier.
                    Variable::Potential => f.insert(off + k, x[off + k] + phi_b - v_e),
                    // Thermionic emission: surface recombination flux added
                    // on top of the bulk continuity equation.
                    Variable::Electron => {
                        f.add(off + k, v_surf * (x[off + k] - n_b0) * area);
                    }
                    Variable::Hole => {
                        f.add(off + k, v_surf * (x[off + k] - p_b0) * area);
                    }
                    _ => f.insert(off + k, x[off + k] - 1.0),
                }
            }
        }
    }

    if let Some(e_row) = layout.bc_offsets[bc_index] {
        let current = contact_current_ad(bc, sys, layout, x, None);
        let (residual, _, _) = circuit_residual(bc, sys, v_e, current);
        f.insert(e_row, residual);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn schottky_jacobian(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    _cfg: &SolverConfig,
    bc_index: usize,
    _barrier: f64,
    x: &[f64],
    jac: &mut SystemMatrix,
) -> Result<()> {
    let e_row = layout.bc_offsets[bc_index];
    let s = &sys.scaling;
    let v_surf = SCHOTTKY_VSURF * s.l / s.d;

    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let kind = sys.regions[cv.region].kind;
            let off = cv.global_offset;
            let area = sys.graph.boundary_area(bc.boundary_id, fid);

            for (k, &var) in layout.region_vars[cv.region].iter().enumerate() {
                match (kind, var) {
                    (RegionKind::Semiconductor, Variable::Electron)
                    | (RegionKind::Semiconductor, Variable::Hole) => {
                        jac.add(off + k, off + k, v_surf * area)?;
                    }
                    (_, Variable::Potential) => {
                        jac.add(off + k, off + k, 1.0)?;
                        if let Some(e) = e_row {
                            jac.add(off + k, e, -1.0)?;
                        }
                    }
                    _ => {
                        jac.add(off + k, off + k, 1.0)?;
                    }
                }
            }
        }
    }

    if let Some(e) = e_row {
        let v_e = electrode_potential(bc, layout, bc_index, x);
        let mut entries: Vec<(usize, f64)> = Vec::new();
        let current = contact_current_ad(
            bc,
            sys,
            layout,
            x,
            Some(&mut |dof, di| entries.push((dof, di))),
        );
        let (_, di_coeff, dv_coeff) = circuit_residual(bc, sys, v_e, current);
        jac.add(e, e, dv_coeff)?;
        for (dof, di) in entries {
            jac.add(e, dof, di_coeff * di)?;
        }
    }
    Ok(())
}

pub fn gate_reserve(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    bc_index: usize,
    pattern: &mut SparsityPattern,
) {
    let Some(e_row) = layout.bc_offsets[bc_index] else {
        return;
    };
    pattern.reserve(e_row, e_row);
    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            if let Some(psi) = layout.dof(&sys.graph, fid, Variable::Potential) {
                pattern.reserve(psi, e_row);
                pattern.reserve(e_row, psi);
            }
        }
    }
}

/// Lumped gate stack on an insulator surface: the oxide capacitor charge
/// `eps_ox (V_e - W - psi) / t_ox + Q_f` enters the surface Poisson rows
/// as a flux.
#[allow(clippy::too_many_arguments)]
pub fn gate_function(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    bc_index: usize,
    work_function: f64,
    thickness: f64,
    eps_ox: f64,
    qf: f64,
    x: &[f64],
    f: &mut SystemVector,
) -> Result<()> {
    let v_e = electrode_potential(bc, layout, bc_index, x);
    let s = &sys.scaling;
    let wf = work_function / s.v;
    let eps_norm = eps_ox / s.eps_ref;
    let t_norm = thickness / s.l;
    let qf_norm = qf / (Q * s.n * s.l);

    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let Some(psi_row) = layout.dof(&sys.graph, fid, Variable::Potential) else {
                continue;
            };
            let area = sys.graph.boundary_area(bc.boundary_id, fid);
            let psi = x[psi_row];
            let dp = area * (eps_norm * (v_e - wf - psi) / t_norm + qf_norm);
            f.add(psi_row, -dp);
        }
    }

    if let Some(e_row) = layout.bc_offsets[bc_index] {
        // Gate conduction current is zero; the circuit row reduces to the
        // source balance.
        let (residual, _, _) = circuit_residual(bc, sys, v_e, 0.0);
        f.insert(e_row, residual);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn gate_jacobian(
    bc: &BoundaryCondition,
    sys: &SimulationSystem,
    _ops: &dyn LevelOps,
    layout: &DofLayout,
    bc_index: usize,
    _work_function: f64,
    thickness: f64,
    eps_ox: f64,
    _qf: f64,
    _x: &[f64],
    jac: &mut SystemMatrix,
) -> Result<()> {
    let s = &sys.scaling;
    let eps_norm = eps_ox / s.eps_ref;
    let t_norm = thickness / s.l;
    let e_row = layout.bc_offsets[bc_index];

    for &node in &bc.nodes {
        for &fid in &sys.graph.by_root[node] {
            let cv = &sys.graph.fvm_nodes[fid];
            let Some(psi_row) = layout.dof(&sys.graph, fid, Variable::Potential) else {
                continue;
            };
            let area = sys.graph.boundary_area(bc.boundary_id, fid);
            let g = area * eps_norm / t_norm;
            jac.add(psi_row, psi_row, g)?;
            if let Some(e) = e_row {
                jac.add(psi_row, e, -g)?;
            }
        }
    }

    if let Some(e) = e_row {
        jac.add(e, e, 1.0)?;
    }
    Ok(())
}
