//! Small-signal AC sweep around a DC operating point.
//!
//! Each real DOF becomes a `(re, im)` pair and the transient derivative
//! becomes multiplication by `j omega`: the doubled real system
//! `[[J, -wM], [wM, J]]` is solved once per frequency, where `J` is the
//! DC Jacobian (with its boundary rows) and `M` the storage mass matrix
//! with the same interface folds applied. Terminal admittance combines
//! the linearized conduction current with the displacement current of the
//! contact's field (or gate-oxide) charge.

use num_complex::Complex64;

use super::linear;
use super::newton::solve_nonlinear;
use crate::assembly::driver::{
    assemble_jacobian, assemble_mass, build_pattern, collect_preprocess,
};
use crate::assembly::matrix::SystemMatrix;
use crate::bc::contacts::conduction_sensitivity;
use crate::bc::BcKind;
use crate::config::SolverConfig;
use crate::error::{Result, SimulationError};
use crate::physics::units::Q;
use crate::solution::layout::DofLayout;
use crate::solution::Variable;
use crate::system::SimulationSystem;

#[derive(Debug, Clone, Copy)]
pub struct AcPoint {
    /// Frequency [Hz].
    pub freq: f64,
    /// Terminal admittance seen at the scanned electrode [S].
    pub y: Complex64,
    /// Equivalent parallel capacitance `Im(Y) / omega` [F].
    pub c: f64,
}

/// AC drive and extraction vectors for the scanned electrode.
struct AcDrive {
    /// Real-part right-hand side of the doubled system.
    rhs: Vec<f64>,
    /// Conduction current sensitivity dI/dx (normalized).
    g: Vec<(usize, f64)>,
    /// Displacement charge sensitivity dQ/dx (normalized).
    q: Vec<(usize, f64)>,
    /// Displacement charge sensitivity to the drive itself (gate stacks).
    q_ve: f64,
}

fn build_drive(
    sys: &SimulationSystem,
    layout: &DofLayout,
    scanned: usize,
    v_ac: f64,
    x_dc: &[f64],
) -> Result<AcDrive> {
    let bc = &sys.bcs[scanned];
    let mut rhs = vec![0.0; layout.n_dofs];
    let mut q: Vec<(usize, f64)> = Vec::new();
    let mut q_ve = 0.0;
    let mut g: Vec<(usize, f64)> = Vec::new();

    match &bc.kind {
        BcKind::OhmicContact | BcKind::SchottkyContact { .. } => {
            g = conduction_sensitivity(bc, sys, layout, x_dc);
            // Voltage drive enters through the circuit row when present,
            // else directly through the Dirichlet potential rows.
            if let Some(e_row) = layout.bc_offsets[scanned] {
                rhs[e_row] = v_ac;
            }
            for &node in &bc.nodes {
                for &fid in &sys.graph.by_root[node] {
                    let Some(psi_i) = layout.dof(&sys.graph, fid, Variable::Potential) else {
                        continue;
                    };
                    if layout.bc_offsets[scanned].is_none() {
                        rhs[psi_i] = v_ac;
                    }
                    // Field charge under the contact.
                    let cv = &sys.graph.fvm_nodes[fid];
                    let eps_i = sys.graph.node_data[fid].aux.eps;
                    for nb in &cv.neighbors {
                        let Some(psi_j) =
                            layout.dof(&sys.graph, nb.fvm, Variable::Potential)
                        else {
                            continue;
                        };
                        let eps_j = sys.graph.node_data[nb.fvm].aux.eps;
                        let w = 0.5 * (eps_i + eps_j) / sys.scaling.eps_ref * nb.area
                            / nb.distance;
                        q.push((psi_i, w));
                        q.push((psi_j, -w));
                    }
                }
            }
        }
        BcKind::SimpleGateContact {
            thickness, eps_ox, ..
        } => {
            let eps_norm = eps_ox / sys.scaling.eps_ref;
            let t_norm = thickness / sys.scaling.l;
            let driven_directly = layout.bc_offsets[scanned].is_none();
            if let Some(e_row) = layout.bc_offsets[scanned] {
                rhs[e_row] = v_ac;
            }
            for &node in &bc.nodes {
                for &fid in &sys.graph.by_root[node] {
                    let Some(psi_i) = layout.dof(&sys.graph, fid, Variable::Potential) else {
                        continue;
                    };
                    let area = sys.graph.boundary_area(bc.boundary_id, fid);
                    let g_ox = area * eps_norm / t_norm;
                    if driven_directly {
                        rhs[psi_i] += g_ox * v_ac;
                    }
                    q.push((psi_i, -g_ox));
                    q_ve += g_ox;
                }
            }
        }
        other => {
            return Err(SimulationError::Config(format!(
                "boundary '{}' ({other:?}) cannot be AC-scanned",
                bc.name
            )))
        }
    }
    Ok(AcDrive { rhs, g, q, q_ve })
}

/// Compose the doubled real system `[[J, -wM], [wM, J]]` in CSR form.
fn doubled_system(
    n: usize,
    jac: &SystemMatrix,
    mass: &SystemMatrix,
    omega: f64,
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let (jp, ji, jv) = (jac.row_ptr(), jac.col_idx(), jac.values());
    let (mp, mi, mv) = (mass.row_ptr(), mass.col_idx(), mass.values());

    let nnz = 2 * (jv.len() + mv.len());
    let mut indptr = Vec::with_capacity(2 * n + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut data = Vec::with_capacity(nnz);
    indptr.push(0);

    for row in 0..n {
        for k in jp[row]..jp[row + 1] {
            indices.push(ji[k]);
            data.push(jv[k]);
        }
        for k in mp[row]..mp[row + 1] {
            indices.push(n + mi[k]);
            data.push(-omega * mv[k]);
        }
        indptr.push(indices.len());
    }
    for row in 0..n {
        for k in mp[row]..mp[row + 1] {
            indices.push(mi[k]);
            data.push(omega * mv[k]);
        }
        for k in jp[row]..jp[row + 1] {
            indices.push(n + ji[k]);
            data.push(jv[k]);
        }
        indptr.push(indices.len());
    }
    (indptr, indices, data)
}

/// Run the AC frequency sweep. Solves the DC operating point first, then
/// one complex linear system per frequency.
pub fn run_ac_sweep(sys: &mut SimulationSystem, cfg: &SolverConfig) -> Result<Vec<AcPoint>> {
    cfg.validate()?;
    let ac = cfg
        .ac
        .clone()
        .ok_or_else(|| SimulationError::Config("AC sweep without schedule".into()))?;

    let ops = crate::physics::level_ops(cfg.solver);
    let kinds = sys.region_kinds();
    let vars = crate::physics::region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout =
        crate::solution::layout::DofLayout::build(&mut sys.graph, &sys.mesh, vars, &extras);

    let scanned = sys
        .bc_by_name(&ac.electrode)
        .ok_or_else(|| SimulationError::Structural(format!("no electrode '{}'", ac.electrode)))?;

    // DC operating point.
    let dc = solve_nonlinear(sys, ops.as_ref(), &layout, cfg, None, 0.0, None, None)?;
    for data in sys.graph.node_data.iter_mut() {
        data.rotate_last();
    }
    let x_dc = dc.solution;

    // Linearization: Jacobian with boundary rows, mass with the same
    // interface folds.
    let pattern = build_pattern(sys, ops.as_ref(), &layout);
    let mut jac = SystemMatrix::from_pattern(pattern);
    assemble_jacobian(
        sys,
        ops.as_ref(),
        &layout,
        cfg,
        x_dc.as_slice(),
        None,
        0.0,
        &mut jac,
    )?;
    let pre = collect_preprocess(sys, ops.as_ref(), &layout);
    let mass = assemble_mass(sys, ops.as_ref(), &layout, cfg, x_dc.as_slice(), Some(&pre))?;

    let v_ac = ac.v_ac / sys.scaling.v;
    let drive = build_drive(sys, &layout, scanned, v_ac, x_dc.as_slice())?;

    let n = layout.n_dofs;
    let y_scale = Q * sys.scaling.n * sys.scaling.d * sys.scaling.l / sys.scaling.v;

    let mut points = Vec::new();
    let mut freq = ac.f_start;
    while freq <= ac.f_stop * (1.0 + 1e-12) {
        let omega = 2.0 * std::f64::consts::PI * freq * sys.scaling.t;

        let (indptr, indices, data) = doubled_system(n, &jac, &mass, omega);
        let mut rhs = vec![0.0; 2 * n];
        rhs[..n].copy_from_slice(&drive.rhs);

        let sol = linear::solve_csr(2 * n, indptr, indices, data, &rhs, cfg)?;

        // Terminal current phasor: conduction plus displacement.
        let mut i_re = 0.0;
        let mut i_im = 0.0;
        for &(dof, gi) in &drive.g {
            i_re += gi * sol[dof];
            i_im += gi * sol[n + dof];
        }
        for &(dof, qi) in &drive.q {
            i_re += -omega * qi * sol[n + dof];
            i_im += omega * qi * sol[dof];
        }
        i_im += omega * drive.q_ve * v_ac;

        let y = Complex64::new(i_re, i_im) / v_ac * y_scale;
        let omega_phys = 2.0 * std::f64::consts::PI * freq;
        let point = AcPoint {
            freq,
            y,
            c: y.im / omega_phys,
        };
        tracing::info!(freq, y_re = y.re, y_im = y.im, c = point.c, "ac point");
        points.push(point);

        // Keep the complex nodal solution for postprocessing.
        for fid in 0..sys.graph.n_fvm_nodes() {
            if let Some(psi) = layout.dof(&sys.graph, fid, Variable::Potential) {
                sys.graph.node_data[fid].ac.psi_ac = Complex64::new(sol[psi], sol[n + psi]);
            }
            if let Some(t) = layout.dof(&sys.graph, fid, Variable::LatticeTemp) {
                sys.graph.node_data[fid].ac.t_ac = Complex64::new(sol[t], sol[n + t]);
            }
        }

        freq *= ac.f_multiple;
    }
    Ok(points)
}
