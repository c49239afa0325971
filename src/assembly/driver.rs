//! Global assembly: composing region kernels and boundary operators into
//! the residual vector and Jacobian matrix.
//!
//! The mandated order is: region volume and edge terms (ADD), boundary
//! preprocess (row folds into interface peers, Dirichlet clears), boundary
//! equations (ADD/INSERT through the mode machine), final flush, then the
//! floating-point probe. Jacobian assembly mirrors the same phases on the
//! matrix. Derivatives come from dual-number seeds local to each CV or
//! edge, so a kernel never carries more than `2 m` directions.

use nalgebra::{Dyn, U1};
use num_dual::{Derivative, DualNum};

use super::matrix::{RowScale, SparsityPattern, SystemMatrix, SystemVector};
use crate::config::{SolverConfig, TsType};
use crate::error::{Result, SimulationError};
use crate::physics::{Ad, EdgeCtx, KernelCtx, LevelOps};
use crate::solution::layout::DofLayout;
use crate::solution::Variable;
use crate::system::SimulationSystem;

/// Row manipulations a boundary condition requests before its equations
/// are written: `src_dst` folds (sum src row into dst, then clear src) and
/// plain Dirichlet clears.
#[derive(Default)]
pub struct Preprocess {
    pub src_dst: Vec<(usize, usize)>,
    pub clear: Vec<usize>,
}

/// Transient discretization context for one time step, prepared by the
/// stepping controller. `s_hist` carries the history part of the BDF
/// combination `(a0 s(u) + a1 s_last + a2 s_last_last) / dt` so it is not
/// recomputed inside Newton; `spatial_old` feeds the trapezoidal rule.
pub struct TimeContext {
    pub scheme: TsType,
    /// Normalized step size.
    pub dt: f64,
    pub a0: f64,
    pub theta: f64,
    pub s_hist: Vec<f64>,
    pub spatial_old: Option<Vec<f64>>,
}

impl TimeContext {
    /// BDF coefficients for the current step ratio. `bdf1` forces first
    /// order (used on restarts).
    pub fn bdf_coefficients(dt: f64, dt_last: f64, bdf1: bool) -> (f64, f64, f64) {
        if bdf1 || dt_last <= 0.0 {
            (1.0, -1.0, 0.0)
        } else {
            let r = dt / dt_last;
            ((1.0 + 2.0 * r) / (1.0 + r), -(1.0 + r), r * r / (1.0 + r))
        }
    }

    /// Build the context for one step.
    pub fn prepare(
        sys: &SimulationSystem,
        ops: &dyn LevelOps,
        layout: &DofLayout,
        cfg: &SolverConfig,
        scheme: TsType,
        dt: f64,
        dt_last: f64,
        bdf2_restart: bool,
        pulse: f64,
    ) -> Self {
        let ctx = KernelCtx { sys, cfg, pulse };
        match scheme {
            TsType::Bdf1 | TsType::Bdf2 => {
                let bdf1 = scheme == TsType::Bdf1 || bdf2_restart;
                let (a0, a1, a2) = Self::bdf_coefficients(dt, dt_last, bdf1);
                let s_last = storage_history(&ctx, ops, layout, HistorySlot::Last);
                let s_last_last = storage_history(&ctx, ops, layout, HistorySlot::LastLast);
                let s_hist = s_last
                    .iter()
                    .zip(&s_last_last)
                    .map(|(sl, sll)| (a1 * sl + a2 * sll) / dt)
                    .collect();
                Self {
                    scheme,
                    dt,
                    a0,
                    theta: 1.0,
                    s_hist,
                    spatial_old: None,
                }
            }
            TsType::Trapezoidal => {
                let s_last = storage_history(&ctx, ops, layout, HistorySlot::Last);
                let s_hist = s_last.iter().map(|sl| -sl / dt).collect();
                let x_last = state_history(sys, layout, HistorySlot::Last);
                let spatial_old = compute_spatial(&ctx, ops, layout, &x_last)
                    .expect("previous accepted state must evaluate");
                Self {
                    scheme,
                    dt,
                    a0: 1.0,
                    theta: 0.5,
                    s_hist,
                    spatial_old: Some(spatial_old),
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
pub enum HistorySlot {
    Last,
    LastLast,
}

fn seed_plain(x: &[f64], off: usize, m: usize) -> Vec<Ad> {
    (0..m).map(|j| Ad::from_re(x[off + j])).collect()
}

fn seed_node(x: &[f64], off: usize, m: usize) -> Vec<Ad> {
    (0..m)
        .map(|j| Ad::new(x[off + j], Derivative::derivative_generic(Dyn(m), U1, j)))
        .collect()
}

fn seed_edge(x: &[f64], off_i: usize, off_j: usize, m: usize) -> (Vec<Ad>, Vec<Ad>) {
    let mut ui = Vec::with_capacity(m);
    let mut uj = Vec::with_capacity(m);
    for j in 0..m {
        ui.push(Ad::new(
            x[off_i + j],
            Derivative::derivative_generic(Dyn(2 * m), U1, j),
        ));
        uj.push(Ad::new(
            x[off_j + j],
            Derivative::derivative_generic(Dyn(2 * m), U1, m + j),
        ));
    }
    (ui, uj)
}

/// Reserve the structural pattern: diagonal blocks, in-region neighbor
/// couplings, then whatever the boundary conditions add (ghost couplings,
/// electrode rows, fold unions).
pub fn build_pattern(
    sys: &SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
) -> SparsityPattern {
    let mut pattern = SparsityPattern::new(layout.n_dofs);
    for node in sys.graph.fvm_nodes.iter() {
        let m = layout.n_vars(node.region);
        let off = node.global_offset;
        pattern.reserve_block(off, m, off, m);
        for nb in &node.neighbors {
            let m_j = layout.n_vars(sys.graph.fvm_nodes[nb.fvm].region);
            let off_j = sys.graph.fvm_nodes[nb.fvm].global_offset;
            pattern.reserve_block(off, m, off_j, m_j);
        }
    }
    for (b, bc) in sys.bcs.iter().enumerate() {
        bc.reserve(sys, ops, layout, b, &mut pattern);
    }
    pattern
}

/// Initial guess and row-scale vector from the nodal state.
pub fn fill_state(
    sys: &SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    cfg: &SolverConfig,
    pulse: f64,
) -> (Vec<f64>, RowScale) {
    let ctx = KernelCtx { sys, cfg, pulse };
    let mut x = vec![0.0; layout.n_dofs];
    let mut l = vec![1.0; layout.n_dofs];
    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        let m = layout.n_vars(node.region);
        let off = node.global_offset;
        ops.fill_value(&ctx, fid, &mut x[off..off + m], &mut l[off..off + m]);
    }
    for (b, bc) in sys.bcs.iter().enumerate() {
        if let Some(off) = layout.bc_offsets[b] {
            x[off] = bc.v_app;
        }
    }
    (x, RowScale::from_vec(l))
}

/// Spatial residual (edge fluxes plus volume terms), no storage, no
/// boundary equations. Shared by the residual assembly and the
/// trapezoidal history.
fn compute_spatial(
    ctx: &KernelCtx,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    x: &[f64],
) -> Result<Vec<f64>> {
    let sys = ctx.sys;
    let mut out = vec![0.0; layout.n_dofs];
    let mut buf: Vec<Ad> = Vec::new();

    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        let m = layout.n_vars(node.region);
        let off = node.global_offset;
        let u = seed_plain(x, off, m);

        buf.clear();
        buf.resize(m, Ad::from_re(0.0));
        ops.volume_residual(ctx, fid, &u, &mut buf);
        for v in 0..m {
            out[off + v] += buf[v].re * node.volume;
        }

        for nb in &node.neighbors {
            if nb.fvm <= fid {
                continue;
            }
            let off_j = sys.graph.fvm_nodes[nb.fvm].global_offset;
            let u_j = seed_plain(x, off_j, m);
            let edge = EdgeCtx {
                fid_i: fid,
                fid_j: nb.fvm,
                area: nb.area,
                distance: nb.distance,
            };
            buf.clear();
            buf.resize(m, Ad::from_re(0.0));
            ops.edge_flux(ctx, &edge, &u, &u_j, &mut buf);
            for v in 0..m {
                out[off + v] += buf[v].re;
                out[off_j + v] -= buf[v].re;
            }
        }
    }
    Ok(out)
}

/// Storage term `s(u) * V` for the whole system at the current state `x`.
fn compute_storage(
    ctx: &KernelCtx,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    x: &[f64],
) -> Vec<f64> {
    let sys = ctx.sys;
    let mut out = vec![0.0; layout.n_dofs];
    let mut buf: Vec<Ad> = Vec::new();
    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        let m = layout.n_vars(node.region);
        let off = node.global_offset;
        let u = seed_plain(x, off, m);
        buf.clear();
        buf.resize(m, Ad::from_re(0.0));
        ops.storage(ctx, fid, &u, &mut buf);
        for v in 0..m {
            out[off + v] += buf[v].re * node.volume;
        }
    }
    out
}

/// Storage evaluated on a nodal history slot.
pub fn storage_history(
    ctx: &KernelCtx,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    slot: HistorySlot,
) -> Vec<f64> {
    let x = state_history(ctx.sys, layout, slot);
    compute_storage(ctx, ops, layout, &x)
}

/// Pack a nodal history slot into solution-vector order.
pub fn state_history(
    sys: &SimulationSystem,
    layout: &DofLayout,
    slot: HistorySlot,
) -> Vec<f64> {
    let mut x = vec![0.0; layout.n_dofs];
    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        let vars = &layout.region_vars[node.region];
        let data = &sys.graph.node_data[fid];
        for (k, &var) in vars.iter().enumerate() {
            x[node.global_offset + k] = match slot {
                HistorySlot::Last => data.get_last(var),
                HistorySlot::LastLast => data.get_last_last(var),
            };
        }
    }
    x
}

/// Assemble the scaled-ready residual. Ordering: region terms (ADD), BC
/// folds and clears, BC equations, final flush, FP probe.
pub fn assemble_residual(
    sys: &SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    cfg: &SolverConfig,
    x: &[f64],
    tctx: Option<&TimeContext>,
    pulse: f64,
) -> Result<Vec<f64>> {
    let ctx = KernelCtx { sys, cfg, pulse };
    let mut f = SystemVector::zeros(layout.n_dofs);

    let spatial = compute_spatial(&ctx, ops, layout, x)?;
    match tctx {
        None => {
            for (i, &v) in spatial.iter().enumerate() {
                f.add(i, v);
            }
        }
        Some(t) => {
            let s_new = compute_storage(&ctx, ops, layout, x);
            for i in 0..layout.n_node_dofs {
                let mut r = t.theta * spatial[i];
                if let Some(old) = &t.spatial_old {
                    r += (1.0 - t.theta) * old[i];
                }
                r += t.a0 / t.dt * s_new[i] + t.s_hist[i];
                f.add(i, r);
            }
            for i in layout.n_node_dofs..layout.n_dofs {
                f.add(i, spatial[i]);
            }
        }
    }

    // Boundary preprocess: interface folds, Dirichlet clears.
    let mut pre = Preprocess::default();
    for bc in &sys.bcs {
        bc.preprocess(sys, ops, layout, &mut pre);
    }
    for &(src, dst) in &pre.src_dst {
        f.add_row_to_row(src, dst);
    }
    f.zero_rows(&pre.clear);

    // Boundary equations.
    for (b, bc) in sys.bcs.iter().enumerate() {
        bc.function(sys, ops, layout, cfg, b, x, &mut f)?;
    }
    f.finalize();

    let out = f.into_vec();
    if !out.iter().all(|v| v.is_finite()) {
        return Err(SimulationError::FpInvalid("residual assembly"));
    }
    Ok(out)
}

/// Assemble the Jacobian into a pattern-frozen matrix.
pub fn assemble_jacobian(
    sys: &SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    cfg: &SolverConfig,
    x: &[f64],
    tctx: Option<&TimeContext>,
    pulse: f64,
    jac: &mut SystemMatrix,
) -> Result<()> {
    let ctx = KernelCtx { sys, cfg, pulse };
    jac.zero_all();

    let theta = tctx.map_or(1.0, |t| t.theta);
    let mut buf: Vec<Ad> = Vec::new();

    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        let m = layout.n_vars(node.region);
        let off = node.global_offset;

        // Volume block.
        let u = seed_node(x, off, m);
        buf.clear();
        buf.resize(m, Ad::from_re(0.0));
        ops.volume_residual(&ctx, fid, &u, &mut buf);
        for v in 0..m {
            let d = buf[v].eps.clone().unwrap_generic(Dyn(m), U1);
            for j in 0..m {
                let w = d[(j, 0)] * node.volume * theta;
                if w != 0.0 {
                    jac.add(off + v, off + j, w)?;
                }
            }
        }

        // Storage block (transient only), unscaled by theta.
        if let Some(t) = tctx {
            let u = seed_node(x, off, m);
            buf.clear();
            buf.resize(m, Ad::from_re(0.0));
            ops.storage(&ctx, fid, &u, &mut buf);
            let factor = node.volume * t.a0 / t.dt;
            for v in 0..m {
                let d = buf[v].eps.clone().unwrap_generic(Dyn(m), U1);
                for j in 0..m {
                    let w = d[(j, 0)] * factor;
                    if w != 0.0 {
                        jac.add(off + v, off + j, w)?;
                    }
                }
            }
        }

        // Edge blocks, each edge visited once.
        for nb in &node.neighbors {
            if nb.fvm <= fid {
                continue;
            }
            let off_j = sys.graph.fvm_nodes[nb.fvm].global_offset;
            let (ui, uj) = seed_edge(x, off, off_j, m);
            let edge = EdgeCtx {
                fid_i: fid,
                fid_j: nb.fvm,
                area: nb.area,
                distance: nb.distance,
            };
            buf.clear();
            buf.resize(m, Ad::from_re(0.0));
            ops.edge_flux(&ctx, &edge, &ui, &uj, &mut buf);
            for v in 0..m {
                let d = buf[v].eps.clone().unwrap_generic(Dyn(2 * m), U1);
                for j in 0..m {
                    let di = d[(j, 0)] * theta;
                    let dj = d[(m + j, 0)] * theta;
                    if di != 0.0 {
                        jac.add(off + v, off + j, di)?;
                        jac.add(off_j + v, off + j, -di)?;
                    }
                    if dj != 0.0 {
                        jac.add(off + v, off_j + j, dj)?;
                        jac.add(off_j + v, off_j + j, -dj)?;
                    }
                }
            }
        }
    }

    // Boundary preprocess on the matrix, then the BC Jacobians.
    let mut pre = Preprocess::default();
    for bc in &sys.bcs {
        bc.preprocess(sys, ops, layout, &mut pre);
    }
    for &(src, dst) in &pre.src_dst {
        jac.add_row_to_row(src, dst)?;
    }
    jac.zero_rows(&pre.clear);

    for (b, bc) in sys.bcs.iter().enumerate() {
        bc.jacobian(sys, ops, layout, cfg, b, x, jac)?;
    }
    jac.finalize();

    if !jac.values().iter().all(|v| v.is_finite()) {
        return Err(SimulationError::FpInvalid("jacobian assembly"));
    }
    Ok(())
}

/// Block-diagonal mass matrix `d(s V)/du` around the state `x`, used by
/// the AC driver as the `j omega` multiplier. When `pre` is given, the
/// same interface folds and Dirichlet clears applied to the Jacobian are
/// applied here, so replaced rows carry no storage.
pub fn assemble_mass(
    sys: &SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    cfg: &SolverConfig,
    x: &[f64],
    pre: Option<&Preprocess>,
) -> Result<SystemMatrix> {
    let ctx = KernelCtx {
        sys,
        cfg,
        pulse: 0.0,
    };
    let mut pattern = SparsityPattern::new(layout.n_dofs);
    for node in sys.graph.fvm_nodes.iter() {
        let m = layout.n_vars(node.region);
        pattern.reserve_block(node.global_offset, m, node.global_offset, m);
    }
    if let Some(pre) = pre {
        for &(src, dst) in &pre.src_dst {
            pattern.reserve_row_union(src, dst);
        }
    }
    let mut mass = SystemMatrix::from_pattern(pattern);
    let mut buf: Vec<Ad> = Vec::new();
    for (fid, node) in sys.graph.fvm_nodes.iter().enumerate() {
        let m = layout.n_vars(node.region);
        let off = node.global_offset;
        let u = seed_node(x, off, m);
        buf.clear();
        buf.resize(m, Ad::from_re(0.0));
        ops.storage(&ctx, fid, &u, &mut buf);
        for v in 0..m {
            let d = buf[v].eps.clone().unwrap_generic(Dyn(m), U1);
            for j in 0..m {
                let w = d[(j, 0)] * node.volume;
                if w != 0.0 {
                    mass.add(off + v, off + j, w)?;
                }
            }
        }
    }
    if let Some(pre) = pre {
        for &(src, dst) in &pre.src_dst {
            mass.add_row_to_row(src, dst)?;
        }
        mass.zero_rows(&pre.clear);
    }
    mass.finalize();
    Ok(mass)
}

/// Collect every boundary condition's preprocess requests.
pub fn collect_preprocess(
    sys: &SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
) -> Preprocess {
    let mut pre = Preprocess::default();
    for bc in &sys.bcs {
        bc.preprocess(sys, ops, layout, &mut pre);
    }
    pre
}

/// Copy the solution vector back onto the nodal data, synchronize ghost
/// copies across interfaces and refresh the lagged nodal field.
pub fn update_solution(
    sys: &mut SimulationSystem,
    layout: &DofLayout,
    x: &[f64],
) {
    for fid in 0..sys.graph.n_fvm_nodes() {
        let node = &sys.graph.fvm_nodes[fid];
        let off = node.global_offset;
        let vars = layout.region_vars[node.region].clone();
        let data = &mut sys.graph.node_data[fid];
        for (k, var) in vars.iter().enumerate() {
            data.set(*var, x[off + k]);
        }
    }

    // Ghost sync: the primary CV of each interface node is authoritative
    // for the shared variables. This is what makes interface values
    // bit-equal after a solve.
    for bc in &sys.bcs {
        let sync = bc.sync_variables();
        if sync.is_empty() {
            continue;
        }
        for &node in &bc.nodes {
            let fids = sys.graph.by_root[node].clone();
            let Some((&primary, rest)) = fids.split_first() else {
                continue;
            };
            for &var in sync {
                let v = sys.graph.node_data[primary].get(var);
                for &other in rest {
                    if sys.graph.node_data[other].is_variable_valid(var) {
                        sys.graph.node_data[other].set(var, v);
                    }
                }
            }
        }
    }

    // Lagged nodal field for the heat sources: area-weighted average of the
    // edge gradients.
    for fid in 0..sys.graph.n_fvm_nodes() {
        let node = &sys.graph.fvm_nodes[fid];
        let psi_i = sys.graph.node_data[fid].get(Variable::Potential);
        let p_i = sys.mesh.nodes[node.root].position;
        let mut e = glam::DVec3::ZERO;
        let mut w_sum = 0.0;
        for nb in &node.neighbors {
            let psi_j = sys.graph.node_data[nb.fvm].get(Variable::Potential);
            let p_j = sys.mesh.nodes[nb.node].position;
            let dir = (p_j - p_i).normalize_or_zero();
            e += -(psi_j - psi_i) / nb.distance * nb.area * dir;
            w_sum += nb.area;
        }
        if w_sum > 0.0 {
            sys.graph.node_data[fid].e_field = e / w_sum;
        }
    }
}
