//! Nonlinear Poisson level: electrostatic potential only, with Boltzmann
//! carrier statistics in semiconductor regions.

use num_dual::DualNum;

use super::{Ad, EdgeCtx, KernelCtx, LevelOps};
use crate::config::SolverType;
use crate::discretization::mesh::RegionKind;
use crate::solution::Variable;

pub struct PoissonLevel;

const POISSON_VARS: &[Variable] = &[Variable::Potential];

/// Electrostatic edge flux shared by every level:
/// `eps_edge (psi_i - psi_j) A / d`.
pub(crate) fn poisson_edge(ctx: &KernelCtx, edge: &EdgeCtx, psi_i: &Ad, psi_j: &Ad) -> Ad {
    let eps_i = ctx.sys.graph.node_data[edge.fid_i].aux.eps;
    let eps_j = ctx.sys.graph.node_data[edge.fid_j].aux.eps;
    let eps_edge = 0.5 * (eps_i + eps_j) / ctx.sys.scaling.eps_ref;
    (psi_i.clone() - psi_j.clone()) * (eps_edge * edge.area / edge.distance)
}

/// Reciprocal characteristic magnitude of a CV's Poisson row: the larger of
/// the Laplacian stencil weight and the space-charge term.
pub(crate) fn poisson_row_scale(ctx: &KernelCtx, fid: usize) -> f64 {
    let node = &ctx.sys.graph.fvm_nodes[fid];
    let data = &ctx.sys.graph.node_data[fid];
    let stencil: f64 = node
        .neighbors
        .iter()
        .map(|nb| data.aux.eps / ctx.sys.scaling.eps_ref * nb.area / nb.distance)
        .sum();
    let charge = node.volume * data.aux.net_doping.abs().max(1.0);
    1.0 / stencil.max(charge).max(1e-30)
}

impl LevelOps for PoissonLevel {
    fn solver(&self) -> SolverType {
        SolverType::Poisson
    }

    fn vars(&self, _kind: RegionKind) -> &'static [Variable] {
        POISSON_VARS
    }

    fn fill_value(&self, ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]) {
        let data = &ctx.sys.graph.node_data[fid];
        x[0] = data.get(Variable::Potential);
        l[0] = poisson_row_scale(ctx, fid);
    }

    fn volume_residual(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region];
        if region.kind != RegionKind::Semiconductor {
            return;
        }
        let data = &ctx.sys.graph.node_data[fid];
        let ni = ctx.sys.scaling.ni_norm(region.material.ni);
        let psi = &u[0];
        // Boltzmann statistics referenced to the intrinsic level.
        let n = psi.exp() * ni;
        let p = (-psi.clone()).exp() * ni;
        out[0] = -(p - n + Ad::from_re(data.aux.net_doping));
    }

    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
        out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]);
    }

    fn storage(&self, _ctx: &KernelCtx, _fid: usize, _u: &[Ad], _out: &mut [Ad]) {}
}
