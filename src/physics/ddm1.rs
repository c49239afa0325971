//! Level-1 drift-diffusion: Poisson + isothermal carrier continuity with
//! Scharfetter-Gummel edge currents.

use num_dual::DualNum;

use super::poisson::{poisson_edge, poisson_row_scale};
use super::sg::{electron_flux, hole_flux, srh};
use super::{Ad, EdgeCtx, KernelCtx, LevelOps};
use crate::config::SolverType;
use crate::discretization::mesh::RegionKind;
use crate::solution::Variable;

pub struct Ddm1Level;

pub(crate) const SEMI_VARS: &[Variable] =
    &[Variable::Potential, Variable::Electron, Variable::Hole];
const OTHER_VARS: &[Variable] = &[Variable::Potential];

/// Normalized diffusivities of a region's carriers.
pub(crate) fn diffusivities(ctx: &KernelCtx, region: usize) -> (f64, f64) {
    let mat = &ctx.sys.regions[region].material;
    let s = &ctx.sys.scaling;
    (mat.mu_n * s.v / s.d, mat.mu_p * s.v / s.d)
}

/// Reciprocal characteristic magnitude of a continuity row.
pub(crate) fn continuity_row_scale(ctx: &KernelCtx, fid: usize) -> f64 {
    let node = &ctx.sys.graph.fvm_nodes[fid];
    let data = &ctx.sys.graph.node_data[fid];
    1.0 / (node.volume * data.aux.net_doping.abs().max(1.0)).max(1e-30)
}

pub(crate) fn semi_fill(ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]) {
    let data = &ctx.sys.graph.node_data[fid];
    x[0] = data.get(Variable::Potential);
    x[1] = data.get(Variable::Electron);
    x[2] = data.get(Variable::Hole);
    l[0] = poisson_row_scale(ctx, fid);
    let lc = continuity_row_scale(ctx, fid);
    l[1] = lc;
    l[2] = lc;
}

/// Net recombination minus generation for one semiconductor CV.
pub(crate) fn semi_recombination(ctx: &KernelCtx, fid: usize, n: &Ad, p: &Ad) -> Ad {
    let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region];
    let data = &ctx.sys.graph.node_data[fid];
    let s = &ctx.sys.scaling;
    let ni = s.ni_norm(region.material.ni);
    let r = srh(
        n,
        p,
        ni,
        region.material.tau_n / s.t,
        region.material.tau_p / s.t,
    );
    let g = data.aux.opt_g + data.aux.pat_g * ctx.pulse;
    r - Ad::from_re(g)
}

pub(crate) fn semi_volume(ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
    let data = &ctx.sys.graph.node_data[fid];
    let (n, p) = (&u[1], &u[2]);
    out[0] = -(p.clone() - n.clone() + Ad::from_re(data.aux.net_doping));
    let rg = semi_recombination(ctx, fid, n, p);
    out[1] = rg.clone();
    out[2] = rg;
}

pub(crate) fn semi_edge(ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
    let region = ctx.sys.graph.fvm_nodes[edge.fid_i].region;
    let (dn, dp) = diffusivities(ctx, region);
    let geom = edge.area / edge.distance;

    out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]);
    let dpsi = u_j[0].clone() - u_i[0].clone();
    out[1] = electron_flux(dn * geom, &dpsi, &u_i[1], &u_j[1]);
    out[2] = hole_flux(dp * geom, &dpsi, &u_i[2], &u_j[2]);
}

pub(crate) fn semi_storage(u: &[Ad], out: &mut [Ad]) {
    out[1] = u[1].clone();
    out[2] = u[2].clone();
}

impl LevelOps for Ddm1Level {
    fn solver(&self) -> SolverType {
        SolverType::Ddml1
    }

    fn vars(&self, kind: RegionKind) -> &'static [Variable] {
        match kind {
            RegionKind::Semiconductor => SEMI_VARS,
            _ => OTHER_VARS,
        }
    }

    fn fill_value(&self, ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind;
        match kind {
            RegionKind::Semiconductor => semi_fill(ctx, fid, x, l),
            _ => {
                let data = &ctx.sys.graph.node_data[fid];
                x[0] = data.get(Variable::Potential);
                l[0] = poisson_row_scale(ctx, fid);
            }
        }
    }

    fn volume_residual(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind;
        if kind == RegionKind::Semiconductor {
            semi_volume(ctx, fid, u, out);
        }
        // Insulator, conductor and vacuum regions carry no space charge at
        // this level; their Poisson rows are pure flux balances.
    }

    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[edge.fid_i].region].kind;
        match kind {
            RegionKind::Semiconductor => semi_edge(ctx, edge, u_i, u_j, out),
            _ => out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]),
        }
    }

    fn storage(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind;
        if kind == RegionKind::Semiconductor {
            semi_storage(u, out);
        }
    }
}
