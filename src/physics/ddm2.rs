//! Level-2 drift-diffusion: DDM1 plus the lattice heat equation.
//!
//! Carrier transport stays Scharfetter-Gummel at the ambient thermal
//! voltage; the lattice couples back through Joule and recombination
//! heating evaluated with the nodal field of the previous Newton update.

use super::ddm1::{
    continuity_row_scale, diffusivities, semi_edge, semi_fill, semi_recombination, semi_storage,
    semi_volume,
};
use super::poisson::{poisson_edge, poisson_row_scale};
use super::{Ad, EdgeCtx, KernelCtx, LevelOps};
use crate::config::SolverType;
use crate::discretization::mesh::RegionKind;
use crate::solution::Variable;

pub struct Ddm2Level;

const SEMI_VARS: &[Variable] = &[
    Variable::Potential,
    Variable::Electron,
    Variable::Hole,
    Variable::LatticeTemp,
];
const THERMAL_VARS: &[Variable] = &[Variable::Potential, Variable::LatticeTemp];
const VACUUM_VARS: &[Variable] = &[Variable::Potential];

/// Normalized edge conductance of the lattice heat equation.
pub(crate) fn heat_edge_coeff(ctx: &KernelCtx, edge: &EdgeCtx) -> f64 {
    let s = &ctx.sys.scaling;
    let mat_i = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[edge.fid_i].region].material;
    let kappa = mat_i.kappa / s.kappa_ref;
    kappa * s.thermal_diffusivity() * edge.area / edge.distance
}

/// Normalized volumetric heat capacity.
pub(crate) fn heat_capacity(ctx: &KernelCtx, fid: usize) -> f64 {
    let mat = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].material;
    mat.heat_capacity / ctx.sys.scaling.heat_cap_ref
}

pub(crate) fn heat_row_scale(ctx: &KernelCtx, fid: usize) -> f64 {
    let node = &ctx.sys.graph.fvm_nodes[fid];
    let s = &ctx.sys.scaling;
    let mat = &ctx.sys.regions[node.region].material;
    let stencil: f64 = node
        .neighbors
        .iter()
        .map(|nb| mat.kappa / s.kappa_ref * s.thermal_diffusivity() * nb.area / nb.distance)
        .sum();
    1.0 / stencil.max(node.volume).max(1e-30)
}

/// Joule heat density in lattice units, using the lagged nodal field.
fn joule_heat(ctx: &KernelCtx, fid: usize, n: &Ad, p: &Ad) -> Ad {
    let region = ctx.sys.graph.fvm_nodes[fid].region;
    let (dn, dp) = diffusivities(ctx, region);
    let e2 = ctx.sys.graph.node_data[fid].e_field.length_squared();
    (n.clone() * dn + p.clone() * dp) * (ctx.sys.scaling.joule_factor() * e2)
}

impl LevelOps for Ddm2Level {
    fn solver(&self) -> SolverType {
        SolverType::Ddml2
    }

    fn vars(&self, kind: RegionKind) -> &'static [Variable] {
        match kind {
            RegionKind::Semiconductor => SEMI_VARS,
            RegionKind::Insulator | RegionKind::Conductor => THERMAL_VARS,
            RegionKind::Vacuum => VACUUM_VARS,
        }
    }

    fn fill_value(&self, ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind;
        let data = &ctx.sys.graph.node_data[fid];
        match kind {
            RegionKind::Semiconductor => {
                semi_fill(ctx, fid, x, l);
                x[3] = data.get(Variable::LatticeTemp);
                l[3] = heat_row_scale(ctx, fid);
            }
            RegionKind::Insulator | RegionKind::Conductor => {
                x[0] = data.get(Variable::Potential);
                x[1] = data.get(Variable::LatticeTemp);
                l[0] = poisson_row_scale(ctx, fid);
                l[1] = heat_row_scale(ctx, fid);
            }
            RegionKind::Vacuum => {
                x[0] = data.get(Variable::Potential);
                l[0] = poisson_row_scale(ctx, fid);
            }
        }
    }

    fn volume_residual(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region];
        if region.kind != RegionKind::Semiconductor {
            return;
        }
        semi_volume(ctx, fid, u, out);
        let (n, p) = (&u[1], &u[2]);
        let s = &ctx.sys.scaling;
        let rec_heat = semi_recombination(ctx, fid, n, p)
            * (s.joule_factor() * region.material.eg / s.v);
        out[3] = -(joule_heat(ctx, fid, n, p) + rec_heat);
    }

    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[edge.fid_i].region].kind;
        match kind {
            RegionKind::Semiconductor => {
                semi_edge(ctx, edge, u_i, u_j, out);
                out[3] = (u_i[3].clone() - u_j[3].clone()) * heat_edge_coeff(ctx, edge);
            }
            RegionKind::Insulator | RegionKind::Conductor => {
                out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]);
                out[1] = (u_i[1].clone() - u_j[1].clone()) * heat_edge_coeff(ctx, edge);
            }
            RegionKind::Vacuum => {
                out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]);
            }
        }
    }

    fn storage(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind;
        match kind {
            RegionKind::Semiconductor => {
                semi_storage(u, out);
                out[3] = u[3].clone() * heat_capacity(ctx, fid);
            }
            RegionKind::Insulator | RegionKind::Conductor => {
                out[1] = u[1].clone() * heat_capacity(ctx, fid);
            }
            RegionKind::Vacuum => {}
        }
    }
}

/// Row-scale helper shared with EBM3.
pub(crate) fn energy_row_scale(ctx: &KernelCtx, fid: usize) -> f64 {
    continuity_row_scale(ctx, fid)
}
