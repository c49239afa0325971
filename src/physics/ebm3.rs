//! Level-3 energy balance: DDM2 plus separate electron and hole
//! temperatures.
//!
//! Carrier energy densities are `(3/2) n k_B T_n`; energy fluxes combine
//! convective transport `(5/2) T F` with Wiedemann-Franz conduction
//! `kappa_c = (5/2) D nbar` along each edge. Carriers heat in the lagged
//! nodal field and relax to the lattice with the material's energy
//! relaxation time.

use super::ddm1::{diffusivities, semi_edge, semi_fill, semi_storage, semi_volume};
use super::ddm2::{energy_row_scale, heat_capacity, heat_edge_coeff, heat_row_scale};
use super::poisson::{poisson_edge, poisson_row_scale};
use super::sg::{electron_flux, hole_flux};
use super::{Ad, EdgeCtx, KernelCtx, LevelOps};
use crate::config::SolverType;
use crate::discretization::mesh::RegionKind;
use crate::solution::Variable;

pub struct Ebm3Level;

const SEMI_VARS: &[Variable] = &[
    Variable::Potential,
    Variable::Electron,
    Variable::Hole,
    Variable::LatticeTemp,
    Variable::ElecTemp,
    Variable::HoleTemp,
];
const THERMAL_VARS: &[Variable] = &[Variable::Potential, Variable::LatticeTemp];
const VACUUM_VARS: &[Variable] = &[Variable::Potential];

impl LevelOps for Ebm3Level {
    fn solver(&self) -> SolverType {
        SolverType::Ebm3
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
                x[4] = data.get(Variable::ElecTemp);
                x[5] = data.get(Variable::HoleTemp);
                l[3] = heat_row_scale(ctx, fid);
                let le = energy_row_scale(ctx, fid);
                l[4] = le;
                l[5] = le;
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

        let s = &ctx.sys.scaling;
        let (dn, dp) = diffusivities(ctx, ctx.sys.graph.fvm_nodes[fid].region);
        let e2 = ctx.sys.graph.node_data[fid].e_field.length_squared();
        let tau_e = (region.material.tau_energy / s.t).max(1e-30);

        let (n, p) = (&u[1], &u[2]);
        let (t_l, t_n, t_p) = (&u[3], &u[4], &u[5]);

        // Relaxation to the lattice and field heating of each carrier gas.
        let relax_n = n.clone() * (t_n.clone() - t_l.clone()) * (1.5 / tau_e);
        let relax_p = p.clone() * (t_p.clone() - t_l.clone()) * (1.5 / tau_e);
        let heat_n = n.clone() * (dn * e2);
        let heat_p = p.clone() * (dp * e2);

        out[4] = relax_n.clone() - heat_n;
        out[5] = relax_p.clone() - heat_p;

        // The lattice receives what the carrier gases shed.
        let cb = s.carrier_heat_factor();
        out[3] = -(relax_n + relax_p) * cb;
    }

    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
        let kind = ctx.sys.regions[ctx.sys.graph.fvm_nodes[edge.fid_i].region].kind;
        match kind {
            RegionKind::Semiconductor => {
                semi_edge(ctx, edge, u_i, u_j, out);
                out[3] = (u_i[3].clone() - u_j[3].clone()) * heat_edge_coeff(ctx, edge);

                let region = ctx.sys.graph.fvm_nodes[edge.fid_i].region;
                let (dn, dp) = diffusivities(ctx, region);
                let geom = edge.area / edge.distance;
                let dpsi = u_j[0].clone() - u_i[0].clone();

                let f_n = electron_flux(dn * geom, &dpsi, &u_i[1], &u_j[1]);
                let f_p = hole_flux(dp * geom, &dpsi, &u_i[2], &u_j[2]);

                let tn_bar = (u_i[4].clone() + u_j[4].clone()) * 0.5;
                let tp_bar = (u_i[5].clone() + u_j[5].clone()) * 0.5;
                let n_bar = (u_i[1].clone() + u_j[1].clone()) * 0.5;
                let p_bar = (u_i[2].clone() + u_j[2].clone()) * 0.5;

                // Convection plus Wiedemann-Franz conduction.
                out[4] = (tn_bar * f_n
                    + n_bar * (u_i[4].clone() - u_j[4].clone()) * (dn * geom))
                    * 2.5;
                out[5] = (tp_bar * f_p
                    + p_bar * (u_i[5].clone() - u_j[5].clone()) * (dp * geom))
                    * 2.5;
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
                out[4] = u[1].clone() * u[4].clone() * 1.5;
                out[5] = u[2].clone() * u[5].clone() * 1.5;
            }
            RegionKind::Insulator | RegionKind::Conductor => {
                out[1] = u[1].clone() * heat_capacity(ctx, fid);
            }
            RegionKind::Vacuum => {}
        }
    }
}
