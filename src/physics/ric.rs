//! Radiation physics in insulator regions.
//!
//! `RicLevel`: radiation-induced conductivity. A single effective carrier
//! (stored in the insulator's hole slot) is generated in proportion to the
//! dose rate, drifts with the fast-carrier mobility and recombines with
//! the material lifetime; the resulting conduction shunts the oxide.
//!
//! `TidLevel`: total-ionizing-dose buildup. Radiation-generated holes hop
//! through the oxide and are captured by deep traps; the trapped charge
//! feeds back into Poisson. The drift-reaction variant additionally
//! converts a fraction of trapping events into interface states. All
//! reaction ODEs integrate with the same BDF machinery as the transport
//! equations. Semiconductor regions solve plain DDM1 alongside.

use num_dual::DualNum;

use super::ddm1::{semi_edge, semi_fill, semi_storage, semi_volume, SEMI_VARS};
use super::poisson::{poisson_edge, poisson_row_scale};
use super::sg::hole_flux;
use super::{Ad, EdgeCtx, KernelCtx, LevelOps};
use crate::config::SolverType;
use crate::discretization::mesh::RegionKind;
use crate::solution::Variable;

/// Electron-hole pairs generated per rad and cm^3 in silica.
const EHP_PER_RAD: f64 = 8.1e12;
/// Fraction of pairs escaping initial recombination.
const YIELD: f64 = 0.8;
/// Deep-trap density near the oxide interface [cm^-3].
const TRAP_DENSITY: f64 = 5.0e18;
/// Capture coefficient sigma_t * v_th [cm^3/s].
const TRAP_CAPTURE: f64 = 1.0e-6;
/// Fraction of capture events that build an interface state.
const INTERFACE_FRACTION: f64 = 0.05;

const RIC_VARS: &[Variable] = &[Variable::Potential, Variable::Hole];
const TID_VARS: &[Variable] = &[
    Variable::Potential,
    Variable::Hole,
    Variable::TrappedCharge,
];
const TID_REACTION_VARS: &[Variable] = &[
    Variable::Potential,
    Variable::Hole,
    Variable::TrappedCharge,
    Variable::InterfaceState,
];
const OTHER_VARS: &[Variable] = &[Variable::Potential];

/// Normalized pair-generation rate density for the configured dose rate.
fn generation(ctx: &KernelCtx, fid: usize) -> f64 {
    let s = &ctx.sys.scaling;
    let density = ctx.sys.graph.node_data[fid].aux.density;
    YIELD * EHP_PER_RAD * density * ctx.cfg.dose_rate * s.t / s.n
}

fn insulator_fill(ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64], vars: &[Variable]) {
    let data = &ctx.sys.graph.node_data[fid];
    let scale_cont = 1.0 / ctx.sys.graph.fvm_nodes[fid].volume.max(1e-30);
    for (k, &var) in vars.iter().enumerate() {
        x[k] = data.get(var);
        l[k] = if var == Variable::Potential {
            poisson_row_scale(ctx, fid)
        } else {
            scale_cont
        };
    }
}

pub struct RicLevel;

impl LevelOps for RicLevel {
    fn solver(&self) -> SolverType {
        SolverType::Ric
    }

    fn vars(&self, kind: RegionKind) -> &'static [Variable] {
        match kind {
            RegionKind::Semiconductor => SEMI_VARS,
            RegionKind::Insulator => RIC_VARS,
            _ => OTHER_VARS,
        }
    }

    fn fill_value(&self, ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]) {
        match ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind {
            RegionKind::Semiconductor => semi_fill(ctx, fid, x, l),
            RegionKind::Insulator => insulator_fill(ctx, fid, x, l, RIC_VARS),
            _ => {
                x[0] = ctx.sys.graph.node_data[fid].get(Variable::Potential);
                l[0] = poisson_row_scale(ctx, fid);
            }
        }
    }

    fn volume_residual(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region];
        match region.kind {
            RegionKind::Semiconductor => semi_volume(ctx, fid, u, out),
            RegionKind::Insulator => {
                let s = &ctx.sys.scaling;
                let p = &u[1];
                out[0] = -p.clone();
                let tau = (region.material.tau_n / s.t).max(1e-30);
                out[1] = p.clone() * (1.0 / tau) - Ad::from_re(generation(ctx, fid));
            }
            _ => {}
        }
    }

    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
        let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[edge.fid_i].region];
        match region.kind {
            RegionKind::Semiconductor => semi_edge(ctx, edge, u_i, u_j, out),
            RegionKind::Insulator => {
                out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]);
                // Fast-carrier conduction under irradiation.
                let s = &ctx.sys.scaling;
                let d_ric = region.material.mu_n * s.v / s.d;
                let geom = edge.area / edge.distance;
                let dpsi = u_j[0].clone() - u_i[0].clone();
                out[1] = hole_flux(d_ric * geom, &dpsi, &u_i[1], &u_j[1]);
            }
            _ => out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]),
        }
    }

    fn storage(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        match ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind {
            RegionKind::Semiconductor => semi_storage(u, out),
            RegionKind::Insulator => out[1] = u[1].clone(),
            _ => {}
        }
    }
}

pub struct TidLevel {
    pub reaction: bool,
}

impl TidLevel {
    fn insulator_vars(&self) -> &'static [Variable] {
        if self.reaction {
            TID_REACTION_VARS
        } else {
            TID_VARS
        }
    }
}

impl LevelOps for TidLevel {
    fn solver(&self) -> SolverType {
        if self.reaction {
            SolverType::TidDriftReaction
        } else {
            SolverType::TidDrift
        }
    }

    fn vars(&self, kind: RegionKind) -> &'static [Variable] {
        match kind {
            RegionKind::Semiconductor => SEMI_VARS,
            RegionKind::Insulator => self.insulator_vars(),
            _ => OTHER_VARS,
        }
    }

    fn fill_value(&self, ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]) {
        match ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind {
            RegionKind::Semiconductor => semi_fill(ctx, fid, x, l),
            RegionKind::Insulator => insulator_fill(ctx, fid, x, l, self.insulator_vars()),
            _ => {
                x[0] = ctx.sys.graph.node_data[fid].get(Variable::Potential);
                l[0] = poisson_row_scale(ctx, fid);
            }
        }
    }

    fn volume_residual(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region];
        match region.kind {
            RegionKind::Semiconductor => semi_volume(ctx, fid, u, out),
            RegionKind::Insulator => {
                let s = &ctx.sys.scaling;
                let (p, nt) = (&u[1], &u[2]);

                // Trapped and mobile holes are both positive space charge.
                out[0] = -(p.clone() + nt.clone());

                let nt_max = TRAP_DENSITY / s.n;
                let k_t = TRAP_CAPTURE * s.n * s.t;
                let capture = p.clone() * (Ad::from_re(nt_max) - nt.clone()) * k_t;

                out[1] = capture.clone() - Ad::from_re(generation(ctx, fid));
                out[2] = -capture.clone();
                if self.reaction {
                    out[3] = -capture * INTERFACE_FRACTION;
                }
            }
            _ => {}
        }
    }

    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]) {
        let region = &ctx.sys.regions[ctx.sys.graph.fvm_nodes[edge.fid_i].region];
        match region.kind {
            RegionKind::Semiconductor => semi_edge(ctx, edge, u_i, u_j, out),
            RegionKind::Insulator => {
                out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]);
                // Hole hopping transport; trapped charge is immobile.
                let s = &ctx.sys.scaling;
                let d_p = region.material.mu_p * s.v / s.d;
                let geom = edge.area / edge.distance;
                let dpsi = u_j[0].clone() - u_i[0].clone();
                out[1] = hole_flux(d_p * geom, &dpsi, &u_i[1], &u_j[1]);
            }
            _ => out[0] = poisson_edge(ctx, edge, &u_i[0], &u_j[0]),
        }
    }

    fn storage(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]) {
        match ctx.sys.regions[ctx.sys.graph.fvm_nodes[fid].region].kind {
            RegionKind::Semiconductor => semi_storage(u, out),
            RegionKind::Insulator => {
                out[1] = u[1].clone();
                out[2] = u[2].clone();
                if self.reaction {
                    out[3] = u[3].clone();
                }
            }
            _ => {}
        }
    }
}

/// Dose-rate conversion helper: rad(SiO2)/s for a given energy deposition
/// [eV/(cm^3 s)].
pub fn dose_rate_from_energy(ev_per_cm3_s: f64, density: f64) -> f64 {
    // 1 rad = 100 erg/g = 6.24e13 eV/g.
    ev_per_cm3_s / (6.24e13 * density)
}
