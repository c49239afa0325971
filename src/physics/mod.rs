//! Region operators for the physics levels.
//!
//! Each solver level (Poisson, DDM1, DDM2, EBM3, RIC, TID) is a
//! [`LevelOps`] object: it declares the variable set each region kind
//! solves and evaluates the per-CV kernels. Kernels are written against
//! dual-number scalars, so the same code path produces residual values
//! (zero derivative seed) and Jacobian rows (unit seeds on the local
//! variables): the two assembly passes cannot drift apart.

pub mod ddm1;
pub mod ddm2;
pub mod ebm3;
pub mod poisson;
pub mod ric;
pub mod sg;
pub mod units;

use num_dual::DualDVec64;

use crate::config::{SolverConfig, SolverType};
use crate::discretization::mesh::RegionKind;
use crate::solution::Variable;
use crate::system::SimulationSystem;

/// AD scalar used by every kernel.
pub type Ad = DualDVec64;

/// Read-only context handed to kernels.
pub struct KernelCtx<'a> {
    pub sys: &'a SimulationSystem,
    pub cfg: &'a SolverConfig,
    /// Time factor of the particle generation pulse, 0 when inactive.
    pub pulse: f64,
}

/// Geometry of one CV-CV edge.
pub struct EdgeCtx {
    pub fid_i: usize,
    pub fid_j: usize,
    /// CV face area between the two CVs (normalized).
    pub area: f64,
    /// Root-node distance (normalized).
    pub distance: f64,
}

/// One physics level: variable sets plus volume/edge/storage kernels.
///
/// Kernel outputs are densities: the driver multiplies volume terms by the
/// CV volume and adds edge fluxes with opposite signs to the two incident
/// rows. `fill_value` deposits the initial guess and the reciprocal
/// characteristic magnitude of each equation into the row-scale vector.
pub trait LevelOps {
    fn solver(&self) -> SolverType;

    /// Ordered variables a region of `kind` solves at this level.
    fn vars(&self, kind: RegionKind) -> &'static [Variable];

    /// Initial guess and row scaling for one CV block.
    fn fill_value(&self, ctx: &KernelCtx, fid: usize, x: &mut [f64], l: &mut [f64]);

    /// Volume (reaction/source) residual density.
    fn volume_residual(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]);

    /// Integrated flux across one CV face, positive leaving `fid_i`.
    fn edge_flux(&self, ctx: &KernelCtx, edge: &EdgeCtx, u_i: &[Ad], u_j: &[Ad], out: &mut [Ad]);

    /// Storage density for the transient term (multiplied by volume and the
    /// BDF coefficients by the driver).
    fn storage(&self, ctx: &KernelCtx, fid: usize, u: &[Ad], out: &mut [Ad]);
}

/// Level factory for a solver selection.
pub fn level_ops(solver: SolverType) -> Box<dyn LevelOps> {
    match solver {
        SolverType::Poisson => Box::new(poisson::PoissonLevel),
        SolverType::Ddml1 => Box::new(ddm1::Ddm1Level),
        // The AC solve linearizes around a DDM1 operating point.
        SolverType::Ddmac => Box::new(ddm1::Ddm1Level),
        SolverType::Ddml2 => Box::new(ddm2::Ddm2Level),
        SolverType::Ebm3 => Box::new(ebm3::Ebm3Level),
        SolverType::Ric => Box::new(ric::RicLevel),
        SolverType::TidDrift => Box::new(ric::TidLevel { reaction: false }),
        SolverType::TidDriftReaction => Box::new(ric::TidLevel { reaction: true }),
    }
}

/// Per-region variable lists for a whole mesh, in region-id order.
pub fn region_variable_table(
    ops: &dyn LevelOps,
    kinds: &[RegionKind],
) -> Vec<Vec<Variable>> {
    kinds.iter().map(|&k| ops.vars(k).to_vec()).collect()
}
