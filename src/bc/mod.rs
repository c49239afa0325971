//! Boundary condition entities and their operator dispatch.
//!
//! A [`BoundaryCondition`] is data: kind, the geometric nodes it governs,
//! material parameters (gate work function, oxide charge, heat transfer
//! coefficient) and an optional external-circuit stub. The operators -
//! preprocess (row folds and Dirichlet clears), reserve (structural
//! zeros), function and jacobian: live in `contacts` and `interfaces` and
//! are dispatched by kind.

pub mod contacts;
pub mod interfaces;

use crate::assembly::driver::Preprocess;
use crate::assembly::matrix::{SparsityPattern, SystemMatrix, SystemVector};
use crate::config::SolverConfig;
use crate::error::Result;
use crate::physics::LevelOps;
use crate::solution::layout::DofLayout;
use crate::system::SimulationSystem;

/// External lumped circuit attached to an electrode:
/// `L dI/dt + R I + V_node - V_src + q_c / C = 0`.
#[derive(Debug, Clone)]
pub struct ExternalCircuit {
    pub r: f64,
    pub l: f64,
    pub c: f64,
    pub v_src: f64,
    pub i_src: f64,
    /// Small-signal drive amplitude.
    pub v_ac: f64,
    /// Accumulated capacitor charge, integrated by the transient stepper.
    pub q_c: f64,
    /// Electrode current of the last accepted step (for `L dI/dt`).
    pub i_last: f64,
    /// Normalized step size while a transient solve is active, 0 otherwise.
    /// Maintained by the time-stepping controller.
    pub dt: f64,
}

impl ExternalCircuit {
    pub fn resistor(r: f64, v_src: f64) -> Self {
        Self {
            r,
            l: 0.0,
            c: 0.0,
            v_src,
            i_src: 0.0,
            v_ac: 0.0,
            q_c: 0.0,
            i_last: 0.0,
            dt: 0.0,
        }
    }
}

/// Boundary condition families.
#[derive(Debug, Clone, PartialEq)]
pub enum BcKind {
    /// Charge-neutral contact on a semiconductor (or plain potential
    /// contact on a conductor region).
    OhmicContact,
    /// Thermionic-emission metal contact with barrier height [V].
    SchottkyContact { barrier: f64 },
    /// Lumped gate stack on an insulator surface: oxide capacitance,
    /// work-function offset and fixed interface charge.
    SimpleGateContact {
        work_function: f64,
        /// Oxide thickness [cm].
        thickness: f64,
        /// Oxide relative permittivity.
        eps_ox: f64,
        /// Fixed charge density [C/cm^2], positive pushes the surface
        /// toward accumulation of electrons.
        qf: f64,
    },
    /// Interface between two semiconductor regions of the same material.
    HomoInterface,
    /// Interface between different semiconductor materials.
    HeteroInterface,
    /// Semiconductor / insulator interface with fixed charge [C/cm^2].
    InsulatorInterface { qf: f64 },
    /// Insulator / insulator interface.
    InsulatorInsulatorInterface,
    /// Outer surface: natural (zero flux) for carriers, optional Robin
    /// heat exchange `h (T - T_ext) A` against the face's own ambient
    /// temperature [K].
    Neumann { h: f64, t_ext: f64 },
}

#[derive(Debug, Clone)]
pub struct BoundaryCondition {
    pub name: String,
    /// Boundary id in the mesh this BC governs.
    pub boundary_id: usize,
    pub kind: BcKind,
    /// Geometric node ids on this boundary, sorted.
    pub nodes: Vec<usize>,
    /// Applied electrode potential, normalized. Swept by the DC driver.
    pub v_app: f64,
    pub circuit: Option<ExternalCircuit>,
}

impl BoundaryCondition {
    pub fn new(sys_nodes: &[usize], name: &str, boundary_id: usize, kind: BcKind) -> Self {
        Self {
            name: name.to_string(),
            boundary_id,
            kind,
            nodes: sys_nodes.to_vec(),
            v_app: 0.0,
            circuit: None,
        }
    }

    pub fn with_circuit(mut self, circuit: ExternalCircuit) -> Self {
        self.circuit = Some(circuit);
        self
    }

    /// Contacts carry current; pure interfaces do not.
    pub fn is_electrode(&self) -> bool {
        matches!(
            self.kind,
            BcKind::OhmicContact | BcKind::SchottkyContact { .. } | BcKind::SimpleGateContact { .. }
        )
    }

    /// Extra global DOFs this BC appends after the node DOFs. An electrode
    /// with an external circuit solves its own potential.
    pub fn n_extra_dofs(&self) -> usize {
        if self.is_electrode() && self.circuit.is_some() {
            1
        } else {
            0
        }
    }

    pub fn preprocess(
        &self,
        sys: &SimulationSystem,
        ops: &dyn LevelOps,
        layout: &DofLayout,
        out: &mut Preprocess,
    ) {
        match &self.kind {
            BcKind::OhmicContact | BcKind::SchottkyContact { .. } => {
                contacts::contact_preprocess(self, sys, ops, layout, out)
            }
            BcKind::HomoInterface
            | BcKind::HeteroInterface
            | BcKind::InsulatorInterface { .. }
            | BcKind::InsulatorInsulatorInterface => {
                interfaces::interface_preprocess(self, sys, ops, layout, out)
            }
            BcKind::SimpleGateContact { .. } | BcKind::Neumann { .. } => {}
        }
    }

    pub fn reserve(
        &self,
        sys: &SimulationSystem,
        ops: &dyn LevelOps,
        layout: &DofLayout,
        bc_index: usize,
        pattern: &mut SparsityPattern,
    ) {
        match &self.kind {
            BcKind::OhmicContact | BcKind::SchottkyContact { .. } => {
                contacts::contact_reserve(self, sys, ops, layout, bc_index, pattern)
            }
            BcKind::SimpleGateContact { .. } => {
                contacts::gate_reserve(self, sys, ops, layout, bc_index, pattern)
            }
            BcKind::HomoInterface
            | BcKind::HeteroInterface
            | BcKind::InsulatorInterface { .. }
            | BcKind::InsulatorInsulatorInterface => {
                interfaces::interface_reserve(self, sys, ops, layout, pattern)
            }
            BcKind::Neumann { .. } => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn function(
        &self,
        sys: &SimulationSystem,
        ops: &dyn LevelOps,
        layout: &DofLayout,
        cfg: &SolverConfig,
        bc_index: usize,
        x: &[f64],
        f: &mut SystemVector,
    ) -> Result<()> {
        match &self.kind {
            BcKind::OhmicContact => {
                contacts::ohmic_function(self, sys, ops, layout, cfg, bc_index, x, f)
            }
            BcKind::SchottkyContact { barrier } => {
                contacts::schottky_function(self, sys, ops, layout, cfg, bc_index, *barrier, x, f)
            }
            BcKind::SimpleGateContact {
                work_function,
                thickness,
                eps_ox,
                qf,
            } => contacts::gate_function(
                self,
                sys,
                ops,
                layout,
                bc_index,
                *work_function,
                *thickness,
                *eps_ox,
                *qf,
                x,
                f,
            ),
            BcKind::HomoInterface
            | BcKind::HeteroInterface
            | BcKind::InsulatorInterface { .. }
            | BcKind::InsulatorInsulatorInterface => {
                interfaces::interface_function(self, sys, ops, layout, x, f)
            }
            BcKind::Neumann { h, t_ext } => {
                interfaces::neumann_function(self, sys, ops, layout, *h, *t_ext, x, f)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn jacobian(
        &self,
        sys: &SimulationSystem,
        ops: &dyn LevelOps,
        layout: &DofLayout,
        cfg: &SolverConfig,
        bc_index: usize,
        x: &[f64],
        jac: &mut SystemMatrix,
    ) -> Result<()> {
        match &self.kind {
            BcKind::OhmicContact => {
                contacts::ohmic_jacobian(self, sys, ops, layout, cfg, bc_index, x, jac)
            }
            BcKind::SchottkyContact { barrier } => {
                contacts::schottky_jacobian(self, sys, ops, layout, cfg, bc_index, *barrier, x, jac)
            }
            BcKind::SimpleGateContact {
                work_function,
                thickness,
                eps_ox,
                qf,
            } => contacts::gate_jacobian(
                self,
                sys,
                ops,
                layout,
                bc_index,
                *work_function,
                *thickness,
                *eps_ox,
                *qf,
                x,
                jac,
            ),
            BcKind::HomoInterface
            | BcKind::HeteroInterface
            | BcKind::InsulatorInterface { .. }
            | BcKind::InsulatorInsulatorInterface => {
                interfaces::interface_jacobian(self, sys, ops, layout, x, jac)
            }
            BcKind::Neumann { h, .. } => {
                interfaces::neumann_jacobian(self, sys, ops, layout, *h, x, jac)
            }
        }
    }

    /// Variables that must agree across the interface after a solve; the
    /// ghost sync copies them from the primary CV onto the others.
    pub fn sync_variables(&self) -> &'static [crate::solution::Variable] {
        use crate::solution::Variable::*;
        match self.kind {
            BcKind::HomoInterface => &[Potential, Electron, Hole, LatticeTemp],
            BcKind::InsulatorInterface { .. }
            | BcKind::InsulatorInsulatorInterface => &[Potential, LatticeTemp],
            _ => &[],
        }
    }
}
