//! Per-CV nodal data, polymorphic over the region kind.
//!
//! Each region family carries its own compact array of solution scalars
//! (with two history slots for BDF2), auxiliary material scalars, complex
//! AC values and the electric-field vector. Reading a variable a region
//! does not carry returns 0 and writing one is a no-op;
//! `is_variable_valid` reports which kinds are live. The named user store
//! holds checkpoint slots for circuit cosimulation rollback.

use std::collections::HashMap;

use glam::DVec3;
use num_complex::Complex64;

use super::Variable;
use crate::discretization::mesh::RegionKind;

/// Complex AC values shared by all region families.
#[derive(Debug, Clone, Default)]
pub struct AcData {
    pub psi_ac: Complex64,
    pub t_ac: Complex64,
    /// Optical wave E field.
    pub op_e: Complex64,
    /// Optical wave H field.
    pub op_h: Complex64,
}

/// Auxiliary material scalars, filled from the material library when the
/// system is built.
#[derive(Debug, Clone, Default)]
pub struct AuxData {
    /// Relative permittivity.
    pub eps: f64,
    /// Mass density [g/cm^3].
    pub density: f64,
    /// Electron affinity [V].
    pub affinity: f64,
    /// Band gap [V].
    pub eg: f64,
    /// Net doping N_D - N_A (semiconductor regions, normalized).
    pub net_doping: f64,
    pub nd: f64,
    pub na: f64,
    /// Optical carrier generation rate.
    pub opt_g: f64,
    /// Particle (heavy-ion) generation rate; the controller applies the
    /// time-pulse factor.
    pub pat_g: f64,
}

/// Ordered solution variables per region family. These index the scalar
/// arrays below; `_last`/`_last_last` slots share the same order.
const SEMICONDUCTOR_VARS: &[Variable] = &[
    Variable::Potential,
    Variable::Electron,
    Variable::Hole,
    Variable::LatticeTemp,
    Variable::ElecTemp,
    Variable::HoleTemp,
];
const INSULATOR_VARS: &[Variable] = &[
    Variable::Potential,
    Variable::LatticeTemp,
    Variable::Hole,
    Variable::TrappedCharge,
    Variable::InterfaceState,
];
const CONDUCTOR_VARS: &[Variable] = &[Variable::Potential, Variable::LatticeTemp];
const VACUUM_VARS: &[Variable] = &[Variable::Potential];

#[derive(Debug, Clone)]
pub struct NodeData {
    kind: RegionKind,
    scalars: Vec<f64>,
    last: Vec<f64>,
    last_last: Vec<f64>,
    pub aux: AuxData,
    pub ac: AcData,
    pub e_field: DVec3,
    /// Named checkpoint slots for circuit-coupled rollback.
    pub user: HashMap<String, f64>,
}

impl NodeData {
    pub fn new(kind: RegionKind) -> Self {
        let n = Self::carried_vars(kind).len();
        Self {
            kind,
            scalars: vec![0.0; n],
            last: vec![0.0; n],
            last_last: vec![0.0; n],
            aux: AuxData::default(),
            ac: AcData::default(),
            e_field: DVec3::ZERO,
            user: HashMap::new(),
        }
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// The full set of variables this region family stores, independent of
    /// which solver is active.
    pub fn carried_vars(kind: RegionKind) -> &'static [Variable] {
        match kind {
            RegionKind::Semiconductor => SEMICONDUCTOR_VARS,
            RegionKind::Insulator => INSULATOR_VARS,
            RegionKind::Conductor => CONDUCTOR_VARS,
            RegionKind::Vacuum => VACUUM_VARS,
        }
    }

    fn idx(&self, var: Variable) -> Option<usize> {
        Self::carried_vars(self.kind).iter().position(|&v| v == var)
    }

    pub fn is_variable_valid(&self, var: Variable) -> bool {
        self.idx(var).is_some()
    }

    /// Read a variable; 0 for kinds this region does not carry.
    pub fn get(&self, var: Variable) -> f64 {
        self.idx(var).map_or(0.0, |i| self.scalars[i])
    }

    /// Write a variable; no-op for kinds this region does not carry.
    pub fn set(&mut self, var: Variable, value: f64) {
        if let Some(i) = self.idx(var) {
            self.scalars[i] = value;
        }
    }

    pub fn get_last(&self, var: Variable) -> f64 {
        self.idx(var).map_or(0.0, |i| self.last[i])
    }

    pub fn set_last(&mut self, var: Variable, value: f64) {
        if let Some(i) = self.idx(var) {
            self.last[i] = value;
        }
    }

    pub fn get_last_last(&self, var: Variable) -> f64 {
        self.idx(var).map_or(0.0, |i| self.last_last[i])
    }

    /// Rotate the time history: `last_last <- last <- current`. Called by
    /// the controller on every accepted time step.
    pub fn rotate_last(&mut self) {
        for i in 0..self.scalars.len() {
            self.last_last[i] = self.last[i];
            self.last[i] = self.scalars[i];
        }
    }

    /// Discard the current values and fall back to the last accepted state.
    pub fn restore_last(&mut self) {
        self.scalars.copy_from_slice(&self.last);
    }

    /// Quasi-Fermi level of electrons in normalized thermal-voltage units.
    pub fn qfn(&self, ni: f64) -> f64 {
        let n = self.get(Variable::Electron);
        if self.kind == RegionKind::Semiconductor && n > 0.0 {
            self.get(Variable::Potential) - (n / ni).ln()
        } else {
            0.0
        }
    }

    /// Quasi-Fermi level of holes.
    pub fn qfp(&self, ni: f64) -> f64 {
        let p = self.get(Variable::Hole);
        if self.kind == RegionKind::Semiconductor && p > 0.0 {
            self.get(Variable::Potential) + (p / ni).ln()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_kind_reads_zero_and_ignores_writes() {
        let mut data = NodeData::new(RegionKind::Insulator);
        assert!(!data.is_variable_valid(Variable::Electron));
        data.set(Variable::Electron, 1e15);
        assert_eq!(data.get(Variable::Electron), 0.0);

        data.set(Variable::Potential, 0.5);
        assert_eq!(data.get(Variable::Potential), 0.5);
    }

    #[test]
    fn history_rotation() {
        let mut data = NodeData::new(RegionKind::Semiconductor);
        data.set(Variable::Electron, 1.0);
        data.rotate_last();
        data.set(Variable::Electron, 2.0);
        data.rotate_last();
        assert_eq!(data.get_last(Variable::Electron), 2.0);
        assert_eq!(data.get_last_last(Variable::Electron), 1.0);
    }

    #[test]
    fn user_store_roundtrip() {
        let mut data = NodeData::new(RegionKind::Semiconductor);
        data.user.insert("spice.psi".into(), 0.7);
        assert_eq!(data.user["spice.psi"], 0.7);
    }
}
