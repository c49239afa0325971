//! Circuit cosimulation seam.
//!
//! The SPICE-side transport lives elsewhere; per time step the device
//! solver exports each electrode's current and sensitivities and imports
//! driving sources plus accept/reject decisions. Named checkpoint slots
//! on every CV let the device roll back in lockstep with the circuit's
//! own integrator.

use crate::bc::contacts::{conduction_sensitivity, electrode_current};
use crate::solution::layout::DofLayout;
use crate::solution::Variable;
use crate::system::SimulationSystem;

/// Per-electrode load exported to the circuit solver.
pub struct ElectrodeLoad {
    pub name: String,
    /// Terminal current [A].
    pub current: f64,
    /// Sensitivity of the normalized current to the device DOFs.
    pub di_dx: Vec<(usize, f64)>,
    /// Sensitivity of the contact residual rows to the electrode voltage
    /// (the `dF/dV` column): -1 on every Dirichlet potential row.
    pub df_dv: Vec<(usize, f64)>,
}

/// Driving sources handed back by the circuit for the next step.
pub struct ElectrodeDrive {
    pub name: String,
    pub v_src: f64,
}

/// Transport interface to the external circuit simulator.
pub trait CircuitBridge {
    /// Exchange loads for drives at a circuit time point.
    fn exchange(&mut self, time: f64, loads: &[ElectrodeLoad]) -> Vec<ElectrodeDrive>;
    /// The circuit accepted the step.
    fn accept(&mut self, time: f64);
    /// The circuit rejected the step; the device rolls back.
    fn reject(&mut self);
}

/// Collect the load block for every electrode with a circuit attachment.
pub fn gather_electrode_loads(
    sys: &SimulationSystem,
    layout: &DofLayout,
    x: &[f64],
) -> Vec<ElectrodeLoad> {
    let mut loads = Vec::new();
    for bc in &sys.bcs {
        if !bc.is_electrode() || bc.circuit.is_none() {
            continue;
        }
        let mut df_dv = Vec::new();
        for &node in &bc.nodes {
            for &fid in &sys.graph.by_root[node] {
                if let Some(psi) = layout.dof(&sys.graph, fid, Variable::Potential) {
                    df_dv.push((psi, -1.0));
                }
            }
        }
        loads.push(ElectrodeLoad {
            name: bc.name.clone(),
            current: electrode_current(bc, sys, layout, x),
            di_dx: conduction_sensitivity(bc, sys, layout, x),
            df_dv,
        });
    }
    loads
}

const SPICE_SLOTS: &[(&str, Variable)] = &[
    ("spice.psi", Variable::Potential),
    ("spice.n", Variable::Electron),
    ("spice.p", Variable::Hole),
    ("spice.t", Variable::LatticeTemp),
];

/// Create the checkpoint slots on every CV from the current state.
pub fn init_spice_data(sys: &mut SimulationSystem) {
    save_spice_data(sys);
}

/// Save the current nodal state into the named slots (the circuit
/// accepted the solution).
pub fn save_spice_data(sys: &mut SimulationSystem) {
    for data in sys.graph.node_data.iter_mut() {
        for &(slot, var) in SPICE_SLOTS {
            if data.is_variable_valid(var) {
                data.user.insert(slot.to_string(), data.get(var));
            }
        }
    }
}

/// Restore the nodal state from the named slots (rollback after a circuit
/// rejection).
pub fn load_spice_data(sys: &mut SimulationSystem) {
    for data in sys.graph.node_data.iter_mut() {
        for &(slot, var) in SPICE_SLOTS {
            if let Some(&v) = data.user.get(slot) {
                data.set(var, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
    use glam::DVec3;

    #[test]
    fn spice_checkpoint_roundtrip() {
        let mesh = MeshBuilder::new(2, 1, 1, DVec3::new(2.0e-4, 1.0e-4, 1.0e-4)).build(
            vec![RegionSpec {
                name: "bulk".into(),
                material: "Si".into(),
                kind: RegionKind::Semiconductor,
            }],
            |_| 0,
            |_, _| None,
        );
        let mut sys = crate::system::SimulationSystem::build(mesh, |_| (1e16, 0.0)).unwrap();
        init_spice_data(&mut sys);

        let before = sys.graph.node_data[0].get(Variable::Electron);
        sys.graph.node_data[0].set(Variable::Electron, before * 2.0);
        load_spice_data(&mut sys);
        assert_eq!(sys.graph.node_data[0].get(Variable::Electron), before);
    }
}
