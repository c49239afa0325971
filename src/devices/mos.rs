//! MOS structures: a capacitor with a lumped gate stack, and a meshed
//! oxide slab for dielectric verification.

use glam::DVec3;

use crate::bc::{BcKind, BoundaryCondition};
use crate::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
use crate::error::Result;
use crate::system::SimulationSystem;

pub struct MosCapSpec {
    /// Silicon thickness along x [cm].
    pub si_thickness: f64,
    /// Gate oxide thickness [cm] (lumped, not meshed).
    pub t_ox: f64,
    /// Gate area edge [cm].
    pub width: f64,
    /// Substrate acceptor doping [cm^-3].
    pub na: f64,
    /// Gate metal work function [V].
    pub work_function: f64,
    /// Fixed oxide charge [C/cm^2].
    pub qf: f64,
    pub nx: usize,
}

impl Default for MosCapSpec {
    fn default() -> Self {
        Self {
            si_thickness: 1.0e-4,
            t_ox: 20.0e-7,
            width: 1.0e-4,
            na: 1.0e16,
            work_function: 4.1,
            qf: 0.0,
            nx: 40,
        }
    }
}

/// p-substrate MOS capacitor: lumped gate stack on the x = 0 surface,
/// ohmic substrate contact at the back. Electrodes `gate` and
/// `substrate`.
pub fn build_mos_capacitor(spec: &MosCapSpec) -> Result<SimulationSystem> {
    let depth = spec.si_thickness;
    let mesh = MeshBuilder::new(spec.nx, 1, 1, DVec3::new(depth, spec.width, spec.width)).build(
        vec![RegionSpec {
            name: "substrate".into(),
            material: "Si".into(),
            kind: RegionKind::Semiconductor,
        }],
        |_| 0,
        |c, _| {
            if c.x < 1e-30 {
                Some("gate".into())
            } else if c.x > depth * (1.0 - 1e-9) {
                Some("substrate".into())
            } else {
                None
            }
        },
    );

    let na = spec.na;
    let mut sys = SimulationSystem::build(mesh, move |_| (0.0, na))?;

    let gate_id = sys.mesh.boundary_id("gate").expect("gate face label");
    let gate_nodes = sys.graph.boundary_nodes[gate_id].clone();
    // Work-function difference against p-silicon mid-gap reference.
    let si = &sys.regions[0].material;
    let wf_offset = spec.work_function - (si.affinity + si.eg / 2.0);
    sys.add_bc(BoundaryCondition::new(
        &gate_nodes,
        "gate",
        gate_id,
        BcKind::SimpleGateContact {
            work_function: wf_offset,
            thickness: spec.t_ox,
            eps_ox: 3.9,
            qf: spec.qf,
        },
    ));

    let sub_id = sys.mesh.boundary_id("substrate").expect("substrate label");
    let sub_nodes = sys.graph.boundary_nodes[sub_id].clone();
    sys.add_bc(BoundaryCondition::new(
        &sub_nodes,
        "substrate",
        sub_id,
        BcKind::OhmicContact,
    ));
    Ok(sys)
}

pub struct OxideSlabSpec {
    /// Thickness along x [cm].
    pub thickness: f64,
    pub width: f64,
    pub nx: usize,
}

impl Default for OxideSlabSpec {
    fn default() -> Self {
        Self {
            thickness: 20.0e-7,
            width: 1.0e-4,
            nx: 10,
        }
    }
}

/// Meshed SiO2 slab between two contacts, the parallel-plate reference
/// for dielectric and heat-flow checks. Electrodes `top` and `bottom`.
pub fn build_oxide_slab(spec: &OxideSlabSpec) -> Result<SimulationSystem> {
    let thickness = spec.thickness;
    let mesh =
        MeshBuilder::new(spec.nx, 1, 1, DVec3::new(thickness, spec.width, spec.width)).build(
            vec![RegionSpec {
                name: "oxide".into(),
                material: "SiO2".into(),
                kind: RegionKind::Insulator,
            }],
            |_| 0,
            |c, _| {
                if c.x < 1e-30 {
                    Some("top".into())
                } else if c.x > thickness * (1.0 - 1e-9) {
                    Some("bottom".into())
                } else {
                    None
                }
            },
        );

    let mut sys = SimulationSystem::build(mesh, |_| (0.0, 0.0))?;
    for name in ["top", "bottom"] {
        let id = sys.mesh.boundary_id(name).expect("contact label");
        let nodes = sys.graph.boundary_nodes[id].clone();
        sys.add_bc(BoundaryCondition::new(&nodes, name, id, BcKind::OhmicContact));
    }
    Ok(sys)
}
