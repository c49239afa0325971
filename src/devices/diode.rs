//! Abrupt PN junction diodes.

use glam::DVec3;

use crate::bc::{BcKind, BoundaryCondition};
use crate::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
use crate::error::Result;
use crate::system::SimulationSystem;

pub struct DiodeSpec {
    /// Device length along x [cm].
    pub length: f64,
    /// Cross-section edge [cm].
    pub width: f64,
    /// Acceptor doping on the anode side [cm^-3].
    pub na: f64,
    /// Donor doping on the cathode side [cm^-3].
    pub nd: f64,
    /// Axial element count.
    pub nx: usize,
    /// Transverse element count.
    pub nt: usize,
}

impl Default for DiodeSpec {
    fn default() -> Self {
        Self {
            length: 2.0e-4,
            width: 1.0e-4,
            na: 1.0e17,
            nd: 1.0e17,
            nx: 40,
            nt: 1,
        }
    }
}

/// Single-region abrupt junction: p-side at the anode (x = 0), n-side at
/// the cathode. Electrodes are named `anode` and `cathode`.
pub fn build_pn_diode(spec: &DiodeSpec) -> Result<SimulationSystem> {
    let length = spec.length;
    let mesh = MeshBuilder::new(
        spec.nx,
        spec.nt,
        spec.nt,
        DVec3::new(length, spec.width, spec.width),
    )
    .build(
        vec![RegionSpec {
            name: "bulk".into(),
            material: "Si".into(),
            kind: RegionKind::Semiconductor,
        }],
        |_| 0,
        |c, _| {
            if c.x < 1e-30 {
                Some("anode".into())
            } else if c.x > length - length * 1e-9 {
                Some("cathode".into())
            } else {
                None
            }
        },
    );

    let (na, nd, half) = (spec.na, spec.nd, length / 2.0);
    let mut sys = SimulationSystem::build(mesh, move |p| {
        if p.x < half {
            (0.0, na)
        } else {
            (nd, 0.0)
        }
    })?;

    for name in ["anode", "cathode"] {
        let id = sys
            .mesh
            .boundary_id(name)
            .expect("contact face must be labeled");
        let nodes = sys.graph.boundary_nodes[id].clone();
        sys.add_bc(BoundaryCondition::new(&nodes, name, id, BcKind::OhmicContact));
    }
    Ok(sys)
}

/// Same junction split into two silicon regions meeting at the
/// metallurgical plane, joined by a homojunction interface condition.
pub fn build_pn_diode_split(spec: &DiodeSpec) -> Result<SimulationSystem> {
    let length = spec.length;
    let half = length / 2.0;
    let mesh = MeshBuilder::new(
        spec.nx,
        spec.nt,
        spec.nt,
        DVec3::new(length, spec.width, spec.width),
    )
    .build(
        vec![
            RegionSpec {
                name: "pside".into(),
                material: "Si".into(),
                kind: RegionKind::Semiconductor,
            },
            RegionSpec {
                name: "nside".into(),
                material: "Si".into(),
                kind: RegionKind::Semiconductor,
            },
        ],
        move |c| if c.x < half { 0 } else { 1 },
        |c, _| {
            if c.x < 1e-30 {
                Some("anode".into())
            } else if c.x > length - length * 1e-9 {
                Some("cathode".into())
            } else {
                None
            }
        },
    );

    let (na, nd) = (spec.na, spec.nd);
    let mut sys = SimulationSystem::build(mesh, move |p| {
        if p.x < half {
            (0.0, na)
        } else {
            (nd, 0.0)
        }
    })?;

    for name in ["anode", "cathode"] {
        let id = sys.mesh.boundary_id(name).expect("contact face label");
        let nodes = sys.graph.boundary_nodes[id].clone();
        sys.add_bc(BoundaryCondition::new(&nodes, name, id, BcKind::OhmicContact));
    }
    let iface = sys
        .mesh
        .boundary_id("pside/nside")
        .expect("interface label");
    let nodes = sys.graph.boundary_nodes[iface].clone();
    sys.add_bc(BoundaryCondition::new(
        &nodes,
        "junction",
        iface,
        BcKind::HomoInterface,
    ));
    Ok(sys)
}
