//! The simulation system: mesh, CV graph, materials, boundary conditions
//! and the normalization, wired together.

use glam::DVec3;

use crate::bc::BoundaryCondition;
use crate::discretization::cv_graph::CvGraph;
use crate::discretization::mesh::{Mesh, RegionKind};
use crate::error::{Result, SimulationError};
use crate::materials::MaterialParams;
use crate::physics::units::Scaling;
use crate::solution::Variable;

/// A material region resolved against the material library.
pub struct Region {
    pub name: String,
    pub kind: RegionKind,
    pub material: MaterialParams,
}

pub struct SimulationSystem {
    pub mesh: Mesh,
    pub graph: CvGraph,
    pub regions: Vec<Region>,
    pub bcs: Vec<BoundaryCondition>,
    pub scaling: Scaling,
}

impl SimulationSystem {
    /// Build the system from a mesh and a doping profile `(N_D, N_A)` in
    /// cm^-3 over physical position. Geometry inside the CV graph is
    /// normalized in place; mesh node positions stay physical.
    pub fn build(mesh: Mesh, doping: impl Fn(DVec3) -> (f64, f64)) -> Result<Self> {
        let mut regions = Vec::with_capacity(mesh.regions.len());
        for spec in &mesh.regions {
            let material = MaterialParams::lookup(&spec.material)?;
            if material.kind != spec.kind {
                return Err(SimulationError::Config(format!(
                    "region '{}' declares kind {:?} but material '{}' is {:?}",
                    spec.name, spec.kind, spec.material, material.kind
                )));
            }
            regions.push(Region {
                name: spec.name.clone(),
                kind: spec.kind,
                material,
            });
        }

        // Characteristic doping for the normalization.
        let mut n_max: f64 = 0.0;
        for node in &mesh.nodes {
            let (nd, na) = doping(node.position);
            n_max = n_max.max(nd).max(na);
        }
        let eps_ref = regions
            .iter()
            .find(|r| r.kind == RegionKind::Semiconductor)
            .map(|r| r.material.eps_r)
            .unwrap_or(11.7);
        let d_max = regions
            .iter()
            .map(|r| {
                let vt = crate::physics::units::KB * 300.0 / crate::physics::units::Q;
                r.material.mu_n.max(r.material.mu_p) * vt
            })
            .fold(1.0_f64, f64::max);
        let scaling = Scaling::new(n_max, 300.0, eps_ref, d_max);

        let mut graph = CvGraph::build(&mesh);

        // Normalize CV geometry.
        let l = scaling.l;
        for node in graph.fvm_nodes.iter_mut() {
            node.volume /= l * l * l;
            for nb in node.neighbors.iter_mut() {
                nb.area /= l * l;
                nb.distance /= l;
            }
            for g in node.ghosts.iter_mut() {
                g.area /= l * l;
            }
        }
        graph.scale_boundary_areas(1.0 / (l * l));

        // Material and doping data onto the CVs.
        for fid in 0..graph.n_fvm_nodes() {
            let region = &regions[graph.fvm_nodes[fid].region];
            let pos = mesh.nodes[graph.fvm_nodes[fid].root].position;
            let data = &mut graph.node_data[fid];
            data.aux.eps = region.material.eps_r;
            data.aux.density = region.material.density;
            data.aux.affinity = region.material.affinity;
            data.aux.eg = region.material.eg;
            if region.kind == RegionKind::Semiconductor {
                let (nd, na) = doping(pos);
                data.aux.nd = nd / scaling.n;
                data.aux.na = na / scaling.n;
                data.aux.net_doping = (nd - na) / scaling.n;
            }
        }

        let mut sys = Self {
            mesh,
            graph,
            regions,
            bcs: Vec::new(),
            scaling,
        };
        sys.set_equilibrium();
        Ok(sys)
    }

    pub fn add_bc(&mut self, bc: BoundaryCondition) {
        self.bcs.push(bc);
    }

    pub fn bc_by_name(&self, name: &str) -> Option<usize> {
        self.bcs.iter().position(|b| b.name == name)
    }

    /// Thermal-equilibrium nodal values: charge-neutral potential from the
    /// local doping, unity normalized temperatures.
    pub fn set_equilibrium(&mut self) {
        for fid in 0..self.graph.n_fvm_nodes() {
            let region = &self.regions[self.graph.fvm_nodes[fid].region];
            let data = &mut self.graph.node_data[fid];
            match region.kind {
                RegionKind::Semiconductor => {
                    let ni = self.scaling.ni_norm(region.material.ni);
                    let c = data.aux.net_doping;
                    // 2 ni sinh(psi) = C at neutrality.
                    let psi = (c / (2.0 * ni)).asinh();
                    data.set(Variable::Potential, psi);
                    data.set(Variable::Electron, ni * psi.exp());
                    data.set(Variable::Hole, ni * (-psi).exp());
                    data.set(Variable::LatticeTemp, 1.0);
                    data.set(Variable::ElecTemp, 1.0);
                    data.set(Variable::HoleTemp, 1.0);
                }
                _ => {
                    data.set(Variable::Potential, 0.0);
                    data.set(Variable::LatticeTemp, 1.0);
                }
            }
            data.rotate_last();
            data.rotate_last();
        }
    }

    /// Restore every CV to its last accepted state. Called by the
    /// controller on divergence or cancellation.
    pub fn diverged_recovery(&mut self) {
        for data in self.graph.node_data.iter_mut() {
            data.restore_last();
        }
    }

    pub fn region_kinds(&self) -> Vec<RegionKind> {
        self.regions.iter().map(|r| r.kind).collect()
    }

    /// Built-in potential of an ohmic contact on a semiconductor CV
    /// (normalized): the equilibrium potential of the local doping.
    pub fn ohmic_potential(&self, fid: usize) -> f64 {
        let region = &self.regions[self.graph.fvm_nodes[fid].region];
        let data = &self.graph.node_data[fid];
        match region.kind {
            RegionKind::Semiconductor => {
                let ni = self.scaling.ni_norm(region.material.ni);
                (data.aux.net_doping / (2.0 * ni)).asinh()
            }
            _ => 0.0,
        }
    }

    /// Equilibrium carrier densities under charge neutrality at a contact.
    pub fn ohmic_carriers(&self, fid: usize) -> (f64, f64) {
        let region = &self.regions[self.graph.fvm_nodes[fid].region];
        let ni = self.scaling.ni_norm(region.material.ni);
        let psi = self.ohmic_potential(fid);
        (ni * psi.exp(), ni * (-psi).exp())
    }
}
