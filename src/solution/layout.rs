//! Degree-of-freedom layout for one solve.
//!
//! Given the variable set each region solves under the active physics
//! level, CVs are walked in a stable order (geometric node id within each
//! processor partition, partitions concatenated) and receive contiguous
//! global offsets. Extra boundary-condition DOFs (electrode potential)
//! append after the node DOFs. Offsets are reassigned at the start of
//! every solve so live DOFs always pack contiguously.

use super::{EquationFamily, Variable};
use crate::discretization::cv_graph::CvGraph;
use crate::discretization::mesh::Mesh;

pub struct DofLayout {
    /// Total DOF count including boundary extras.
    pub n_dofs: usize,
    /// Node DOFs only.
    pub n_node_dofs: usize,
    /// Ordered variable list per region id.
    pub region_vars: Vec<Vec<Variable>>,
    /// Per-DOF equation family, used for convergence norms.
    pub families: Vec<EquationFamily>,
    /// Global offset of each boundary condition's extra DOF block.
    pub bc_offsets: Vec<Option<usize>>,
    /// CV ids in layout order (useful for deterministic walks).
    pub order: Vec<usize>,
}

impl DofLayout {
    /// Assign offsets. `region_vars[r]` is the ordered variable list solved
    /// in region `r`; `bc_extra[b]` the number of extra DOFs boundary
    /// condition `b` carries (0 or, for AC pairs, 2).
    pub fn build(
        graph: &mut CvGraph,
        mesh: &Mesh,
        region_vars: Vec<Vec<Variable>>,
        bc_extra: &[usize],
    ) -> Self {
        graph.clear_offsets();

        let mut families = Vec::new();
        let mut order = Vec::with_capacity(graph.n_fvm_nodes());
        let mut offset = 0usize;

        // Single partition: processor 0 owns every node. The nested walk is
        // kept so a partitioned mesh lays out rank blocks back to back.
        let max_proc = mesh.nodes.iter().map(|n| n.processor_id).max().unwrap_or(0);
        for proc in 0..=max_proc {
            for node in 0..mesh.n_nodes() {
                if mesh.nodes[node].processor_id != proc {
                    continue;
                }
                for &fid in &graph.by_root[node] {
                    let vars = &region_vars[graph.fvm_nodes[fid].region];
                    graph.fvm_nodes[fid].global_offset = offset;
                    graph.fvm_nodes[fid].local_offset = offset;
                    for var in vars {
                        families.push(var.family());
                    }
                    offset += vars.len();
                    order.push(fid);
                }
            }
        }
        let n_node_dofs = offset;

        let mut bc_offsets = Vec::with_capacity(bc_extra.len());
        for &extra in bc_extra {
            if extra == 0 {
                bc_offsets.push(None);
            } else {
                bc_offsets.push(Some(offset));
                for _ in 0..extra {
                    families.push(EquationFamily::Electrode);
                }
                offset += extra;
            }
        }

        Self {
            n_dofs: offset,
            n_node_dofs,
            region_vars,
            families,
            bc_offsets,
            order,
        }
    }

    /// Number of variables a CV of the given region carries in this layout.
    pub fn n_vars(&self, region: usize) -> usize {
        self.region_vars[region].len()
    }

    /// Position of a variable within a region's DOF block.
    pub fn var_index(&self, region: usize, var: Variable) -> Option<usize> {
        self.region_vars[region].iter().position(|&v| v == var)
    }

    /// Global DOF of (CV, variable), if the region solves that variable.
    pub fn dof(&self, graph: &CvGraph, fid: usize, var: Variable) -> Option<usize> {
        let node = &graph.fvm_nodes[fid];
        self.var_index(node.region, var)
            .map(|i| node.global_offset + i)
    }

    /// L2 norms of a residual vector grouped by equation family.
    pub fn family_norms(&self, residual: &[f64]) -> Vec<(EquationFamily, f64)> {
        let mut acc: Vec<(EquationFamily, f64)> = Vec::new();
        for (i, &f) in self.families.iter().enumerate() {
            let r = residual[i];
            match acc.iter_mut().find(|(fam, _)| *fam == f) {
                Some((_, s)) => *s += r * r,
                None => acc.push((f, r * r)),
            }
        }
        for (_, s) in acc.iter_mut() {
            *s = s.sqrt();
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
    use glam::DVec3;

    #[test]
    fn offsets_partition_contiguously() {
        let mesh = MeshBuilder::new(3, 1, 1, DVec3::new(3.0, 1.0, 1.0)).build(
            vec![
                RegionSpec {
                    name: "a".into(),
                    material: "Si".into(),
                    kind: RegionKind::Semiconductor,
                },
                RegionSpec {
                    name: "b".into(),
                    material: "SiO2".into(),
                    kind: RegionKind::Insulator,
                },
            ],
            |c| if c.x < 2.0 { 0 } else { 1 },
            |_, _| None,
        );
        let mut graph = CvGraph::build(&mesh);
        let layout = DofLayout::build(
            &mut graph,
            &mesh,
            vec![
                vec![Variable::Potential, Variable::Electron, Variable::Hole],
                vec![Variable::Potential],
            ],
            &[0, 1],
        );

        // Every CV offset block must tile [0, n_node_dofs) without gaps.
        let mut covered = vec![false; layout.n_node_dofs];
        for (fid, node) in graph.fvm_nodes.iter().enumerate() {
            assert!(node.is_valid());
            let m = layout.n_vars(node.region);
            for k in 0..m {
                assert!(!covered[node.global_offset + k], "overlap at CV {fid}");
                covered[node.global_offset + k] = true;
            }
        }
        assert!(covered.into_iter().all(|c| c));

        // The single electrode DOF appends after the node DOFs.
        assert_eq!(layout.bc_offsets[0], None);
        assert_eq!(layout.bc_offsets[1], Some(layout.n_node_dofs));
        assert_eq!(layout.n_dofs, layout.n_node_dofs + 1);
        assert_eq!(layout.families.len(), layout.n_dofs);
    }
}
