//! Geometric mesh: nodes, elements, region and boundary tags.
//!
//! Mesh generation proper is an external concern; the simulator consumes a
//! ready mesh. The [`MeshBuilder`] at the bottom produces the structured
//! hexahedral meshes used by the demos and the verification tests.

use std::collections::HashMap;

use glam::DVec3;

/// Material family of a region. Decides which nodal variables exist and
/// which region operators apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Semiconductor,
    Insulator,
    Conductor,
    Vacuum,
}

/// A geometric mesh node.
pub struct MeshNode {
    pub position: DVec3,
    /// Owning process of this node. Single-process runs use 0 throughout;
    /// the field keeps the partition-aware layout walk honest.
    pub processor_id: u32,
}

/// Element shapes supported by the finite-volume discretization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemShape {
    Tet4,
    Hex8,
    Prism6,
}

impl ElemShape {
    pub fn n_nodes(&self) -> usize {
        match self {
            ElemShape::Tet4 => 4,
            ElemShape::Hex8 => 8,
            ElemShape::Prism6 => 6,
        }
    }

    /// Element edges as pairs of local node indices.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            ElemShape::Tet4 => &[[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]],
            ElemShape::Hex8 => &[
                [0, 1],
                [1, 2],
                [2, 3],
                [3, 0],
                [0, 4],
                [1, 5],
                [2, 6],
                [3, 7],
                [4, 5],
                [5, 6],
                [6, 7],
                [7, 4],
            ],
            ElemShape::Prism6 => &[
                [0, 1],
                [1, 2],
                [2, 0],
                [0, 3],
                [1, 4],
                [2, 5],
                [3, 4],
                [4, 5],
                [5, 3],
            ],
        }
    }

    /// Element faces as local node index lists, outward oriented.
    pub fn faces(&self) -> &'static [&'static [usize]] {
        match self {
            ElemShape::Tet4 => &[&[0, 2, 1], &[0, 1, 3], &[1, 2, 3], &[0, 3, 2]],
            ElemShape::Hex8 => &[
                &[0, 3, 2, 1],
                &[4, 5, 6, 7],
                &[0, 1, 5, 4],
                &[1, 2, 6, 5],
                &[2, 3, 7, 6],
                &[3, 0, 4, 7],
            ],
            ElemShape::Prism6 => &[
                &[0, 2, 1],
                &[3, 4, 5],
                &[0, 1, 4, 3],
                &[1, 2, 5, 4],
                &[2, 0, 3, 5],
            ],
        }
    }

    /// The (exactly two) faces of a 3D element containing a given edge.
    pub fn faces_of_edge(&self, edge: [usize; 2]) -> [usize; 2] {
        let mut found = [usize::MAX; 2];
        let mut k = 0;
        for (fi, face) in self.faces().iter().enumerate() {
            if face.contains(&edge[0]) && face.contains(&edge[1]) {
                found[k] = fi;
                k += 1;
                if k == 2 {
                    break;
                }
            }
        }
        debug_assert_eq!(k, 2, "edge must lie on two faces of a 3D element");
        found
    }
}

/// A mesh element with its region tag.
pub struct Elem {
    pub shape: ElemShape,
    pub nodes: Vec<usize>,
    pub region: usize,
    /// Refinement level, 0 for an unrefined mesh.
    pub level: u8,
}

/// A material region of the device.
pub struct RegionSpec {
    pub name: String,
    pub material: String,
    pub kind: RegionKind,
}

/// A named boundary (outer surface patch or region interface).
pub struct BoundarySpec {
    pub name: String,
}

/// One element face together with its neighborhood, produced by
/// [`Mesh::classify_faces`].
pub struct FaceInfo {
    pub elem: usize,
    pub local_face: usize,
    /// Neighboring element sharing the face, if any.
    pub neighbor: Option<usize>,
    /// Boundary id carried by this face (outer label or region interface).
    pub boundary: Option<usize>,
}

/// The complete computational grid.
pub struct Mesh {
    pub nodes: Vec<MeshNode>,
    pub elems: Vec<Elem>,
    pub regions: Vec<RegionSpec>,
    pub boundaries: Vec<BoundarySpec>,
    /// Face labels assigned by the builder: (elem, local_face) -> boundary id.
    pub face_labels: HashMap<(usize, usize), usize>,
}

impl Mesh {
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_elems(&self) -> usize {
        self.elems.len()
    }

    pub fn boundary_id(&self, name: &str) -> Option<usize> {
        self.boundaries.iter().position(|b| b.name == name)
    }

    pub fn elem_centroid(&self, e: usize) -> DVec3 {
        let elem = &self.elems[e];
        let mut c = DVec3::ZERO;
        for &n in &elem.nodes {
            c += self.nodes[n].position;
        }
        c / elem.nodes.len() as f64
    }

    pub fn face_centroid(&self, e: usize, local_face: usize) -> DVec3 {
        let elem = &self.elems[e];
        let face = elem.shape.faces()[local_face];
        let mut c = DVec3::ZERO;
        for &ln in face {
            c += self.nodes[elem.nodes[ln]].position;
        }
        c / face.len() as f64
    }

    /// Area of a (planar) element face, by fan triangulation around its
    /// centroid.
    pub fn face_area(&self, e: usize, local_face: usize) -> f64 {
        let elem = &self.elems[e];
        let face = elem.shape.faces()[local_face];
        let c = self.face_centroid(e, local_face);
        let mut area = 0.0;
        for i in 0..face.len() {
            let a = self.nodes[elem.nodes[face[i]]].position;
            let b = self.nodes[elem.nodes[face[(i + 1) % face.len()]]].position;
            area += triangle_area(c, a, b);
        }
        area
    }

    /// Outward unit normal of an element face.
    pub fn face_normal(&self, e: usize, local_face: usize) -> DVec3 {
        let elem = &self.elems[e];
        let face = elem.shape.faces()[local_face];
        let a = self.nodes[elem.nodes[face[0]]].position;
        let b = self.nodes[elem.nodes[face[1]]].position;
        let c = self.nodes[elem.nodes[face[2]]].position;
        (b - a).cross(c - a).normalize()
    }

    /// Pair up element faces into interior/interface/outer faces. Each
    /// shared face appears once, owned by the lower element id.
    pub fn classify_faces(&self) -> Vec<FaceInfo> {
        let mut by_key: HashMap<Vec<usize>, (usize, usize)> = HashMap::new();
        let mut out = Vec::new();
        for (e, elem) in self.elems.iter().enumerate() {
            for (lf, face) in elem.shape.faces().iter().enumerate() {
                let mut key: Vec<usize> = face.iter().map(|&ln| elem.nodes[ln]).collect();
                key.sort_unstable();
                if let Some((oe, olf)) = by_key.remove(&key) {
                    let boundary = self
                        .face_labels
                        .get(&(oe, olf))
                        .or_else(|| self.face_labels.get(&(e, lf)))
                        .copied();
                    out.push(FaceInfo {
                        elem: oe,
                        local_face: olf,
                        neighbor: Some(e),
                        boundary,
                    });
                } else {
                    by_key.insert(key, (e, lf));
                }
            }
        }
        for (_, (e, lf)) in by_key {
            let boundary = self.face_labels.get(&(e, lf)).copied();
            out.push(FaceInfo {
                elem: e,
                local_face: lf,
                neighbor: None,
                boundary,
            });
        }
        out.sort_by_key(|f| (f.elem, f.local_face));
        out
    }
}

pub fn triangle_area(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    0.5 * (b - a).cross(c - a).length()
}

pub fn tet_volume(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    ((b - a).cross(c - a).dot(d - a) / 6.0).abs()
}

/// Structured hexahedral mesh builder for device stacks.
///
/// Regions are assigned per element by a caller-supplied closure over the
/// element centroid; outer faces are labeled by a closure over the face
/// centroid and outward normal. Interfaces between different regions are
/// labeled automatically as `"region_a/region_b"`.
pub struct MeshBuilder {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub size: DVec3,
    pub origin: DVec3,
}

impl MeshBuilder {
    pub fn new(nx: usize, ny: usize, nz: usize, size: DVec3) -> Self {
        Self {
            nx,
            ny,
            nz,
            size,
            origin: DVec3::ZERO,
        }
    }

    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = origin;
        self
    }

    /// Build the mesh. `regions` declares the region table; `region_of`
    /// maps an element centroid to an index into it; `label_of` may tag
    /// outer faces with boundary names.
    pub fn build(
        &self,
        regions: Vec<RegionSpec>,
        region_of: impl Fn(DVec3) -> usize,
        label_of: impl Fn(DVec3, DVec3) -> Option<String>,
    ) -> Mesh {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        let d = DVec3::new(
            self.size.x / nx as f64,
            self.size.y / ny as f64,
            self.size.z / nz as f64,
        );

        let node_id = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;

        let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    nodes.push(MeshNode {
                        position: self.origin
                            + DVec3::new(i as f64 * d.x, j as f64 * d.y, k as f64 * d.z),
                        processor_id: 0,
                    });
                }
            }
        }

        let mut elems = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let n = [
                        node_id(i, j, k),
                        node_id(i + 1, j, k),
                        node_id(i + 1, j + 1, k),
                        node_id(i, j + 1, k),
                        node_id(i, j, k + 1),
                        node_id(i + 1, j, k + 1),
                        node_id(i + 1, j + 1, k + 1),
                        node_id(i, j + 1, k + 1),
                    ];
                    let centroid = self.origin
                        + DVec3::new(
                            (i as f64 + 0.5) * d.x,
                            (j as f64 + 0.5) * d.y,
                            (k as f64 + 0.5) * d.z,
                        );
                    elems.push(Elem {
                        shape: ElemShape::Hex8,
                        nodes: n.to_vec(),
                        region: region_of(centroid),
                        level: 0,
                    });
                }
            }
        }

        let mut mesh = Mesh {
            nodes,
            elems,
            regions,
            boundaries: Vec::new(),
            face_labels: HashMap::new(),
        };

        // Outer-face labels from the caller, interface labels automatic.
        let mut labels: Vec<((usize, usize), String)> = Vec::new();
        for info in mesh.classify_faces() {
            match info.neighbor {
                None => {
                    let c = mesh.face_centroid(info.elem, info.local_face);
                    let n = mesh.face_normal(info.elem, info.local_face);
                    if let Some(name) = label_of(c, n) {
                        labels.push(((info.elem, info.local_face), name));
                    }
                }
                Some(other) => {
                    let ra = mesh.elems[info.elem].region;
                    let rb = mesh.elems[other].region;
                    if ra != rb {
                        let (lo, hi) = (ra.min(rb), ra.max(rb));
                        let name =
                            format!("{}/{}", mesh.regions[lo].name, mesh.regions[hi].name);
                        labels.push(((info.elem, info.local_face), name));
                    }
                }
            }
        }
        for ((e, lf), name) in labels {
            let id = match mesh.boundary_id(&name) {
                Some(id) => id,
                None => {
                    mesh.boundaries.push(BoundarySpec { name });
                    mesh.boundaries.len() - 1
                }
            };
            mesh.face_labels.insert((e, lf), id);
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> Mesh {
        MeshBuilder::new(2, 2, 2, DVec3::ONE).build(
            vec![RegionSpec {
                name: "bulk".into(),
                material: "Si".into(),
                kind: RegionKind::Semiconductor,
            }],
            |_| 0,
            |c, _| {
                if c.x < 1e-12 {
                    Some("left".into())
                } else if c.x > 1.0 - 1e-12 {
                    Some("right".into())
                } else {
                    None
                }
            },
        )
    }

    #[test]
    fn hex_face_geometry() {
        let mesh = unit_cube();
        assert_eq!(mesh.n_nodes(), 27);
        assert_eq!(mesh.n_elems(), 8);
        let area = mesh.face_area(0, 0);
        assert!((area - 0.25).abs() < 1e-14);
    }

    #[test]
    fn face_classification_counts() {
        let mesh = unit_cube();
        let faces = mesh.classify_faces();
        let interior = faces.iter().filter(|f| f.neighbor.is_some()).count();
        let outer = faces.iter().filter(|f| f.neighbor.is_none()).count();
        // 2x2x2 hex grid: 12 interior faces, 24 outer.
        assert_eq!(interior, 12);
        assert_eq!(outer, 24);
        let labeled = faces.iter().filter(|f| f.boundary.is_some()).count();
        // 4 faces each on the left and right surfaces.
        assert_eq!(labeled, 8);
    }

    #[test]
    fn edge_face_incidence() {
        for shape in [ElemShape::Tet4, ElemShape::Hex8, ElemShape::Prism6] {
            for &edge in shape.edges() {
                let fs = shape.faces_of_edge(edge);
                assert_ne!(fs[0], fs[1]);
            }
        }
    }
}
