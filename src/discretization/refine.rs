//! Element flagging for adaptive mesh refinement.
//!
//! The refinement machinery itself lives with the mesher; the simulator's
//! contribution is turning a per-element error indicator into
//! refine/coarsen flags under one of the selection strategies, smoothing
//! the flag field so neighboring levels never differ by more than one,
//! and removing lone unrefined elements surrounded by refined neighbors.
//! After the external refiner runs, the CV graph and DOF layout are
//! discarded and rebuilt from the new mesh.

use std::collections::HashMap;

use super::mesh::Mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineFlag {
    DoNothing,
    Refine,
    Coarsen,
    Inactive,
    CoarsenInactive,
}

/// Per-element error indicator.
pub type ErrorVector = Vec<f64>;

/// Flag the elements whose error lies within the top `refine_fraction` of
/// the error range, and coarsen those in the bottom `coarsen_fraction`.
pub fn flag_by_error_fraction(
    error: &ErrorVector,
    refine_fraction: f64,
    coarsen_fraction: f64,
) -> Vec<RefineFlag> {
    assert!((0.0..=1.0).contains(&refine_fraction));
    assert!((0.0..=1.0).contains(&coarsen_fraction));
    let error_max = error.iter().cloned().fold(f64::MIN, f64::max);
    let error_min = error.iter().cloned().fold(f64::MAX, f64::min);
    let delta = error_max - error_min;
    let refine_cutoff = (1.0 - refine_fraction) * error_max;
    let coarsen_cutoff = coarsen_fraction * delta + error_min;
    error
        .iter()
        .map(|&e| {
            if e > refine_cutoff {
                RefineFlag::Refine
            } else if e <= coarsen_cutoff {
                RefineFlag::Coarsen
            } else {
                RefineFlag::DoNothing
            }
        })
        .collect()
}

/// Refine wherever the indicator exceeds an absolute tolerance; coarsen
/// below `coarsen_threshold` times it.
pub fn flag_by_error_tolerance(
    error: &ErrorVector,
    tolerance: f64,
    coarsen_threshold: f64,
) -> Vec<RefineFlag> {
    error
        .iter()
        .map(|&e| {
            if e > tolerance {
                RefineFlag::Refine
            } else if e < coarsen_threshold * tolerance {
                RefineFlag::Coarsen
            } else {
                RefineFlag::DoNothing
            }
        })
        .collect()
}

/// Refine above, coarsen below a pair of absolute thresholds.
pub fn flag_by_error_threshold(
    error: &ErrorVector,
    refine_above: f64,
    coarsen_below: f64,
) -> Vec<RefineFlag> {
    error
        .iter()
        .map(|&e| {
            if e > refine_above {
                RefineFlag::Refine
            } else if e < coarsen_below {
                RefineFlag::Coarsen
            } else {
                RefineFlag::DoNothing
            }
        })
        .collect()
}

/// Drive the active element count toward a target: refine the worst
/// elements when under it, coarsen the best when over.
pub fn flag_by_nelem_target(error: &ErrorVector, target: usize) -> Vec<RefineFlag> {
    let n = error.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| error[a].total_cmp(&error[b]));
    let mut flags = vec![RefineFlag::DoNothing; n];
    if n < target {
        // Each refined hex yields 8 children, net +7 per element.
        let need = (target - n + 6) / 7;
        for &i in order.iter().rev().take(need) {
            flags[i] = RefineFlag::Refine;
        }
    } else if n > target {
        let excess = n - target;
        for &i in order.iter().take(excess) {
            flags[i] = RefineFlag::Coarsen;
        }
    }
    flags
}

/// Refine the worst `refine_fraction` and coarsen the best
/// `coarsen_fraction` of elements by count.
pub fn flag_by_elem_fraction(
    error: &ErrorVector,
    refine_fraction: f64,
    coarsen_fraction: f64,
) -> Vec<RefineFlag> {
    let n = error.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| error[a].total_cmp(&error[b]));
    let n_refine = (refine_fraction * n as f64) as usize;
    let n_coarsen = (coarsen_fraction * n as f64) as usize;
    let mut flags = vec![RefineFlag::DoNothing; n];
    for &i in order.iter().rev().take(n_refine) {
        flags[i] = RefineFlag::Refine;
    }
    for &i in order.iter().take(n_coarsen) {
        flags[i] = RefineFlag::Coarsen;
    }
    flags
}

/// Statistical selection: refine above `mean + refine_fraction * stddev`,
/// coarsen below `mean - coarsen_fraction * stddev`.
pub fn flag_by_mean_stddev(
    error: &ErrorVector,
    refine_fraction: f64,
    coarsen_fraction: f64,
) -> Vec<RefineFlag> {
    let n = error.len().max(1) as f64;
    let mean = error.iter().sum::<f64>() / n;
    let var = error.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / n;
    let std = var.sqrt();
    flag_by_error_threshold(
        error,
        mean + refine_fraction * std,
        mean - coarsen_fraction * std,
    )
}

/// Limit the refinement-level mismatch between face neighbors to
/// `max_mismatch` by upgrading coarse neighbors to `Refine`, and cancel
/// coarsening that would widen a mismatch. Returns the number of flags
/// changed.
pub fn smooth_level_mismatch(
    mesh: &Mesh,
    flags: &mut [RefineFlag],
    max_mismatch: u8,
) -> usize {
    let mut changed = 0;
    // Neighbor pairs from the shared-face map.
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    {
        let mut by_key: HashMap<Vec<usize>, usize> = HashMap::new();
        for (e, elem) in mesh.elems.iter().enumerate() {
            for face in elem.shape.faces() {
                let mut key: Vec<usize> = face.iter().map(|&ln| elem.nodes[ln]).collect();
                key.sort_unstable();
                if let Some(other) = by_key.remove(&key) {
                    pairs.push((other, e));
                } else {
                    by_key.insert(key, e);
                }
            }
        }
    }

    let target_level = |level: u8, flag: RefineFlag| -> i32 {
        match flag {
            RefineFlag::Refine => level as i32 + 1,
            RefineFlag::Coarsen | RefineFlag::CoarsenInactive => level as i32 - 1,
            _ => level as i32,
        }
    };

    let mut stable = false;
    while !stable {
        stable = true;
        for &(a, b) in &pairs {
            let la = target_level(mesh.elems[a].level, flags[a]);
            let lb = target_level(mesh.elems[b].level, flags[b]);
            if (la - lb).abs() <= max_mismatch as i32 {
                continue;
            }
            let (lo, _hi) = if la < lb { (a, b) } else { (b, a) };
            if flags[lo] == RefineFlag::Coarsen {
                flags[lo] = RefineFlag::DoNothing;
            } else {
                flags[lo] = RefineFlag::Refine;
            }
            changed += 1;
            stable = false;
        }
    }
    changed
}

/// Eliminate unrefined islands: an element whose face neighbors are all
/// flagged for refinement gets refined too.
pub fn eliminate_unrefined_islands(mesh: &Mesh, flags: &mut [RefineFlag]) -> usize {
    let mut neighbor_lists: Vec<Vec<usize>> = vec![Vec::new(); mesh.n_elems()];
    {
        let mut by_key: HashMap<Vec<usize>, usize> = HashMap::new();
        for (e, elem) in mesh.elems.iter().enumerate() {
            for face in elem.shape.faces() {
                let mut key: Vec<usize> = face.iter().map(|&ln| elem.nodes[ln]).collect();
                key.sort_unstable();
                if let Some(other) = by_key.remove(&key) {
                    neighbor_lists[e].push(other);
                    neighbor_lists[other].push(e);
                } else {
                    by_key.insert(key, e);
                }
            }
        }
    }
    let mut changed = 0;
    for e in 0..mesh.n_elems() {
        if flags[e] != RefineFlag::DoNothing || neighbor_lists[e].is_empty() {
            continue;
        }
        if neighbor_lists[e]
            .iter()
            .all(|&nb| flags[nb] == RefineFlag::Refine)
        {
            flags[e] = RefineFlag::Refine;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::mesh::{MeshBuilder, RegionKind, RegionSpec};
    use glam::DVec3;

    fn bar() -> Mesh {
        MeshBuilder::new(4, 1, 1, DVec3::new(4.0, 1.0, 1.0)).build(
            vec![RegionSpec {
                name: "bulk".into(),
                material: "Si".into(),
                kind: RegionKind::Semiconductor,
            }],
            |_| 0,
            |_, _| None,
        )
    }

    #[test]
    fn error_fraction_flags_extremes() {
        let error = vec![0.0, 0.2, 0.5, 1.0];
        let flags = flag_by_error_fraction(&error, 0.3, 0.1);
        assert_eq!(flags[3], RefineFlag::Refine);
        assert_eq!(flags[0], RefineFlag::Coarsen);
        assert_eq!(flags[2], RefineFlag::DoNothing);
    }

    #[test]
    fn nelem_target_refines_worst_first() {
        let error = vec![0.1, 0.9, 0.3, 0.2];
        let flags = flag_by_nelem_target(&error, 12);
        assert_eq!(flags[1], RefineFlag::Refine);
        assert_eq!(flags.iter().filter(|f| **f == RefineFlag::Refine).count(), 2);
    }

    #[test]
    fn islands_are_eliminated() {
        let mesh = bar();
        let mut flags = vec![
            RefineFlag::Refine,
            RefineFlag::DoNothing,
            RefineFlag::Refine,
            RefineFlag::Refine,
        ];
        let changed = eliminate_unrefined_islands(&mesh, &mut flags);
        assert_eq!(changed, 1);
        assert_eq!(flags[1], RefineFlag::Refine);
    }

    #[test]
    fn mismatch_smoothing_converges() {
        let mesh = bar();
        let mut flags = vec![
            RefineFlag::Refine,
            RefineFlag::Coarsen,
            RefineFlag::DoNothing,
            RefineFlag::DoNothing,
        ];
        smooth_level_mismatch(&mesh, &mut flags, 1);
        // The coarsen next to a refine would open a 2-level gap.
        assert_ne!(flags[1], RefineFlag::Coarsen);
    }
}
