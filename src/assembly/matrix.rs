//! Sparse system matrix and residual vector with PETSc-style assembly
//! discipline.
//!
//! The sparsity pattern is reserved once before the first assembly; later
//! assemblies must stay inside it. All writes go through an ADD/INSERT mode
//! machine: switching between the two value modes forces a flush barrier,
//! so no operator can interleave them illegally. Row folding
//! (`add_row_to_row`) and row clearing mirror the collective matrix
//! operations the boundary operators are written against.

use crate::error::{Result, SimulationError};

/// Value insertion mode. Transitions between `Add` and `Insert` require a
/// flush; the containers below perform it automatically and count it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    NotSet,
    Add,
    Insert,
}

#[derive(Debug, Default)]
struct ModeMachine {
    mode: InsertMode,
    flushes: usize,
    transitions: usize,
}

impl ModeMachine {
    fn ensure(&mut self, want: InsertMode) {
        if self.mode != want {
            if self.mode != InsertMode::NotSet {
                // Mode switch: flush before continuing.
                self.flushes += 1;
                self.transitions += 1;
            }
            self.mode = want;
        }
    }

    fn flush(&mut self) {
        self.flushes += 1;
        self.mode = InsertMode::NotSet;
    }
}

impl Default for InsertMode {
    fn default() -> Self {
        InsertMode::NotSet
    }
}

/// Structural nonzero collection, filled during the reserve phase.
pub struct SparsityPattern {
    n: usize,
    rows: Vec<Vec<usize>>,
}

impl SparsityPattern {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            rows: vec![Vec::new(); n],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn reserve(&mut self, row: usize, col: usize) {
        debug_assert!(row < self.n && col < self.n);
        self.rows[row].push(col);
    }

    /// Reserve a dense block coupling two DOF ranges.
    pub fn reserve_block(&mut self, row0: usize, nrows: usize, col0: usize, ncols: usize) {
        for r in row0..row0 + nrows {
            for c in col0..col0 + ncols {
                self.reserve(r, c);
            }
        }
    }

    /// Make every column of `src`'s row also available in `dst`'s row, so a
    /// later fold cannot leave the pattern.
    pub fn reserve_row_union(&mut self, src: usize, dst: usize) {
        let cols = self.rows[src].clone();
        self.rows[dst].extend(cols);
    }
}

/// Row-compressed system matrix with a frozen pattern.
pub struct SystemMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    machine: ModeMachine,
}

impl SystemMatrix {
    pub fn from_pattern(mut pattern: SparsityPattern) -> Self {
        let n = pattern.n;
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for row in pattern.rows.iter_mut() {
            row.sort_unstable();
            row.dedup();
            col_idx.extend_from_slice(row);
            row_ptr.push(col_idx.len());
        }
        let nnz = col_idx.len();
        Self {
            n,
            row_ptr,
            col_idx,
            values: vec![0.0; nnz],
            machine: ModeMachine::default(),
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mode(&self) -> InsertMode {
        self.machine.mode
    }

    pub fn flushes(&self) -> usize {
        self.machine.flushes
    }

    pub fn mode_transitions(&self) -> usize {
        self.machine.transitions
    }

    fn slot(&self, row: usize, col: usize) -> Option<usize> {
        let lo = self.row_ptr[row];
        let hi = self.row_ptr[row + 1];
        self.col_idx[lo..hi]
            .binary_search(&col)
            .ok()
            .map(|k| lo + k)
    }

    /// Clear values for reassembly; the pattern stays frozen.
    pub fn zero_all(&mut self) {
        self.values.fill(0.0);
        self.machine.mode = InsertMode::NotSet;
    }

    pub fn add(&mut self, row: usize, col: usize, v: f64) -> Result<()> {
        self.machine.ensure(InsertMode::Add);
        let slot = self
            .slot(row, col)
            .ok_or(SimulationError::PatternViolation(row, col))?;
        self.values[slot] += v;
        Ok(())
    }

    pub fn insert(&mut self, row: usize, col: usize, v: f64) -> Result<()> {
        self.machine.ensure(InsertMode::Insert);
        let slot = self
            .slot(row, col)
            .ok_or(SimulationError::PatternViolation(row, col))?;
        self.values[slot] = v;
        Ok(())
    }

    /// Fold row `src` into row `dst` and clear `src`. Collective in spirit:
    /// flushes before and after.
    pub fn add_row_to_row(&mut self, src: usize, dst: usize) -> Result<()> {
        self.machine.flush();
        let (s_lo, s_hi) = (self.row_ptr[src], self.row_ptr[src + 1]);
        for k in s_lo..s_hi {
            let col = self.col_idx[k];
            let v = self.values[k];
            if v == 0.0 {
                continue;
            }
            let slot = self
                .slot(dst, col)
                .ok_or(SimulationError::PatternViolation(dst, col))?;
            self.values[slot] += v;
        }
        for k in s_lo..s_hi {
            self.values[k] = 0.0;
        }
        self.machine.flush();
        Ok(())
    }

    /// Zero out whole rows (Dirichlet preparation). Flush barrier included.
    pub fn zero_rows(&mut self, rows: &[usize]) {
        self.machine.flush();
        for &row in rows {
            let (lo, hi) = (self.row_ptr[row], self.row_ptr[row + 1]);
            for k in lo..hi {
                self.values[k] = 0.0;
            }
        }
        self.machine.flush();
    }

    /// Final assembly barrier.
    pub fn finalize(&mut self) {
        self.machine.flush();
    }

    /// Left-multiply by a diagonal scaling vector.
    pub fn diagonal_scale(&mut self, l: &[f64]) {
        for row in 0..self.n {
            let s = l[row];
            for k in self.row_ptr[row]..self.row_ptr[row + 1] {
                self.values[k] *= s;
            }
        }
    }

    /// Hand the CSR arrays to the linear-algebra backend.
    pub fn to_csr_parts(&self) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        (
            self.row_ptr.clone(),
            self.col_idx.clone(),
            self.values.clone(),
        )
    }

    /// Matrix-vector product, used by the AC driver and tests.
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        for row in 0..self.n {
            let mut acc = 0.0;
            for k in self.row_ptr[row]..self.row_ptr[row + 1] {
                acc += self.values[k] * x[self.col_idx[k]];
            }
            y[row] = acc;
        }
    }
}

/// Residual vector under the same assembly discipline as the matrix.
pub struct SystemVector {
    data: Vec<f64>,
    machine: ModeMachine,
}

impl SystemVector {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: vec![0.0; n],
            machine: ModeMachine::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn add(&mut self, i: usize, v: f64) {
        self.machine.ensure(InsertMode::Add);
        self.data[i] += v;
    }

    pub fn insert(&mut self, i: usize, v: f64) {
        self.machine.ensure(InsertMode::Insert);
        self.data[i] = v;
    }

    /// Sum row `src` into `dst`, then clear `src`.
    pub fn add_row_to_row(&mut self, src: usize, dst: usize) {
        self.machine.flush();
        self.data[dst] += self.data[src];
        self.data[src] = 0.0;
        self.machine.flush();
    }

    pub fn zero_rows(&mut self, rows: &[usize]) {
        self.machine.flush();
        for &r in rows {
            self.data[r] = 0.0;
        }
        self.machine.flush();
    }

    pub fn finalize(&mut self) {
        self.machine.flush();
    }

    pub fn flushes(&self) -> usize {
        self.machine.flushes
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

/// Diagonal row scaling computed by the fill-value pass. Applying it twice
/// is a no-op: the `applied` latch makes scaling idempotent until the
/// vector is recomputed.
pub struct RowScale {
    l: Vec<f64>,
    applied: bool,
}

impl RowScale {
    pub fn identity(n: usize) -> Self {
        Self {
            l: vec![1.0; n],
            applied: false,
        }
    }

    pub fn from_vec(l: Vec<f64>) -> Self {
        Self { l, applied: false }
    }

    pub fn set(&mut self, i: usize, inv_char: f64) {
        self.l[i] = inv_char;
        self.applied = false;
    }

    pub fn values(&self) -> &[f64] {
        &self.l
    }

    /// Scale residual and Jacobian rows. Idempotent until `reset`.
    pub fn apply(&mut self, residual: &mut [f64], jacobian: Option<&mut SystemMatrix>) {
        if self.applied {
            return;
        }
        for (r, s) in residual.iter_mut().zip(&self.l) {
            *r *= s;
        }
        if let Some(jac) = jacobian {
            jac.diagonal_scale(&self.l);
        }
        self.applied = true;
    }

    /// Arm the scaling for a freshly assembled system.
    pub fn reset(&mut self) {
        self.applied = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_matrix() -> SystemMatrix {
        let mut p = SparsityPattern::new(3);
        for r in 0..3 {
            for c in 0..3 {
                p.reserve(r, c);
            }
        }
        SystemMatrix::from_pattern(p)
    }

    #[test]
    fn mode_switch_always_flushes() {
        let mut m = small_matrix();
        m.add(0, 0, 1.0).unwrap();
        m.insert(1, 1, 2.0).unwrap();
        m.add(2, 2, 3.0).unwrap();
        m.finalize();
        // Two ADD<->INSERT switches plus the final barrier.
        assert_eq!(m.mode_transitions(), 2);
        assert!(m.flushes() >= 3);
    }

    #[test]
    fn pattern_is_closed_after_freeze() {
        let mut p = SparsityPattern::new(2);
        p.reserve(0, 0);
        p.reserve(1, 1);
        let mut m = SystemMatrix::from_pattern(p);
        assert!(m.add(0, 1, 1.0).is_err());
    }

    #[test]
    fn fold_and_clear() {
        let mut p = SparsityPattern::new(2);
        p.reserve(0, 0);
        p.reserve(0, 1);
        p.reserve(1, 0);
        p.reserve(1, 1);
        let mut m = SystemMatrix::from_pattern(p);
        m.add(1, 0, 2.0).unwrap();
        m.add(1, 1, 3.0).unwrap();
        m.add_row_to_row(1, 0).unwrap();
        assert_eq!(m.values()[0], 2.0);
        assert_eq!(m.values()[1], 3.0);
        let (lo, hi) = (m.row_ptr()[1], m.row_ptr()[1 + 1]);
        assert!(m.values()[lo..hi].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn row_scaling_is_idempotent() {
        let mut m = small_matrix();
        m.add(0, 0, 2.0).unwrap();
        m.finalize();
        let mut r = vec![2.0, 4.0, 8.0];
        let mut scale = RowScale::from_vec(vec![0.5, 0.25, 0.125]);
        scale.apply(&mut r, Some(&mut m));
        let once = (r.clone(), m.values().to_vec());
        scale.apply(&mut r, Some(&mut m));
        assert_eq!(r, once.0);
        assert_eq!(m.values(), &once.1[..]);
    }
}
