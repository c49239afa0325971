//! Linear-algebra seam: the sparse Newton correction solve.
//!
//! The distributed backend sits behind this module; here it is kryst's
//! BiCGStab over a CSR operator with a no-op communicator, plus a dense
//! LU fallback for small systems. Rows arrive already equilibrated by the
//! assembly driver's scaling vector; an additional Jacobi pass on the
//! diagonal keeps the Krylov iteration honest when a boundary row
//! dominates.

use kryst::core::traits::MatVec;
use kryst::matrix::sparse::{CsrMatrix, SparseMatrix};
use kryst::solver::LinearSolver;
use nalgebra::{DMatrix, DVector};

use crate::assembly::matrix::SystemMatrix;
use crate::config::{LinearSolverType, SolverConfig};
use crate::error::{Result, SimulationError};

/// Solve `A x = b` for the Newton correction.
pub fn solve(matrix: &SystemMatrix, b: &[f64], cfg: &SolverConfig) -> Result<DVector<f64>> {
    let (indptr, indices, data) = matrix.to_csr_parts();
    solve_csr(matrix.n(), indptr, indices, data, b, cfg)
}

/// Solve a raw CSR system (also used by the doubled AC system).
pub fn solve_csr(
    n: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
    b: &[f64],
    cfg: &SolverConfig,
) -> Result<DVector<f64>> {
    match cfg.linear_solver {
        LinearSolverType::Lu => solve_dense(n, &indptr, &indices, &data, b),
        LinearSolverType::Bicgstab => solve_bicgstab(n, indptr, indices, data, b, cfg),
    }
}

fn solve_dense(
    n: usize,
    row_ptr: &[usize],
    col_idx: &[usize],
    values: &[f64],
    b: &[f64],
) -> Result<DVector<f64>> {
    let mut dense = DMatrix::<f64>::zeros(n, n);
    for row in 0..n {
        for k in row_ptr[row]..row_ptr[row + 1] {
            dense[(row, col_idx[k])] = values[k];
        }
    }
    dense
        .lu()
        .solve(&DVector::from_column_slice(b))
        .ok_or(SimulationError::LinearSolveFailed)
}

/// Adapts a `kryst` sparse CSR matrix to the dense `MatVec` trait the
/// iterative solvers are generic over.
struct CsrMatVec(CsrMatrix<f64>);

impl MatVec<Vec<f64>> for CsrMatVec {
    fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) {
        self.0.spmv(x, y);
    }
}

fn solve_bicgstab(
    n: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    mut data: Vec<f64>,
    b: &[f64],
    cfg: &SolverConfig,
) -> Result<DVector<f64>> {

    // Jacobi row equilibration on the diagonal.
    let d_inv: Vec<f64> = (0..n)
        .map(|row| {
            let diag = (indptr[row]..indptr[row + 1])
                .find(|&k| indices[k] == row)
                .map(|k| data[k])
                .unwrap_or(1.0);
            if diag.abs() < 1e-12 { 1.0 } else { 1.0 / diag }
        })
        .collect();
    for row in 0..n {
        for k in indptr[row]..indptr[row + 1] {
            data[k] *= d_inv[row];
        }
    }
    let rhs: DVector<f64> = DVector::from_iterator(n, (0..n).map(|i| b[i] * d_inv[i]));

    let b_norm = rhs.norm();
    let linear_tol = (b_norm * cfg.ksp_rtol).max(cfg.ksp_atol).min(1e-2);

    let jacobian = CsrMatrix::from_csr(n, n, indptr, indices, data);
    let op = CsrMatVec(jacobian);

    let mut bicgstab = kryst::solver::bicgstab::BiCgStabSolver::new(linear_tol, 2000);

    let mut x = vec![0.0_f64; n];
    let rhs_vec: Vec<f64> = rhs.iter().copied().collect();
    let stats = bicgstab.solve(&op, None, &rhs_vec, &mut x);
    let x = DVector::from_vec(x);

    match stats {
        Ok(s) => {
            tracing::trace!(iterations = s.iterations, tol = linear_tol, "bicgstab");
        }
        Err(e) => {
            tracing::warn!(error = ?e, "linear solve failed");
            return Err(SimulationError::LinearSolveFailed);
        }
    }
    if !x.iter().all(|v| v.is_finite()) {
        return Err(SimulationError::LinearSolveFailed);
    }
    Ok(x)
}
