//! Shared error types used across the solver stack.

use thiserror::Error;

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Malformed configuration or input deck. Fatal before any solve starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A mesh entity, region or boundary the solver relies on is missing.
    #[error("structural error: {0}")]
    Structural(String),

    /// Newton iteration failed to converge within the iteration limit.
    /// Recoverable: the transient controller halves the step, the sweep
    /// controller aborts the sweep.
    #[error("Newton's method failed to converge")]
    NonConvergence,

    /// The Krylov (or direct) linear solve broke down. Reported to the
    /// controller as non-convergence.
    #[error("linear solve failed")]
    LinearSolveFailed,

    /// NaN or Inf detected by the floating-point probe after an assembly
    /// phase. Fatal; the solution vector is left at the last accepted state.
    #[error("non-finite value detected during {0}")]
    FpInvalid(&'static str),

    /// A structural nonzero outside the reserved sparsity pattern was
    /// requested after the pattern was frozen.
    #[error("matrix entry ({0}, {1}) outside the reserved pattern")]
    PatternViolation(usize, usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
