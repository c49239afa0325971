//! Solver controllers: Newton iteration, time stepping, bias and
//! frequency sweeps, and the linear-algebra seam.

pub mod ac;
pub mod linear;
pub mod newton;
pub mod sweep;
pub mod timing;
pub mod transient;

use crate::config::{SolutionType, SolverConfig};
use crate::error::Result;
use crate::system::SimulationSystem;

/// Outcome of one solve block, by solution kind.
pub enum SolveOutcome {
    Steady(newton::SolverResult),
    Transient(transient::TransientReport),
    DcSweep(Vec<sweep::IvPoint>),
    AcSweep(Vec<ac::AcPoint>),
}

/// Route one configuration block to the matching controller.
pub fn run_solution(sys: &mut SimulationSystem, cfg: &SolverConfig) -> Result<SolveOutcome> {
    match cfg.solution {
        SolutionType::SteadyState => Ok(SolveOutcome::Steady(newton::run_steady(sys, cfg)?)),
        SolutionType::Transient => Ok(SolveOutcome::Transient(transient::run_transient(
            sys,
            cfg,
            |_, _, _| {},
        )?)),
        SolutionType::DcSweepVoltage => {
            Ok(SolveOutcome::DcSweep(sweep::run_dc_sweep(sys, cfg)?.points))
        }
        SolutionType::DcSweepCurrent => {
            Ok(SolveOutcome::DcSweep(sweep::run_current_sweep(sys, cfg)?))
        }
        SolutionType::AcSweep => Ok(SolveOutcome::AcSweep(ac::run_ac_sweep(sys, cfg)?)),
    }
}
