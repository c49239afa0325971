//! DC bias sweeps with adaptive continuation.
//!
//! Each bias point reuses the previous operating point as the initial
//! guess. The step adapts to how hard Newton worked: failures halve it,
//! easy points grow it up to the configured cap.

use nalgebra::DVector;

use super::newton::solve_nonlinear;
use crate::bc::contacts::electrode_current;
use crate::config::SolverConfig;
use crate::error::{Result, SimulationError};
use crate::solution::layout::DofLayout;
use crate::system::SimulationSystem;

/// Newton iteration count below which the continuation step may grow.
const EASY_ITERATIONS: usize = 5;
const GROWTH: f64 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct IvPoint {
    /// Applied bias [V].
    pub v: f64,
    /// Electrode current [A].
    pub i: f64,
}

pub struct SweepResult {
    pub points: Vec<IvPoint>,
    /// Final solution vector at the last converged bias.
    pub solution: DVector<f64>,
    pub layout: DofLayout,
}

/// Voltage sweep over the configured electrodes.
pub fn run_dc_sweep(sys: &mut SimulationSystem, cfg: &SolverConfig) -> Result<SweepResult> {
    cfg.validate()?;
    let sweep = cfg
        .vsweep
        .clone()
        .ok_or_else(|| SimulationError::Config("DC sweep without vsweep schedule".into()))?;

    let ops = crate::physics::level_ops(cfg.solver);
    let kinds = sys.region_kinds();
    let vars = crate::physics::region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout =
        crate::solution::layout::DofLayout::build(&mut sys.graph, &sys.mesh, vars, &extras);

    let scan: Vec<usize> = sweep
        .electrodes
        .iter()
        .map(|name| {
            sys.bc_by_name(name)
                .ok_or_else(|| SimulationError::Structural(format!("no electrode '{name}'")))
        })
        .collect::<Result<_>>()?;
    let measure = *scan
        .first()
        .ok_or_else(|| SimulationError::Config("empty electrode list".into()))?;

    let v_scale = sys.scaling.v;
    let mut points = Vec::new();
    let mut last_solution: Option<DVector<f64>> = None;

    let mut v = sweep.v_start;
    let mut step = sweep.v_step;
    let direction = if sweep.v_stop >= sweep.v_start { 1.0 } else { -1.0 };
    let min_step = sweep.v_step.abs() * 1e-4;

    loop {
        for &e in &scan {
            sys.bcs[e].v_app = v / v_scale;
        }

        match solve_nonlinear(sys, ops.as_ref(), &layout, cfg, None, 0.0, None, None) {
            Ok(result) => {
                let i = electrode_current(
                    &sys.bcs[measure],
                    sys,
                    &layout,
                    result.solution.as_slice(),
                );
                tracing::info!(bias = v, current = i, iters = result.iterations, "bias point");
                points.push(IvPoint { v, i });

                // Accept the operating point for continuation.
                for data in sys.graph.node_data.iter_mut() {
                    data.rotate_last();
                }
                let easy = result.iterations < EASY_ITERATIONS;
                last_solution = Some(result.solution);

                if (v - sweep.v_stop).abs() < 1e-12 {
                    break;
                }
                if easy {
                    step = (step * GROWTH).min(sweep.v_step_max);
                }
                v += direction * step.abs();
                // Land exactly on the stop bias.
                if direction * (v - sweep.v_stop) > 0.0 {
                    v = sweep.v_stop;
                }
            }
            Err(SimulationError::NonConvergence) => {
                step *= 0.5;
                tracing::warn!(bias = v, step, "bias point failed, shrinking step");
                if step.abs() < min_step {
                    return Err(SimulationError::NonConvergence);
                }
                v -= direction * step.abs();
            }
            Err(e) => return Err(e),
        }
    }

    Ok(SweepResult {
        points,
        solution: last_solution.ok_or(SimulationError::NonConvergence)?,
        layout,
    })
}

/// Current-driven sweep: the scanned electrodes get a current source and
/// the solver finds the terminal voltage.
pub fn run_current_sweep(sys: &mut SimulationSystem, cfg: &SolverConfig) -> Result<Vec<IvPoint>> {
    cfg.validate()?;
    let sweep = cfg
        .isweep
        .clone()
        .ok_or_else(|| SimulationError::Config("current sweep without schedule".into()))?;

    let scan: Vec<usize> = sweep
        .electrodes
        .iter()
        .map(|name| {
            sys.bc_by_name(name)
                .ok_or_else(|| SimulationError::Structural(format!("no electrode '{name}'")))
        })
        .collect::<Result<_>>()?;
    for &e in &scan {
        if sys.bcs[e].circuit.is_none() {
            return Err(SimulationError::Config(format!(
                "current-driven electrode '{}' needs an external circuit",
                sys.bcs[e].name
            )));
        }
    }

    let ops = crate::physics::level_ops(cfg.solver);
    let kinds = sys.region_kinds();
    let vars = crate::physics::region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout =
        crate::solution::layout::DofLayout::build(&mut sys.graph, &sys.mesh, vars, &extras);

    let mut points = Vec::new();
    let mut i_drive = sweep.i_start;
    let mut step = sweep.i_step;
    let min_step = sweep.i_step.abs() * 1e-4;

    while i_drive <= sweep.i_stop + 1e-30 {
        for &e in &scan {
            sys.bcs[e].circuit.as_mut().unwrap().i_src = i_drive;
        }
        match solve_nonlinear(sys, ops.as_ref(), &layout, cfg, None, 0.0, None, None) {
            Ok(result) => {
                let e_dof = layout.bc_offsets[scan[0]].expect("electrode dof");
                let v = result.solution[e_dof] * sys.scaling.v;
                points.push(IvPoint { v, i: i_drive });
                for data in sys.graph.node_data.iter_mut() {
                    data.rotate_last();
                }
                if result.iterations < EASY_ITERATIONS {
                    step = (step * GROWTH).min(sweep.i_step_max);
                }
                i_drive += step;
            }
            Err(SimulationError::NonConvergence) => {
                i_drive -= step;
                step *= 0.5;
                i_drive += step;
                if step.abs() < min_step {
                    return Err(SimulationError::NonConvergence);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(points)
}
