//! Transient solve: BDF1/BDF2/trapezoidal stepping with automatic step
//! control.
//!
//! Each step prepares the discretization context (history storage terms),
//! optionally predicts the next state by linear extrapolation, runs a
//! Newton solve and accepts or rejects on the weighted local truncation
//! error of the predictor mismatch. Accepted steps rotate the nodal
//! history and may grow the step by at most a factor of two; rejected
//! ones halve it and retry from the last accepted state.

use nalgebra::DVector;

use super::newton::{solve_nonlinear, SolverResult};
use crate::assembly::driver::TimeContext;
use crate::bc::contacts::electrode_current;
use crate::config::{SolverConfig, TsState, TsType};
use crate::error::{Result, SimulationError};
use crate::system::SimulationSystem;

/// Smallest step, as a fraction of the user step, before giving up.
const MIN_STEP_FRACTION: f64 = 1e-6;
/// Step growth cap per accepted step.
const MAX_GROWTH: f64 = 2.0;

pub struct TransientReport {
    pub accepted: usize,
    pub rejected: usize,
    pub final_time: f64,
}

/// Weighted RMS truncation-error norm of the predictor mismatch.
fn lte_norm(x: &DVector<f64>, x_pred: &DVector<f64>, atol: f64, rtol: f64) -> f64 {
    let n = x.len().max(1);
    let sum: f64 = x
        .iter()
        .zip(x_pred.iter())
        .map(|(xi, pi)| {
            let w = atol + rtol * xi.abs();
            let e = (xi - pi) / w;
            e * e
        })
        .sum();
    (sum / n as f64).sqrt()
}

/// Particle-pulse time factor: a Gaussian around `pulse_t0`.
fn pulse_factor(cfg: &SolverConfig, sys: &SimulationSystem, t_norm: f64) -> f64 {
    if !cfg.particle_generation {
        return 0.0;
    }
    let t0 = sys.scaling.time_norm(cfg.pulse_t0);
    let tc = sys.scaling.time_norm(cfg.pulse_t_char).max(1e-300);
    let arg = (t_norm - t0) / tc;
    (-arg * arg).exp()
}

/// Run a transient solve from the current (accepted) nodal state. The
/// callback receives `(t_seconds, system, solution)` after each accepted
/// step.
pub fn run_transient(
    sys: &mut SimulationSystem,
    cfg: &SolverConfig,
    mut on_accept: impl FnMut(f64, &SimulationSystem, &SolverResult),
) -> Result<TransientReport> {
    cfg.validate()?;
    let spec = cfg
        .transient
        .as_ref()
        .ok_or_else(|| SimulationError::Config("transient solve without schedule".into()))?
        .clone();

    let ops = crate::physics::level_ops(cfg.solver);
    let kinds = sys.region_kinds();
    let vars = crate::physics::region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout =
        crate::solution::layout::DofLayout::build(&mut sys.graph, &sys.mesh, vars, &extras);

    let mut ts = TsState::new(&spec);
    let scale_t = sys.scaling.t;
    let t_stop = spec.t_stop;
    let min_dt = spec.t_step * MIN_STEP_FRACTION;

    let mut x_prev: Option<DVector<f64>> = None;
    let mut x_prev_prev: Option<DVector<f64>> = None;

    let mut report = TransientReport {
        accepted: 0,
        rejected: 0,
        final_time: ts.t,
    };

    while ts.t < t_stop - 1e-30 {
        ts.dt = ts.dt.min(spec.t_step_max).min(t_stop - ts.t);
        let dt_norm = ts.dt / scale_t;
        let dt_last_norm = ts.dt_last / scale_t;

        let tctx = TimeContext::prepare(
            sys,
            ops.as_ref(),
            &layout,
            cfg,
            spec.ts_type,
            dt_norm,
            dt_last_norm,
            ts.bdf2_restart,
            pulse_factor(cfg, sys, sys.scaling.time_norm(ts.t + ts.dt)),
        );

        for bc in sys.bcs.iter_mut() {
            if let Some(c) = bc.circuit.as_mut() {
                c.dt = dt_norm;
            }
        }

        // Predict by linear extrapolation from the last two accepted
        // states.
        let predictor: Option<DVector<f64>> = match (&x_prev, &x_prev_prev) {
            (Some(xp), Some(xpp)) if spec.predict && ts.dt_last > 0.0 => {
                let r = ts.dt / ts.dt_last;
                Some(xp + (xp - xpp) * r)
            }
            _ => None,
        };

        let pulse = pulse_factor(cfg, sys, sys.scaling.time_norm(ts.t + ts.dt));
        let attempt = solve_nonlinear(
            sys,
            ops.as_ref(),
            &layout,
            cfg,
            Some(&tctx),
            pulse,
            predictor.clone(),
            None,
        );

        match attempt {
            Ok(result) => {
                // Local truncation error against the predictor; without a
                // usable predictor the step is accepted as-is.
                let err = predictor
                    .as_ref()
                    .filter(|_| spec.auto_step)
                    .map(|p| lte_norm(&result.solution, p, spec.ts_atol, spec.ts_rtol));

                if let Some(e) = err {
                    if e > 1.0 {
                        tracing::debug!(t = ts.t, dt = ts.dt, lte = e, "step rejected");
                        report.rejected += 1;
                        sys.diverged_recovery();
                        ts.dt *= 0.5;
                        if ts.dt < min_dt {
                            return Err(SimulationError::NonConvergence);
                        }
                        continue;
                    }
                }

                // Accept: rotate history, update circuits, grow the step.
                for data in sys.graph.node_data.iter_mut() {
                    data.rotate_last();
                }
                // Electrode currents feed the circuit history.
                for b in 0..sys.bcs.len() {
                    if sys.bcs[b].circuit.is_some() {
                        let i = electrode_current(
                            &sys.bcs[b],
                            sys,
                            &layout,
                            result.solution.as_slice(),
                        );
                        let c = sys.bcs[b].circuit.as_mut().unwrap();
                        c.i_last = i;
                        c.q_c += i * ts.dt;
                    }
                }

                ts.rotate();
                report.accepted += 1;
                report.final_time = ts.t;

                x_prev_prev = x_prev.take();
                x_prev = Some(result.solution.clone());

                tracing::info!(
                    step = ts.step,
                    t = ts.t,
                    dt = ts.dt,
                    iters = result.iterations,
                    "transient step accepted"
                );
                on_accept(ts.t, sys, &result);

                if spec.auto_step {
                    if let Some(e) = err {
                        let order = match spec.ts_type {
                            TsType::Bdf1 => 1.0,
                            _ => 2.0,
                        };
                        let growth = (0.9 * e.max(1e-10).powf(-1.0 / (order + 1.0)))
                            .clamp(0.5, MAX_GROWTH);
                        ts.dt = (ts.dt * growth).min(spec.t_step_max);
                    }
                }
            }
            Err(SimulationError::NonConvergence) => {
                report.rejected += 1;
                ts.dt *= 0.5;
                tracing::warn!(t = ts.t, dt = ts.dt, "newton failed, halving step");
                if ts.dt < min_dt {
                    return Err(SimulationError::NonConvergence);
                }
            }
            Err(e) => return Err(e),
        }
    }

    for bc in sys.bcs.iter_mut() {
        if let Some(c) = bc.circuit.as_mut() {
            c.dt = 0.0;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use crate::assembly::driver::TimeContext;

    #[test]
    fn bdf_coefficients_reduce_correctly() {
        // BDF1 regardless of history on a restart.
        let (a0, a1, a2) = TimeContext::bdf_coefficients(1.0, 1.0, true);
        assert_eq!((a0, a1, a2), (1.0, -1.0, 0.0));

        // Constant-step BDF2: 3/2, -2, 1/2.
        let (a0, a1, a2) = TimeContext::bdf_coefficients(1.0, 1.0, false);
        assert!((a0 - 1.5).abs() < 1e-14);
        assert!((a1 + 2.0).abs() < 1e-14);
        assert!((a2 - 0.5).abs() < 1e-14);

        // Consistency: the scheme must annihilate constants...
        let (a0, a1, a2) = TimeContext::bdf_coefficients(2.0, 1.0, false);
        assert!((a0 + a1 + a2).abs() < 1e-14);
        // ...and differentiate linear functions exactly: for y(t) = t,
        // (a0 y_n + a1 y_{n-1} + a2 y_{n-2})/dt = 1.
        let (dt, dt_last) = (2.0, 1.0);
        let y_n = 0.0;
        let y_n1 = -dt;
        let y_n2 = -dt - dt_last;
        let deriv = (a0 * y_n + a1 * y_n1 + a2 * y_n2) / dt;
        assert!((deriv - 1.0).abs() < 1e-14);
    }
}
