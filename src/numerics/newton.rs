//! Newton iteration with damping, per-family convergence and recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use nalgebra::DVector;

use super::linear;
use super::timing::{finalize_and_log, record_assembly, record_linear_solve, reset_timing};
use crate::assembly::driver::{
    assemble_jacobian, assemble_residual, build_pattern, fill_state, update_solution, TimeContext,
};
use crate::assembly::matrix::SystemMatrix;
use crate::config::{DampingScheme, SolverConfig};
use crate::error::{Result, SimulationError};
use crate::physics::LevelOps;
use crate::solution::layout::DofLayout;
use crate::solution::EquationFamily;
use crate::system::SimulationSystem;

pub struct SolverResult {
    pub solution: DVector<f64>,
    pub iterations: usize,
    pub final_residual: f64,
}

/// Absolute tolerance of an equation family.
fn family_tolerance(cfg: &SolverConfig, family: EquationFamily) -> f64 {
    match family {
        EquationFamily::Poisson => cfg.poisson_abs_toler,
        EquationFamily::ElecContinuity => cfg.elec_continuity_abs_toler,
        EquationFamily::HoleContinuity => cfg.hole_continuity_abs_toler,
        EquationFamily::HeatEquation => cfg.heat_equation_abs_toler,
        EquationFamily::ElecEnergy => cfg.elec_energy_abs_toler,
        EquationFamily::HoleEnergy => cfg.hole_energy_abs_toler,
        EquationFamily::Trap => cfg.trap_abs_toler,
        EquationFamily::Electrode => cfg.electrode_abs_toler,
    }
}

/// Normalized floors used by the damping and projection steps:
/// densities stay above 1 cm^-3, the lattice above `T_ext - 50 K`,
/// carrier temperatures above 90 % of ambient.
struct Floors {
    density: f64,
    lattice: f64,
    carrier_temp: f64,
}

impl Floors {
    fn new(sys: &SimulationSystem) -> Self {
        Self {
            density: 1.0 / sys.scaling.n,
            lattice: 1.0 - 50.0 / sys.scaling.t_k,
            carrier_temp: 0.9,
        }
    }

    fn project(&self, layout: &DofLayout, x: &mut DVector<f64>) {
        for (i, family) in layout.families.iter().enumerate() {
            match family {
                EquationFamily::ElecContinuity | EquationFamily::HoleContinuity => {
                    if x[i] < self.density {
                        x[i] = self.density;
                    }
                }
                EquationFamily::HeatEquation => {
                    if x[i] < self.lattice {
                        x[i] = self.lattice;
                    }
                }
                EquationFamily::ElecEnergy | EquationFamily::HoleEnergy => {
                    if x[i] < self.carrier_temp {
                        x[i] = self.carrier_temp;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Damping step: may shrink the potential update before the floors apply.
fn damp_step(
    sys: &SimulationSystem,
    layout: &DofLayout,
    cfg: &SolverConfig,
    delta: &mut DVector<f64>,
) {
    match cfg.damping {
        DampingScheme::None | DampingScheme::BankRose => {
            // Bank-Rose is a monotone line-search hook; the placeholder
            // leaves the step untouched.
        }
        DampingScheme::Potential => {
            let dv_max = layout
                .families
                .iter()
                .enumerate()
                .filter(|(_, f)| **f == EquationFamily::Poisson)
                .map(|(i, _)| delta[i].abs())
                .fold(0.0, f64::max);
            if dv_max > 1e-6 {
                let factor = (1.0 + dv_max).ln() / dv_max;
                for (i, family) in layout.families.iter().enumerate() {
                    if *family == EquationFamily::Poisson {
                        delta[i] *= factor;
                    }
                }
            }
        }
        DampingScheme::PositiveDensity => {
            // Potential updates larger than one volt are clipped.
            let clip = 1.0 / sys.scaling.v;
            for (i, family) in layout.families.iter().enumerate() {
                if *family == EquationFamily::Poisson {
                    delta[i] = delta[i].clamp(-clip, clip);
                }
            }
        }
    }
}

/// One nonlinear solve. `x0` overrides the nodal initial guess (used by
/// the transient predictor); `tctx` activates the storage terms;
/// `cancel` is polled between Newton steps.
#[allow(clippy::too_many_arguments)]
pub fn solve_nonlinear(
    sys: &mut SimulationSystem,
    ops: &dyn LevelOps,
    layout: &DofLayout,
    cfg: &SolverConfig,
    tctx: Option<&TimeContext>,
    pulse: f64,
    x0: Option<DVector<f64>>,
    cancel: Option<&AtomicBool>,
) -> Result<SolverResult> {
    reset_timing();
    let solve_start = Instant::now();

    let pattern = build_pattern(sys, ops, layout);
    let mut jac = SystemMatrix::from_pattern(pattern);

    let (fill_x, mut scale) = fill_state(sys, ops, layout, cfg, pulse);
    let mut x = x0.unwrap_or_else(|| DVector::from_vec(fill_x));
    let floors = Floors::new(sys);
    floors.project(layout, &mut x);

    let mut last_update_rel = f64::INFINITY;

    for iter in 0..cfg.max_iteration {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                sys.diverged_recovery();
                return Err(SimulationError::NonConvergence);
            }
        }

        let assembled = record_assembly(|| {
            assemble_residual(sys, ops, layout, cfg, x.as_slice(), tctx, pulse)
        });
        let mut f = match assembled {
            Ok(f) => f,
            Err(e) => {
                sys.diverged_recovery();
                return Err(e);
            }
        };
        scale.reset();
        scale.apply(&mut f, None);

        let norms = layout.family_norms(&f);
        let res_norm = f.iter().map(|v| v * v).sum::<f64>().sqrt();
        let families_converged = norms
            .iter()
            .all(|(fam, norm)| *norm < family_tolerance(cfg, *fam));
        let update_converged = last_update_rel < cfg.relative_toler * cfg.toler_relax;

        tracing::debug!(
            iter,
            residual = res_norm,
            update_rel = last_update_rel,
            converged = families_converged && update_converged,
            "newton"
        );

        if families_converged && update_converged {
            update_solution(sys, layout, x.as_slice());
            finalize_and_log(solve_start.elapsed());
            return Ok(SolverResult {
                solution: x,
                iterations: iter,
                final_residual: res_norm,
            });
        }

        let assembled = record_assembly(|| {
            assemble_jacobian(sys, ops, layout, cfg, x.as_slice(), tctx, pulse, &mut jac)
        });
        if let Err(e) = assembled {
            sys.diverged_recovery();
            return Err(e);
        }
        jac.diagonal_scale(scale.values());

        let rhs: Vec<f64> = f.iter().map(|v| -v).collect();
        let mut delta = match record_linear_solve(|| linear::solve(&jac, &rhs, cfg)) {
            Ok(d) => d,
            Err(_) => {
                sys.diverged_recovery();
                return Err(SimulationError::NonConvergence);
            }
        };

        damp_step(sys, layout, cfg, &mut delta);

        let x_norm = x.norm().max(1e-30);
        last_update_rel = delta.norm() / x_norm;

        x += &delta;
        // Projection: enforce the physical floors on the candidate.
        floors.project(layout, &mut x);
    }

    sys.diverged_recovery();
    Err(SimulationError::NonConvergence)
}

/// Steady-state entry point: builds the DOF layout for the configured
/// solver and runs one Newton solve from the current nodal state.
pub fn run_steady(sys: &mut SimulationSystem, cfg: &SolverConfig) -> Result<SolverResult> {
    cfg.validate()?;
    let ops = crate::physics::level_ops(cfg.solver);
    let kinds = sys.region_kinds();
    let vars = crate::physics::region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout = crate::solution::layout::DofLayout::build(
        &mut sys.graph,
        &sys.mesh,
        vars,
        &extras,
    );
    let result = solve_nonlinear(sys, ops.as_ref(), &layout, cfg, None, 0.0, None, None)?;
    // Accept the operating point.
    for data in sys.graph.node_data.iter_mut() {
        data.rotate_last();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::diode::{build_pn_diode, DiodeSpec};
    use crate::solution::EquationFamily;

    #[test]
    fn floors_clamp_densities_and_temperatures() {
        let sys = build_pn_diode(&DiodeSpec {
            nx: 2,
            nt: 1,
            ..DiodeSpec::default()
        })
        .unwrap();
        let floors = Floors::new(&sys);

        let layout = DofLayout {
            n_dofs: 4,
            n_node_dofs: 4,
            region_vars: vec![],
            families: vec![
                EquationFamily::Poisson,
                EquationFamily::ElecContinuity,
                EquationFamily::HeatEquation,
                EquationFamily::ElecEnergy,
            ],
            bc_offsets: vec![],
            order: vec![],
        };
        let mut x = DVector::from_vec(vec![-5.0, -1.0, 0.0, 0.0]);
        floors.project(&layout, &mut x);

        // Potential untouched, density at 1 cm^-3, lattice at
        // T_ext - 50 K, carrier temperature at 90 % ambient.
        assert_eq!(x[0], -5.0);
        assert!((x[1] - 1.0 / sys.scaling.n).abs() < 1e-30);
        assert!((x[2] - (1.0 - 50.0 / 300.0)).abs() < 1e-12);
        assert!((x[3] - 0.9).abs() < 1e-12);
    }
}
