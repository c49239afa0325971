//! Solver configuration populated from the input deck.
//!
//! Everything the controller, the region operators and the boundary
//! operators need to know about *how* to solve is collected here and passed
//! by value down the call chain. The struct mirrors the solve-time parameter
//! blocks of the input deck: solver/solution selection, nonlinear and linear
//! tolerances, transient parameters and sweep schedules.

use serde::{Deserialize, Serialize};

/// Which equation system is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverType {
    /// Nonlinear Poisson only.
    Poisson,
    /// Isothermal drift-diffusion (level 1).
    Ddml1,
    /// Drift-diffusion with lattice heating (level 2).
    Ddml2,
    /// Energy balance with carrier temperatures (level 3).
    Ebm3,
    /// Small-signal AC around a DC operating point.
    Ddmac,
    /// Radiation-induced conductivity in insulators.
    Ric,
    /// Total-ionizing-dose oxide charge buildup, drift only.
    TidDrift,
    /// TID drift plus interface-state reaction.
    TidDriftReaction,
}

/// Which kind of solution the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionType {
    SteadyState,
    Transient,
    DcSweepVoltage,
    DcSweepCurrent,
    AcSweep,
}

/// Newton damping strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DampingScheme {
    /// No damping beyond the projection floors.
    None,
    /// Logarithmic damping on the potential update.
    Potential,
    /// Monotone line-search placeholder; currently a no-op hook.
    BankRose,
    /// Clip the potential update and enforce positivity floors.
    PositiveDensity,
}

/// Time integration scheme for transient solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsType {
    Bdf1,
    Bdf2,
    Trapezoidal,
}

/// Linear solver selection behind the LinAlg seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverType {
    /// Dense LU, only sensible for small systems.
    Lu,
    /// BiCGStab with Jacobi row equilibration.
    Bicgstab,
}

/// Voltage sweep schedule for one or more electrodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageSweep {
    pub electrodes: Vec<String>,
    pub v_start: f64,
    pub v_step: f64,
    pub v_step_max: f64,
    pub v_stop: f64,
}

/// Current sweep schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSweep {
    pub electrodes: Vec<String>,
    pub i_start: f64,
    pub i_step: f64,
    pub i_step_max: f64,
    pub i_stop: f64,
}

/// AC small-signal sweep schedule. Frequencies run from `f_start`,
/// multiplying by `f_multiple`, while not exceeding `f_stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcSweep {
    pub electrode: String,
    pub v_ac: f64,
    pub f_start: f64,
    pub f_multiple: f64,
    pub f_stop: f64,
}

/// Transient (TS) parameters. The mutable clock state (`t`, `dt`,
/// `dt_last`, ...) lives in [`TsState`]; this block is the user-facing
/// schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientSpec {
    #[serde(default)]
    pub ts_type: TsType,
    pub t_start: f64,
    pub t_stop: f64,
    /// Reference (initial) time step.
    pub t_step: f64,
    /// The step never grows beyond this.
    pub t_step_max: f64,
    #[serde(default = "default_true")]
    pub auto_step: bool,
    #[serde(default = "default_true")]
    pub predict: bool,
    #[serde(default = "default_ts_rtol")]
    pub ts_rtol: f64,
    #[serde(default = "default_ts_atol")]
    pub ts_atol: f64,
}

impl Default for TsType {
    fn default() -> Self {
        TsType::Bdf2
    }
}

fn default_true() -> bool {
    true
}
fn default_ts_rtol() -> f64 {
    1e-3
}
fn default_ts_atol() -> f64 {
    1e-7
}

/// Mutable transient clock owned by the time-stepping controller.
#[derive(Debug, Clone)]
pub struct TsState {
    pub t: f64,
    pub dt: f64,
    pub dt_last: f64,
    pub dt_last_last: f64,
    /// Forces BDF1 for the first step after a (re)start.
    pub bdf2_restart: bool,
    pub step: usize,
}

impl TsState {
    pub fn new(spec: &TransientSpec) -> Self {
        Self {
            t: spec.t_start,
            dt: spec.t_step,
            dt_last: 0.0,
            dt_last_last: 0.0,
            bdf2_restart: true,
            step: 0,
        }
    }

    /// Rotate the step history after an accepted step.
    pub fn rotate(&mut self) {
        self.dt_last_last = self.dt_last;
        self.dt_last = self.dt;
        self.t += self.dt;
        self.step += 1;
        self.bdf2_restart = false;
    }
}

/// Complete solver configuration for one solve block of the input deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub solver: SolverType,
    pub solution: SolutionType,

    /// Label identifying this solve step in logs and output files.
    #[serde(default)]
    pub label: String,
    /// Named pipeline hooks with their parameter bags, executed by the
    /// driver shell between solve stages. Interpreted by the caller.
    #[serde(default)]
    pub hooks: Vec<(String, Vec<(String, f64)>)>,

    #[serde(default)]
    pub damping: DampingScheme,
    #[serde(default)]
    pub linear_solver: LinearSolverType,

    // -- linear solve convergence --
    #[serde(default = "default_ksp_rtol")]
    pub ksp_rtol: f64,
    #[serde(default = "default_ksp_atol")]
    pub ksp_atol: f64,

    // -- Newton convergence --
    #[serde(default = "default_max_iteration")]
    pub max_iteration: usize,
    #[serde(default = "default_relative_toler")]
    pub relative_toler: f64,
    #[serde(default = "default_toler_relax")]
    pub toler_relax: f64,
    #[serde(default = "default_abs_toler")]
    pub poisson_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub elec_continuity_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub hole_continuity_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub heat_equation_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub elec_energy_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub hole_energy_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub trap_abs_toler: f64,
    #[serde(default = "default_abs_toler")]
    pub electrode_abs_toler: f64,

    /// Ambient temperature [K].
    #[serde(default = "default_t_external")]
    pub t_external: f64,

    #[serde(default)]
    pub transient: Option<TransientSpec>,
    #[serde(default)]
    pub vsweep: Option<VoltageSweep>,
    #[serde(default)]
    pub isweep: Option<CurrentSweep>,
    #[serde(default)]
    pub ac: Option<AcSweep>,

    /// Particle (heavy-ion) generation active during this solve.
    #[serde(default)]
    pub particle_generation: bool,
    /// Center of the particle time pulse [s].
    #[serde(default)]
    pub pulse_t0: f64,
    /// Characteristic width of the particle time pulse [s].
    #[serde(default = "default_pulse_t_char")]
    pub pulse_t_char: f64,
    /// Dose rate for RIC/TID solves [rad(Si)/s].
    #[serde(default)]
    pub dose_rate: f64,
}

impl Default for DampingScheme {
    fn default() -> Self {
        DampingScheme::Potential
    }
}

impl Default for LinearSolverType {
    fn default() -> Self {
        LinearSolverType::Bicgstab
    }
}

fn default_ksp_rtol() -> f64 {
    1e-8
}
fn default_ksp_atol() -> f64 {
    1e-14
}
fn default_max_iteration() -> usize {
    30
}
fn default_relative_toler() -> f64 {
    1e-5
}
fn default_toler_relax() -> f64 {
    1e4
}
fn default_abs_toler() -> f64 {
    1e-6
}
fn default_t_external() -> f64 {
    300.0
}
fn default_pulse_t_char() -> f64 {
    2e-12
}

impl SolverConfig {
    /// A steady-state configuration with default tolerances, the usual
    /// starting point for tests and sweeps.
    pub fn steady(solver: SolverType) -> Self {
        serde_json::from_value(serde_json::json!({
            "solver": solver,
            "solution": "SteadyState",
        }))
        .expect("default solver config must deserialize")
    }

    /// Sanity checks run once before the first solve.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SimulationError::Config;
        if self.max_iteration == 0 {
            return Err(Config("max_iteration must be positive".into()));
        }
        if let Some(ts) = &self.transient {
            if ts.t_stop <= ts.t_start {
                return Err(Config("t_stop must lie after t_start".into()));
            }
            if ts.t_step <= 0.0 || ts.t_step_max < ts.t_step {
                return Err(Config("invalid transient step sizes".into()));
            }
        }
        if let Some(ac) = &self.ac {
            if ac.f_multiple <= 1.0 {
                return Err(Config("f_multiple must exceed 1".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_deserializes() {
        let cfg = SolverConfig::steady(SolverType::Ddml1);
        assert_eq!(cfg.max_iteration, 30);
        assert_eq!(cfg.damping, DampingScheme::Potential);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn transient_spec_is_validated() {
        let mut cfg = SolverConfig::steady(SolverType::Ddml1);
        cfg.transient = Some(TransientSpec {
            ts_type: TsType::Bdf2,
            t_start: 0.0,
            t_stop: -1.0,
            t_step: 1e-12,
            t_step_max: 1e-9,
            auto_step: true,
            predict: true,
            ts_rtol: 1e-3,
            ts_atol: 1e-7,
        });
        assert!(cfg.validate().is_err());
    }
}
