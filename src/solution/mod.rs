pub mod layout;
pub mod node_data;

/// Nodal solution variable kinds. Which of these are live on a CV depends
/// on the region kind and the active solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Potential,
    Electron,
    Hole,
    LatticeTemp,
    ElecTemp,
    HoleTemp,
    /// Trapped oxide charge density (TID solves).
    TrappedCharge,
    /// Interface-state density (TID drift-reaction).
    InterfaceState,
}

/// Equation families used for per-family convergence norms and row scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquationFamily {
    Poisson,
    ElecContinuity,
    HoleContinuity,
    HeatEquation,
    ElecEnergy,
    HoleEnergy,
    Trap,
    Electrode,
}

impl Variable {
    pub fn family(&self) -> EquationFamily {
        match self {
            Variable::Potential => EquationFamily::Poisson,
            Variable::Electron => EquationFamily::ElecContinuity,
            Variable::Hole => EquationFamily::HoleContinuity,
            Variable::LatticeTemp => EquationFamily::HeatEquation,
            Variable::ElecTemp => EquationFamily::ElecEnergy,
            Variable::HoleTemp => EquationFamily::HoleEnergy,
            Variable::TrappedCharge | Variable::InterfaceState => EquationFamily::Trap,
        }
    }
}
