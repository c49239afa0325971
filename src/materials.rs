//! Material parameter seam.
//!
//! Constitutive models live in an external material library; the solver
//! only needs the handful of parameters below per region. The built-in
//! table covers the materials the demos and verification tests use;
//! anything else comes in through [`MaterialParams`] directly.

use crate::discretization::mesh::RegionKind;
use crate::error::{Result, SimulationError};

#[derive(Debug, Clone)]
pub struct MaterialParams {
    pub name: String,
    pub kind: RegionKind,
    /// Relative permittivity.
    pub eps_r: f64,
    /// Electron / hole mobilities [cm^2/Vs].
    pub mu_n: f64,
    pub mu_p: f64,
    /// SRH lifetimes [s].
    pub tau_n: f64,
    pub tau_p: f64,
    /// Thermal conductivity [W/(cm K)].
    pub kappa: f64,
    /// Volumetric heat capacity [J/(cm^3 K)].
    pub heat_capacity: f64,
    /// Electron affinity [V].
    pub affinity: f64,
    /// Band gap [V].
    pub eg: f64,
    /// Intrinsic density at 300 K [cm^-3] (semiconductors).
    pub ni: f64,
    /// Mass density [g/cm^3].
    pub density: f64,
    /// Metal work function [V] (conductors).
    pub work_function: f64,
    /// Energy relaxation time for the carrier energy balance [s].
    pub tau_energy: f64,
}

impl MaterialParams {
    /// Look up a built-in material by name.
    pub fn lookup(name: &str) -> Result<Self> {
        let m = match name {
            "Si" => Self {
                name: "Si".into(),
                kind: RegionKind::Semiconductor,
                eps_r: 11.7,
                mu_n: 1400.0,
                mu_p: 470.0,
                tau_n: 1e-7,
                tau_p: 1e-7,
                kappa: 1.5,
                heat_capacity: 1.63,
                affinity: 4.05,
                eg: 1.12,
                ni: 1.0e10,
                density: 2.33,
                work_function: 0.0,
                tau_energy: 3e-13,
            },
            "GaAs" => Self {
                name: "GaAs".into(),
                kind: RegionKind::Semiconductor,
                eps_r: 12.9,
                mu_n: 8500.0,
                mu_p: 400.0,
                tau_n: 1e-9,
                tau_p: 1e-9,
                kappa: 0.46,
                heat_capacity: 1.74,
                affinity: 4.07,
                eg: 1.42,
                ni: 2.1e6,
                density: 5.32,
                work_function: 0.0,
                tau_energy: 1e-13,
            },
            "SiO2" => Self {
                name: "SiO2".into(),
                kind: RegionKind::Insulator,
                eps_r: 3.9,
                mu_n: 20.0,
                mu_p: 1e-5,
                tau_n: 1e-6,
                tau_p: 1e-6,
                kappa: 0.014,
                heat_capacity: 1.67,
                affinity: 0.9,
                eg: 9.0,
                ni: 0.0,
                density: 2.2,
                work_function: 0.0,
                tau_energy: 1e-13,
            },
            "Si3N4" => Self {
                name: "Si3N4".into(),
                kind: RegionKind::Insulator,
                eps_r: 7.5,
                mu_n: 1.0,
                mu_p: 1e-6,
                tau_n: 1e-6,
                tau_p: 1e-6,
                kappa: 0.185,
                heat_capacity: 2.2,
                affinity: 2.1,
                eg: 5.0,
                ni: 0.0,
                density: 3.1,
                work_function: 0.0,
                tau_energy: 1e-13,
            },
            "Al" => Self {
                name: "Al".into(),
                kind: RegionKind::Conductor,
                eps_r: 1.0,
                mu_n: 0.0,
                mu_p: 0.0,
                tau_n: 0.0,
                tau_p: 0.0,
                kappa: 2.37,
                heat_capacity: 2.42,
                affinity: 0.0,
                eg: 0.0,
                ni: 0.0,
                density: 2.70,
                work_function: 4.28,
                tau_energy: 0.0,
            },
            "PolySi" => Self {
                name: "PolySi".into(),
                kind: RegionKind::Conductor,
                eps_r: 11.7,
                mu_n: 0.0,
                mu_p: 0.0,
                tau_n: 0.0,
                tau_p: 0.0,
                kappa: 0.3,
                heat_capacity: 1.63,
                affinity: 4.05,
                eg: 1.12,
                ni: 0.0,
                density: 2.33,
                work_function: 4.1,
                tau_energy: 0.0,
            },
            "Vacuum" => Self {
                name: "Vacuum".into(),
                kind: RegionKind::Vacuum,
                eps_r: 1.0,
                mu_n: 0.0,
                mu_p: 0.0,
                tau_n: 0.0,
                tau_p: 0.0,
                kappa: 0.0,
                heat_capacity: 0.0,
                affinity: 0.0,
                eg: 0.0,
                ni: 0.0,
                density: 0.0,
                work_function: 0.0,
                tau_energy: 0.0,
            },
            other => {
                return Err(SimulationError::Config(format!(
                    "unknown material '{other}'"
                )))
            }
        };
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_matches_region_kind() {
        assert_eq!(
            MaterialParams::lookup("Si").unwrap().kind,
            RegionKind::Semiconductor
        );
        assert_eq!(
            MaterialParams::lookup("SiO2").unwrap().kind,
            RegionKind::Insulator
        );
        assert!(MaterialParams::lookup("Unobtainium").is_err());
    }
}
