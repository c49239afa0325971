//! Physical constants (cm-based) and the normalization used internally.
//!
//! All nodal quantities are stored normalized: potentials in thermal
//! voltages, densities in units of the characteristic doping, lengths in
//! extrinsic Debye lengths, time in `l^2 / D_max`, temperatures in units of
//! the ambient temperature. The scaled drift-diffusion system is O(1) per
//! equation, which is what keeps the Newton linearization solvable without
//! per-column equilibration.

/// Elementary charge [C].
pub const Q: f64 = 1.602176634e-19;
/// Boltzmann constant [J/K].
pub const KB: f64 = 1.380649e-23;
/// Vacuum permittivity [F/cm].
pub const EPS0: f64 = 8.854187817e-14;
/// Intrinsic carrier density of silicon at 300 K [cm^-3].
pub const NI_SI_300K: f64 = 1.0e10;

/// Normalization constants for one device, computed once when the system
/// is built.
#[derive(Debug, Clone)]
pub struct Scaling {
    /// Thermal voltage k_B T / q [V].
    pub v: f64,
    /// Characteristic density [cm^-3], the largest doping in the device.
    pub n: f64,
    /// Extrinsic Debye length [cm].
    pub l: f64,
    /// Diffusivity scale [cm^2/s].
    pub d: f64,
    /// Time scale l^2 / d [s].
    pub t: f64,
    /// Ambient temperature [K]; lattice/carrier temperatures normalize by it.
    pub t_k: f64,
    /// Reference relative permittivity (the permittivity used in the Debye
    /// length; silicon for the usual device stacks).
    pub eps_ref: f64,
    /// Reference thermal conductivity [W/(cm K)].
    pub kappa_ref: f64,
    /// Reference volumetric heat capacity [J/(cm^3 K)].
    pub heat_cap_ref: f64,
}

impl Scaling {
    /// Build the normalization from the device's largest doping and the
    /// ambient temperature.
    pub fn new(n_max: f64, t_ext: f64, eps_ref: f64, d_max: f64) -> Self {
        let v = KB * t_ext / Q;
        let n = n_max.max(NI_SI_300K);
        let l = (EPS0 * eps_ref * v / (Q * n)).sqrt();
        let d = d_max;
        Self {
            v,
            n,
            l,
            d,
            t: l * l / d,
            t_k: t_ext,
            eps_ref,
            kappa_ref: 1.5,
            heat_cap_ref: 1.63,
        }
    }

    /// Normalized intrinsic density.
    pub fn ni_norm(&self, ni: f64) -> f64 {
        ni / self.n
    }

    /// Current carried by a normalized particle-flux sum (`sum F*A` over CV
    /// faces), converted back to amperes.
    pub fn current(&self, flux_sum: f64) -> f64 {
        Q * self.n * self.d * self.l * flux_sum
    }

    /// Physical heat flux density [W/cm^2] from a normalized temperature
    /// gradient flux.
    pub fn heat_flux(&self, flux: f64) -> f64 {
        self.kappa_ref * self.t_k / self.l * flux
    }

    /// Normalized heat-transfer coefficient for a Robin surface.
    pub fn h_norm(&self, h_w_per_cm2_k: f64) -> f64 {
        h_w_per_cm2_k * self.l / self.kappa_ref
    }

    /// Normalized elapsed time.
    pub fn time_norm(&self, seconds: f64) -> f64 {
        seconds / self.t
    }

    /// Dimensionless thermal diffusivity of the reference material,
    /// `kappa_ref t / (c_ref l^2)`: the ratio of heat to carrier transport
    /// speeds under this normalization.
    pub fn thermal_diffusivity(&self) -> f64 {
        self.kappa_ref * self.t / (self.heat_cap_ref * self.l * self.l)
    }

    /// Converts normalized Joule power density `n D E^2` into lattice
    /// temperature-rate units: `q N v / (c_ref T)`.
    pub fn joule_factor(&self) -> f64 {
        Q * self.n * self.v / (self.heat_cap_ref * self.t_k)
    }

    /// Converts carrier energy densities (`n T` in normalized units) into
    /// lattice heat units: `k_B N / c_ref`.
    pub fn carrier_heat_factor(&self) -> f64 {
        KB * self.n / self.heat_cap_ref
    }
}

/// Error function, Abramowitz & Stegun 7.1.26. Good to ~1.5e-7 absolute,
/// plenty for the radiation pulse shapes that need it.
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thermal_voltage_at_room_temperature() {
        let s = Scaling::new(1e17, 300.0, 11.7, 35.0);
        assert!((s.v - 0.02585).abs() < 1e-4);
        // Debye length for 1e17 is a few nanometers.
        assert!(s.l > 1e-7 && s.l < 3e-6);
    }

    #[test]
    fn erf_reference_values() {
        assert!(erf(0.0).abs() < 1e-12);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) + 0.8427007929).abs() < 1e-6);
        assert!((erf(3.0) - 0.9999779095).abs() < 1e-6);
    }
}
