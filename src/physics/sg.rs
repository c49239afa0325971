//! Scharfetter-Gummel edge discretization and shared kernel helpers.

use num_dual::DualNum;

use super::Ad;

/// Bernoulli function `B(x) = x / (e^x - 1)` with the series expansion
/// near zero that keeps the derivative finite.
pub fn bern(x: &Ad) -> Ad {
    if x.re.abs() < 1e-4 {
        let x2 = x.clone() * x.clone();
        Ad::from_re(1.0) - x.clone() * 0.5 + x2 * (1.0 / 12.0)
    } else {
        x.clone() / (x.exp() - Ad::from_re(1.0))
    }
}

/// Electron particle flux from node i to node j across a CV face,
/// integrated over the face: `(D_n A / d) (n_i B(-dpsi) - n_j B(dpsi))`
/// with `dpsi = psi_j - psi_i` in thermal-voltage units.
pub fn electron_flux(dn_geom: f64, dpsi: &Ad, n_i: &Ad, n_j: &Ad) -> Ad {
    let minus = -dpsi.clone();
    (n_i.clone() * bern(&minus) - n_j.clone() * bern(dpsi)) * dn_geom
}

/// Hole particle flux from i to j, mirrored drift sign.
pub fn hole_flux(dp_geom: f64, dpsi: &Ad, p_i: &Ad, p_j: &Ad) -> Ad {
    let minus = -dpsi.clone();
    (p_i.clone() * bern(dpsi) - p_j.clone() * bern(&minus)) * dp_geom
}

/// Shockley-Read-Hall net recombination with `n1 = p1 = ni`.
pub fn srh(n: &Ad, p: &Ad, ni: f64, tau_n: f64, tau_p: f64) -> Ad {
    let num = n.clone() * p.clone() - Ad::from_re(ni * ni);
    let den = (n.clone() + Ad::from_re(ni)) * tau_p + (p.clone() + Ad::from_re(ni)) * tau_n;
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(x: f64) -> f64 {
        bern(&Ad::from_re(x)).re
    }

    #[test]
    fn bernoulli_limits() {
        assert!((b(0.0) - 1.0).abs() < 1e-12);
        // Identity B(-x) = B(x) + x.
        for x in [1e-6, 1e-3, 0.1, 1.0, 5.0, 20.0] {
            assert!((b(-x) - (b(x) + x)).abs() < 1e-9, "x = {x}");
        }
        // Decays like x e^-x for large positive argument.
        assert!(b(30.0) < 1e-11);
    }

    #[test]
    fn series_matches_closed_form_at_crossover() {
        let eps = 1e-4;
        let below = b(eps * 0.999);
        let above = b(eps * 1.001);
        assert!((below - above).abs() < 1e-10);
    }

    #[test]
    fn pure_diffusion_flux() {
        let zero = Ad::from_re(0.0);
        let f = electron_flux(2.0, &zero, &Ad::from_re(3.0), &Ad::from_re(1.0));
        // B(0) = 1 on both sides: plain Fick's law.
        assert!((f.re - 4.0).abs() < 1e-12);
    }

    #[test]
    fn drift_dominates_for_large_field() {
        // Electrons flow toward higher potential.
        let dpsi = Ad::from_re(20.0);
        let f = electron_flux(1.0, &dpsi, &Ad::from_re(1.0), &Ad::from_re(1.0));
        assert!(f.re > 19.0);
        // Holes flow the other way.
        let g = hole_flux(1.0, &dpsi, &Ad::from_re(1.0), &Ad::from_re(1.0));
        assert!(g.re < -19.0);
    }

    #[test]
    fn srh_vanishes_in_equilibrium() {
        let ni = 1e-8;
        let r = srh(
            &Ad::from_re(1e-4),
            &Ad::from_re(ni * ni / 1e-4),
            ni,
            1.0,
            1.0,
        );
        assert!(r.re.abs() < 1e-20);
    }
}
