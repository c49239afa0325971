//! Single-event-upset deposition: the analytic ion track must deposit a
//! total pair count consistent with its LET.

use glam::DVec3;
use semifvm_rs::devices::diode::{build_pn_diode, DiodeSpec};
use semifvm_rs::physics::units::{erf, Q};
use semifvm_rs::source::particle::{ParticleTrack, PulseSpec};

const SQRT_PI: f64 = 1.772453850905516;

#[test]
fn track_deposits_let_consistent_charge() {
    // Transverse resolution matters for sampling the lateral Gaussian.
    let spec = DiodeSpec {
        length: 2.0e-4,
        width: 2.0e-4,
        nx: 10,
        nt: 24,
        ..DiodeSpec::default()
    };
    let mut sys = build_pn_diode(&spec).unwrap();

    let pulse = PulseSpec {
        t0: 0.0,
        t_char: 2e-12,
        t_max: 1e-11,
        quan_eff: 3.6,
    };
    let track = ParticleTrack {
        // Through the device center, along the axis.
        start: DVec3::new(0.0, spec.width / 2.0, spec.width / 2.0),
        dir: DVec3::X,
        let_value: 30.0,
        r_char: spec.width / 6.0,
        pulse: pulse.clone(),
    };
    track.apply(&mut sys);

    // Integrate the deposited generation rate over the device and the
    // pulse shape.
    let mut rate_sum = 0.0;
    for fid in 0..sys.graph.n_fvm_nodes() {
        let g_norm = sys.graph.node_data[fid].aux.pat_g;
        let v_norm = sys.graph.fvm_nodes[fid].volume;
        rate_sum += g_norm * v_norm;
    }
    // Back to pairs/s, then integrate the Gaussian pulse.
    let l = sys.scaling.l;
    let rate_pairs = rate_sum * sys.scaling.n / sys.scaling.t * l * l * l;
    let pulse_integral =
        pulse.t_char / 2.0 * SQRT_PI * (1.0 + erf((pulse.t_max - pulse.t0) / pulse.t_char));
    let charge = rate_pairs * pulse_integral * Q;

    let expected = track.collected_charge(spec.length, sys.regions[0].material.density);
    let rel = (charge - expected).abs() / expected;
    assert!(
        rel < 0.15,
        "deposited charge {charge} vs LET prediction {expected} (rel {rel})"
    );
}
