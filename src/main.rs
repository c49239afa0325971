use std::fs;

use semifvm_rs::config::{SolverConfig, SolverType, VoltageSweep};
use semifvm_rs::devices::diode::{build_pn_diode, DiodeSpec};
use semifvm_rs::numerics::{newton, sweep};
use semifvm_rs::processing::csv_writer;
use semifvm_rs::solution::Variable;

fn main() -> semifvm_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    fs::create_dir_all("output")?;

    let mut sys = build_pn_diode(&DiodeSpec::default())?;

    // Equilibrium first: nonlinear Poisson conditions the initial guess.
    let mut poisson_cfg = SolverConfig::steady(SolverType::Poisson);
    poisson_cfg.label = "equilibrium".into();
    newton::run_steady(&mut sys, &poisson_cfg)?;

    // Forward IV sweep under drift-diffusion.
    let mut cfg = SolverConfig::steady(SolverType::Ddml1);
    cfg.label = "forward_iv".into();
    cfg.vsweep = Some(VoltageSweep {
        electrodes: vec!["anode".into()],
        v_start: 0.0,
        v_step: 0.05,
        v_step_max: 0.1,
        v_stop: 0.7,
    });
    let result = sweep::run_dc_sweep(&mut sys, &cfg)?;

    csv_writer::write_iv("output/diode_iv.csv", &result.points)?;
    tracing::info!(
        points = result.points.len(),
        "IV sweep finished, output/diode_iv.csv written"
    );

    // Nodal profile along the axis at the final bias.
    let mut x_pos = Vec::new();
    let mut psi = Vec::new();
    let mut n_e = Vec::new();
    let mut p_h = Vec::new();
    for fid in 0..sys.graph.n_fvm_nodes() {
        let node = &sys.graph.fvm_nodes[fid];
        let pos = sys.mesh.nodes[node.root].position;
        if pos.y != 0.0 || pos.z != 0.0 {
            continue;
        }
        let data = &sys.graph.node_data[fid];
        x_pos.push(pos.x * 1e4);
        psi.push(data.get(Variable::Potential) * sys.scaling.v);
        n_e.push(data.get(Variable::Electron) * sys.scaling.n);
        p_h.push(data.get(Variable::Hole) * sys.scaling.n);
    }
    csv_writer::write_csv(
        "output/diode_profile.csv",
        &["x_um", "psi_v", "n_cm3", "p_cm3"],
        &[x_pos, psi, n_e, p_h],
    )?;
    tracing::info!("profile written to output/diode_profile.csv");
    Ok(())
}
