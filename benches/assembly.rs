use criterion::{criterion_group, criterion_main, Criterion};

use semifvm_rs::assembly::driver::{
    assemble_jacobian, assemble_residual, build_pattern, fill_state,
};
use semifvm_rs::assembly::matrix::SystemMatrix;
use semifvm_rs::config::{SolverConfig, SolverType};
use semifvm_rs::devices::diode::{build_pn_diode, DiodeSpec};
use semifvm_rs::physics::{level_ops, region_variable_table};
use semifvm_rs::solution::layout::DofLayout;

fn assembly_benchmark(c: &mut Criterion) {
    let mut sys = build_pn_diode(&DiodeSpec {
        nx: 64,
        nt: 4,
        ..DiodeSpec::default()
    })
    .unwrap();
    let cfg = SolverConfig::steady(SolverType::Ddml1);
    let ops = level_ops(cfg.solver);
    let kinds = sys.region_kinds();
    let vars = region_variable_table(ops.as_ref(), &kinds);
    let extras: Vec<usize> = sys.bcs.iter().map(|b| b.n_extra_dofs()).collect();
    let layout = DofLayout::build(&mut sys.graph, &sys.mesh, vars, &extras);

    let (x, _) = fill_state(&sys, ops.as_ref(), &layout, &cfg, 0.0);
    let pattern = build_pattern(&sys, ops.as_ref(), &layout);
    let mut jac = SystemMatrix::from_pattern(pattern);

    c.bench_function("residual_ddm1", |b| {
        b.iter(|| {
            assemble_residual(&sys, ops.as_ref(), &layout, &cfg, &x, None, 0.0).unwrap()
        })
    });

    c.bench_function("jacobian_ddm1", |b| {
        b.iter(|| {
            assemble_jacobian(&sys, ops.as_ref(), &layout, &cfg, &x, None, 0.0, &mut jac)
                .unwrap()
        })
    });
}

criterion_group!(benches, assembly_benchmark);
criterion_main!(benches);
