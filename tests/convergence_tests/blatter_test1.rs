//! Convergence of the linear Blatter problem towards the exact solution
//! `u = e^x sin 2πy`, `v = e^x cos 2πy`.
use super::{assert_errors_decrease, export_summary, ErrorSummary};
use icefem::assembly::Blatter;
use icefem::comm::SelfCommunicator;
use icefem::config::SolverConfig;
use icefem::flow_law::IsothermalGlen;
use icefem::solver::StokesSolver;
use icefem::verification::{max_error, BlatterTest1};

fn solve(m: usize) -> f64 {
    let config = SolverConfig {
        mz: 3,
        n_levels: 1,
        ..SolverConfig::default()
    };
    let grid = BlatterTest1::grid(m, 2).unwrap();
    let test = BlatterTest1::new(1.0);
    let assembler = Blatter::new(&config)
        .with_flow_law(IsothermalGlen::linear())
        .with_boundary(test)
        .with_hardness(1.0);
    let mut solver = StokesSolver::new(&grid, assembler, config).unwrap();
    let report = solver.solve(&BlatterTest1::geometry(&grid)).unwrap();
    assert!(report.converged(), "Blatter solve did not converge for m = {}", m);

    let exact = test.exact_solution(solver.finest_level());
    max_error(&exact, solver.state().unwrap(), &SelfCommunicator)
}

#[test]
fn blatter_test1_converges_to_exact_solution() {
    let resolutions = vec![5, 9, 17];
    let summary = ErrorSummary {
        problem: "blatter_test1".to_string(),
        max_errors: resolutions.iter().map(|&m| solve(m)).collect(),
        resolutions,
    };
    export_summary(&summary);

    assert_errors_decrease(&summary, 1.5);
}
