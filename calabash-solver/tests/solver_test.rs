#![cfg(test)] // workaround for https://github.com/rust-lang/rust-clippy/issues/11024

use std::collections::BTreeSet;
use std::num::NonZero;

use calabash_solver::SatisfactionResult;
use calabash_solver::Solver;
use calabash_solver::SolverOptions;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn model_set(result: SatisfactionResult, atoms: &[calabash_solver::ProgramLiteral]) -> BTreeSet<Vec<bool>> {
    match result {
        SatisfactionResult::Satisfiable(models) => models
            .iter()
            .map(|model| atoms.iter().map(|&atom| model.value(atom)).collect())
            .collect(),
        SatisfactionResult::Unsatisfiable => BTreeSet::new(),
    }
}

#[test]
fn an_unconstrained_program_has_all_polarity_combinations_as_models() {
    init_logger();

    let mut solver = Solver::default();
    let x = solver.new_atom();
    let y = solver.new_atom();
    let z = solver.new_atom();

    let found = model_set(solver.solve().expect("no propagators"), &[x, y, z]);
    assert_eq!(found.len(), 8);
}

#[test]
fn clauses_prune_the_model_space() {
    init_logger();

    let mut solver = Solver::default();
    let x = solver.new_atom();
    let y = solver.new_atom();
    assert!(solver.add_clause([x, y]));
    assert!(solver.add_clause([!x, !y]));

    let found = model_set(solver.solve().expect("no propagators"), &[x, y]);
    let expected: BTreeSet<Vec<bool>> =
        [vec![true, false], vec![false, true]].into_iter().collect();
    assert_eq!(found, expected);
}

#[test]
fn contradicting_unit_clauses_are_rejected_at_the_root() {
    init_logger();

    let mut solver = Solver::default();
    let x = solver.new_atom();
    assert!(solver.add_clause([x]));
    assert!(!solver.add_clause([!x]));

    assert!(matches!(
        solver.solve().expect("no propagators"),
        SatisfactionResult::Unsatisfiable
    ));
}

#[test]
fn unsatisfiability_without_root_units_is_detected_by_search() {
    init_logger();

    let mut solver = Solver::default();
    let x = solver.new_atom();
    let y = solver.new_atom();
    // every clause is binary, so nothing is forced at the root
    assert!(solver.add_clause([x, y]));
    assert!(solver.add_clause([x, !y]));
    assert!(solver.add_clause([!x, y]));
    assert!(solver.add_clause([!x, !y]));

    assert!(matches!(
        solver.solve().expect("no propagators"),
        SatisfactionResult::Unsatisfiable
    ));
}

#[test]
fn solving_is_incremental_across_steps() {
    init_logger();

    let mut solver = Solver::default();
    let x = solver.new_atom();
    let y = solver.new_atom();

    let first = model_set(solver.solve().expect("no propagators"), &[x, y]);
    assert_eq!(first.len(), 4);

    assert!(solver.add_clause([!x]));
    let second = model_set(solver.solve().expect("no propagators"), &[x, y]);
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|model| !model[0]));
}

#[test]
fn every_thread_count_finds_the_same_models() {
    init_logger();

    let build = |threads: u32| {
        let mut solver = Solver::with_options(SolverOptions {
            number_of_threads: NonZero::new(threads).unwrap(),
            ..SolverOptions::default()
        });
        let x = solver.new_atom();
        let y = solver.new_atom();
        let z = solver.new_atom();
        assert!(solver.add_clause([x, y, z]));
        assert!(solver.add_clause([!x, !y]));
        (solver, [x, y, z])
    };

    let (mut single, atoms) = build(1);
    let baseline = model_set(single.solve().expect("no propagators"), &atoms);

    for threads in [2, 4] {
        let (mut solver, atoms) = build(threads);
        let found = model_set(solver.solve().expect("no propagators"), &atoms);
        assert_eq!(found, baseline, "{threads} threads diverged");
    }
}

#[test]
fn random_polarity_changes_the_order_but_not_the_models() {
    init_logger();

    let mut solver = Solver::with_options(SolverOptions {
        random_polarity: true,
        random_seed: 7,
        ..SolverOptions::default()
    });
    let x = solver.new_atom();
    let y = solver.new_atom();
    assert!(solver.add_clause([x, y]));

    let found = model_set(solver.solve().expect("no propagators"), &[x, y]);
    assert_eq!(found.len(), 3);
}

#[test]
fn the_true_literal_is_never_free() {
    init_logger();

    let mut solver = Solver::default();
    let _ = solver.new_atom();
    let true_literal = solver.true_literal();
    assert!(true_literal.is_positive());

    let _ = solver.solve().expect("no propagators");
    solver.log_statistics();
}
