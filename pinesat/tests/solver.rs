//! End to end tests against the public API.
use std::fs;

use tempfile::TempDir;

use pinesat::{ProofFormat, SolveResult, Solver};

use pinesat_formula::{cnf_formula, lit, lits, var, CnfFormula, ExtendFormula};

/// The pigeon hole formula with 3 pigeons and 2 holes.
fn pigeon_hole_3_2() -> CnfFormula {
    let mut formula = CnfFormula::new();
    // Variable p*2+h: pigeon p sits in hole h.
    for pigeon in 0..3usize {
        formula.add_clause(&[
            pinesat_formula::Lit::from_index(pigeon * 2, true),
            pinesat_formula::Lit::from_index(pigeon * 2 + 1, true),
        ]);
    }
    for hole in 0..2usize {
        for pigeon_a in 0..3usize {
            for pigeon_b in 0..pigeon_a {
                formula.add_clause(&[
                    pinesat_formula::Lit::from_index(pigeon_a * 2 + hole, false),
                    pinesat_formula::Lit::from_index(pigeon_b * 2 + hole, false),
                ]);
            }
        }
    }
    formula
}

#[test]
fn scenario_two_var_exclusive() {
    let mut solver = Solver::new();
    solver.add_formula(&cnf_formula![
        1, 2;
        -1, -2;
    ]);
    assert_eq!(solver.solve(), SolveResult::Satisfiable);
    assert_ne!(solver.value(lit!(1)), solver.value(lit!(2)));
}

#[test]
fn scenario_unit_contradiction_with_drat() {
    let tmp = TempDir::new().unwrap();
    let proof_path = tmp.path().join("proof.drat");

    let mut solver = Solver::new();
    solver
        .write_proof_file(&proof_path, ProofFormat::Drat)
        .unwrap();

    solver.add_clause(&lits![1]);
    solver.add_clause(&lits![-1]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    solver.close_proof();

    let proof = fs::read_to_string(&proof_path).unwrap();
    let last_line = proof.lines().rev().find(|line| !line.is_empty()).unwrap();
    assert_eq!(last_line, "0");
}

#[test]
fn scenario_diamond_with_assumptions() {
    let mut solver = Solver::new();
    solver.add_formula(&cnf_formula![
        1, 2;
        -1, 3;
        -2, 3;
        -3;
    ]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);

    // Without the clauses over 1 and 2 the formula is satisfiable, but assuming both pushes it
    // back into unsatisfiability and both assumptions are part of the core.
    let mut solver = Solver::new();
    solver.add_formula(&cnf_formula![
        -1, 3;
        -2, 3;
        -3;
    ]);
    solver.assume(lit!(1));
    solver.assume(lit!(2));
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    assert!(solver.failed(lit!(1)) || solver.failed(lit!(2)));

    assert_eq!(solver.solve(), SolveResult::Satisfiable);
}

#[test]
fn scenario_tautology_phase_choice() {
    for &phase in [false, true].iter() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1, -1]);
        solver.phase(var!(1).lit(phase));
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert_eq!(solver.value(lit!(1)), Some(phase));
    }
}

#[test]
fn scenario_pigeon_hole_proofs() {
    for &format in [
        ProofFormat::Drat,
        ProofFormat::BinaryDrat,
        ProofFormat::Frat,
        ProofFormat::Lrat,
        ProofFormat::VeriPb,
        ProofFormat::Idrup,
        ProofFormat::Lidrup,
    ]
    .iter()
    {
        let tmp = TempDir::new().unwrap();
        let proof_path = tmp.path().join("proof.out");

        let mut solver = Solver::new();
        solver.write_proof_file(&proof_path, format).unwrap();
        solver.add_formula(&pigeon_hole_3_2());
        assert_eq!(
            solver.solve(),
            SolveResult::Unsatisfiable,
            "php 3/2 must be unsat with {:?}",
            format
        );
        solver.close_proof();

        let proof = fs::read(&proof_path).unwrap();
        assert!(!proof.is_empty(), "empty proof for {:?}", format);
    }
}

#[test]
fn scenario_reentrant_freeze_melt() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, 2]);
    assert_eq!(solver.solve(), SolveResult::Satisfiable);

    solver.freeze(var!(1));
    solver.add_clause(&lits![-1]);
    assert_eq!(solver.solve(), SolveResult::Satisfiable);
    assert_eq!(solver.value(lit!(1)), Some(false));

    solver.melt(var!(1));
    solver.add_clause(&lits![1]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
}

#[test]
fn idrup_records_the_interaction() {
    let tmp = TempDir::new().unwrap();
    let proof_path = tmp.path().join("proof.idrup");

    let mut solver = Solver::new();
    solver
        .write_proof_file(&proof_path, ProofFormat::Idrup)
        .unwrap();

    solver.add_clause(&lits![1, 2]);
    solver.assume(lit!(-1));
    assert_eq!(solver.solve(), SolveResult::Satisfiable);

    solver.add_clause(&lits![-2]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    solver.close_proof();

    let proof = fs::read_to_string(&proof_path).unwrap();
    assert!(proof.starts_with("p idrup\n"));
    assert!(proof.contains("\nq -1 0\n"));
    assert!(proof.contains("s SATISFIABLE"));
    assert!(proof.contains("s UNSATISFIABLE"));
}

#[test]
fn lrat_chains_reference_known_ids() {
    let tmp = TempDir::new().unwrap();
    let proof_path = tmp.path().join("proof.lrat");

    let mut solver = Solver::new();
    solver
        .write_proof_file(&proof_path, ProofFormat::Lrat)
        .unwrap();
    solver.add_formula(&pigeon_hole_3_2());
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    solver.close_proof();

    let proof = fs::read_to_string(&proof_path).unwrap();

    // Every addition line must only reference earlier ids in its antecedents.
    let mut known = 0u64;
    let original_count = pigeon_hole_3_2().len() as u64;
    known += original_count;

    for line in proof.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 || fields[1] == "d" {
            continue;
        }
        let id: u64 = fields[0].parse().expect("addition line starts with an id");
        let mut sections = line.splitn(3, " 0 ");
        sections.next();
        if let Some(antecedents) = sections.next() {
            for field in antecedents.split_whitespace() {
                let antecedent: i64 = field.parse().unwrap();
                if antecedent != 0 {
                    assert!(
                        (antecedent.abs() as u64) <= known,
                        "antecedent {} references future id in line '{}'",
                        antecedent,
                        line
                    );
                }
            }
        }
        known = known.max(id);
    }
}

#[test]
fn model_covers_all_clauses_after_inprocessing() {
    // A formula shaped to give elimination and substitution something to do.
    let mut solver = Solver::new();
    let formula = cnf_formula![
        1, 2, 3;
        -1, 4;
        -4, 1;
        -2, 5, 6;
        -5, -6, 2;
        3, 7;
        -7, 8;
        -8, 3, 5;
        6, -3;
    ];
    solver.add_formula(&formula);
    assert_eq!(solver.solve(), SolveResult::Satisfiable);

    let model = solver.model().unwrap();
    for clause in formula.iter() {
        assert!(
            clause.iter().any(|lit| model.contains(lit)),
            "clause {:?} not satisfied by extended model",
            clause
        );
    }
}

#[test]
fn cubes_cover_and_exclude() {
    let mut solver = Solver::new();
    solver.add_formula(&cnf_formula![
        1, 2;
        -1, -2;
    ]);
    let cubes = solver.generate_cubes(2);
    assert!(!cubes.is_empty());
    for cube in cubes.iter() {
        assert!(cube.len() <= 2);
    }
}

#[test]
fn propagate_reports_fixed_literals() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1]);
    solver.add_clause(&lits![-1, 2]);
    let implied = solver.propagate().unwrap();
    assert!(implied.contains(&lit!(1)));
    assert!(implied.contains(&lit!(2)));
}
