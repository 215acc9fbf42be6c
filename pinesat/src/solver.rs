//! The incremental solver API.
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};

use anyhow::Error;
use log::info;

use pinesat_formula::{CnfFormula, ExtendFormula, Lit, Var};

use pinesat_dimacs::DimacsParser;

use pinesat_proof::{
    Conclusion, DratTracer, FratTracer, IdrupTracer, LidrupTracer, LratTracer, Tracer,
    VeripbTracer,
};

use crate::config::{ConfigError, SolverConfigUpdate};
use crate::context::{config_changed, Context};
use crate::context::{
    AssignmentP, CallbacksP, ClauseAllocP, ClauseDbP, ConfigP, IncrementalP, ProofP,
    SolverStateP, StatsP, VariablesP,
};
use crate::external::ExternalPropagate;
use crate::inprocess::inprocess_round;
use crate::load::add_input_clause;
use crate::lookahead;
use crate::model;
use crate::proof;
use crate::schedule::schedule_step;
use crate::state::SatState;
use crate::varmap::VarStatus;

/// Proof dialects that can be emitted during solving.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProofFormat {
    Drat,
    BinaryDrat,
    Frat,
    BinaryFrat,
    Lrat,
    BinaryLrat,
    VeriPb,
    Idrup,
    Lidrup,
}

/// Result of a solve call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolveResult {
    Satisfiable,
    Unsatisfiable,
    Interrupted,
}

impl SolveResult {
    /// The conventional exit status: 10 for satisfiable, 20 for unsatisfiable, 0 otherwise.
    pub fn status(self) -> i32 {
        match self {
            SolveResult::Satisfiable => 10,
            SolveResult::Unsatisfiable => 20,
            SolveResult::Interrupted => 0,
        }
    }
}

/// API state machine.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum ApiState {
    Configuring,
    Steady,
    /// An open clause is being built literal by literal.
    Adding,
    /// An open constraint is being built literal by literal.
    Constraining,
    Satisfied,
    Unsatisfied,
    Inconclusive,
}

/// A boolean satisfiability solver.
pub struct Solver {
    ctx: Box<Context>,
    state: ApiState,
    clause_buf: Vec<Lit>,
    constraint_buf: Vec<Lit>,
    /// Assumption and constraint variables frozen for the duration of one solve.
    solve_frozen: Vec<Var>,
    api_trace: Option<io::BufWriter<File>>,
}

impl Default for Solver {
    fn default() -> Solver {
        Solver::new()
    }
}

macro_rules! api_trace {
    ($solver:expr, $($fmt:tt)*) => {
        if let Some(target) = &mut $solver.api_trace {
            let _ = writeln!(target, $($fmt)*);
        }
    };
}

impl Solver {
    /// Create a new solver.
    ///
    /// The environment variables `PINESAT_API_TRACE` and `PINESAT_LIDRUP_TRACE` are honored
    /// here: the former records all API calls, the latter attaches an LIDRUP tracer writing to
    /// the given path.
    pub fn new() -> Solver {
        let api_trace = std::env::var_os("PINESAT_API_TRACE")
            .and_then(|path| File::create(path).ok())
            .map(io::BufWriter::new);

        let mut solver = Solver {
            ctx: Box::new(Context::default()),
            state: ApiState::Configuring,
            clause_buf: vec![],
            constraint_buf: vec![],
            solve_frozen: vec![],
            api_trace,
        };

        if let Some(path) = std::env::var_os("PINESAT_LIDRUP_TRACE") {
            if let Ok(file) = File::create(path) {
                solver.add_tracer(Box::new(LidrupTracer::new(file)));
            }
        }

        api_trace!(solver, "init");
        solver
    }

    /// Append a literal in the DIMACS encoding; zero terminates the clause.
    pub fn add(&mut self, lit: isize) {
        api_trace!(self, "add {}", lit);
        if lit == 0 {
            let clause = std::mem::replace(&mut self.clause_buf, vec![]);
            self.state = ApiState::Steady;
            self.add_clause(&clause);
            return;
        }
        match Lit::try_from_dimacs(lit) {
            Some(lit) => {
                self.expect_state(
                    &[
                        ApiState::Configuring,
                        ApiState::Steady,
                        ApiState::Adding,
                        ApiState::Satisfied,
                        ApiState::Unsatisfied,
                        ApiState::Inconclusive,
                    ],
                    "add",
                );
                self.state = ApiState::Adding;
                self.clause_buf.push(lit);
            }
            None => panic!("invalid literal {} passed to add", lit),
        }
    }

    /// Add a clause over external literals.
    pub fn add_clause(&mut self, clause: &[Lit]) {
        self.expect_state(
            &[
                ApiState::Configuring,
                ApiState::Steady,
                ApiState::Satisfied,
                ApiState::Unsatisfied,
                ApiState::Inconclusive,
            ],
            "add_clause",
        );
        self.state = ApiState::Steady;
        let mut ctx = self.ctx.into_partial_ref_mut();
        add_input_clause(ctx.borrow(), clause);
    }

    /// Add a formula to the solver.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        for clause in formula.iter() {
            self.add_clause(clause);
        }
    }

    /// Reads and adds a formula in DIMACS CNF format.
    ///
    /// Using this avoids creating a temporary [`CnfFormula`].
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), Error> {
        let parser = DimacsParser::parse_incremental(input, |parser| {
            self.add_formula(&parser.take_formula());
            Ok(())
        })?;

        info!(
            "Parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        Ok(())
    }

    /// Append a literal of the one-shot constraint; zero terminates it.
    pub fn constrain(&mut self, lit: isize) {
        api_trace!(self, "constrain {}", lit);
        if lit == 0 {
            let constraint = std::mem::replace(&mut self.constraint_buf, vec![]);
            self.state = ApiState::Steady;
            let internal = self.internalize_frozen(&constraint);
            let mut ctx = self.ctx.into_partial_ref_mut();
            proof::add_constraint(ctx.borrow(), &internal);
            ctx.part_mut(IncrementalP).set_constraint(internal);
            return;
        }
        match Lit::try_from_dimacs(lit) {
            Some(lit) => {
                self.state = ApiState::Constraining;
                self.constraint_buf.push(lit);
            }
            None => panic!("invalid literal {} passed to constrain", lit),
        }
    }

    /// Add a one-shot assumption for the next solve call.
    pub fn assume(&mut self, lit: Lit) {
        api_trace!(self, "assume {}", lit);
        self.expect_state(
            &[
                ApiState::Configuring,
                ApiState::Steady,
                ApiState::Satisfied,
                ApiState::Unsatisfied,
                ApiState::Inconclusive,
            ],
            "assume",
        );
        self.state = ApiState::Steady;
        let internal = self.internalize_frozen(&[lit]);
        let mut ctx = self.ctx.into_partial_ref_mut();
        proof::add_assumption(ctx.borrow(), internal[0]);
        ctx.part_mut(IncrementalP).assume(internal[0]);
    }

    /// Check the satisfiability of the current formula under the pending assumptions.
    pub fn solve(&mut self) -> SolveResult {
        api_trace!(self, "solve");
        self.expect_state(
            &[
                ApiState::Configuring,
                ApiState::Steady,
                ApiState::Satisfied,
                ApiState::Unsatisfied,
                ApiState::Inconclusive,
            ],
            "solve",
        );

        {
            let mut ctx = self.ctx.into_partial_ref_mut();
            ctx.part_mut(SolverStateP).start_solve();
            ctx.part_mut(IncrementalP).start_solve();
            proof::solve_query(ctx.borrow());

            while schedule_step(ctx.borrow()) {}
        }

        self.conclude()
    }

    /// Run one round of inprocessing without searching.
    pub fn simplify(&mut self) -> SolveResult {
        api_trace!(self, "simplify");
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(SolverStateP).start_solve();
        ctx.part_mut(IncrementalP).start_solve();
        if ctx.part(SolverStateP).sat_state == SatState::Unknown {
            inprocess_round(ctx.borrow());
        }
        drop(ctx);
        // Simplification alone decides nothing unless it derived the empty clause.
        let mut ctx = self.ctx.into_partial_ref_mut();
        if ctx.part(SolverStateP).sat_state == SatState::Unknown {
            ctx.part_mut(SolverStateP).terminated = true;
        }
        drop(ctx);
        self.conclude()
    }

    /// Propagate the root level and return the fixed literals.
    pub fn propagate(&mut self) -> Option<Vec<Lit>> {
        api_trace!(self, "propagate");
        let mut ctx = self.ctx.into_partial_ref_mut();
        lookahead::propagate_root(ctx.borrow())
    }

    /// The literal a lookahead would branch on.
    pub fn lookahead(&mut self) -> Option<Lit> {
        api_trace!(self, "lookahead");
        let mut ctx = self.ctx.into_partial_ref_mut();
        let internal = lookahead::lookahead(ctx.borrow())?;
        Some(ctx.part(VariablesP).external_from_internal_lit(internal))
    }

    /// Split the search space into cubes by recursive lookahead.
    pub fn generate_cubes(&mut self, depth: usize) -> Vec<Vec<Lit>> {
        api_trace!(self, "generate_cubes {}", depth);
        let mut ctx = self.ctx.into_partial_ref_mut();
        lookahead::generate_cubes(ctx.borrow(), depth)
    }

    fn conclude(&mut self) -> SolveResult {
        let mut ctx = self.ctx.into_partial_ref_mut();

        let result = match ctx.part(SolverStateP).sat_state {
            SatState::Sat => {
                let model = model::reconstruct_model(ctx.borrow());
                proof::conclude_sat(ctx.borrow(), &model);
                self.state = ApiState::Satisfied;
                SolveResult::Satisfiable
            }
            SatState::Unsat => {
                let ids: Vec<_> = ctx.part(ProofP).empty_clause.into_iter().collect();
                proof::conclude_unsat(ctx.borrow(), Conclusion::ConflictClause, &ids);
                self.state = ApiState::Unsatisfied;
                SolveResult::Unsatisfiable
            }
            SatState::UnsatUnderAssumptions => {
                if ctx.part(IncrementalP).constraint_failed {
                    // There is no failed core for a failing constraint, only the flag.
                    proof::conclude_unsat(ctx.borrow(), Conclusion::Constraint, &[]);
                } else {
                    let (core, chain): (Vec<Lit>, Vec<_>) = {
                        let incremental = ctx.part(IncrementalP);
                        (
                            incremental.failed_core().iter().map(|&l| !l).collect(),
                            incremental.core_chain().to_vec(),
                        )
                    };
                    let id = proof::add_assumption_clause(ctx.borrow(), &core, &chain);
                    proof::conclude_unsat(ctx.borrow(), Conclusion::Assumptions, &[id]);
                }
                self.state = ApiState::Unsatisfied;
                SolveResult::Unsatisfiable
            }
            SatState::Unknown => {
                proof::conclude_unknown(ctx.borrow());
                self.state = ApiState::Inconclusive;
                SolveResult::Interrupted
            }
        };

        drop(ctx);

        // Assumptions and the constraint are one-shot; their freeze protection ends here.
        // The failed core stays queryable until the next call that changes the state.
        for var in std::mem::replace(&mut self.solve_frozen, vec![]) {
            let mut ctx = self.ctx.into_partial_ref_mut();
            ctx.part_mut(VariablesP).melt(var);
        }
        {
            let mut ctx = self.ctx.into_partial_ref_mut();
            ctx.part_mut(IncrementalP).reset_after_solve();
            proof::reset_assumptions(ctx.borrow());
        }

        result
    }

    /// The value assigned to an external literal by the last satisfiable call.
    pub fn value(&mut self, lit: Lit) -> Option<bool> {
        self.expect_state(&[ApiState::Satisfied], "value");
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(VariablesP).mark_tainted(lit.var());
        ctx.part(VariablesP)
            .solution(lit.var())
            .map(|value| value == lit.is_positive())
    }

    /// Set of literals that satisfy the formula.
    pub fn model(&self) -> Option<Vec<Lit>> {
        if self.state != ApiState::Satisfied {
            return None;
        }
        let ctx = self.ctx.into_partial_ref();
        let variables = ctx.part(VariablesP);
        Some(
            (0..variables.external_count())
                .filter_map(|index| {
                    let var = Var::from_index(index);
                    variables.solution(var).map(|value| var.lit(value))
                })
                .collect(),
        )
    }

    /// Whether an assumption of the last unsatisfiable call is part of the failed core.
    pub fn failed(&self, lit: Lit) -> bool {
        self.expect_state(&[ApiState::Unsatisfied], "failed");
        let ctx = self.ctx.into_partial_ref();
        match ctx.part(VariablesP).internal_from_external_lit(lit) {
            Some(internal) => ctx.part(IncrementalP).is_failed(internal),
            None => false,
        }
    }

    /// Whether the one-shot constraint of the last call was responsible for unsatisfiability.
    pub fn constraint_failed(&self) -> bool {
        self.expect_state(&[ApiState::Unsatisfied], "constraint_failed");
        let ctx = self.ctx.into_partial_ref();
        ctx.part(IncrementalP).constraint_failed
    }

    /// The root level value of a literal, if it is forced.
    pub fn fixed(&self, lit: Lit) -> Option<bool> {
        let ctx = self.ctx.into_partial_ref();
        let internal = ctx.part(VariablesP).internal_from_external_lit(lit)?;
        if ctx.part(VariablesP).status(internal.var()) != VarStatus::Fixed {
            return None;
        }
        ctx.part(AssignmentP)
            .lit_value(internal)
    }

    /// Whether the literal's polarity can be flipped in the current model.
    pub fn flippable(&self, lit: Lit) -> bool {
        self.expect_state(&[ApiState::Satisfied], "flippable");
        let ctx = self.ctx.into_partial_ref();
        model::flippable(ctx.borrow(), lit)
    }

    /// Flip the literal's polarity in the current model, if possible.
    pub fn flip(&mut self, lit: Lit) -> bool {
        api_trace!(self, "flip {}", lit);
        self.expect_state(&[ApiState::Satisfied], "flip");
        let mut ctx = self.ctx.into_partial_ref_mut();
        model::flip(ctx.borrow(), lit)
    }

    /// Force the decision phase of a variable.
    pub fn phase(&mut self, lit: Lit) {
        api_trace!(self, "phase {}", lit);
        let mut ctx = self.ctx.into_partial_ref_mut();
        let internal = ctx.part_mut(VariablesP).alloc_external(lit.var());
        crate::context::ensure_var_count(ctx.borrow());
        ctx.part_mut(crate::context::PhasesP)
            .set_forced(internal, Some(lit.is_positive()));
    }

    /// Remove a forced decision phase.
    pub fn unphase(&mut self, var: Var) {
        api_trace!(self, "unphase {}", var);
        let mut ctx = self.ctx.into_partial_ref_mut();
        if let Some(internal) = ctx.part(VariablesP).internal_from_external(var) {
            ctx.part_mut(crate::context::PhasesP)
                .set_forced(internal, None);
        }
    }

    /// Protect a variable from being removed by inprocessing.
    pub fn freeze(&mut self, var: Var) {
        api_trace!(self, "freeze {}", var);
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(VariablesP).freeze(var);
    }

    /// Undo one freeze of a variable.
    pub fn melt(&mut self, var: Var) {
        api_trace!(self, "melt {}", var);
        let mut ctx = self.ctx.into_partial_ref_mut();
        if ctx.part(VariablesP).is_tainted(var) {
            log::debug!("melting variable {} whose value was queried", var);
        }
        if !ctx.part_mut(VariablesP).melt(var) {
            panic!("melt called on unfrozen variable {}", var);
        }
    }

    /// Pre-size the internal structures for the given number of variables.
    pub fn reserve(&mut self, var_count: usize) {
        api_trace!(self, "reserve {}", var_count);
        let mut ctx = self.ctx.into_partial_ref_mut();
        if var_count > 0 {
            ctx.part_mut(VariablesP)
                .alloc_external(Var::from_index(var_count - 1));
        }
        crate::context::ensure_var_count(ctx.borrow());
    }

    /// Pre-size the internal structures for this many additional variables.
    pub fn reserve_difference(&mut self, additional: usize) {
        let current = {
            let ctx = self.ctx.into_partial_ref();
            ctx.part(VariablesP).external_count()
        };
        self.reserve(current + additional);
    }

    /// Set an option by name.
    pub fn set_option(&mut self, name: &str, value: i64) -> Result<(), ConfigError> {
        api_trace!(self, "set_option {} {}", name, value);
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ConfigP).set_option(name, value)?;
        let mut update = SolverConfigUpdate::new();
        update.set(name, value);
        config_changed(ctx.borrow(), &update);
        Ok(())
    }

    /// Look up an option value by name.
    pub fn get_option(&self, name: &str) -> Result<i64, ConfigError> {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(ConfigP).get_option(name)
    }

    /// Apply one of the bundled option sets ("default", "plain", "sat", "unsat").
    pub fn configure(&mut self, name: &str) -> Result<(), ConfigError> {
        api_trace!(self, "configure {}", name);
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ConfigP).configure(name)?;
        config_changed(ctx.borrow(), &SolverConfigUpdate::new());
        Ok(())
    }

    /// Install a termination callback, polled at the solver's cooperative suspension points.
    pub fn set_terminator(&mut self, terminator: Option<Box<dyn FnMut() -> bool>>) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(CallbacksP).terminator = terminator;
    }

    /// Connect an external propagator.
    pub fn connect_external_propagator(&mut self, propagator: Box<dyn ExternalPropagate>) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(CallbacksP).propagator = Some(propagator);
    }

    /// Disconnect the external propagator.
    pub fn disconnect_external_propagator(&mut self) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(CallbacksP).propagator = None;
    }

    /// Request a forced backtrack to the given decision level, on behalf of the external
    /// propagator.
    pub fn force_backtrack(&mut self, level: usize) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(CallbacksP).force_backtrack(level);
    }

    /// Attach a proof tracer writing the given format to the given writer.
    ///
    /// Must be called before any clause is added.
    pub fn write_proof(&mut self, target: impl Write + 'static, format: ProofFormat) {
        api_trace!(self, "write_proof {:?}", format);
        assert!(
            self.clause_count() == 0,
            "proof tracers must be attached before clauses are added"
        );
        let checked = {
            let ctx = self.ctx.into_partial_ref();
            ctx.part(ConfigP).checkeddeletions != 0
        };
        let tracer: Box<dyn Tracer> = match format {
            ProofFormat::Drat => Box::new(DratTracer::new(target, false)),
            ProofFormat::BinaryDrat => Box::new(DratTracer::new(target, true)),
            ProofFormat::Frat => Box::new(FratTracer::new(target, false)),
            ProofFormat::BinaryFrat => Box::new(FratTracer::new(target, true)),
            ProofFormat::Lrat => Box::new(LratTracer::new(target, false)),
            ProofFormat::BinaryLrat => Box::new(LratTracer::new(target, true)),
            ProofFormat::VeriPb => Box::new(VeripbTracer::new(target, checked)),
            ProofFormat::Idrup => Box::new(IdrupTracer::new(target)),
            ProofFormat::Lidrup => Box::new(LidrupTracer::new(target)),
        };
        self.add_tracer(tracer);
    }

    /// Attach a proof tracer writing to a file path.
    pub fn write_proof_file(&mut self, path: &Path, format: ProofFormat) -> Result<(), Error> {
        let file = File::create(path)?;
        self.write_proof(file, format);
        Ok(())
    }

    /// Attach an already constructed tracer.
    pub fn add_tracer(&mut self, tracer: Box<dyn Tracer>) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).add_tracer(tracer);
    }

    /// Finish and detach all proof tracers.
    ///
    /// Live clauses are finalized first, as required by FRAT.
    pub fn close_proof(&mut self) {
        api_trace!(self, "close_proof");
        let mut ctx = self.ctx.into_partial_ref_mut();

        if ctx.part(ProofP).is_active() {
            let mut live: Vec<(pinesat_proof::ClauseId, Vec<Lit>)> = vec![];
            {
                let alloc = ctx.part(ClauseAllocP);
                for &cref in ctx.part(ClauseDbP).clauses.iter() {
                    let clause = alloc.clause(cref);
                    if !clause.header().deleted() {
                        live.push((clause.header().id(), clause.lits().to_vec()));
                    }
                }
            }
            for (id, lits) in live {
                proof::finalize_clause(ctx.borrow(), id, &lits);
            }
        }

        ctx.part_mut(ProofP).take_tracers();
    }

    /// Log the statistics counters.
    pub fn log_stats(&self) {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(StatsP).summarize();
    }

    fn clause_count(&self) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(ClauseDbP).count_by_tier(crate::clause::Tier::Irred)
            + ctx.part(crate::context::BinaryClausesP).count()
    }

    /// Map external literals to internal ones, freezing their variables for the pending solve.
    fn internalize_frozen(&mut self, lits: &[Lit]) -> Vec<Lit> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let mut internal = Vec::with_capacity(lits.len());
        for &lit in lits {
            let lit = ctx.part_mut(VariablesP).repr_external_lit(lit);
            let internal_var = ctx.part_mut(VariablesP).alloc_external(lit.var());
            ctx.part_mut(VariablesP).freeze(lit.var());
            self.solve_frozen.push(lit.var());
            if ctx.part(VariablesP).status(internal_var) == VarStatus::Unused {
                ctx.part_mut(VariablesP)
                    .set_status(internal_var, VarStatus::Active);
            }
            internal.push(internal_var.lit(lit.is_positive()));
        }
        crate::context::ensure_var_count(ctx.borrow());
        drop(ctx);

        // Restoring eliminated variables keeps the assumption meaningful.
        let mut ctx = self.ctx.into_partial_ref_mut();
        for &lit in internal.iter() {
            let status = ctx.part(VariablesP).status(lit.var());
            if let VarStatus::Eliminated | VarStatus::Pure = status {
                crate::load::restore_var(ctx.borrow(), lit.var());
            }
        }
        internal
    }

    fn expect_state(&self, allowed: &[ApiState], operation: &str) {
        if !allowed.contains(&self.state) {
            panic!(
                "operation {} invalid in solver state {:?}",
                operation, self.state
            );
        }
    }
}

impl ExtendFormula for Solver {
    fn add_clause(&mut self, literals: &[Lit]) {
        Solver::add_clause(self, literals)
    }

    fn new_var(&mut self) -> Var {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let next = ctx.part(VariablesP).external_count();
        let external = Var::from_index(next);
        ctx.part_mut(VariablesP).alloc_external(external);
        crate::context::ensure_var_count(ctx.borrow());
        external
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use pinesat_formula::{cnf_formula, lit, lits};

    use pinesat_formula::test::{
        conditional_pigeon_hole, dpll_is_sat, sat_formula, sgen_unsat_formula,
    };

    #[test]
    fn simple_sat() {
        let mut solver = Solver::new();
        solver.add_formula(&cnf_formula![
            1, 2;
            -1, -2;
        ]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert_ne!(solver.value(lit!(1)), solver.value(lit!(2)));
    }

    #[test]
    fn simple_unsat() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1]);
        solver.add_clause(&lits![-1]);
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    }

    #[test]
    fn tautology_only() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1, -1]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
    }

    #[test]
    fn add_interface() {
        let mut solver = Solver::new();
        for &lit in [1, 2, 0, -1, 2, 0, -2, 0].iter() {
            solver.add(lit);
        }
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    }

    #[test]
    #[should_panic(expected = "invalid literal")]
    fn rejects_min_int() {
        let mut solver = Solver::new();
        solver.add(isize::min_value());
    }

    #[test]
    fn failed_assumption_core() {
        let mut solver = Solver::new();
        solver.add_formula(&cnf_formula![
            -1, 3;
            -2, 3;
            -3;
        ]);

        solver.assume(lit!(1));
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        assert!(solver.failed(lit!(1)));

        assert_eq!(solver.solve(), SolveResult::Satisfiable);
    }

    #[test]
    fn assumptions_are_one_shot() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1, 2]);
        solver.assume(lit!(-1));
        solver.assume(lit!(-2));
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
    }

    #[test]
    fn constraint_one_shot() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1, 2]);
        for &lit in [-1, 0].iter() {
            solver.constrain(lit);
        }
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert_eq!(solver.value(lit!(2)), Some(true));
    }

    #[test]
    fn failing_constraint_reports_no_stale_core() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1]);
        solver.add_clause(&lits![2]);

        // First an assumption failure, which leaves a failed core behind.
        solver.assume(lit!(-1));
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        assert!(solver.failed(lit!(-1)));
        assert!(!solver.constraint_failed());

        // Then a failing constraint: the earlier core must not leak into this call.
        for &lit in [-1, -2, 0].iter() {
            solver.constrain(lit);
        }
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        assert!(solver.constraint_failed());
        assert!(!solver.failed(lit!(-1)));
        assert!(!solver.failed(lit!(-2)));
    }

    #[test]
    fn freeze_melt_flow() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1, 2]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);

        solver.freeze(pinesat_formula::var!(1));
        solver.add_clause(&lits![-1]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert_eq!(solver.value(lit!(1)), Some(false));

        solver.melt(pinesat_formula::var!(1));
        solver.add_clause(&lits![1]);
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    }

    #[test]
    fn fixed_reports_root_units() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1]);
        solver.add_clause(&lits![-1, 2]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert_eq!(solver.fixed(lit!(1)), Some(true));
        assert_eq!(solver.fixed(lit!(-1)), Some(false));
    }

    #[test]
    fn options_and_presets() {
        let mut solver = Solver::new();
        solver.set_option("elim", 0).unwrap();
        assert_eq!(solver.get_option("elim").unwrap(), 0);
        assert!(solver.set_option("nonsense", 1).is_err());
        solver.configure("plain").unwrap();
        assert_eq!(solver.get_option("probe").unwrap(), 0);
        assert!(solver.configure("nonsense").is_err());
    }

    #[test]
    fn terminator_interrupts() {
        let mut solver = Solver::new();
        solver.add_formula(&cnf_formula![
            1, 2;
            -1, -2;
        ]);
        solver.set_terminator(Some(Box::new(|| true)));
        assert_eq!(solver.solve(), SolveResult::Interrupted);

        solver.set_terminator(None);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
    }

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();
            solver.add_formula(&formula);
            prop_assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();
            solver.add_formula(&formula);
            prop_assert_eq!(solver.solve(), SolveResult::Satisfiable);

            let model = solver.model().unwrap();
            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn matches_reference_dpll(
            formula in pinesat_formula::test::any_formula(1..8usize, 0..30, 0..5)
        ) {
            let mut solver = Solver::new();
            solver.add_formula(&formula);
            let result = solver.solve();
            let expected = if dpll_is_sat(&formula) {
                SolveResult::Satisfiable
            } else {
                SolveResult::Unsatisfiable
            };
            prop_assert_eq!(result, expected);
        }

        #[test]
        fn pigeon_hole_assumption_core(
            (enable_row, _columns, formula) in conditional_pigeon_hole(1..4usize, 1..4usize),
        ) {
            let mut solver = Solver::new();
            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), SolveResult::Satisfiable);

            for &lit in enable_row.iter() {
                solver.assume(lit);
            }

            prop_assert_eq!(solver.solve(), SolveResult::Unsatisfiable);

            let core: Vec<_> = enable_row
                .iter()
                .cloned()
                .filter(|&lit| solver.failed(lit))
                .collect();
            prop_assert!(!core.is_empty());
        }

        #[test]
        fn incremental_clauses(formula in sgen_unsat_formula(1..5usize)) {
            let mut solver = Solver::new();

            let mut last = SolveResult::Satisfiable;
            for clause in formula.iter() {
                solver.add_clause(clause);
                let state = solver.solve();
                if state != last {
                    prop_assert_eq!(state, SolveResult::Unsatisfiable);
                    prop_assert_eq!(last, SolveResult::Satisfiable);
                    last = state;
                }
            }
            prop_assert_eq!(last, SolveResult::Unsatisfiable);
        }
    }
}
