//! Proof tracing and proof format emitters for the Pinesat SAT solver.
//!
//! The solver fans clause events out to any number of attached [`Tracer`]s. Each tracer turns the
//! event stream into one proof dialect. All literals passed to tracers are in the external (user)
//! encoding; the engine performs the internal-to-external mapping before emission.

use pinesat_formula::Lit;

pub mod enc;

mod drat;
mod emit;
mod frat;
mod idrup;
mod lrat;
mod veripb;

pub use drat::DratTracer;
pub use frat::FratTracer;
pub use idrup::{IdrupTracer, LidrupTracer};
pub use lrat::LratTracer;
pub use veripb::VeripbTracer;

/// Identifier of a clause.
///
/// Assigned by the solver in strictly increasing order over all original and derived clauses.
pub type ClauseId = u64;

/// Result status reported to tracers.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Status {
    Satisfiable,
    Unsatisfiable,
    Unknown,
}

/// Justification variant for an unsatisfiable conclusion.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Conclusion {
    /// The empty clause was derived.
    ConflictClause,
    /// A subset of the assumptions is incompatible with the formula.
    Assumptions,
    /// The one-shot constraint failed.
    Constraint,
}

/// A sink for clause events produced during solving.
///
/// All methods have empty default implementations so that a dialect only implements the events it
/// renders. Tracers must not re-enter the solver.
pub trait Tracer {
    /// A clause of the input formula, or a clause restored from the extension stack.
    fn add_original_clause(&mut self, _id: ClauseId, _redundant: bool, _lits: &[Lit], _restored: bool) {
    }

    /// A clause derived by the solver.
    ///
    /// `antecedents` contains the ids of the clauses that propagate the negation of `lits` to a
    /// conflict, in propagation order. It is empty unless [`needs_antecedents`][Self::needs_antecedents]
    /// returned true.
    fn add_derived_clause(
        &mut self,
        _id: ClauseId,
        _redundant: bool,
        _lits: &[Lit],
        _antecedents: &[ClauseId],
    ) {
    }

    /// The clause is removed from the active formula and will not be used in further derivations.
    fn delete_clause(&mut self, _id: ClauseId, _redundant: bool, _lits: &[Lit]) {}

    /// The clause is removed from the active formula but kept on the extension stack.
    fn weaken_minus(&mut self, _id: ClauseId, _lits: &[Lit]) {}

    /// The weakened clause is moved back into the active formula.
    fn strengthen(&mut self, _id: ClauseId) {}

    /// Reports a clause that is still live when the proof ends.
    fn finalize_clause(&mut self, _id: ClauseId, _lits: &[Lit]) {}

    /// Reports the solver status after a solve call.
    fn report_status(&mut self, _status: Status, _id: ClauseId) {}

    /// Signals that the empty clause was derived.
    fn begin_proof(&mut self, _id: ClauseId) {}

    /// An incremental solve call starts.
    fn solve_query(&mut self) {}

    /// An assumption for the next solve call.
    fn add_assumption(&mut self, _lit: Lit) {}

    /// The negation of a failed assumption core, derived at the end of an unsatisfiable
    /// incremental call.
    fn add_assumption_clause(&mut self, _id: ClauseId, _lits: &[Lit], _antecedents: &[ClauseId]) {}

    /// A one-shot constraint clause for the next solve call.
    fn add_constraint(&mut self, _lits: &[Lit]) {}

    /// The assumptions and constraint of the previous solve call are dropped.
    fn reset_assumptions(&mut self) {}

    /// The formula is satisfiable with the given model.
    fn conclude_sat(&mut self, _model: &[Lit]) {}

    /// The formula is unsatisfiable.
    ///
    /// For [`Conclusion::ConflictClause`] `ids` contains the id of the empty clause, for
    /// [`Conclusion::Assumptions`] the id of the assumption clause.
    fn conclude_unsat(&mut self, _conclusion: Conclusion, _ids: &[ClauseId]) {}

    /// The solve call was aborted.
    fn conclude_unknown(&mut self) {}

    /// Whether derived clauses must carry antecedent chains.
    fn needs_antecedents(&self) -> bool {
        false
    }

    /// Flush buffered output.
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::lits;

    #[test]
    fn default_methods_are_noops() {
        struct Nop;
        impl Tracer for Nop {}

        let mut tracer = Nop;
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.add_derived_clause(2, true, &lits![1], &[1]);
        tracer.delete_clause(1, false, &lits![1, 2]);
        tracer.conclude_unsat(Conclusion::ConflictClause, &[2]);
        assert!(!tracer.needs_antecedents());
    }
}
