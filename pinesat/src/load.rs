//! Loading clauses into the solver.
use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::clause::{db, ClauseHeader, Tier};
use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context,
    EvsidsP, ExtendP, ImplGraphP, IncrementalP, OccurP, PhasesP, ProofP, SolverStateP, StatsP,
    TmpDataP, TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::context::ensure_var_count;
use crate::decision;
use crate::proof;
use crate::prop::{assignment, full_restart, Reason};
use crate::state::SatState;
use crate::varmap::VarStatus;

/// Result of attaching a simplified clause.
pub enum Attached {
    Empty,
    Unit(Lit),
    Binary([Lit; 2]),
    Long(crate::clause::ClauseRef),
}

/// Attach a clause that contains no duplicate, satisfied or falsified literals.
///
/// Dispatches among unit, binary and long clauses and hooks up watches when they are enabled.
/// Unit clauses are enqueued; the caller must be at the root level for that.
pub fn attach_clause(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        ConfigP,
    ),
    id: ClauseId,
    redundant: bool,
    glue: usize,
    hyper: bool,
    lits: &[Lit],
) -> Attached {
    match lits {
        [] => Attached::Empty,
        &[lit] => {
            debug_assert_eq!(ctx.part(TrailP).current_level(), 0);
            ctx.part_mut(ProofP).set_unit_id(lit.var(), id);
            ctx.part_mut(VariablesP).set_status(lit.var(), VarStatus::Fixed);
            assignment::enqueue_assignment(ctx.borrow(), lit, Reason::Unit { id });
            Attached::Unit(lit)
        }
        &[lit_0, lit_1] => {
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([lit_0, lit_1], id, redundant, hyper);
            Attached::Binary([lit_0, lit_1])
        }
        lits => {
            let mut header = ClauseHeader::new();
            header.set_id(id);
            header.set_glue(glue);
            header.set_hyper(hyper);
            header.set_tier(if redundant {
                let config = ctx.part(ConfigP);
                Tier::for_glue(glue, config.tier1glue as usize, config.tier2glue as usize)
            } else {
                Tier::Irred
            });

            let cref = db::add_clause(ctx.borrow(), header, lits);
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP)
                    .watch_clause(cref, [lits[0], lits[1]]);
            }
            Attached::Long(cref)
        }
    }
}

/// Load a clause that already carries a proof id.
///
/// Removes duplicated literals, drops tautological and satisfied clauses, removes literals that
/// are false at the root level (with the matching proof steps) and attaches the rest.
pub fn load_simplified(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        ConfigP,
    ),
    id: ClauseId,
    lits: &[Lit],
) {
    let (tmp_data, mut ctx) = ctx.split_part_mut(TmpDataP);

    tmp_data.lits.clear();
    tmp_data.lits.extend_from_slice(lits);
    let lits = &mut tmp_data.lits;
    let simplified_lits = &mut tmp_data.lits_2;

    lits.sort_unstable();
    lits.dedup();

    // Detect tautological clauses
    let mut last = None;

    for &lit in lits.iter() {
        if last == Some(!lit) {
            proof::delete_clause(ctx.borrow(), id, false, lits);
            return;
        }
        last = Some(lit);
    }

    // Remove false literals and satisfied clauses
    simplified_lits.clear();
    let mut unit_chain = vec![];

    for &lit in lits.iter() {
        match ctx.part(AssignmentP).lit_value(lit) {
            Some(true) => {
                proof::delete_clause(ctx.borrow(), id, false, lits);
                return;
            }
            Some(false) => {
                if let Some(unit_id) = ctx.part(ProofP).unit_id(lit.var()) {
                    unit_chain.push(unit_id);
                }
            }
            None => {
                simplified_lits.push(lit);
            }
        }
    }

    let mut active_id = id;

    if simplified_lits.len() < lits.len() {
        unit_chain.push(id);
        let derived_id =
            proof::add_derived_clause(ctx.borrow(), false, simplified_lits, &unit_chain);
        proof::delete_clause(ctx.borrow(), id, false, lits);
        active_id = derived_id;
    }

    match attach_clause(ctx.borrow(), active_id, false, 0, false, simplified_lits) {
        Attached::Empty => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            ctx.part_mut(SolverStateP).formula_unsat = true;
        }
        _ => (),
    }
}

/// Adds a clause over external literals to the current formula.
///
/// Maps the literals to internal ones, restoring removed variables and rewriting substituted
/// literals along the way, then dispatches to [`load_simplified`].
pub fn add_input_clause(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut ImplGraphP,
        mut IncrementalP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
    external_lits: &[Lit],
) {
    match ctx.part(SolverStateP).sat_state {
        SatState::Unsat => return,
        SatState::Sat | SatState::UnsatUnderAssumptions => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unknown;
        }
        SatState::Unknown => (),
    }

    // Restart the search when the user adds new clauses.
    full_restart(ctx.borrow());

    // Map the external literals, allocating and restoring variables as needed. Substituted
    // variables are rewritten to their representative before they ever become internal.
    let mut internal_lits = Vec::with_capacity(external_lits.len());
    for &external in external_lits {
        let external = ctx.part_mut(VariablesP).repr_external_lit(external);
        let internal_var = ctx.part_mut(VariablesP).alloc_external(external.var());
        internal_lits.push(internal_var.lit(external.is_positive()));
    }
    ensure_var_count(ctx.borrow());

    for &lit in internal_lits.iter() {
        let status = ctx.part(VariablesP).status(lit.var());
        if let VarStatus::Eliminated | VarStatus::Pure = status {
            restore_var(ctx.borrow(), lit.var());
        }
    }

    for &lit in internal_lits.iter() {
        if ctx.part(VariablesP).status(lit.var()) == VarStatus::Unused {
            ctx.part_mut(VariablesP)
                .set_status(lit.var(), VarStatus::Active);
            decision::initialize_var(ctx.borrow(), lit.var());
        }
    }

    let id = proof::add_original_clause(ctx.borrow(), &internal_lits, false);
    load_simplified(ctx.borrow(), id, &internal_lits);
}

/// Restore all extension stack records whose witness mentions the given variable.
///
/// The restored clauses reenter the formula under their original ids; restored variables become
/// active again. Restoring one clause can require restoring further variables, which is handled
/// by a worklist.
pub fn restore_var(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut ImplGraphP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        mut AnalyzeConflictP,
        ConfigP,
    ),
    var: pinesat_formula::Var,
) {
    let mut worklist = vec![var];

    while let Some(var) = worklist.pop() {
        let status = ctx.part(VariablesP).status(var);
        if status != VarStatus::Eliminated && status != VarStatus::Pure {
            continue;
        }

        let external = match ctx.part(VariablesP).external_from_internal(var) {
            Some(external) => external,
            None => continue,
        };

        let records = ctx
            .part_mut(ExtendP)
            .take_records_with_witness_var(external);

        ctx.part_mut(VariablesP).set_status(var, VarStatus::Active);
        decision::initialize_var(ctx.borrow(), var);
        ctx.part_mut(StatsP).restored += records.len() as u64;

        for record in records {
            // The record stores external literals; map them back, collecting any further
            // removed variables for restoration.
            let mut internal_lits = Vec::with_capacity(record.clause.len());
            for &external_lit in record.clause.iter() {
                let external_lit = ctx.part_mut(VariablesP).repr_external_lit(external_lit);
                let internal_var = ctx.part_mut(VariablesP).alloc_external(external_lit.var());
                internal_lits.push(internal_var.lit(external_lit.is_positive()));
            }
            ensure_var_count(ctx.borrow());

            for &lit in internal_lits.iter() {
                match ctx.part(VariablesP).status(lit.var()) {
                    VarStatus::Eliminated | VarStatus::Pure => worklist.push(lit.var()),
                    VarStatus::Unused => {
                        ctx.part_mut(VariablesP)
                            .set_status(lit.var(), VarStatus::Active);
                        decision::initialize_var(ctx.borrow(), lit.var());
                    }
                    _ => (),
                }
            }

            proof::add_restored_clause(ctx.borrow(), record.id, &internal_lits);
            load_simplified(ctx.borrow(), record.id, &internal_lits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use pinesat_formula::lits;

    use crate::clause::Tier;

    #[test]
    fn unsat_on_empty_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        add_input_clause(ctx.borrow(), &[]);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn unit_clauses() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        add_input_clause(ctx.borrow(), &lits![1]);

        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        add_input_clause(ctx.borrow(), &lits![3, -3]);

        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        add_input_clause(ctx.borrow(), &lits![-2]);

        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        add_input_clause(ctx.borrow(), &lits![1, 1]);

        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);

        add_input_clause(ctx.borrow(), &lits![2]);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn binary_clauses() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        add_input_clause(ctx.borrow(), &lits![1, 2]);

        assert_eq!(ctx.part(BinaryClausesP).count(), 1);

        add_input_clause(ctx.borrow(), &lits![-1, 3, 3]);

        assert_eq!(ctx.part(BinaryClausesP).count(), 2);

        add_input_clause(ctx.borrow(), &lits![4, -4]);

        assert_eq!(ctx.part(BinaryClausesP).count(), 2);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
    }

    #[test]
    fn long_clauses() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        add_input_clause(ctx.borrow(), &lits![1, 2, 3]);

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 1);

        add_input_clause(ctx.borrow(), &lits![-2, 3, 3, 4]);

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 2);

        add_input_clause(ctx.borrow(), &lits![4, -5, 5, 2]);

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 2);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        add_input_clause(ctx.borrow(), &lits![1, 2, 3]);
        add_input_clause(ctx.borrow(), &lits![-1, -2, -3]);

        let mut ids = vec![];
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            ids.push(ctx.part(ClauseAllocP).header(cref).id());
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
