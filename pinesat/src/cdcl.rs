//! Conflict driven clause learning.

use partial_ref::{partial, split_borrow, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::analyze::analyze_conflict;
use crate::clause::{db, ClauseHeader, Tier};
use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, CallbacksP, ClauseAllocP, ClauseDbP, ConfigP,
    Context, EvsidsP, ExtendP, ImplGraphP, IncrementalP, OccurP, PhasesP, ProofP, ScheduleP,
    SolverStateP, StatsP, TmpDataP, TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::decision::make_decision;
use crate::incremental::{
    analyze_assumption_conflict_clause, enqueue_assumption, EnqueueAssumption,
};
use crate::phase::update_target_and_best;
use crate::proof;
use crate::prop::{
    backtrack, enqueue_assignment, enqueue_assignment_at, propagate, Conflict, Reason,
};
use crate::restart::after_conflict;
use crate::simplify::{prove_units, simplify};
use crate::state::SatState;
use crate::varmap::VarStatus;

/// Return type of [`find_conflict`].
enum FoundConflict {
    Conflict(Conflict),
    Assumption,
    /// The solver state was decided as a side effect, e.g. by a falsified external unit.
    Finished,
}

/// Find a conflict, learn a clause and backtrack.
pub fn conflict_step(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut ImplGraphP,
        mut IncrementalP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut ScheduleP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    let conflict = match find_conflict(ctx.borrow()) {
        Ok(()) => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Sat;
            return;
        }
        Err(FoundConflict::Assumption) => {
            ctx.part_mut(SolverStateP).sat_state = SatState::UnsatUnderAssumptions;
            return;
        }
        Err(FoundConflict::Finished) => return,
        Err(FoundConflict::Conflict(conflict)) => conflict,
    };

    ctx.part_mut(StatsP).conflicts += 1;

    let conflict_level = {
        split_borrow!(lit_ctx = &(ClauseAllocP) ctx);

        conflict
            .lits(&lit_ctx)
            .iter()
            .map(|lit| ctx.part(ImplGraphP).level(lit.var()))
            .max()
            .unwrap_or(0)
    };

    if conflict_level == 0 {
        // The conflict does not depend on any decision: the formula is unsatisfiable.
        backtrack(ctx.borrow(), 0);
        analyze_conflict(ctx.borrow(), conflict);
        let (analyze, mut ctx) = ctx.split_part(AnalyzeConflictP);
        let id = proof::add_derived_clause(ctx.borrow(), false, &[], analyze.chain());
        proof::begin_unsat_proof(ctx.borrow(), id);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        ctx.part_mut(SolverStateP).formula_unsat = true;
        return;
    }

    if conflict_level < ctx.part(TrailP).current_level() {
        // An out-of-order conflict; drop the levels that don't take part in it.
        backtrack(ctx.borrow(), conflict_level);
    }

    let assumption_levels = ctx.part(IncrementalP).assumption_levels();
    if assumption_levels > 0 && conflict_level <= assumption_levels {
        // The conflict only involves assumption levels, so there is nothing to learn; the
        // assumptions themselves are incompatible.
        analyze_assumption_conflict_clause(ctx.borrow(), conflict);
        ctx.part_mut(SolverStateP).sat_state = SatState::UnsatUnderAssumptions;
        return;
    }

    let backtrack_to = analyze_conflict(ctx.borrow(), conflict);

    bump_involved(ctx.borrow());

    if ctx.part(ConfigP).otfs != 0 {
        subsume_involved(ctx.borrow());
    }

    let glue = ctx.part(AnalyzeConflictP).glue();
    after_conflict(ctx.borrow(), glue);

    // Chronological backtracking: when the backjump would be very long, only undo the conflicting
    // level and enqueue the asserting literal out of order.
    let current_level = ctx.part(TrailP).current_level();
    let config = ctx.part(ConfigP);
    let jump_to = if config.chrono != 0
        && current_level - backtrack_to >= config.chronolevels as usize
        && backtrack_to > assumption_levels
    {
        current_level - 1
    } else {
        backtrack_to
    };

    backtrack(ctx.borrow(), jump_to);

    learn_clause(ctx.borrow(), backtrack_to);
}

/// Increment the usage counters of the clauses involved in the conflict.
fn bump_involved(
    mut ctx: partial!(Context, mut ClauseAllocP, AnalyzeConflictP),
) {
    let (analyze, mut ctx) = ctx.split_part(AnalyzeConflictP);
    for &cref in analyze.involved() {
        ctx.part_mut(ClauseAllocP).header_mut(cref).bump_used();
    }
}

/// On-the-fly subsumption: delete involved clauses that the learned clause subsumes.
fn subsume_involved(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP,
        mut StatsP,
        mut TmpDataP,
        mut WatchlistsP,
        AnalyzeConflictP,
        AssignmentP,
        ImplGraphP,
        VariablesP,
    ),
) {
    let learned_len = ctx.part(AnalyzeConflictP).clause().len();
    if learned_len == 0 {
        return;
    }

    // Mark the learned literals.
    {
        let (tmp, ctx) = ctx.split_part_mut(TmpDataP);
        for &lit in ctx.part(AnalyzeConflictP).clause() {
            tmp.flags[lit.code()] = true;
        }
    }

    let mut subsumed = vec![];
    {
        let (analyze, ctx) = ctx.split_part(AnalyzeConflictP);
        let alloc = ctx.part(ClauseAllocP);
        let tmp = ctx.part(TmpDataP);
        let assignment = ctx.part(AssignmentP);
        let impl_graph = ctx.part(ImplGraphP);

        for &cref in analyze.involved() {
            let clause = alloc.clause(cref);
            let header = clause.header();
            if header.deleted() || clause.lits().len() <= learned_len {
                continue;
            }
            // Keep clauses that are currently a reason on the trail.
            let first = clause.lits()[0];
            if assignment.lit_is_true(first)
                && impl_graph.reason(first.var()) == &Reason::Long(cref)
            {
                continue;
            }
            let marked = clause
                .lits()
                .iter()
                .filter(|lit| tmp.flags[lit.code()])
                .count();
            if marked == learned_len {
                subsumed.push(cref);
            }
        }
    }

    subsumed.dedup();
    for cref in subsumed {
        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }
        let (id, redundant, lits) = {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            (
                clause.header().id(),
                clause.header().redundant(),
                clause.lits().to_vec(),
            )
        };
        proof::delete_clause(ctx.borrow(), id, redundant, &lits);
        if ctx.part(WatchlistsP).enabled() {
            ctx.part_mut(WatchlistsP)
                .unwatch_clause(cref, [lits[0], lits[1]]);
        }
        db::delete_clause(ctx.borrow(), cref);
        ctx.part_mut(StatsP).otf_subsumed += 1;
    }

    // Clear the marks.
    let (tmp, ctx) = ctx.split_part_mut(TmpDataP);
    for &lit in ctx.part(AnalyzeConflictP).clause() {
        tmp.flags[lit.code()] = false;
    }
}

/// Attach the learned clause and enqueue its asserting literal.
fn learn_clause(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        AnalyzeConflictP,
        ConfigP,
    ),
    backtrack_to: usize,
) {
    let (analyze, mut ctx) = ctx.split_part(AnalyzeConflictP);
    let clause = analyze.clause();
    let glue = analyze.glue();

    debug_assert!(glue <= clause.len().max(1));

    let redundant = clause.len() > 2;
    let id = proof::add_derived_clause(ctx.borrow(), redundant, clause, analyze.chain());

    let reason = match clause.len() {
        0 => unreachable!("empty learned clauses are handled by the conflict level check"),
        1 => {
            ctx.part_mut(ProofP).set_unit_id(clause[0].var(), id);
            ctx.part_mut(VariablesP)
                .set_status(clause[0].var(), VarStatus::Fixed);
            ctx.part_mut(StatsP).learned_units += 1;
            Reason::Unit { id }
        }
        2 => {
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([clause[0], clause[1]], id, false, false);
            ctx.part_mut(StatsP).learned_binary += 1;
            Reason::Binary {
                other: [clause[1]],
                id,
            }
        }
        _ => {
            let mut header = ClauseHeader::new();
            header.set_id(id);
            header.set_glue(glue);
            let config = ctx.part(ConfigP);
            header.set_tier(Tier::for_glue(
                glue,
                config.tier1glue as usize,
                config.tier2glue as usize,
            ));
            let cref = db::add_clause(ctx.borrow(), header, clause);
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP)
                    .watch_clause(cref, [clause[0], clause[1]]);
            }
            ctx.part_mut(StatsP).learned_long += 1;
            Reason::Long(cref)
        }
    };

    enqueue_assignment_at(ctx.borrow(), clause[0], reason, backtrack_to);
}

/// Find a conflict.
///
/// Returns `Err` if a conflict was found and `Ok` if a satisfying assignment was found instead.
fn find_conflict(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut ImplGraphP,
        mut IncrementalP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut ScheduleP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) -> Result<(), FoundConflict> {
    loop {
        let propagation_result = propagate(ctx.borrow());

        if has_propagator(ctx.borrow()) {
            materialize_external_reasons(ctx.borrow());
        }

        let new_unit = prove_units(ctx.borrow());

        if let Err(conflict) = propagation_result {
            return Err(FoundConflict::Conflict(conflict));
        }

        if new_unit {
            simplify(ctx.borrow());
        }

        if has_propagator(ctx.borrow()) {
            match external_propagate(ctx.borrow()) {
                Ok(true) => {
                    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
                        return Err(FoundConflict::Finished);
                    }
                    continue;
                }
                Ok(false) => (),
                Err(conflict) => return Err(FoundConflict::Conflict(conflict)),
            }

            if let Some(level) = ctx.part_mut(CallbacksP).requested_backtrack.take() {
                if level < ctx.part(TrailP).current_level() {
                    backtrack(ctx.borrow(), level);
                    continue;
                }
            }
        }

        match enqueue_assumption(ctx.borrow()) {
            EnqueueAssumption::Enqueued => continue,
            EnqueueAssumption::Conflict => return Err(FoundConflict::Assumption),
            EnqueueAssumption::Done => (),
        }

        let stable = ctx.part(ScheduleP).stable;
        update_target_and_best(ctx.borrow(), stable);

        if !make_decision(ctx.borrow()) {
            if !check_external_model(ctx.borrow()) {
                continue;
            }
            return Ok(());
        }
    }
}

fn has_propagator(ctx: partial!(Context, CallbacksP)) -> bool {
    ctx.part(CallbacksP).propagator.is_some()
}

/// Pull propagations out of the external propagator.
///
/// Returns whether any assignment was enqueued. An externally propagated literal that is already
/// false has its explanation materialized, which produces the conflict returned as `Err`.
fn external_propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ProofP,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) -> Result<bool, Conflict> {
    let mut enqueued = false;

    loop {
        let external = {
            let callbacks = ctx.part_mut(CallbacksP);
            match callbacks.propagator.as_mut().and_then(|p| p.cb_propagate()) {
                Some(external) => external,
                None => break,
            }
        };

        let internal = match ctx.part(VariablesP).internal_from_external_lit(external) {
            Some(internal) => internal,
            None => continue,
        };

        match ctx.part(AssignmentP).lit_value(internal) {
            None => {
                enqueue_assignment(ctx.borrow(), internal, Reason::External);
                enqueued = true;
            }
            Some(true) => (),
            Some(false) => {
                // The explanation of this propagation is falsified.
                if let Some(conflict) = materialize_reason(ctx.borrow(), internal, true)? {
                    return Err(conflict);
                }
                enqueued = true;
            }
        }
    }

    Ok(enqueued)
}

/// Replace all `External` reasons on the trail by materialized clauses.
fn materialize_external_reasons(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ProofP,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    let mut external_reasons = vec![];
    {
        let trail = ctx.part(TrailP);
        let impl_graph = ctx.part(ImplGraphP);
        for &lit in trail.trail() {
            if matches!(impl_graph.reason(lit.var()), Reason::External) {
                external_reasons.push(lit);
            }
        }
    }

    for lit in external_reasons {
        // The result is only a conflict for falsified literals, which these are not.
        let _ = materialize_reason(ctx.borrow(), lit, false);
    }
}

/// Pull the reason clause for an external propagation and attach it.
///
/// For a true literal the reason replaces the `External` marker in the implication graph. For a
/// falsified literal (`conflicting`) the materialized clause is the returned conflict; unit
/// explanations are resolved by backtracking to the root instead.
fn materialize_reason(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ProofP,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
    lit: Lit,
    conflicting: bool,
) -> Result<Option<Conflict>, Conflict> {
    let external_lit = ctx.part(VariablesP).external_from_internal_lit(lit);

    let mut lits = vec![];
    loop {
        let next = {
            let callbacks = ctx.part_mut(CallbacksP);
            callbacks
                .propagator
                .as_mut()
                .and_then(|p| p.cb_add_reason_clause_lit(external_lit))
        };
        match next {
            Some(external) => {
                let internal_var = ctx.part_mut(VariablesP).alloc_external(external.var());
                lits.push(internal_var.lit(external.is_positive()));
            }
            None => break,
        }
    }

    // The propagated literal leads the clause, the remaining literals are ordered by decreasing
    // decision level to satisfy the watch invariants.
    if let Some(position) = lits.iter().position(|&l| l == lit) {
        lits.swap(0, position);
    } else {
        lits.insert(0, lit);
    }
    {
        let impl_graph = ctx.part(ImplGraphP);
        lits[1..].sort_by_key(|l| std::cmp::Reverse(impl_graph.level(l.var())));
    }

    let id = proof::add_original_clause(ctx.borrow(), &lits, false);

    match lits.len() {
        1 => {
            if conflicting {
                // A falsified external unit: undo everything and assert it at the root.
                handle_external_unit(ctx.borrow(), lits[0], id);
                return Ok(None);
            }
            ctx.part_mut(ImplGraphP).update_removed_unit(lit.var(), id);
            Ok(None)
        }
        2 => {
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([lits[0], lits[1]], id, true, false);
            if conflicting {
                return Ok(Some(Conflict::Binary([lits[0], lits[1]], id)));
            }
            ctx.part_mut(ImplGraphP).update_reason(
                lit.var(),
                Reason::Binary {
                    other: [lits[1]],
                    id,
                },
            );
            Ok(None)
        }
        _ => {
            let mut header = ClauseHeader::new();
            header.set_id(id);
            header.set_glue(lits.len());
            header.set_tier(Tier::Mid);
            let cref = db::add_clause(ctx.borrow(), header, &lits);
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP)
                    .watch_clause(cref, [lits[0], lits[1]]);
            }
            if conflicting {
                return Ok(Some(Conflict::Long(cref)));
            }
            ctx.part_mut(ImplGraphP)
                .update_reason(lit.var(), Reason::Long(cref));
            Ok(None)
        }
    }
}

/// Undo everything for a falsified external unit, then either enqueue it at the root or derive
/// the empty clause.
fn handle_external_unit(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
    ),
    lit: Lit,
    id: ClauseId,
) {
    backtrack(ctx.borrow(), 0);

    if ctx.part(AssignmentP).lit_is_false(lit) {
        // Still false at the root: the unit contradicts a fixed assignment.
        let unit_id = ctx.part(ProofP).unit_id(lit.var());
        let chain: Vec<ClauseId> = unit_id.iter().cloned().chain(Some(id)).collect();
        let empty_id = proof::add_derived_clause(ctx.borrow(), false, &[], &chain);
        proof::begin_unsat_proof(ctx.borrow(), empty_id);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        ctx.part_mut(SolverStateP).formula_unsat = true;
    } else if ctx.part(AssignmentP).lit_value(lit).is_none() {
        ctx.part_mut(ProofP).set_unit_id(lit.var(), id);
        ctx.part_mut(VariablesP)
            .set_status(lit.var(), VarStatus::Fixed);
        enqueue_assignment(ctx.borrow(), lit, Reason::Unit { id });
    }
}

/// Let the external propagator check a full assignment.
///
/// Returns true when the model is accepted (or no propagator is attached).
fn check_external_model(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
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
) -> bool {
    if !has_propagator(ctx.borrow()) {
        return true;
    }

    let model: Vec<Lit> = {
        let variables = ctx.part(VariablesP);
        let assignment = ctx.part(AssignmentP);
        (0..assignment.assignment().len())
            .filter_map(|index| {
                let var = pinesat_formula::Var::from_index(index);
                let value = assignment.var_value(var)?;
                let external = variables.external_from_internal(var)?;
                Some(external.lit(value))
            })
            .collect()
    };

    let accepted = {
        let callbacks = ctx.part_mut(CallbacksP);
        match callbacks.propagator.as_mut() {
            Some(propagator) => propagator.cb_check_found_model(&model),
            None => true,
        }
    };

    if accepted {
        return true;
    }

    // Pull a clause ruling this model out, if the propagator has one.
    let has_clause = {
        let callbacks = ctx.part_mut(CallbacksP);
        callbacks
            .propagator
            .as_mut()
            .map(|p| p.cb_has_external_clause())
            .unwrap_or(false)
    };
    if !has_clause {
        return true;
    }

    let mut external_lits = vec![];
    loop {
        let next = {
            let callbacks = ctx.part_mut(CallbacksP);
            callbacks
                .propagator
                .as_mut()
                .and_then(|p| p.cb_add_external_clause_lit())
        };
        match next {
            Some(lit) => external_lits.push(lit),
            None => break,
        }
    }

    // Added like an input clause: undo all decisions first.
    crate::load::add_input_clause(ctx.borrow(), &external_lits);
    false
}
