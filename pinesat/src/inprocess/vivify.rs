//! Clause vivification.
//!
//! The literals of a candidate clause are decided negated one by one, with propagation in
//! between. When propagation derives a conflict or assigns one of the clause's literals before
//! all of them were assumed, the clause can be strengthened or is outright implied by the rest
//! of the formula. The decision prefix is shared between candidates with a common literal
//! prefix, counted as reused.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use crate::clause::{ClauseRef, Tier};
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ImplGraphP,
    OccurP, PhasesP, ProofP, ScheduleP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP,
    VmtfP, WatchlistsP,
};
use crate::prop::{backtrack, enable_watchlists, enqueue_assignment, propagate, Reason};
use crate::schedule::effort_limit;
use crate::state::SatState;

use super::util::{collect_chain, delete_long, store_derived};

/// One vivification round.
///
/// Irredundant clauses are always candidates; of the redundant clauses one retention tier is
/// scheduled per round, rotating between core, mid and local.
pub fn vivify(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
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
    let config = ctx.part(ConfigP);
    if config.vivify == 0 {
        return;
    }

    let ticks_start = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.vivify;
    let budget = effort_limit(ticks_start, last, config.vivifyeffort);
    ctx.part_mut(ScheduleP).pass_ticks.vivify = ticks_start;

    enable_watchlists(ctx.borrow());

    let redundant_tier = match ctx.part(ScheduleP).inprocess_count % 3 {
        0 => Tier::Core,
        1 => Tier::Mid,
        _ => Tier::Local,
    };

    // Candidate collection: rescheduled (added) clauses first, then by length.
    let mut candidates: Vec<(bool, usize, ClauseRef)> = vec![];
    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let header = alloc.header(cref);
            if header.deleted() {
                continue;
            }
            let eligible = header.tier() == Tier::Irred || header.tier() == redundant_tier;
            if eligible {
                candidates.push((!header.added(), header.len(), cref));
            }
        }
    }
    candidates.sort_unstable_by_key(|&(not_added, len, _)| (not_added, len));

    for (_, _, cref) in candidates {
        if ctx.part(StatsP).ticks.saturating_sub(ticks_start) > budget {
            break;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            break;
        }

        vivify_clause(ctx.borrow(), cref);
    }

    backtrack(ctx.borrow(), 0);
}

fn vivify_clause(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
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
        ConfigP,
    ),
    cref: ClauseRef,
) {
    let (lits, id, redundant) = {
        let clause = ctx.part(ClauseAllocP).clause(cref);
        let header = clause.header();
        if header.deleted() {
            return;
        }
        (
            clause.lits().to_vec(),
            header.id(),
            header.redundant(),
        )
    };

    // Clauses satisfied at the root are handled by simplification.
    if lits
        .iter()
        .any(|&lit| ctx.part(ImplGraphP).level(lit.var()) == 0
            && ctx.part(AssignmentP).lit_value(lit) == Some(true))
    {
        return;
    }

    // Reuse the decision prefix shared with the previous candidate.
    let mut reuse = 0;
    {
        let trail = ctx.part(TrailP);
        for (index, &lit) in lits.iter().enumerate() {
            match trail.control().get(index + 1) {
                Some(frame) if frame.decision == Some(!lit) => reuse = index + 1,
                _ => break,
            }
        }
    }
    if reuse > 0 {
        ctx.part_mut(StatsP).vivify_reused_prefix += 1;
    }
    backtrack(ctx.borrow(), reuse);

    let mut decided = reuse;

    for position in reuse..lits.len() {
        let lit = lits[position];

        match ctx.part(AssignmentP).lit_value(lit) {
            Some(true) => {
                // The remaining literals are implied: strengthen to the decided prefix plus
                // this literal.
                let mut new_lits: Vec<Lit> = lits[..decided].to_vec();
                new_lits.push(lit);
                if new_lits.len() < lits.len() {
                    let chain = collect_chain(ctx.borrow(), &[lit], None);
                    strengthen(ctx.borrow(), cref, redundant, &new_lits, &chain);
                }
                return;
            }
            Some(false) => {
                if ctx.part(ImplGraphP).level(lit.var()) == 0 && decided == 0 {
                    // Removed by root simplification instead.
                    return;
                }
                // The literal is falsified by the other assumptions: drop it.
                let new_lits: Vec<Lit> = lits
                    .iter()
                    .cloned()
                    .filter(|&other| other != lit)
                    .collect();
                let mut chain = collect_chain(ctx.borrow(), &[!lit], None);
                chain.push(id);
                strengthen(ctx.borrow(), cref, redundant, &new_lits, &chain);
                return;
            }
            None => {
                ctx.part_mut(TrailP).new_decision_level(Some(!lit));
                enqueue_assignment(ctx.borrow(), !lit, Reason::Decision);
                decided = position + 1;

                if let Err(conflict) = propagate(ctx.borrow()) {
                    let (seeds, conflict_id) = {
                        use partial_ref::split_borrow;
                        split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
                        let seeds: Vec<Lit> = conflict.lits(&lit_ctx).to_vec();
                        (seeds, conflict.id(&lit_ctx))
                    };

                    if decided < lits.len() {
                        // Assuming a strict prefix already conflicts.
                        let new_lits: Vec<Lit> = lits[..decided].to_vec();
                        let chain = collect_chain(ctx.borrow(), &seeds, Some(conflict_id));
                        strengthen(ctx.borrow(), cref, redundant, &new_lits, &chain);
                    } else {
                        // All literals assumed and the rest of the formula conflicts: the
                        // clause is implied and can be dropped entirely.
                        backtrack(ctx.borrow(), 0);
                        delete_long(ctx.borrow(), cref);
                        ctx.part_mut(StatsP).vivified_subsumed += 1;
                    }
                    return;
                }
            }
        }
    }
}

/// Replace a clause by a stronger one, as an add-then-delete pair on the proof.
fn strengthen(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut OccurP,
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
    cref: ClauseRef,
    redundant: bool,
    new_lits: &[Lit],
    chain: &[pinesat_proof::ClauseId],
) {
    // Attach at the root so that the new clause's watches start out intact (and a unit can be
    // enqueued).
    backtrack(ctx.borrow(), 0);

    store_derived(ctx.borrow(), redundant, false, new_lits, chain);

    delete_long(ctx.borrow(), cref);

    ctx.part_mut(StatsP).vivified_strengthened += 1;
}
