//! Simplification using root level units.

use partial_ref::{partial, split_borrow, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::clause::db::filter_clauses;
use crate::clause::ClauseRef;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, ProofP, StatsP,
    TrailP, VariablesP, WatchlistsP,
};
use crate::proof;
use crate::prop::Reason;
use crate::varmap::VarStatus;

/// Turn all root level propagations into unit clauses.
///
/// Every literal propagated at the root level is a consequence of the formula; a unit clause is
/// derived for it (with its reason chain) and the trail entry is removed. Afterwards the trail
/// is empty and the implication graph answers unit reasons for these variables.
pub fn prove_units(
    mut ctx: partial!(
        Context,
        mut ImplGraphP,
        mut ProofP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        AssignmentP,
        ClauseAllocP,
    ),
) -> bool {
    if ctx.part(TrailP).current_level() != 0 || ctx.part(TrailP).trail().is_empty() {
        return false;
    }

    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);

    let trail_lits: Vec<Lit> = ctx.part(TrailP).trail().to_vec();

    for &lit in trail_lits.iter() {
        let reason = *ctx.part(ImplGraphP).reason(lit.var());

        let id = match reason {
            Reason::Unit { id } => id,
            Reason::Decision => unreachable!("decision on the root level"),
            reason => {
                let mut chain: Vec<_> = reason
                    .lits(&lit_ctx)
                    .iter()
                    .filter_map(|other| ctx.part(ProofP).unit_id(other.var()))
                    .collect();
                chain.sort_unstable();
                chain.dedup();
                if let Some(reason_id) = reason.id(&lit_ctx) {
                    chain.push(reason_id);
                }
                let id = proof::add_derived_clause(ctx.borrow(), false, &[lit], &chain);
                ctx.part_mut(StatsP).learned_units += 1;
                id
            }
        };

        ctx.part_mut(ProofP).set_unit_id(lit.var(), id);
        ctx.part_mut(ImplGraphP).update_removed_unit(lit.var(), id);
        ctx.part_mut(VariablesP)
            .set_status(lit.var(), VarStatus::Fixed);
    }

    ctx.part_mut(TrailP).clear();

    !trail_lits.is_empty()
}

/// Remove satisfied clauses and false literals.
pub fn simplify(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP,
        mut WatchlistsP,
        AssignmentP,
        VariablesP,
    ),
) {
    simplify_binaries(ctx.borrow());
    simplify_long_clauses(ctx.borrow());
}

/// Delete all binary clauses that touch a fixed variable.
///
/// Such a clause is always satisfied: if one side is false the other was propagated true. Each
/// clause is reported once, from the side with the smaller literal code.
fn simplify_binaries(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ProofP,
        AssignmentP,
        VariablesP,
    ),
) {
    let mut deletes: Vec<(ClauseId, bool, [Lit; 2])> = vec![];

    {
        let (binary_clauses, ctx) = ctx.split_part_mut(BinaryClausesP);
        let assignment = ctx.part(AssignmentP);

        for code in 0..assignment.assignment().len() * 2 {
            let lit = Lit::from_code(code);
            let this = !lit;
            let keep_this = assignment.lit_value(this).is_none();
            let list = binary_clauses.implied_mut(lit);
            if list.is_empty() {
                continue;
            }
            list.retain(|watch| {
                if watch.garbage {
                    return false;
                }
                let keep = keep_this && assignment.lit_value(watch.other).is_none();
                if !keep && this.code() < watch.other.code() {
                    deletes.push((watch.id, watch.redundant, [this, watch.other]));
                }
                keep
            });
        }

        for &(_, redundant, _) in deletes.iter() {
            binary_clauses.note_removed(redundant);
        }
    }

    for (id, redundant, lits) in deletes {
        proof::delete_clause(ctx.borrow(), id, redundant, &lits);
    }
}

/// Remove satisfied long clauses and strip false literals, shrinking in place.
fn simplify_long_clauses(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP,
        mut WatchlistsP,
        AssignmentP,
        VariablesP,
    ),
) {
    let (assignment, mut ctx) = ctx.split_part(AssignmentP);

    let mut new_lits = vec![];
    let mut deletes: Vec<(ClauseId, bool, Vec<Lit>)> = vec![];
    let mut rewrites: Vec<(ClauseRef, bool, ClauseId, bool, Vec<Lit>, Vec<Lit>)> = vec![];

    filter_clauses(ctx.borrow(), |alloc, cref| {
        let clause = alloc.clause_mut(cref);
        let header = *clause.header();
        new_lits.clear();
        for &lit in clause.lits() {
            match assignment.lit_value(lit) {
                None => new_lits.push(lit),
                Some(true) => {
                    deletes.push((header.id(), header.redundant(), clause.lits().to_vec()));
                    return false;
                }
                Some(false) => (),
            }
        }
        if new_lits.len() < clause.lits().len() {
            let old_lits = clause.lits().to_vec();
            match new_lits[..] {
                // Cannot have empty or unit clauses after full propagation. An empty clause
                // would have been a conflict and a unit clause would have been propagated.
                [] | [_] => unreachable!(),
                [_, _] => {
                    rewrites.push((
                        cref,
                        false,
                        header.id(),
                        header.redundant(),
                        old_lits,
                        new_lits.clone(),
                    ));
                    false
                }
                ref lits => {
                    clause.lits_mut()[..lits.len()].copy_from_slice(lits);
                    let header_mut = clause.header_mut();
                    header_mut.set_len(lits.len());
                    header_mut.set_pos(2);
                    header_mut.set_added(true);
                    rewrites.push((
                        cref,
                        true,
                        header.id(),
                        header.redundant(),
                        old_lits,
                        new_lits.clone(),
                    ));
                    true
                }
            }
        } else {
            true
        }
    });

    for (id, redundant, lits) in deletes {
        proof::delete_clause(ctx.borrow(), id, redundant, &lits);
    }

    for (old_cref, kept_in_place, id, redundant, old_lits, new) in rewrites {
        let mut chain: Vec<_> = old_lits
            .iter()
            .filter(|lit| !new.contains(lit))
            .filter_map(|lit| ctx.part(ProofP).unit_id(lit.var()))
            .collect();
        chain.sort_unstable();
        chain.dedup();
        chain.push(id);

        let new_id = proof::add_derived_clause(ctx.borrow(), redundant, &new, &chain);
        proof::delete_clause(ctx.borrow(), id, redundant, &old_lits);

        if kept_in_place {
            ctx.part_mut(ClauseAllocP).header_mut(old_cref).set_id(new_id);
        } else {
            // The long clause was replaced by a binary; its stale watches must go so the
            // deleted clause cannot take part in later propagations.
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP)
                    .unwatch_clause(old_cref, [old_lits[0], old_lits[1]]);
            }
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([new[0], new[1]], new_id, redundant, false);
        }
    }
}
