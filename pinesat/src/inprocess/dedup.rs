//! Deduplication of binary clauses.
//!
//! Sorts every implication list, drops duplicated binary clauses, and detects hyper unary
//! resolutions: the pair (a v b) and (a v ¬b) yields the unit a.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::context::{
    AssignmentP, BinaryClausesP, Context, ImplGraphP, ProofP, StatsP, TrailP, VariablesP,
};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::varmap::VarStatus;

/// Deduplicate binary clauses and resolve hyper unary pairs.
///
/// Duplicates appear in both literals' lists; since the lists are sorted with the id as tie
/// break, both sides independently mark the same (higher id) copy, so a single sweep suffices.
pub fn dedup_binaries(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
    ),
) {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let var_count = ctx.part(AssignmentP).assignment().len();

    let mut units: Vec<(Lit, ClauseId, ClauseId)> = vec![];
    let mut duplicate_deletes: Vec<(ClauseId, [Lit; 2])> = vec![];

    {
        let (binary_clauses, ctx) = ctx.split_part_mut(BinaryClausesP);

        for code in 0..var_count * 2 {
            let lit = Lit::from_code(code);
            // Entries at `lit` are clauses (this v other).
            let this = !lit;
            if ctx.part(AssignmentP).lit_value(this).is_some() {
                continue;
            }

            let list = binary_clauses.implied_mut(lit);
            list.sort_unstable_by_key(|watch| (watch.other.code(), watch.id));

            let mut previous: Option<(Lit, ClauseId)> = None;
            for index in 0..list.len() {
                let watch = list[index];
                if watch.garbage {
                    continue;
                }
                match previous {
                    Some((other, _)) if other == watch.other => {
                        // Duplicate of a preceding live entry; report it from one side only.
                        if this.code() < watch.other.code() {
                            duplicate_deletes.push((watch.id, [this, watch.other]));
                        }
                        list[index].garbage = true;
                    }
                    Some((other, first_id)) if other == !watch.other => {
                        // (this v b) and (this v ¬b) resolve to the unit this.
                        units.push((this, first_id, watch.id));
                        previous = Some((watch.other, watch.id));
                    }
                    _ => previous = Some((watch.other, watch.id)),
                }
            }
        }

        for _ in duplicate_deletes.iter() {
            binary_clauses.note_removed(false);
        }
        binary_clauses.flush_garbage();
    }

    for (id, lits) in duplicate_deletes {
        proof::delete_clause(ctx.borrow(), id, false, &lits);
        ctx.part_mut(StatsP).deduplicated += 1;
    }

    units.sort_unstable_by_key(|&(lit, _, _)| lit.code());
    units.dedup_by_key(|&mut (lit, _, _)| lit);

    for (lit, id_a, id_b) in units {
        if ctx.part(AssignmentP).lit_value(lit).is_some() {
            continue;
        }
        let unit_id = proof::add_derived_clause(ctx.borrow(), false, &[lit], &[id_a, id_b]);
        ctx.part_mut(ProofP).set_unit_id(lit.var(), unit_id);
        ctx.part_mut(VariablesP)
            .set_status(lit.var(), VarStatus::Fixed);
        enqueue_assignment(ctx.borrow(), lit, Reason::Unit { id: unit_id });
        ctx.part_mut(StatsP).hyper_unary += 1;
    }
}
