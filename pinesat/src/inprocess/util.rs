//! Shared helpers for the inprocessing passes.

use partial_ref::{partial, split_borrow, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::clause::{db, ClauseRef};
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, ExtendP, ImplGraphP,
    OccurP, ProofP, SolverStateP, TmpDataP, TrailP, VariablesP, WatchlistsP,
};
use crate::load::{attach_clause, Attached};
use crate::proof;

/// Store a derived clause produced by an inprocessing pass.
///
/// Emits the proof step, attaches the clause and registers it with whichever indexing is
/// active. Returns the id and, for long clauses, the clause reference.
pub fn store_derived(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        ConfigP,
    ),
    redundant: bool,
    hyper: bool,
    lits: &[Lit],
    chain: &[ClauseId],
) -> (ClauseId, Option<ClauseRef>) {
    let id = proof::add_derived_clause(ctx.borrow(), redundant, lits, chain);

    let glue = lits.len();
    match attach_clause(ctx.borrow(), id, redundant, glue, hyper, lits) {
        Attached::Empty => {
            ctx.part_mut(SolverStateP).sat_state = crate::state::SatState::Unsat;
            ctx.part_mut(SolverStateP).formula_unsat = true;
            (id, None)
        }
        Attached::Unit(_) | Attached::Binary(_) => (id, None),
        Attached::Long(cref) => {
            if ctx.part(OccurP).active() {
                let (occur, ctx) = ctx.split_part_mut(OccurP);
                occur.add_clause(cref, ctx.part(ClauseAllocP).clause(cref).lits());
            }
            (id, Some(cref))
        }
    }
}

/// Delete a long clause from the database, the proof and the active indexing.
pub fn delete_long(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut OccurP,
        mut ProofP,
        mut WatchlistsP,
        VariablesP,
    ),
    cref: ClauseRef,
) {
    let (id, redundant, lits) = {
        let clause = ctx.part(ClauseAllocP).clause(cref);
        (
            clause.header().id(),
            clause.header().redundant(),
            clause.lits().to_vec(),
        )
    };
    proof::delete_clause(ctx.borrow(), id, redundant, &lits);
    if ctx.part(OccurP).active() {
        ctx.part_mut(OccurP).remove_clause(cref, &lits);
    }
    if ctx.part(WatchlistsP).enabled() {
        ctx.part_mut(WatchlistsP)
            .unwatch_clause(cref, [lits[0], lits[1]]);
    }
    db::delete_clause(ctx.borrow(), cref);
}

/// Move a long clause to the extension stack instead of deleting it outright.
pub fn weaken_long(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExtendP,
        mut OccurP,
        mut ProofP,
        mut WatchlistsP,
        VariablesP,
    ),
    cref: ClauseRef,
    witness: Lit,
) {
    let (id, lits) = {
        let clause = ctx.part(ClauseAllocP).clause(cref);
        (clause.header().id(), clause.lits().to_vec())
    };
    proof::weaken_clause(ctx.borrow(), id, &lits);

    {
        let (variables, mut ctx) = ctx.split_part(VariablesP);
        let external_witness = variables.external_from_internal_lit(witness);
        let external_clause: Vec<Lit> = lits
            .iter()
            .map(|&lit| variables.external_from_internal_lit(lit))
            .collect();
        ctx.part_mut(ExtendP).push_record(
            &[external_witness],
            id,
            &external_clause,
        );
    }

    if ctx.part(OccurP).active() {
        ctx.part_mut(OccurP).remove_clause(cref, &lits);
    }
    if ctx.part(WatchlistsP).enabled() {
        ctx.part_mut(WatchlistsP)
            .unwatch_clause(cref, [lits[0], lits[1]]);
    }
    db::delete_clause(ctx.borrow(), cref);
}

/// Collect the antecedent chain refuting the negation of a set of literals.
///
/// Seeds the walk with the falsified literals (their negations are on the trail) and an optional
/// conflict clause id, then walks the trail backwards expanding reasons. The result is ordered
/// so that a checker can replay it with plain unit propagation.
pub fn collect_chain(
    mut ctx: partial!(
        Context,
        mut TmpDataP,
        ClauseAllocP,
        ImplGraphP,
        ProofP,
        TrailP,
    ),
    seeds: &[Lit],
    conflict_id: Option<ClauseId>,
) -> Vec<ClauseId> {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let (tmp, ctx) = ctx.split_part_mut(TmpDataP);

    let flags = &mut tmp.flags;
    let mut chain: Vec<(u32, ClauseId)> = vec![];

    if let Some(id) = conflict_id {
        chain.push((u32::max_value(), id));
    }

    let mut flag_count = 0;
    for &lit in seeds {
        if ctx.part(ImplGraphP).level(lit.var()) == 0 {
            if let Some(id) = ctx.part(ProofP).unit_id(lit.var()) {
                chain.push((0, id));
            }
        } else if !flags[lit.index()] {
            flags[lit.index()] = true;
            flag_count += 1;
        }
    }

    for &lit in ctx.part(TrailP).trail().iter().rev() {
        if flag_count == 0 {
            break;
        }
        if !flags[lit.index()] {
            continue;
        }
        flags[lit.index()] = false;
        flag_count -= 1;

        let reason = *ctx.part(ImplGraphP).reason(lit.var());
        if reason.is_decision() {
            continue;
        }
        if let Some(id) = reason.id(&lit_ctx) {
            let depth = ctx.part(ImplGraphP).depth(lit.var()) as u32;
            chain.push((depth + 1, id));
        }
        for &reason_lit in reason.lits(&lit_ctx) {
            if ctx.part(ImplGraphP).level(reason_lit.var()) == 0 {
                if let Some(id) = ctx.part(ProofP).unit_id(reason_lit.var()) {
                    chain.push((0, id));
                }
            } else if !flags[reason_lit.index()] {
                flags[reason_lit.index()] = true;
                flag_count += 1;
            }
        }
    }

    // Clean up any seeds that were never reached on the trail.
    for &lit in seeds {
        flags[lit.index()] = false;
    }

    chain.sort_unstable();
    chain.dedup();
    chain.into_iter().map(|(_, id)| id).collect()
}
