//! Blocked clause elimination.
//!
//! A clause C is blocked on one of its literals l when every resolvent of C with a clause
//! containing ¬l is tautological. Removing a blocked clause preserves satisfiability; the
//! witness l goes to the extension stack so the model can be repaired.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use crate::clause::ClauseRef;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, ExtendP, OccurP,
    ProofP, ScheduleP, SolverStateP, StatsP, TrailP, VariablesP, WatchlistsP,
};
use crate::schedule::effort_limit;
use crate::state::SatState;

use super::util::weaken_long;

/// One blocked clause elimination round. Requires active occurrence lists.
pub fn block(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExtendP,
        mut OccurP,
        mut ProofP,
        mut ScheduleP,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    let (enabled, occlim) = {
        let config = ctx.part(ConfigP);
        (config.block != 0, config.blockocclim as usize)
    };
    if !enabled {
        return;
    }
    debug_assert!(ctx.part(OccurP).active());

    let ticks_start = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.block;
    let budget = effort_limit(ticks_start, last, 100);
    ctx.part_mut(ScheduleP).pass_ticks.block = ticks_start;

    let mut spent = 0u64;

    let all_crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).clauses.clone();

    for cref in all_crefs {
        if spent > budget {
            break;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return;
        }

        let lits = {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            let header = clause.header();
            if header.deleted() || header.redundant() {
                continue;
            }
            clause.lits().to_vec()
        };

        for &candidate in lits.iter() {
            // Removing a clause on a frozen literal would not be repairable through the API
            // contract, and assigned literals are left to simplification.
            if ctx.part(VariablesP).is_frozen_internal(candidate.var())
                || ctx.part(AssignmentP).lit_value(candidate).is_some()
            {
                continue;
            }

            let partner_count = ctx.part(OccurP).occs(!candidate).len()
                + ctx.part(BinaryClausesP).occurrence_count(!candidate);
            if partner_count > occlim {
                continue;
            }

            if is_blocked(ctx.borrow(), cref, &lits, candidate, &mut spent) {
                weaken_long(ctx.borrow(), cref, candidate);
                ctx.part_mut(StatsP).blocked += 1;
                break;
            }
        }
    }

    ctx.part_mut(StatsP).ticks += spent;
}

/// Whether all resolvents of the clause on the candidate literal are tautological.
fn is_blocked(
    mut ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        OccurP,
    ),
    cref: ClauseRef,
    lits: &[Lit],
    candidate: Lit,
    spent: &mut u64,
) -> bool {
    let alloc = ctx.part(ClauseAllocP);
    let occur = ctx.part(OccurP);
    let binary_clauses = ctx.part(BinaryClausesP);

    // Collect the resolution partners.
    let mut partners: Vec<Vec<Lit>> = vec![];
    for &other_cref in occur.occs(!candidate) {
        if other_cref == cref {
            continue;
        }
        let clause = alloc.clause(other_cref);
        if clause.header().deleted() || clause.header().redundant() {
            continue;
        }
        partners.push(clause.lits().to_vec());
    }
    for watch in binary_clauses.containing(!candidate) {
        if !watch.garbage && !watch.redundant {
            partners.push(vec![!candidate, watch.other]);
        }
    }

    if partners.is_empty() {
        return true;
    }

    // All resolvents must be tautological on some literal other than the candidate.
    for partner in partners.iter() {
        *spent += 1;
        let tautological = lits.iter().any(|&lit| {
            lit.var() != candidate.var() && partner.contains(&!lit)
        });
        if !tautological {
            return false;
        }
    }

    true
}
