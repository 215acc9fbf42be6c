//! Ternary resolution.
//!
//! Resolves pairs of three-literal clauses, keeping resolvents that are again binary or ternary.
//! The resolvents are redundant hyper clauses and subject to aggressive reduction.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use rustc_hash::FxHashSet;

use crate::clause::ClauseRef;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, ImplGraphP, OccurP,
    ProofP, ScheduleP, SolverStateP, StatsP, TrailP, VariablesP, WatchlistsP,
};
use crate::schedule::effort_limit;
use crate::state::SatState;

use super::util::store_derived;

/// One ternary resolution round over the current formula.
pub fn ternary(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
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
    let config = ctx.part(ConfigP);
    if config.ternary == 0 {
        return;
    }

    let ticks = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.ternary;
    let initial_budget = effort_limit(ticks, last, config.ternaryeffort) as i64;
    let mut budget = initial_budget;
    ctx.part_mut(ScheduleP).pass_ticks.ternary = ticks;

    let var_count = ctx.part(AssignmentP).assignment().len();

    // Occurrence lists over the ternary clauses only.
    let mut by_lit: Vec<Vec<ClauseRef>> = vec![vec![]; var_count * 2];
    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let clause = alloc.clause(cref);
            if clause.header().deleted() || clause.lits().len() != 3 {
                continue;
            }
            for &lit in clause.lits() {
                by_lit[lit.code()].push(cref);
            }
        }
    }

    // Known binary and ternary clauses, to avoid re-deriving what is already present.
    let mut seen: FxHashSet<Vec<Lit>> = FxHashSet::default();
    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let clause = alloc.clause(cref);
            if !clause.header().deleted() && clause.lits().len() == 3 {
                let mut key = clause.lits().to_vec();
                key.sort_unstable();
                seen.insert(key);
            }
        }
        let binary_clauses = ctx.part(BinaryClausesP);
        for code in 0..var_count * 2 {
            let lit = Lit::from_code(code);
            for watch in binary_clauses.containing(lit) {
                if !watch.garbage {
                    let mut key = vec![lit, watch.other];
                    key.sort_unstable();
                    seen.insert(key);
                }
            }
        }
    }

    let mut new_clauses: Vec<(Vec<Lit>, u64, u64)> = vec![];

    'pivots: for index in 0..var_count {
        let pivot = pinesat_formula::Var::from_index(index);
        if ctx.part(AssignmentP).var_value(pivot).is_some()
            || !ctx.part(VariablesP).is_active(pivot)
        {
            continue;
        }

        let positives = by_lit[pivot.positive().code()].clone();
        let negatives = by_lit[pivot.negative().code()].clone();

        for &c_ref in positives.iter() {
            for &d_ref in negatives.iter() {
                budget -= 1;
                if budget < 0 {
                    break 'pivots;
                }

                let (resolvent, c_id, d_id) = {
                    let alloc = ctx.part(ClauseAllocP);
                    let c = alloc.clause(c_ref);
                    let d = alloc.clause(d_ref);
                    if c.header().deleted() || d.header().deleted() {
                        continue;
                    }
                    let mut resolvent: Vec<Lit> = c
                        .lits()
                        .iter()
                        .chain(d.lits().iter())
                        .cloned()
                        .filter(|lit| lit.var() != pivot)
                        .collect();
                    resolvent.sort_unstable();
                    resolvent.dedup();
                    (resolvent, c.header().id(), d.header().id())
                };

                if resolvent.len() > 3 {
                    continue;
                }
                if resolvent
                    .windows(2)
                    .any(|pair| pair[0] == !pair[1])
                {
                    continue;
                }
                if !seen.insert(resolvent.clone()) {
                    continue;
                }

                new_clauses.push((resolvent, c_id, d_id));
            }
        }
    }

    for (lits, c_id, d_id) in new_clauses {
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            break;
        }
        store_derived(ctx.borrow(), true, true, &lits, &[c_id, d_id]);
        ctx.part_mut(StatsP).ternary_resolvents += 1;
    }

    ctx.part_mut(StatsP).ticks += (initial_budget - budget).max(0) as u64;
}
