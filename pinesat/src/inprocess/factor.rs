//! Bounded variable addition (factoring).
//!
//! A pair of literals occurring together in many clauses is factored out: a fresh variable `x`
//! is defined as their disjunction and the common pair is replaced by `x` in those clauses.
//! The definition clauses are redundance-based additions, so this pass only runs while no
//! attached tracer demands antecedent chains.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use rustc_hash::FxHashMap;

use crate::clause::ClauseRef;
use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context,
    EvsidsP, ImplGraphP, OccurP, PhasesP, ProofP, ScheduleP, SolverStateP, StatsP, TmpDataP,
    TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::context::ensure_var_count;
use crate::decision;
use crate::schedule::effort_limit;
use crate::varmap::VarStatus;

use super::util::{delete_long, store_derived};

/// One factoring round. Requires active occurrence lists.
pub fn factor(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
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
    let (enabled, effort, factor_min) = {
        let config = ctx.part(ConfigP);
        (config.factor != 0, config.factoreffort, config.factormin as usize)
    };
    if !enabled {
        return;
    }
    // The definition of the fresh variable is not derivable by unit propagation, so formats
    // with antecedent chains cannot express it.
    if ctx.part(ProofP).needs_antecedents() {
        return;
    }
    debug_assert!(ctx.part(OccurP).active());

    let ticks_start = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.factor;
    let budget = effort_limit(ticks_start, last, effort);
    ctx.part_mut(ScheduleP).pass_ticks.factor = ticks_start;

    let mut spent = 0u64;

    // Count co-occurring literal pairs over the irredundant long clauses.
    let mut pair_counts: FxHashMap<(Lit, Lit), usize> = FxHashMap::default();
    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let clause = alloc.clause(cref);
            let header = clause.header();
            if header.deleted() || header.redundant() || clause.lits().len() < 3 {
                continue;
            }
            let lits = clause.lits();
            for i in 0..lits.len() {
                for j in i + 1..lits.len() {
                    spent += 1;
                    let pair = if lits[i].code() < lits[j].code() {
                        (lits[i], lits[j])
                    } else {
                        (lits[j], lits[i])
                    };
                    *pair_counts.entry(pair).or_insert(0) += 1;
                }
            }
            if spent > budget {
                break;
            }
        }
    }

    let mut frequent: Vec<((Lit, Lit), usize)> = pair_counts
        .into_iter()
        .filter(|&(_, count)| count >= factor_min)
        .collect();
    frequent.sort_unstable_by_key(|&((a, b), count)| {
        (std::cmp::Reverse(count), a.code(), b.code())
    });

    let ((a, b), _) = match frequent.first() {
        Some(&found) => found,
        None => {
            ctx.part_mut(StatsP).ticks += spent;
            return;
        }
    };

    // Unused variables can appear in the counted clauses only through stale occurrences.
    if ctx.part(AssignmentP).var_value(a.var()).is_some()
        || ctx.part(AssignmentP).var_value(b.var()).is_some()
    {
        ctx.part_mut(StatsP).ticks += spent;
        return;
    }

    // Introduce x with x <-> (a v b).
    let x_var = ctx.part_mut(VariablesP).alloc_internal();
    ctx.part_mut(VariablesP)
        .set_status(x_var, VarStatus::Active);
    ensure_var_count(ctx.borrow());
    decision::initialize_var(ctx.borrow(), x_var);
    let x = x_var.positive();

    store_derived(ctx.borrow(), false, false, &[!a, x], &[]);
    store_derived(ctx.borrow(), false, false, &[!b, x], &[]);
    store_derived(ctx.borrow(), false, false, &[a, b, !x], &[]);

    // Rewrite the clauses containing both a and b.
    let targets: Vec<ClauseRef> = {
        let alloc = ctx.part(ClauseAllocP);
        ctx.part(OccurP)
            .occs(a)
            .iter()
            .cloned()
            .filter(|&cref| {
                let clause = alloc.clause(cref);
                let header = clause.header();
                !header.deleted()
                    && !header.redundant()
                    && clause.lits().contains(&b)
                    && clause.lits().len() >= 3
            })
            .collect()
    };

    let mut rewritten = 0;
    for cref in targets {
        let old_lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        let mut new_lits: Vec<Lit> = old_lits
            .iter()
            .cloned()
            .filter(|&lit| lit != a && lit != b)
            .collect();
        new_lits.push(x);

        store_derived(ctx.borrow(), false, false, &new_lits, &[]);
        delete_long(ctx.borrow(), cref);
        rewritten += 1;
    }

    if rewritten > 0 {
        ctx.part_mut(StatsP).factored += 1;
    }
    ctx.part_mut(StatsP).ticks += spent;
}
