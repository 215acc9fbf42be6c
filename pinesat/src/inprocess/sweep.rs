//! Backbone and equivalence sweeping.
//!
//! A neighborhood of a target variable is embedded into a small sub-solver. Any literal that is
//! false in no model of the embedded clauses (queried through the sub-solver) is a backbone
//! literal of the environment; since the environment is a subset of the formula, it is implied
//! by the formula as well. Pairs of environment variables that cannot differ are merged as
//! equivalences. Depth, variable and clause limits grow with the number of completed sweeps.
//!
//! Conclusions of the sub-solver search are not unit propagation derivable, so this pass only
//! runs while no proof tracer is attached.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use rustc_hash::FxHashMap;

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ExtendP,
    ImplGraphP, OccurP, ProofP, ScheduleP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP,
    VmtfP, WatchlistsP,
};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::schedule::effort_limit;
use crate::state::SatState;
use crate::varmap::VarStatus;

use super::decompose::decompose;
use super::util::store_derived;

/// A miniature solver for environment queries.
///
/// Plain DPLL with unit propagation and a conflict budget; complete enough to answer
/// satisfiability of the small embedded neighborhoods and cheap enough to be called per
/// candidate literal.
pub struct Kernel {
    clauses: Vec<Vec<Lit>>,
    var_count: usize,
    conflict_budget: usize,
}

impl Kernel {
    pub fn new(clauses: Vec<Vec<Lit>>, var_count: usize) -> Kernel {
        Kernel {
            clauses,
            var_count,
            conflict_budget: 10_000,
        }
    }

    /// Decide satisfiability of the environment under the given assumptions.
    ///
    /// Returns `None` when the budget ran out.
    pub fn solve(&mut self, assumptions: &[Lit]) -> Option<bool> {
        let mut assignment: Vec<Option<bool>> = vec![None; self.var_count];
        for &lit in assumptions {
            match assignment[lit.index()] {
                Some(value) if value != lit.is_positive() => return Some(false),
                _ => assignment[lit.index()] = Some(lit.is_positive()),
            }
        }
        let mut budget = self.conflict_budget;
        let result = Self::search(&self.clauses, &mut assignment, &mut budget);
        self.conflict_budget = budget;
        result
    }

    fn search(
        clauses: &[Vec<Lit>],
        assignment: &mut Vec<Option<bool>>,
        budget: &mut usize,
    ) -> Option<bool> {
        if *budget == 0 {
            return None;
        }
        *budget -= 1;

        // Unit propagation to fixpoint.
        let mut changed = true;
        while changed {
            changed = false;
            for clause in clauses {
                let mut unassigned = None;
                let mut unassigned_count = 0;
                let mut satisfied = false;
                for &lit in clause {
                    match assignment[lit.index()] {
                        None => {
                            unassigned = Some(lit);
                            unassigned_count += 1;
                        }
                        Some(value) => {
                            if value == lit.is_positive() {
                                satisfied = true;
                                break;
                            }
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                match unassigned_count {
                    0 => return Some(false),
                    1 => {
                        let lit = unassigned.expect("counted unassigned literal");
                        assignment[lit.index()] = Some(lit.is_positive());
                        changed = true;
                    }
                    _ => (),
                }
            }
        }

        let next = match assignment.iter().position(|value| value.is_none()) {
            Some(index) => index,
            None => return Some(true),
        };

        let saved = assignment.clone();
        for &value in [true, false].iter() {
            assignment[next] = Some(value);
            match Self::search(clauses, assignment, budget) {
                Some(true) => return Some(true),
                Some(false) => *assignment = saved.clone(),
                None => return None,
            }
        }
        Some(false)
    }
}

/// One sweeping round.
pub fn sweep(
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
    let (enabled, effort, base_vars, base_clauses, base_depth) = {
        let config = ctx.part(ConfigP);
        (
            config.sweep != 0,
            config.sweepeffort,
            config.sweepvars as usize,
            config.sweepclauses as usize,
            config.sweepdepth as usize,
        )
    };
    if !enabled {
        return;
    }
    // Sub-solver conclusions have no unit propagation justification.
    if ctx.part(ProofP).is_active() {
        return;
    }
    debug_assert!(ctx.part(OccurP).active());

    let ticks_start = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.sweep;
    let budget = effort_limit(ticks_start, last, effort);
    ctx.part_mut(ScheduleP).pass_ticks.sweep = ticks_start;

    // Limits grow with each completed sweep.
    let completions = ctx.part(ScheduleP).sweep_completions;
    let growth = 1 + completions.min(8) as usize;
    let max_vars = base_vars * growth;
    let max_clauses = base_clauses * growth;
    let max_depth = base_depth + completions.min(8) as usize;

    let var_count = ctx.part(AssignmentP).assignment().len();

    let mut spent = 0u64;
    let mut merged_any = false;

    for index in 0..var_count {
        if spent > budget {
            break;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return;
        }

        let target = Var::from_index(index);
        if !ctx.part(VariablesP).is_active(target)
            || ctx.part(AssignmentP).var_value(target).is_some()
        {
            continue;
        }

        let (env_vars, env_clauses) =
            collect_environment(ctx.borrow(), target, max_vars, max_clauses, max_depth, &mut spent);

        if env_clauses.is_empty() {
            continue;
        }

        // Remap to dense kernel variables.
        let mut dense: FxHashMap<Var, usize> = FxHashMap::default();
        for &var in env_vars.iter() {
            let next = dense.len();
            dense.insert(var, next);
        }
        let kernel_clauses: Vec<Vec<Lit>> = env_clauses
            .iter()
            .map(|clause| {
                clause
                    .iter()
                    .map(|lit| Lit::from_index(dense[&lit.var()], lit.is_positive()))
                    .collect()
            })
            .collect();
        let mut kernel = Kernel::new(kernel_clauses, dense.len());

        // Backbone check for the target variable.
        let target_kernel = Lit::from_index(dense[&target], true);
        let mut backbone = None;
        match kernel.solve(&[target_kernel]) {
            Some(false) => backbone = Some(target.negative()),
            Some(true) => {
                if kernel.solve(&[!target_kernel]) == Some(false) {
                    backbone = Some(target.positive());
                }
            }
            None => continue,
        }

        spent += 100;

        if let Some(unit) = backbone {
            let unit_id = proof::add_derived_clause(ctx.borrow(), false, &[unit], &[]);
            ctx.part_mut(ProofP).set_unit_id(unit.var(), unit_id);
            ctx.part_mut(VariablesP)
                .set_status(unit.var(), VarStatus::Fixed);
            enqueue_assignment(ctx.borrow(), unit, Reason::Unit { id: unit_id });
            ctx.part_mut(StatsP).swept_backbones += 1;
            continue;
        }

        // Equivalence candidates: the environment variables adjacent to the target.
        for &other in env_vars.iter().take(8) {
            if other == target || ctx.part(AssignmentP).var_value(other).is_some() {
                continue;
            }
            if !ctx.part(VariablesP).is_active(other) {
                continue;
            }
            spent += 100;

            let other_kernel = Lit::from_index(dense[&other], true);
            let differ_a = kernel.solve(&[target_kernel, !other_kernel]);
            let differ_b = kernel.solve(&[!target_kernel, other_kernel]);
            if differ_a == Some(false) && differ_b == Some(false) {
                store_derived(
                    ctx.borrow(),
                    false,
                    false,
                    &[!target.positive(), other.positive()],
                    &[],
                );
                store_derived(
                    ctx.borrow(),
                    false,
                    false,
                    &[target.positive(), !other.positive()],
                    &[],
                );
                ctx.part_mut(StatsP).swept_equivalences += 1;
                merged_any = true;
                break;
            }
        }
    }

    if merged_any {
        // The new equivalence binaries are substituted away right here.
        decompose(ctx.borrow());
    }

    ctx.part_mut(ScheduleP).sweep_completions += 1;
    ctx.part_mut(StatsP).ticks += spent;
}

/// Collect the clause neighborhood of a variable, breadth first up to the given limits.
fn collect_environment(
    mut ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        OccurP,
    ),
    target: Var,
    max_vars: usize,
    max_clauses: usize,
    max_depth: usize,
    spent: &mut u64,
) -> (Vec<Var>, Vec<Vec<Lit>>) {
    let alloc = ctx.part(ClauseAllocP);
    let occur = ctx.part(OccurP);
    let binary_clauses = ctx.part(BinaryClausesP);
    let assignment = ctx.part(AssignmentP);

    let mut env_vars = vec![target];
    let mut frontier = vec![target];
    let mut depth = 0;

    while depth < max_depth && env_vars.len() < max_vars {
        let mut next_frontier = vec![];
        for &var in frontier.iter() {
            for &polarity in [var.positive(), var.negative()].iter() {
                for &cref in occur.occs(polarity) {
                    *spent += 1;
                    let clause = alloc.clause(cref);
                    if clause.header().deleted() || clause.header().redundant() {
                        continue;
                    }
                    for &lit in clause.lits() {
                        if !env_vars.contains(&lit.var()) && env_vars.len() < max_vars {
                            env_vars.push(lit.var());
                            next_frontier.push(lit.var());
                        }
                    }
                }
                for watch in binary_clauses.containing(polarity) {
                    *spent += 1;
                    if watch.garbage {
                        continue;
                    }
                    let other = watch.other.var();
                    if !env_vars.contains(&other) && env_vars.len() < max_vars {
                        env_vars.push(other);
                        next_frontier.push(other);
                    }
                }
            }
        }
        frontier = next_frontier;
        depth += 1;
    }

    // Collect the clauses fully contained in the environment.
    let mut clauses = vec![];
    for &var in env_vars.iter() {
        for &polarity in [var.positive(), var.negative()].iter() {
            for &cref in occur.occs(polarity) {
                *spent += 1;
                if clauses.len() >= max_clauses {
                    return (env_vars, clauses);
                }
                let clause = alloc.clause(cref);
                if clause.header().deleted() || clause.header().redundant() {
                    continue;
                }
                // Only from the first literal, to collect each clause once.
                if clause.lits()[0] != polarity {
                    continue;
                }
                if clause
                    .lits()
                    .iter()
                    .all(|lit| env_vars.contains(&lit.var()))
                {
                    clauses.push(clause.lits().to_vec());
                }
            }
            for watch in binary_clauses.containing(polarity) {
                if clauses.len() >= max_clauses {
                    return (env_vars, clauses);
                }
                if watch.garbage || watch.redundant {
                    continue;
                }
                if polarity.code() < watch.other.code()
                    && env_vars.contains(&watch.other.var())
                {
                    clauses.push(vec![polarity, watch.other]);
                }
            }
        }
    }

    // Root level units pin their variables inside the environment too.
    for &var in env_vars.iter() {
        if let Some(value) = assignment.var_value(var) {
            clauses.push(vec![var.lit(value)]);
        }
    }

    (env_vars, clauses)
}
