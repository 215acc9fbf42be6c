//! Root propagation, lookahead and cube generation.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ImplGraphP,
    PhasesP, ProofP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::inprocess::util::collect_chain;
use crate::prop::{backtrack, enable_watchlists, enqueue_assignment, propagate, Reason};
use crate::state::SatState;

/// Propagate at the root level and report the fixed external literals.
///
/// Returns `None` when the formula became unsatisfiable instead.
pub fn propagate_root(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
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
) -> Option<Vec<Lit>> {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);
    enable_watchlists(ctx.borrow());

    if let Err(conflict) = propagate(ctx.borrow()) {
        let (seeds, conflict_id) = {
            use partial_ref::split_borrow;
            split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
            (conflict.lits(&lit_ctx).to_vec(), conflict.id(&lit_ctx))
        };
        let chain = collect_chain(ctx.borrow(), &seeds, Some(conflict_id));
        let id = crate::proof::add_derived_clause(ctx.borrow(), false, &[], &chain);
        crate::proof::begin_unsat_proof(ctx.borrow(), id);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        ctx.part_mut(SolverStateP).formula_unsat = true;
        return None;
    }

    let variables = ctx.part(VariablesP);
    let fixed = ctx
        .part(TrailP)
        .trail()
        .iter()
        .map(|&lit| variables.external_from_internal_lit(lit))
        .collect();
    Some(fixed)
}

/// Pick the literal a lookahead would branch on next.
///
/// Scores variables by the product of their positive and negative occurrence counts, preferring
/// balanced, frequent variables. Returns the polarity with more occurrences.
pub fn lookahead(
    mut ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        VariablesP,
    ),
) -> Option<Lit> {
    let var_count = ctx.part(AssignmentP).assignment().len();

    let mut counts = vec![0usize; var_count * 2];
    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let clause = alloc.clause(cref);
            if clause.header().deleted() || clause.header().redundant() {
                continue;
            }
            for &lit in clause.lits() {
                counts[lit.code()] += 1;
            }
        }
        let binary_clauses = ctx.part(BinaryClausesP);
        for code in 0..var_count * 2 {
            counts[code] += binary_clauses.occurrence_count(Lit::from_code(code));
        }
    }

    let mut best: Option<(usize, Lit)> = None;
    for index in 0..var_count {
        let var = Var::from_index(index);
        if !ctx.part(VariablesP).is_active(var)
            || ctx.part(AssignmentP).var_value(var).is_some()
        {
            continue;
        }
        let positive = counts[var.positive().code()];
        let negative = counts[var.negative().code()];
        if positive + negative == 0 {
            continue;
        }
        let score = (positive + 1) * (negative + 1);
        let lit = if positive >= negative {
            var.positive()
        } else {
            var.negative()
        };
        match best {
            Some((best_score, _)) if best_score >= score => (),
            _ => best = Some((score, lit)),
        }
    }

    best.map(|(_, lit)| lit)
}

/// Generate cubes by recursive lookahead splitting.
///
/// Returns cubes over external literals whose disjunction covers the search space of the
/// current formula. Branches refuted by propagation are dropped.
pub fn generate_cubes(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
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
    depth: usize,
) -> Vec<Vec<Lit>> {
    let mut cubes = vec![];

    if propagate_root(ctx.borrow()).is_none() {
        return cubes;
    }

    cube_recurse(ctx.borrow(), depth, &mut vec![], &mut cubes);

    backtrack(ctx.borrow(), 0);
    cubes
}

fn cube_recurse(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
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
    depth: usize,
    decisions: &mut Vec<Lit>,
    cubes: &mut Vec<Vec<Lit>>,
) {
    let split = if depth == 0 {
        None
    } else {
        lookahead(ctx.borrow())
    };

    let split = match split {
        Some(split) => split,
        None => {
            let variables = ctx.part(VariablesP);
            cubes.push(
                decisions
                    .iter()
                    .map(|&lit| variables.external_from_internal_lit(lit))
                    .collect(),
            );
            return;
        }
    };

    for &branch in [split, !split].iter() {
        let level = ctx.part(TrailP).current_level();
        ctx.part_mut(TrailP).new_decision_level(Some(branch));
        enqueue_assignment(ctx.borrow(), branch, Reason::Decision);

        if propagate(ctx.borrow()).is_ok() {
            decisions.push(branch);
            cube_recurse(ctx.borrow(), depth - 1, decisions, cubes);
            decisions.pop();
        }
        // A refuted branch contributes no cube.

        backtrack(ctx.borrow(), level);
    }
}
