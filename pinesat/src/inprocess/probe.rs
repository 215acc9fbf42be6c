//! Failed literal probing with hyper binary resolution.
//!
//! Roots of the binary implication graph are decided at level one and propagated. A conflict
//! makes the probe a failed literal whose negation is derived as a unit, justified by the level
//! one reason chain. While probing, a long clause that becomes a reason is strengthened on the
//! fly to a hyper binary clause over the unique dominator of its falsified literals in the
//! binary implication graph.

use partial_ref::{partial, split_borrow, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ImplGraphP,
    PhasesP, ProofP, ScheduleP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP, VmtfP,
    WatchlistsP,
};
use crate::proof;
use crate::prop::{backtrack, enqueue_assignment, propagate, Reason};
use crate::schedule::effort_limit;
use crate::varmap::VarStatus;

use super::util::collect_chain;

/// One probing round.
pub fn probe(
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
    if config.probe == 0 {
        return;
    }
    let hbr_enabled = config.probehbr != 0;

    let ticks_start = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.probe;
    let budget = effort_limit(ticks_start, last, config.probeeffort);
    ctx.part_mut(ScheduleP).pass_ticks.probe = ticks_start;

    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    // Probe the roots of the binary implication graph: literals that are not implied by any
    // binary clause but whose negation occurs in one. Roots with many implications first.
    let var_count = ctx.part(AssignmentP).assignment().len();
    let mut probes: Vec<(usize, Lit)> = vec![];
    {
        let binary_clauses = ctx.part(BinaryClausesP);
        let assignment = ctx.part(AssignmentP);
        for code in 0..var_count * 2 {
            let lit = Lit::from_code(code);
            if assignment.lit_value(lit).is_some() {
                continue;
            }
            if !ctx.part(VariablesP).is_active(lit.var()) {
                continue;
            }
            let own = binary_clauses.occurrence_count(lit);
            if own != 0 {
                continue;
            }
            let negated = binary_clauses.occurrence_count(!lit);
            if negated == 0 {
                continue;
            }
            probes.push((negated, lit));
        }
    }
    probes.sort_unstable_by_key(|&(count, lit)| (std::cmp::Reverse(count), lit.code()));

    for (_, probe_lit) in probes {
        if ctx.part(StatsP).ticks.saturating_sub(ticks_start) > budget {
            break;
        }
        if ctx.part(SolverStateP).sat_state != crate::state::SatState::Unknown {
            return;
        }
        if ctx.part(AssignmentP).lit_value(probe_lit).is_some() {
            continue;
        }

        ctx.part_mut(StatsP).probed += 1;

        ctx.part_mut(TrailP).new_decision_level(Some(probe_lit));
        enqueue_assignment(ctx.borrow(), probe_lit, Reason::Decision);

        let result = propagate(ctx.borrow());

        match result {
            Ok(()) => {
                if hbr_enabled {
                    hyper_binary_resolve(ctx.borrow());
                }
                backtrack(ctx.borrow(), 0);
            }
            Err(conflict) => {
                // The probe failed; derive its negation as a unit.
                let conflict_id = {
                    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
                    conflict.id(&lit_ctx)
                };
                let seeds: Vec<Lit> = {
                    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
                    conflict.lits(&lit_ctx).iter().map(|&l| !l).collect()
                };
                let chain = collect_chain(ctx.borrow(), &seeds, Some(conflict_id));

                backtrack(ctx.borrow(), 0);

                let unit = !probe_lit;
                let unit_id = proof::add_derived_clause(ctx.borrow(), false, &[unit], &chain);
                ctx.part_mut(ProofP).set_unit_id(unit.var(), unit_id);
                ctx.part_mut(VariablesP)
                    .set_status(unit.var(), VarStatus::Fixed);
                enqueue_assignment(ctx.borrow(), unit, Reason::Unit { id: unit_id });
                ctx.part_mut(StatsP).failed_literals += 1;

                // Propagate the unit; a conflict here means the formula is unsatisfiable and is
                // left for the search to rediscover with a reset queue.
                if propagate(ctx.borrow()).is_err() {
                    ctx.part_mut(TrailP).reset_queue();
                    return;
                }
            }
        }
    }
}

/// Strengthen long level-one reasons to hyper binary clauses.
///
/// For each trail literal of the probe level whose reason is a long clause, all antecedent
/// literals are level one as well and reachable from the probe decision in the binary
/// implication graph. Their unique dominator `d` implies all of them, so (¬d v lit) is a valid
/// hyper binary resolvent. If the dominator is the decision itself the resolvent is exactly the
/// binary that probing would learn; any other dominator gives a stronger clause.
fn hyper_binary_resolve(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut StatsP,
        ClauseAllocP,
        TrailP,
        VariablesP,
    ),
) {
    let trail_lits: Vec<Lit> = {
        let trail = ctx.part(TrailP);
        let start = trail.control().last().map(|f| f.trail_offset).unwrap_or(0);
        trail.trail()[start..].to_vec()
    };

    for &lit in trail_lits.iter() {
        let reason = *ctx.part(ImplGraphP).reason(lit.var());
        let cref = match reason {
            Reason::Long(cref) => cref,
            _ => continue,
        };

        let (falsified, clause_id): (Vec<Lit>, ClauseId) = {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            (
                clause.lits()[1..].iter().map(|&l| !l).collect(),
                clause.header().id(),
            )
        };

        let dominator = match common_dominator(ctx.borrow(), &falsified) {
            Some(dominator) => dominator,
            None => continue,
        };

        // Paths from the dominator to each falsified literal justify the resolvent.
        let mut chain: Vec<ClauseId> = vec![];
        let mut valid = true;
        for &target in falsified.iter() {
            match binary_chain(ctx.borrow(), dominator, target) {
                Some(mut part) => chain.append(&mut part),
                None => {
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            continue;
        }
        chain.sort_unstable();
        chain.dedup();
        chain.push(clause_id);

        let new_binary = [!dominator, lit];
        if new_binary[0] == new_binary[1] || new_binary[0] == !new_binary[1] {
            continue;
        }

        let id = proof::add_derived_clause(ctx.borrow(), true, &new_binary, &chain);
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause(new_binary, id, true, true);
        ctx.part_mut(ImplGraphP).update_reason(
            lit.var(),
            Reason::Binary {
                other: [!dominator],
                id,
            },
        );
        ctx.part_mut(StatsP).hyper_binary += 1;
    }
}

/// The deepest literal of the probe level that reaches all given literals through binary
/// implications.
///
/// Walks the binary parent pointers of the implication graph. Starting from the first literal's
/// ancestor chain, each further literal prunes the chain at its first common ancestor.
fn common_dominator(
    mut ctx: partial!(Context, ImplGraphP),
    lits: &[Lit],
) -> Option<Lit> {
    let impl_graph = ctx.part(ImplGraphP);

    let parent = |lit: Lit| -> Option<Lit> {
        match impl_graph.reason(lit.var()) {
            Reason::Binary { other, .. } => Some(!other[0]),
            _ => None,
        }
    };

    let first = *lits.first()?;
    let mut chain = vec![first];
    let mut at = first;
    while let Some(up) = parent(at) {
        chain.push(up);
        at = up;
    }

    for &lit in lits[1..].iter() {
        let mut at = lit;
        loop {
            if let Some(position) = chain.iter().position(|&c| c == at) {
                chain.drain(..position);
                break;
            }
            match parent(at) {
                Some(up) => at = up,
                None => return None,
            }
        }
    }

    chain.first().cloned()
}

/// The binary reason chain from an ancestor down to a literal, in propagation order.
fn binary_chain(
    mut ctx: partial!(Context, ImplGraphP),
    from: Lit,
    to: Lit,
) -> Option<Vec<ClauseId>> {
    let impl_graph = ctx.part(ImplGraphP);

    let mut chain = vec![];
    let mut at = to;
    while at != from {
        match *impl_graph.reason(at.var()) {
            Reason::Binary { other, id } => {
                chain.push(id);
                at = !other[0];
            }
            _ => return None,
        }
    }
    chain.reverse();
    Some(chain)
}
