//! Transitive reduction of the binary implication graph.
//!
//! A binary clause (a v b) is the implication ¬a => b. When b is reachable from ¬a through
//! other binary clauses, the edge is transitively implied and the clause can be deleted. When
//! the search from ¬a reaches a itself, ¬a is a failed literal and a is derived as a unit.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::context::{
    AssignmentP, BinaryClausesP, ConfigP, Context, ImplGraphP, ProofP, ScheduleP, StatsP, TrailP,
    VariablesP,
};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::schedule::effort_limit;
use crate::varmap::VarStatus;

/// One transitive reduction round.
pub fn transitive_reduction(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut ScheduleP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        ConfigP,
    ),
) {
    let config = ctx.part(ConfigP);
    if config.transred == 0 {
        return;
    }

    let ticks = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.transred;
    let initial_budget = effort_limit(ticks, last, config.transredeffort) as i64;
    let mut budget = initial_budget;
    ctx.part_mut(ScheduleP).pass_ticks.transred = ticks;

    let var_count = ctx.part(AssignmentP).assignment().len();

    let mut redundant_edges: Vec<(ClauseId, [Lit; 2])> = vec![];
    let mut failed: Vec<(Lit, Vec<ClauseId>)> = vec![];

    {
        let (binary_clauses, ctx) = ctx.split_part(BinaryClausesP);
        let assignment = ctx.part(AssignmentP);

        // Breadth first search state, reused across edges.
        let mut reached = vec![false; var_count * 2];
        let mut touched: Vec<usize> = vec![];
        let mut queue: Vec<(usize, usize)> = vec![];
        let mut parent: Vec<(usize, ClauseId)> = vec![(0, 0); var_count * 2];

        'edges: for code in 0..var_count * 2 {
            let source = Lit::from_code(code);
            if assignment.lit_value(source).is_some() {
                continue;
            }

            for watch in binary_clauses.implied(source).iter() {
                if budget < 0 {
                    break 'edges;
                }
                if watch.garbage || watch.redundant {
                    continue;
                }
                let target = watch.other;
                if assignment.lit_value(target).is_some() {
                    continue;
                }
                let skip_id = watch.id;

                // Search for target from source, avoiding the edge under test.
                for &t in touched.iter() {
                    reached[t] = false;
                }
                touched.clear();
                queue.clear();
                queue.push((source.code(), 0));
                reached[source.code()] = true;
                touched.push(source.code());

                let mut head = 0;
                while head < queue.len() {
                    let (at, _) = queue[head];
                    head += 1;
                    budget -= 1;
                    if budget < 0 {
                        break;
                    }
                    for next_watch in binary_clauses.implied(Lit::from_code(at)).iter() {
                        if next_watch.garbage
                            || next_watch.id == skip_id
                            || assignment.lit_value(next_watch.other).is_some()
                        {
                            continue;
                        }
                        let next = next_watch.other.code();
                        if reached[next] {
                            continue;
                        }
                        reached[next] = true;
                        touched.push(next);
                        parent[next] = (at, next_watch.id);
                        queue.push((next, 0));

                        if next == target.code() {
                            redundant_edges.push((skip_id, [!source, target]));
                            continue 'edges;
                        }
                        if next == (!source).code() {
                            // source implies its own negation: failed literal.
                            let mut chain = vec![];
                            let mut at = next;
                            while at != source.code() {
                                let (previous, id) = parent[at];
                                chain.push(id);
                                at = previous;
                            }
                            chain.reverse();
                            failed.push((!source, chain));
                            continue 'edges;
                        }
                    }
                }
            }
        }
    }

    // Units first: their chains may reference edges that are deleted just below.
    for (unit, chain) in failed {
        if ctx.part(AssignmentP).lit_value(unit).is_some() {
            continue;
        }
        let unit_id = proof::add_derived_clause(ctx.borrow(), false, &[unit], &chain);
        ctx.part_mut(ProofP).set_unit_id(unit.var(), unit_id);
        ctx.part_mut(VariablesP)
            .set_status(unit.var(), VarStatus::Fixed);
        enqueue_assignment(ctx.borrow(), unit, Reason::Unit { id: unit_id });
        ctx.part_mut(StatsP).failed_literals += 1;
    }

    for (id, lits) in redundant_edges {
        if ctx.part_mut(BinaryClausesP).mark_garbage(lits).is_some() {
            proof::delete_clause(ctx.borrow(), id, false, &lits);
            ctx.part_mut(StatsP).transitive_reduced += 1;
        }
    }
    ctx.part_mut(BinaryClausesP).flush_garbage();

    ctx.part_mut(StatsP).ticks += (initial_budget - budget).max(0) as u64;
}
