//! SCC decomposition of the binary implication graph and equivalent literal substitution.
//!
//! All literals of one strongly connected component of the binary implication graph are equal in
//! every model. The literal of smallest variable index becomes the representative; the others
//! are substituted throughout the formula and only live on in the extension stack and the
//! union-find of the variable mapping. A component containing a literal and its negation makes
//! the formula unsatisfiable, detected here as a failed literal unit.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use rustc_hash::FxHashMap;

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ExtendP,
    ImplGraphP, OccurP, ProofP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP, VmtfP,
    WatchlistsP,
};
use crate::decision;
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::varmap::VarStatus;

use super::util::{delete_long, store_derived};

const UNSEEN: u32 = u32::max_value();

/// One round of decomposition. Returns true when anything changed.
pub fn decompose(
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
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let var_count = ctx.part(AssignmentP).assignment().len();
    let node_count = var_count * 2;

    let components = tarjan_components(ctx.borrow(), node_count);

    // Failed literals: a variable with both polarities in one component.
    for index in 0..var_count {
        let var = pinesat_formula::Var::from_index(index);
        if ctx.part(AssignmentP).var_value(var).is_some() {
            continue;
        }
        let positive = var.positive();
        if components[positive.code()] != UNSEEN
            && components[positive.code()] == components[(!positive).code()]
        {
            // l and ¬l are equivalent; the path l => ¬l proves the unit ¬l.
            if let Some(chain) = binary_path(ctx.borrow(), positive, !positive) {
                let unit_id =
                    proof::add_derived_clause(ctx.borrow(), false, &[!positive], &chain);
                ctx.part_mut(ProofP).set_unit_id(var, unit_id);
                ctx.part_mut(VariablesP).set_status(var, VarStatus::Fixed);
                enqueue_assignment(ctx.borrow(), !positive, Reason::Unit { id: unit_id });
                ctx.part_mut(StatsP).failed_literals += 1;
            }
            // Propagating this unit is the caller's job; it will run into the converse
            // implication and derive the empty clause.
            return true;
        }
    }

    // Group the members of each component, remembering the representative.
    let mut members: FxHashMap<u32, Vec<Lit>> = FxHashMap::default();
    for code in 0..node_count {
        if components[code] != UNSEEN {
            members
                .entry(components[code])
                .or_insert_with(Vec::new)
                .push(Lit::from_code(code));
        }
    }

    // Equivalence binaries per merged literal: (forward id of ¬l v r, backward id of l v ¬r).
    let mut merged: Vec<(Lit, Lit, ClauseId, ClauseId)> = vec![];

    let mut ordered: Vec<(u32, Vec<Lit>)> = members.into_iter().collect();
    ordered.sort_unstable_by_key(|&(component, _)| component);

    for (_, lits) in ordered.iter() {
        if lits.len() < 2 {
            continue;
        }
        let repr = *lits
            .iter()
            .min_by_key(|lit| lit.index())
            .expect("nonempty component");
        // Complementary components describe the same merges; handle the one whose
        // representative is positive.
        if repr.is_negative() {
            continue;
        }

        for &lit in lits.iter() {
            if lit == repr {
                continue;
            }
            // Frozen variables must stay addressable through the API; they keep their name and
            // only the equivalence binaries relate them to the representative.
            if ctx.part(VariablesP).is_frozen_internal(lit.var()) {
                continue;
            }
            let forward = match binary_path(ctx.borrow(), lit, repr) {
                Some(chain) => chain,
                None => continue,
            };
            let backward = match binary_path(ctx.borrow(), repr, lit) {
                Some(chain) => chain,
                None => continue,
            };

            let forward_id =
                proof::add_derived_clause(ctx.borrow(), false, &[!lit, repr], &forward);
            let backward_id =
                proof::add_derived_clause(ctx.borrow(), false, &[lit, !repr], &backward);

            merged.push((lit, repr, forward_id, backward_id));
        }
    }

    if merged.is_empty() {
        return false;
    }

    // Record the merges in the union-find and on the extension stack, and retire the
    // substituted variables.
    let mut substituted = vec![false; var_count];
    let mut binary_ids: FxHashMap<usize, (ClauseId, ClauseId)> = FxHashMap::default();

    for &(lit, repr, forward_id, backward_id) in merged.iter() {
        {
            let variables = ctx.part_mut(VariablesP);
            let ext_lit = variables.external_from_internal_lit(lit);
            let ext_repr = variables.external_from_internal_lit(repr);
            let _merged_ok = variables.equivalences.merge(ext_repr, ext_lit);
            debug_assert!(_merged_ok, "inconsistent equivalence merge");
        }

        binary_ids.insert(lit.code(), (forward_id, backward_id));
        binary_ids.insert((!lit).code(), (backward_id, forward_id));

        substituted[lit.index()] = true;

        {
            let (variables, mut ctx) = ctx.split_part(VariablesP);
            let ext_lit = variables.external_from_internal_lit(lit);
            let ext_repr = variables.external_from_internal_lit(repr);
            let extend = ctx.part_mut(ExtendP);
            extend.push_record(&[!ext_lit], forward_id, &[!ext_lit, ext_repr]);
            extend.push_record(&[ext_lit], backward_id, &[ext_lit, !ext_repr]);
        }

        ctx.part_mut(VariablesP)
            .set_status(lit.var(), VarStatus::Substituted);
        decision::remove_var(ctx.borrow(), lit.var());
        ctx.part_mut(StatsP).substituted += 1;
    }

    rewrite_long_clauses(ctx.borrow(), &substituted, &binary_ids);
    rewrite_binary_clauses(ctx.borrow(), &substituted, &binary_ids);

    true
}

/// Iterative Tarjan over the binary implication graph.
///
/// Returns the component index per literal code, `UNSEEN` for assigned or disconnected nodes.
fn tarjan_components(
    mut ctx: partial!(Context, AssignmentP, BinaryClausesP),
    node_count: usize,
) -> Vec<u32> {
    let (binary_clauses, ctx) = ctx.split_part(BinaryClausesP);
    let assignment = ctx.part(AssignmentP);

    let mut component = vec![UNSEEN; node_count];
    let mut index = vec![UNSEEN; node_count];
    let mut lowlink = vec![UNSEEN; node_count];
    let mut on_stack = vec![false; node_count];
    let mut stack: Vec<usize> = vec![];
    let mut next_index = 0u32;
    let mut next_component = 0u32;

    // Explicit DFS frames: node and position in its successor list.
    let mut frames: Vec<(usize, usize)> = vec![];

    for root in 0..node_count {
        if index[root] != UNSEEN {
            continue;
        }
        let root_lit = Lit::from_code(root);
        if assignment.lit_value(root_lit).is_some() {
            continue;
        }

        frames.push((root, 0));
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while !frames.is_empty() {
            let frame_index = frames.len() - 1;
            let (node, successor) = frames[frame_index];
            let node_lit = Lit::from_code(node);
            let implied = binary_clauses.implied(node_lit);

            if successor < implied.len() {
                frames[frame_index].1 += 1;
                let watch = implied[successor];
                if watch.garbage || assignment.lit_value(watch.other).is_some() {
                    continue;
                }
                let next = watch.other.code();
                if index[next] == UNSEEN {
                    index[next] = next_index;
                    lowlink[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    frames.push((next, 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
            } else {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[node]);
                }
                if lowlink[node] == index[node] {
                    loop {
                        let member = stack.pop().expect("tarjan stack underflow");
                        on_stack[member] = false;
                        component[member] = next_component;
                        if member == node {
                            break;
                        }
                    }
                    next_component += 1;
                }
            }
        }
    }

    component
}

/// BFS for an implication path from `from` to `to`, returning the edge clause ids in order.
fn binary_path(
    mut ctx: partial!(Context, AssignmentP, BinaryClausesP),
    from: Lit,
    to: Lit,
) -> Option<Vec<ClauseId>> {
    let (binary_clauses, ctx) = ctx.split_part(BinaryClausesP);
    let assignment = ctx.part(AssignmentP);

    let node_count = assignment.assignment().len() * 2;
    let mut parent: Vec<Option<(usize, ClauseId)>> = vec![None; node_count];
    let mut queue = std::collections::VecDeque::new();

    parent[from.code()] = Some((from.code(), 0));
    queue.push_back(from.code());

    while let Some(code) = queue.pop_front() {
        if code == to.code() {
            let mut chain = vec![];
            let mut at = code;
            while at != from.code() {
                let (previous, id) = parent[at].expect("path parent missing");
                chain.push(id);
                at = previous;
            }
            chain.reverse();
            return Some(chain);
        }
        for watch in binary_clauses.implied(Lit::from_code(code)) {
            if watch.garbage || assignment.lit_value(watch.other).is_some() {
                continue;
            }
            let next = watch.other.code();
            if parent[next].is_none() {
                parent[next] = Some((code, watch.id));
                queue.push_back(next);
            }
        }
    }

    None
}

/// Rewrite all long clauses containing a substituted variable.
fn rewrite_long_clauses(
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
    substituted: &[bool],
    binary_ids: &FxHashMap<usize, (ClauseId, ClauseId)>,
) {
    let all_crefs: Vec<_> = ctx.part(ClauseDbP).clauses.clone();

    for cref in all_crefs {
        let (needs_rewrite, id, redundant, old_lits) = {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            let header = clause.header();
            if header.deleted() {
                continue;
            }
            (
                clause.lits().iter().any(|lit| substituted[lit.index()]),
                header.id(),
                header.redundant(),
                clause.lits().to_vec(),
            )
        };
        if !needs_rewrite {
            continue;
        }

        let mut chain = vec![];
        let mut new_lits = vec![];
        for &lit in old_lits.iter() {
            if substituted[lit.index()] {
                let repr = ctx.part_mut(VariablesP).equivalences.find(lit);
                // The forward implication justifies replacing the literal.
                if let Some(&(forward_id, _)) = binary_ids.get(&lit.code()) {
                    chain.push(forward_id);
                }
                new_lits.push(repr);
            } else {
                new_lits.push(lit);
            }
        }

        new_lits.sort_unstable();
        new_lits.dedup();
        let tautological = new_lits
            .windows(2)
            .any(|pair| pair[0] == !pair[1]);

        if !tautological {
            // The equivalence binaries propagate first, the original clause conflicts last.
            chain.sort_unstable();
            chain.dedup();
            chain.push(id);
            store_derived(ctx.borrow(), redundant, false, &new_lits, &chain);
        }

        delete_long(ctx.borrow(), cref);
    }
}

/// Rewrite all binary clauses touching a substituted variable.
fn rewrite_binary_clauses(
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
    substituted: &[bool],
    binary_ids: &FxHashMap<usize, (ClauseId, ClauseId)>,
) {
    let var_count = substituted.len();

    let mut touched: Vec<(ClauseId, [Lit; 2])> = vec![];
    {
        let binary_clauses = ctx.part(BinaryClausesP);
        for code in 0..var_count * 2 {
            let lit = Lit::from_code(code);
            let this = !lit;
            for watch in binary_clauses.implied(lit) {
                if watch.garbage || this.code() >= watch.other.code() {
                    continue;
                }
                if substituted[this.index()] || substituted[watch.other.index()] {
                    touched.push((watch.id, [this, watch.other]));
                }
            }
        }
    }

    for (id, lits) in touched {
        ctx.part_mut(BinaryClausesP).mark_garbage(lits);

        let mut chain = vec![];
        let mut new_pair = [lits[0], lits[1]];
        for lit in new_pair.iter_mut() {
            if substituted[lit.index()] {
                if let Some(&(forward_id, _)) = binary_ids.get(&lit.code()) {
                    chain.push(forward_id);
                }
                *lit = ctx.part_mut(VariablesP).equivalences.find(*lit);
            }
        }
        chain.push(id);

        if new_pair[0] == !new_pair[1] {
            // Tautological after substitution (e.g. the defining equivalences themselves).
            proof::delete_clause(ctx.borrow(), id, false, &lits);
            continue;
        }

        if new_pair[0] == new_pair[1] {
            store_derived(ctx.borrow(), false, false, &[new_pair[0]], &chain);
        } else {
            store_derived(ctx.borrow(), false, false, &new_pair, &chain);
        }
        proof::delete_clause(ctx.borrow(), id, false, &lits);
    }

    ctx.part_mut(BinaryClausesP).flush_garbage();
}
