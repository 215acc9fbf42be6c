//! Congruence closure over extracted gates.
//!
//! AND, XOR and ITE gates are extracted from the irredundant formula (equivalence gates are
//! already handled by decomposition). Two gates of the same kind over the same inputs force
//! their outputs equal; the equivalence is derived as binary clauses which the next
//! decomposition round substitutes away. Rounds repeat until no new equivalence is found.
//!
//! An AND equivalence is a plain propagation consequence of the defining clauses. For XOR and
//! ITE it is not, so the two directions are each derived through two intermediate resolvents
//! that are deleted again right away.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use pinesat_proof::ClauseId;

use rustc_hash::FxHashMap;

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ExtendP,
    ImplGraphP, OccurP, ProofP, ScheduleP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP,
    VmtfP, WatchlistsP,
};
use crate::proof;
use crate::state::SatState;

use super::decompose::decompose;
use super::util::store_derived;

#[derive(Hash, PartialEq, Eq, Clone)]
enum GateKey {
    And(Vec<Lit>),
    Xor(Lit, Lit),
    Ite(Lit, Lit, Lit),
}

/// A clause of a gate definition: its id and its literals without the output.
type DefClause = (ClauseId, Vec<Lit>);

enum GateDef {
    /// Binaries proving output => input and the base clause proving inputs => output.
    And {
        forward: Vec<ClauseId>,
        base: ClauseId,
    },
    /// The two clauses containing the negated output and the two containing it.
    Split {
        neg: [DefClause; 2],
        pos: [DefClause; 2],
    },
}

struct GateMatch {
    output: Lit,
    def: GateDef,
}

/// Run gate extraction and congruence closure until a fixpoint or the round limit.
pub fn congruence(
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
    if ctx.part(ConfigP).congruence == 0 {
        return;
    }

    for _round in 0..4 {
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return;
        }

        let merged = congruence_round(ctx.borrow());
        if merged == 0 {
            break;
        }

        // The new equivalences feed the next decomposition, which substitutes them away and
        // thereby changes the gate structure for the next extraction.
        decompose(ctx.borrow());
    }
}

fn congruence_round(
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
) -> usize {
    let var_count = ctx.part(AssignmentP).assignment().len();

    let mut gates: FxHashMap<GateKey, GateMatch> = FxHashMap::default();
    let mut merged = 0;

    for index in 0..var_count {
        let var = Var::from_index(index);
        if !ctx.part(VariablesP).is_active(var)
            || ctx.part(AssignmentP).var_value(var).is_some()
        {
            continue;
        }

        for (key, found) in extract_gates(ctx.borrow(), var) {
            match gates.get(&key) {
                Some(existing) if existing.output.var() != found.output.var() => {
                    if merge_outputs(ctx.borrow(), existing, &found) {
                        merged += 1;
                        ctx.part_mut(StatsP).congruent_merged += 1;
                    }
                }
                Some(_) => (),
                None => {
                    gates.insert(key, found);
                }
            }
        }

        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            break;
        }
    }

    merged
}

/// Derive `existing.output <-> found.output` as two binary clauses.
fn merge_outputs(
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
    existing: &GateMatch,
    found: &GateMatch,
) -> bool {
    let o1 = existing.output;
    let o2 = found.output;

    if ctx.part(AssignmentP).lit_value(o1).is_some()
        || ctx.part(AssignmentP).lit_value(o2).is_some()
    {
        return false;
    }

    match (&existing.def, &found.def) {
        (
            GateDef::And {
                forward: forward_1,
                base: base_1,
            },
            GateDef::And {
                forward: forward_2,
                base: base_2,
            },
        ) => {
            // o1's forward binaries derive the inputs, o2's base clause then conflicts.
            let mut chain = forward_1.clone();
            chain.push(*base_2);
            store_derived(ctx.borrow(), false, false, &[!o1, o2], &chain);

            let mut chain = forward_2.clone();
            chain.push(*base_1);
            store_derived(ctx.borrow(), false, false, &[!o2, o1], &chain);
            true
        }
        (GateDef::Split { neg: neg_1, .. }, GateDef::Split { pos: pos_2, .. }) => {
            split_direction(ctx.borrow(), o1, o2, neg_1, pos_2);
            // The other direction needs the mirrored clause sets.
            if let (GateDef::Split { pos: pos_1, .. }, GateDef::Split { neg: neg_2, .. }) =
                (&existing.def, &found.def)
            {
                split_direction(ctx.borrow(), o2, o1, neg_2, pos_1);
            }
            true
        }
        _ => false,
    }
}

/// Derive (¬from v to) for a split (XOR/ITE) definition pair.
///
/// Each `neg` clause of `from` is resolved with the `pos` clause of `to` that complements it on
/// its second literal, producing two intermediates that resolve to the binary. The
/// intermediates are deleted again immediately.
fn split_direction(
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
    from: Lit,
    to: Lit,
    neg: &[DefClause; 2],
    pos: &[DefClause; 2],
) {
    // Pair each neg clause with the pos clause that clashes on one literal and shares the
    // other; the shared literal survives into the intermediate. For XOR and ITE shapes the two
    // shared literals are complementary, which is what lets the intermediates resolve.
    let mut pairings: Vec<(ClauseId, ClauseId, Lit)> = vec![];

    for (neg_id, neg_rest) in neg.iter() {
        if neg_rest.len() != 2 {
            return;
        }
        let mut partner = None;
        for (pos_id, pos_rest) in pos.iter() {
            for pivot_index in 0..2 {
                let pivot = neg_rest[pivot_index];
                let shared = neg_rest[1 - pivot_index];
                if pos_rest.contains(&!pivot) && pos_rest.contains(&shared) {
                    partner = Some((*pos_id, shared));
                }
            }
        }
        match partner {
            Some((pos_id, shared)) => pairings.push((*neg_id, pos_id, shared)),
            None => return,
        }
    }

    if pairings.len() != 2 || pairings[0].2 != !pairings[1].2 {
        return;
    }
    if pairings
        .iter()
        .any(|&(_, _, shared)| shared.var() == from.var() || shared.var() == to.var())
    {
        return;
    }

    let mut intermediates: Vec<(ClauseId, Vec<Lit>)> = vec![];
    for &(neg_id, pos_id, shared) in pairings.iter() {
        let lits = vec![!from, to, shared];
        let chain = [neg_id, pos_id];
        let id = proof::add_derived_clause(ctx.borrow(), true, &lits, &chain);
        intermediates.push((id, lits));
    }

    let chain = [intermediates[0].0, intermediates[1].0];
    store_derived(ctx.borrow(), false, false, &[!from, to], &chain);

    for (id, lits) in intermediates {
        proof::delete_clause(ctx.borrow(), id, true, &lits);
    }
}

/// Extract the gates with the given output variable.
fn extract_gates(
    mut ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        OccurP,
        VariablesP,
    ),
    var: Var,
) -> Vec<(GateKey, GateMatch)> {
    let mut result = vec![];

    let alloc = ctx.part(ClauseAllocP);
    let binary_clauses = ctx.part(BinaryClausesP);
    let occur = ctx.part(OccurP);

    // The ternary clauses around the variable, keyed by the polarity of the output.
    let mut with_output: Vec<DefClause> = vec![];
    let mut with_negated: Vec<DefClause> = vec![];
    for &cref in occur.occs(var.positive()).iter().chain(occur.occs(var.negative())) {
        let clause = alloc.clause(cref);
        let header = clause.header();
        if header.deleted() || header.redundant() || clause.lits().len() != 3 {
            continue;
        }
        let rest: Vec<Lit> = clause
            .lits()
            .iter()
            .cloned()
            .filter(|lit| lit.var() != var)
            .collect();
        if rest.len() != 2 {
            continue;
        }
        if clause.lits().contains(&var.positive()) {
            with_output.push((header.id(), rest));
        } else {
            with_negated.push((header.id(), rest));
        }
    }

    for &output in [var.positive(), var.negative()].iter() {
        // AND gate: binaries (¬output v a_i) and the base clause (output v ¬a_1 v .. v ¬a_k).
        let implied: Vec<(Lit, ClauseId)> = binary_clauses
            .containing(!output)
            .iter()
            .filter(|watch| !watch.garbage && !watch.redundant)
            .map(|watch| (watch.other, watch.id))
            .collect();

        if implied.is_empty() {
            continue;
        }

        for &cref in occur.occs(output) {
            let clause = alloc.clause(cref);
            let header = clause.header();
            if header.deleted() || header.redundant() || clause.lits().len() < 3 {
                continue;
            }

            let mut inputs = vec![];
            let mut forward = vec![];
            let mut matched = true;
            for &lit in clause.lits() {
                if lit == output {
                    continue;
                }
                match implied.iter().find(|&&(other, _)| other == !lit) {
                    Some(&(other, id)) => {
                        inputs.push(other);
                        forward.push(id);
                    }
                    None => {
                        matched = false;
                        break;
                    }
                }
            }
            if !matched || inputs.is_empty() {
                continue;
            }

            inputs.sort_unstable();
            result.push((
                GateKey::And(inputs),
                GateMatch {
                    output,
                    def: GateDef::And {
                        forward,
                        base: header.id(),
                    },
                },
            ));
        }
    }

    // XOR gate over the four ternary clauses: with the output v <-> a xor b reads
    // (¬v v a v b), (¬v v ¬a v ¬b), (v v a v ¬b), (v v ¬a v b).
    if with_output.len() >= 2 && with_negated.len() >= 2 {
        'xor: for (n1_id, n1) in with_negated.iter() {
            let (a, b) = (n1[0], n1[1]);
            let n2 = with_negated
                .iter()
                .find(|(_, rest)| rest.contains(&!a) && rest.contains(&!b));
            let p1 = with_output
                .iter()
                .find(|(_, rest)| rest.contains(&a) && rest.contains(&!b));
            let p2 = with_output
                .iter()
                .find(|(_, rest)| rest.contains(&!a) && rest.contains(&b));
            if let (Some(n2), Some(p1), Some(p2)) = (n2, p1, p2) {
                let (x, y) = if a.code() < b.code() { (a, b) } else { (b, a) };
                result.push((
                    GateKey::Xor(x, y),
                    GateMatch {
                        output: var.positive(),
                        def: GateDef::Split {
                            neg: [(*n1_id, n1.clone()), (n2.0, n2.1.clone())],
                            pos: [(p1.0, p1.1.clone()), (p2.0, p2.1.clone())],
                        },
                    },
                ));
                break 'xor;
            }
        }
    }

    // ITE gate: (¬v v ¬c v t), (¬v v c v e), (v v ¬c v ¬t), (v v c v ¬e), with the condition
    // normalized to its positive polarity.
    if with_output.len() >= 2 && with_negated.len() >= 2 {
        'ite: for (n1_id, n1) in with_negated.iter() {
            for &cond_neg in n1.iter() {
                let cond = !cond_neg;
                if cond.is_negative() {
                    continue;
                }
                let then_lit = match n1.iter().find(|&&l| l != cond_neg) {
                    Some(&l) => l,
                    None => continue,
                };
                let n2 = with_negated
                    .iter()
                    .find(|(_, rest)| rest.contains(&cond) && !rest.contains(&then_lit));
                let n2 = match n2 {
                    Some(n2) => n2,
                    None => continue,
                };
                let else_lit = match n2.1.iter().find(|&&l| l != cond) {
                    Some(&l) => l,
                    None => continue,
                };
                let p1 = with_output
                    .iter()
                    .find(|(_, rest)| rest.contains(&cond_neg) && rest.contains(&!then_lit));
                let p2 = with_output
                    .iter()
                    .find(|(_, rest)| rest.contains(&cond) && rest.contains(&!else_lit));
                if let (Some(p1), Some(p2)) = (p1, p2) {
                    result.push((
                        GateKey::Ite(cond, then_lit, else_lit),
                        GateMatch {
                            output: var.positive(),
                            def: GateDef::Split {
                                neg: [(*n1_id, n1.clone()), (n2.0, n2.1.clone())],
                                pos: [(p1.0, p1.1.clone()), (p2.0, p2.1.clone())],
                            },
                        },
                    ));
                    break 'ite;
                }
            }
        }
    }

    result
}
