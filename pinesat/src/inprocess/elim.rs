//! Bounded variable elimination with gate recognition.
//!
//! A variable can be eliminated when the set of non-tautological resolvents of its positive and
//! negative occurrences is no larger than the clauses it replaces. When the variable is the
//! output of a recognized gate (AND, XOR, ITE), resolution can be restricted to pairs of one
//! gate-definition clause and one ordinary clause, which keeps the resolvent count small enough
//! for many variables that plain counting would reject.
//!
//! The clauses of the eliminated variable's positive polarity move to the extension stack with
//! the positive literal as witness; the negative side is deleted outright.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use pinesat_proof::ClauseId;

use crate::clause::ClauseRef;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ExtendP,
    ImplGraphP, OccurP, ProofP, ScheduleP, SolverStateP, StatsP, TmpDataP, TrailP, VariablesP,
    VmtfP, WatchlistsP,
};
use crate::decision;
use crate::proof;
use crate::schedule::effort_limit;
use crate::state::SatState;
use crate::varmap::VarStatus;

use super::util::{delete_long, store_derived, weaken_long};

/// One clause occurrence of the candidate variable.
#[derive(Clone)]
enum Occurrence {
    Long(ClauseRef, Vec<Lit>, ClauseId),
    Binary([Lit; 2], ClauseId),
}

impl Occurrence {
    fn lits(&self) -> &[Lit] {
        match self {
            Occurrence::Long(_, lits, _) => lits,
            Occurrence::Binary(lits, _) => lits,
        }
    }

    fn id(&self) -> ClauseId {
        match self {
            Occurrence::Long(_, _, id) => *id,
            Occurrence::Binary(_, id) => *id,
        }
    }
}

/// One round of bounded variable elimination. Requires active occurrence lists.
pub fn eliminate(
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
    let (enabled, effort, base_occlim, base_clslim, grow, gates_enabled) = {
        let config = ctx.part(ConfigP);
        (
            config.elim != 0,
            config.elimeffort,
            config.elimocclim as usize,
            config.elimclslim as usize,
            config.elimboundgrow as usize,
            config.elimgates != 0,
        )
    };
    if !enabled {
        return;
    }
    debug_assert!(ctx.part(OccurP).active());

    let ticks_start = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.elim;
    let budget = effort_limit(ticks_start, last, effort);
    ctx.part_mut(ScheduleP).pass_ticks.elim = ticks_start;

    // Every fourth round is thorough, with much larger caps; the others are the fast variant.
    let thorough = ctx.part(ScheduleP).inprocess_count % 4 == 0;
    let cap_factor = if thorough { 8 } else { 1 };
    let occlim = base_occlim * cap_factor;
    let clslim = base_clslim * cap_factor;

    let var_count = ctx.part(AssignmentP).assignment().len();
    let mut spent = 0u64;

    for index in 0..var_count {
        if spent > budget {
            break;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return;
        }

        let var = Var::from_index(index);
        if !ctx.part(VariablesP).is_active(var)
            || ctx.part(VariablesP).is_frozen_internal(var)
            || ctx.part(AssignmentP).var_value(var).is_some()
        {
            continue;
        }

        // Redundant clauses do not count against elimination; they are dropped if the variable
        // goes away.
        let (positives, redundant_p) = gather(ctx.borrow(), var.positive(), &mut spent);
        let (negatives, redundant_n) = gather(ctx.borrow(), var.negative(), &mut spent);

        if positives.len() > occlim || negatives.len() > occlim {
            continue;
        }
        if positives
            .iter()
            .chain(negatives.iter())
            .any(|occurrence| occurrence.lits().len() > clslim)
        {
            continue;
        }

        if positives.is_empty() && negatives.is_empty() {
            continue;
        }

        // Pure literal: one side has no irredundant occurrences.
        if negatives.is_empty() || positives.is_empty() {
            let witness = if negatives.is_empty() {
                var.positive()
            } else {
                var.negative()
            };
            remove_variable(
                ctx.borrow(),
                var,
                witness,
                &positives,
                &negatives,
                &redundant_p,
                &redundant_n,
                VarStatus::Pure,
            );
            continue;
        }

        // Gate recognition restricts which resolvent pairs have to be produced.
        let gate = if gates_enabled {
            find_gate(&positives, &negatives, var)
        } else {
            None
        };

        let bound = positives.len() + negatives.len() + grow;
        let mut resolvents: Vec<(Vec<Lit>, ClauseId, ClauseId)> = vec![];
        let mut too_many = false;

        'pairs: for (p_index, p) in positives.iter().enumerate() {
            for (n_index, n) in negatives.iter().enumerate() {
                spent += 1;

                if let Some((ref gate_p, ref gate_n)) = gate {
                    // Only resolve a definition clause against an ordinary clause.
                    let p_is_gate = gate_p.contains(&p_index);
                    let n_is_gate = gate_n.contains(&n_index);
                    if p_is_gate == n_is_gate {
                        continue;
                    }
                }

                let mut resolvent: Vec<Lit> = p
                    .lits()
                    .iter()
                    .chain(n.lits().iter())
                    .cloned()
                    .filter(|lit| lit.var() != var)
                    .collect();
                resolvent.sort_unstable();
                resolvent.dedup();

                if resolvent.windows(2).any(|pair| pair[0] == !pair[1]) {
                    continue;
                }

                resolvents.push((resolvent, p.id(), n.id()));
                if resolvents.len() > bound {
                    too_many = true;
                    break 'pairs;
                }
            }
        }

        if too_many {
            continue;
        }

        let trail_before = ctx.part(TrailP).trail().len();

        for (lits, p_id, n_id) in resolvents {
            store_derived(ctx.borrow(), false, false, &lits, &[p_id, n_id]);
        }
        if gate.is_some() {
            ctx.part_mut(StatsP).elim_gates += 1;
        }

        remove_variable(
            ctx.borrow(),
            var,
            var.positive(),
            &positives,
            &negatives,
            &redundant_p,
            &redundant_n,
            VarStatus::Eliminated,
        );

        // A unit resolvent needs propagation before elimination can continue soundly.
        if ctx.part(TrailP).trail().len() > trail_before {
            break;
        }
    }

    ctx.part_mut(StatsP).ticks += spent;
}

/// Collect the irredundant occurrences of a literal, and the redundant ones separately.
fn gather(
    mut ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        OccurP,
    ),
    lit: Lit,
    spent: &mut u64,
) -> (Vec<Occurrence>, Vec<Occurrence>) {
    let mut irredundant = vec![];
    let mut redundant = vec![];

    let alloc = ctx.part(ClauseAllocP);
    for &cref in ctx.part(OccurP).occs(lit) {
        *spent += 1;
        let clause = alloc.clause(cref);
        let header = clause.header();
        if header.deleted() {
            continue;
        }
        let occurrence = Occurrence::Long(cref, clause.lits().to_vec(), header.id());
        if header.redundant() {
            redundant.push(occurrence);
        } else {
            irredundant.push(occurrence);
        }
    }

    for watch in ctx.part(BinaryClausesP).containing(lit) {
        *spent += 1;
        if watch.garbage {
            continue;
        }
        let occurrence = Occurrence::Binary([lit, watch.other], watch.id);
        if watch.redundant {
            redundant.push(occurrence);
        } else {
            irredundant.push(occurrence);
        }
    }

    (irredundant, redundant)
}

/// Recognized gate definitions: indices of the defining clauses on each side.
type Gate = (Vec<usize>, Vec<usize>);

/// Look for an AND, XOR or ITE definition of the variable.
fn find_gate(positives: &[Occurrence], negatives: &[Occurrence], var: Var) -> Option<Gate> {
    find_and_gate(positives, negatives, var)
        .or_else(|| find_and_gate(negatives, positives, var).map(|(n, p)| (p, n)))
        .or_else(|| find_xor_gate(positives, negatives, var))
        .or_else(|| find_ite_gate(positives, negatives, var))
}

/// v <-> AND(a1..ak): binaries (¬v v ai) on one side, (v v ¬a1 v .. v ¬ak) on the other.
///
/// Called with the side containing the long base clause first; returns (base side indices,
/// binary side indices).
fn find_and_gate(
    base_side: &[Occurrence],
    binary_side: &[Occurrence],
    var: Var,
) -> Option<Gate> {
    let mut implied: Vec<(Lit, usize)> = vec![];
    for (index, occurrence) in binary_side.iter().enumerate() {
        if let Occurrence::Binary(lits, _) = occurrence {
            let other = if lits[0].var() == var { lits[1] } else { lits[0] };
            implied.push((other, index));
        }
    }
    if implied.is_empty() {
        return None;
    }

    for (base_index, occurrence) in base_side.iter().enumerate() {
        let lits = occurrence.lits();
        if lits.len() < 3 {
            continue;
        }
        let mut binary_indices = vec![];
        let mut all_matched = true;
        for &lit in lits.iter() {
            if lit.var() == var {
                continue;
            }
            match implied.iter().find(|&&(other, _)| other == !lit) {
                Some(&(_, index)) => binary_indices.push(index),
                None => {
                    all_matched = false;
                    break;
                }
            }
        }
        if all_matched {
            return Some((vec![base_index], binary_indices));
        }
    }
    None
}

/// v <-> a XOR b over the four ternary clauses.
fn find_xor_gate(positives: &[Occurrence], negatives: &[Occurrence], var: Var) -> Option<Gate> {
    let ternaries = |side: &[Occurrence]| -> Vec<(usize, [Lit; 2])> {
        side.iter()
            .enumerate()
            .filter_map(|(index, occurrence)| {
                let lits = occurrence.lits();
                if lits.len() != 3 {
                    return None;
                }
                let mut others = lits.iter().cloned().filter(|lit| lit.var() != var);
                let a = others.next()?;
                let b = others.next()?;
                Some((index, if a.code() < b.code() { [a, b] } else { [b, a] }))
            })
            .collect()
    };

    let pos = ternaries(positives);
    let neg = ternaries(negatives);

    for &(p1, [a, b]) in pos.iter() {
        let p2 = match pos.iter().find(|&&(_, pair)| pair == [!a, !b]) {
            Some(&(index, _)) => index,
            None => continue,
        };
        let n1 = neg.iter().find(|&&(_, pair)| pair == [a, !b] || pair == [!b, a]);
        let n2 = neg.iter().find(|&&(_, pair)| pair == [!a, b] || pair == [b, !a]);
        if let (Some(&(n1, _)), Some(&(n2, _))) = (n1, n2) {
            return Some((vec![p1, p2], vec![n1, n2]));
        }
    }
    None
}

/// v <-> (c ? t : e) over the four ternary clauses.
fn find_ite_gate(positives: &[Occurrence], negatives: &[Occurrence], var: Var) -> Option<Gate> {
    // (¬v v ¬c v t), (¬v v c v e) on the negative side and the mirrored pair on the positive
    // side. Search all candidate pairs of negative ternaries sharing a complementary literal.
    let ternary = |occurrence: &Occurrence| -> Option<Vec<Lit>> {
        let lits = occurrence.lits();
        if lits.len() == 3 {
            Some(lits.iter().cloned().filter(|lit| lit.var() != var).collect())
        } else {
            None
        }
    };

    for (n1, occ_n1) in negatives.iter().enumerate() {
        let lits_n1 = match ternary(occ_n1) {
            Some(lits) => lits,
            None => continue,
        };
        for (n2, occ_n2) in negatives.iter().enumerate().skip(n1 + 1) {
            let lits_n2 = match ternary(occ_n2) {
                Some(lits) => lits,
                None => continue,
            };
            // Find the condition literal: present negated in one and positive in the other.
            for &candidate in lits_n1.iter() {
                if !lits_n2.contains(&!candidate) {
                    continue;
                }
                let t = lits_n1.iter().cloned().find(|&l| l != candidate);
                let e = lits_n2.iter().cloned().find(|&l| l != !candidate);
                let (t, e) = match (t, e) {
                    (Some(t), Some(e)) => (t, e),
                    _ => continue,
                };
                // The positive side must contain the mirrored clauses.
                let find_pos = |x: Lit, y: Lit| {
                    positives.iter().position(|occurrence| {
                        match ternary(occurrence) {
                            Some(lits) => lits.contains(&x) && lits.contains(&y),
                            None => false,
                        }
                    })
                };
                if let (Some(p1), Some(p2)) = (find_pos(candidate, !t), find_pos(!candidate, !e))
                {
                    return Some((vec![p1, p2], vec![n1, n2]));
                }
            }
        }
    }
    None
}

/// Remove a variable and all its occurrences from the live formula.
///
/// The clauses containing the witness literal are weakened to the extension stack, everything
/// else is deleted. Redundant occurrences are deleted outright.
fn remove_variable(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut OccurP,
        mut ProofP,
        mut StatsP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
    ),
    var: Var,
    witness: Lit,
    positives: &[Occurrence],
    negatives: &[Occurrence],
    redundant_p: &[Occurrence],
    redundant_n: &[Occurrence],
    status: VarStatus,
) {
    for occurrence in positives.iter().chain(negatives.iter()) {
        let is_witness_side = occurrence.lits().contains(&witness);
        match occurrence {
            &Occurrence::Long(cref, _, _) => {
                if ctx.part(ClauseAllocP).header(cref).deleted() {
                    continue;
                }
                if is_witness_side {
                    weaken_long(ctx.borrow(), cref, witness);
                } else {
                    delete_long(ctx.borrow(), cref);
                }
            }
            &Occurrence::Binary(lits, id) => {
                if ctx.part_mut(BinaryClausesP).mark_garbage(lits).is_none() {
                    continue;
                }
                if is_witness_side {
                    proof::weaken_clause(ctx.borrow(), id, &lits);
                    let (variables, mut ctx) = ctx.split_part(VariablesP);
                    let external_witness = variables.external_from_internal_lit(witness);
                    let external: Vec<Lit> = lits
                        .iter()
                        .map(|&lit| variables.external_from_internal_lit(lit))
                        .collect();
                    ctx.part_mut(ExtendP)
                        .push_record(&[external_witness], id, &external);
                } else {
                    proof::delete_clause(ctx.borrow(), id, false, &lits);
                }
            }
        }
    }

    for occurrence in redundant_p.iter().chain(redundant_n.iter()) {
        match occurrence {
            &Occurrence::Long(cref, _, _) => {
                if !ctx.part(ClauseAllocP).header(cref).deleted() {
                    delete_long(ctx.borrow(), cref);
                }
            }
            &Occurrence::Binary(lits, id) => {
                if ctx.part_mut(BinaryClausesP).mark_garbage(lits).is_some() {
                    proof::delete_clause(ctx.borrow(), id, true, &lits);
                }
            }
        }
    }

    ctx.part_mut(BinaryClausesP).flush_garbage();

    ctx.part_mut(VariablesP).set_status(var, status);
    decision::remove_var(ctx.borrow(), var);
    ctx.part_mut(StatsP).eliminated += 1;
}
