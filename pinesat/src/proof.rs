//! Proof event fan-out.
//!
//! The engine produces clause events in terms of internal literals; this module externalizes
//! them and forwards them to every attached tracer. Clause ids are allocated here, strictly
//! increasing over original and derived clauses alike. For every root level unit the id of its
//! unit clause is remembered, so that antecedent chains can reference it.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use pinesat_proof::{ClauseId, Conclusion, Status, Tracer};

use crate::context::{Context, ProofP, VariablesP};
use crate::varmap::Variables;

/// Proof tracing state.
#[derive(Default)]
pub struct Proof {
    tracers: Vec<Box<dyn Tracer>>,
    next_id: ClauseId,
    needs_antecedents: bool,
    /// Id of the unit clause fixing a variable at the root level, by internal variable index.
    unit_ids: Vec<Option<ClauseId>>,
    /// Scratch buffer for externalized literals.
    ext_lits: Vec<Lit>,
    /// Id of the derived empty clause, once derived.
    pub empty_clause: Option<ClauseId>,
}

impl Proof {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        if self.unit_ids.len() < count {
            self.unit_ids.resize(count, None);
        }
    }

    /// Attach a tracer receiving all future clause events.
    pub fn add_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.needs_antecedents |= tracer.needs_antecedents();
        self.tracers.push(tracer);
    }

    /// Whether any tracer is attached.
    pub fn is_active(&self) -> bool {
        !self.tracers.is_empty()
    }

    /// Whether derived clauses must carry antecedent chains.
    pub fn needs_antecedents(&self) -> bool {
        self.needs_antecedents
    }

    /// Allocate the next clause id.
    pub fn new_clause_id(&mut self) -> ClauseId {
        self.next_id += 1;
        self.next_id
    }

    /// The id of the unit clause fixing this variable, if it is fixed.
    pub fn unit_id(&self, var: Var) -> Option<ClauseId> {
        self.unit_ids.get(var.index()).cloned().flatten()
    }

    pub fn set_unit_id(&mut self, var: Var, id: ClauseId) {
        if self.unit_ids.len() <= var.index() {
            self.unit_ids.resize(var.index() + 1, None);
        }
        self.unit_ids[var.index()] = Some(id);
    }

    /// Drop all unit clause ids for a compaction; the caller re-registers the kept ones.
    pub fn reset_unit_ids(&mut self, count: usize) {
        self.unit_ids = vec![None; count];
    }


    /// Remove all tracers, flushing them first.
    pub fn take_tracers(&mut self) -> Vec<Box<dyn Tracer>> {
        for tracer in self.tracers.iter_mut() {
            tracer.flush();
        }
        self.needs_antecedents = false;
        std::mem::replace(&mut self.tracers, vec![])
    }

    /// Externalize `lits` and pass them to every tracer.
    fn fan_out(
        &mut self,
        variables: &Variables,
        lits: &[Lit],
        mut event: impl FnMut(&mut dyn Tracer, &[Lit]),
    ) {
        self.ext_lits.clear();
        for &lit in lits {
            self.ext_lits
                .push(variables.external_from_internal_lit(lit));
        }
        let ext = std::mem::replace(&mut self.ext_lits, vec![]);
        for tracer in self.tracers.iter_mut() {
            event(tracer.as_mut(), &ext);
        }
        self.ext_lits = ext;
    }
}

/// Emit an original clause (input or restored) and return its id.
pub fn add_original_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    lits: &[Lit],
    restored: bool,
) -> ClauseId {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    let id = proof.new_clause_id();
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.add_original_clause(id, false, ext, restored)
        });
    }
    id
}

/// Emit a clause restored from the extension stack under its original id.
pub fn add_restored_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    id: ClauseId,
    lits: &[Lit],
) {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.add_original_clause(id, false, ext, true)
        });
    }
}

/// Emit a derived clause and return its id.
pub fn add_derived_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    redundant: bool,
    lits: &[Lit],
    antecedents: &[ClauseId],
) -> ClauseId {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    let id = proof.new_clause_id();
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.add_derived_clause(id, redundant, ext, antecedents)
        });
    }
    if lits.is_empty() && proof.empty_clause.is_none() {
        proof.empty_clause = Some(id);
    }
    id
}

/// Emit a clause deletion.
pub fn delete_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    id: ClauseId,
    redundant: bool,
    lits: &[Lit],
) {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.delete_clause(id, redundant, ext)
        });
    }
}

/// Emit a weakening: the clause moves to the extension stack.
pub fn weaken_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    id: ClauseId,
    lits: &[Lit],
) {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.weaken_minus(id, ext)
        });
    }
}

/// Report an incremental solve call.
pub fn solve_query(mut ctx: partial!(Context, mut ProofP)) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.solve_query();
    }
}

/// Report an assumption of the next solve call.
pub fn add_assumption(mut ctx: partial!(Context, mut ProofP, VariablesP), lit: Lit) {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        let external = ctx.part(VariablesP).external_from_internal_lit(lit);
        for tracer in proof.tracers.iter_mut() {
            tracer.add_assumption(external);
        }
    }
}

/// Report the one-shot constraint of the next solve call.
pub fn add_constraint(mut ctx: partial!(Context, mut ProofP, VariablesP), lits: &[Lit]) {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.add_constraint(ext)
        });
    }
}

/// Report the clause over the negated failed assumptions and return its id.
pub fn add_assumption_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    lits: &[Lit],
    antecedents: &[ClauseId],
) -> ClauseId {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    let id = proof.new_clause_id();
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.add_assumption_clause(id, ext, antecedents)
        });
    }
    id
}

/// Report that the assumptions and constraint of the last call are dropped.
pub fn reset_assumptions(mut ctx: partial!(Context, mut ProofP)) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.reset_assumptions();
    }
}

/// Report a satisfiable conclusion with the model in external encoding.
pub fn conclude_sat(mut ctx: partial!(Context, mut ProofP), model: &[Lit]) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.report_status(Status::Satisfiable, 0);
        tracer.conclude_sat(model);
    }
}

/// Report an unsatisfiable conclusion.
pub fn conclude_unsat(
    mut ctx: partial!(Context, mut ProofP),
    conclusion: Conclusion,
    ids: &[ClauseId],
) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.report_status(Status::Unsatisfiable, ids.first().cloned().unwrap_or(0));
        tracer.conclude_unsat(conclusion, ids);
    }
}

/// Report an aborted solve call.
pub fn conclude_unknown(mut ctx: partial!(Context, mut ProofP)) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.report_status(Status::Unknown, 0);
        tracer.conclude_unknown();
    }
}

/// Report the derivation of the empty clause.
pub fn begin_unsat_proof(mut ctx: partial!(Context, mut ProofP), id: ClauseId) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.begin_proof(id);
    }
}

/// Finalize a clause that is still live when the proof ends.
pub fn finalize_clause(
    mut ctx: partial!(Context, mut ProofP, VariablesP),
    id: ClauseId,
    lits: &[Lit],
) {
    let (proof, ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        proof.fan_out(ctx.part(VariablesP), lits, |tracer, ext| {
            tracer.finalize_clause(id, ext)
        });
    }
}

/// Flush all attached tracers.
pub fn flush(mut ctx: partial!(Context, mut ProofP)) {
    for tracer in ctx.part_mut(ProofP).tracers.iter_mut() {
        tracer.flush();
    }
}
