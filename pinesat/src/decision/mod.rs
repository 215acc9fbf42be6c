//! Decision heuristics.
//!
//! Two interchangeable branching schemes are kept up to date at the same time: a VMTF queue used
//! during unstable mode and an EVSIDS score heap used during stable mode. Which one picks the
//! next decision variable depends on the current search mode. The phase of the decision literal
//! follows the active phase policy.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::config::SolverConfig;
use crate::context::{
    AssignmentP, CallbacksP, ConfigP, Context, EvsidsP, ImplGraphP, PhasesP, ScheduleP, StatsP,
    TrailP, VariablesP, VmtfP,
};
use crate::phase::Phases;
use crate::prop::{enqueue_assignment, Reason};

pub mod evsids;
pub mod vmtf;

pub use evsids::Evsids;
pub use vmtf::Vmtf;

/// Reinsert a variable into the decision structures when it becomes unassigned.
pub fn make_available(mut ctx: partial!(Context, mut EvsidsP, mut VmtfP), var: Var) {
    ctx.part_mut(EvsidsP).make_available(var);
    ctx.part_mut(VmtfP).make_available(var);
}

/// Register a (re)activated variable with the decision structures.
pub fn initialize_var(mut ctx: partial!(Context, mut EvsidsP, mut VmtfP), var: Var) {
    let vmtf = ctx.part_mut(VmtfP);
    if !vmtf.contains(var) {
        vmtf.enqueue(var);
    }
    ctx.part_mut(EvsidsP).make_available(var);
}

/// Remove a variable from the decision structures.
///
/// Used when a variable leaves the formula through elimination, substitution or compaction.
pub fn remove_var(mut ctx: partial!(Context, mut EvsidsP, mut VmtfP), var: Var) {
    ctx.part_mut(VmtfP).dequeue(var);
    ctx.part_mut(EvsidsP).remove(var);
}

/// Bump a variable in both branching schemes.
pub fn bump_var(
    mut ctx: partial!(Context, mut EvsidsP, mut VmtfP, AssignmentP),
    var: Var,
) {
    ctx.part_mut(EvsidsP).bump(var);
    let assigned = ctx.part(AssignmentP).var_value(var).is_some();
    ctx.part_mut(VmtfP).bump(var, assigned);
}

/// The phase policy: forced, then target (in stable mode), then saved, then the initial phase.
pub fn decide_phase(config: &SolverConfig, phases: &Phases, stable: bool, var: Var) -> bool {
    if let Some(forced) = phases.forced(var) {
        return forced;
    }
    if config.target == 2 || (stable && config.target == 1) {
        return phases.target(var);
    }
    if config.phasesaving != 0 {
        return phases.saved(var);
    }
    config.initialphase != 0
}

/// Make a decision and enqueue it.
///
/// An external propagator gets the first say; otherwise the heuristic picks the variable and the
/// phase policy its polarity. Returns `false` if no decision was made because all variables are
/// assigned.
pub fn make_decision(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut CallbacksP,
        mut EvsidsP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        mut VmtfP,
        ConfigP,
        PhasesP,
        ScheduleP,
        VariablesP,
    ),
) -> bool {
    if let Some(lit) = external_decision(ctx.borrow()) {
        ctx.part_mut(StatsP).decisions += 1;
        ctx.part_mut(TrailP).new_decision_level(Some(lit));
        enqueue_assignment(ctx.borrow(), lit, Reason::Decision);
        return true;
    }

    let stable = ctx.part(ScheduleP).stable;

    let decision_var = if stable {
        next_from_heap(ctx.borrow())
    } else {
        let (vmtf, ctx) = ctx.split_part_mut(VmtfP);
        vmtf.next_decision(ctx.part(AssignmentP))
    };

    let decision_var = match decision_var {
        Some(var) => var,
        None => return false,
    };

    let polarity = decide_phase(
        ctx.part(ConfigP),
        ctx.part(PhasesP),
        stable,
        decision_var,
    );
    let decision = Lit::from_var(decision_var, polarity);

    ctx.part_mut(StatsP).decisions += 1;
    ctx.part_mut(TrailP).new_decision_level(Some(decision));

    enqueue_assignment(ctx.borrow(), decision, Reason::Decision);

    true
}

/// Pop unassigned variables off the score heap until a decision candidate is found.
fn next_from_heap(
    mut ctx: partial!(Context, mut EvsidsP, AssignmentP),
) -> Option<Var> {
    let (evsids, ctx) = ctx.split_part_mut(EvsidsP);
    let assignment = ctx.part(AssignmentP);
    while let Some(var) = evsids.pop() {
        if assignment.var_value(var).is_none() {
            return Some(var);
        }
    }
    None
}

/// Ask the external propagator for a decision.
fn external_decision(
    mut ctx: partial!(Context, mut CallbacksP, AssignmentP, VariablesP),
) -> Option<Lit> {
    let (callbacks, ctx) = ctx.split_part_mut(CallbacksP);
    let propagator = callbacks.propagator.as_mut()?;

    loop {
        let external = propagator.cb_decide()?;
        if let Some(internal) = ctx.part(VariablesP).internal_from_external_lit(external) {
            if ctx.part(AssignmentP).lit_value(internal).is_none() {
                return Some(internal);
            }
        }
    }
}

/// The priority the active heuristic assigns to the next fresh decision.
///
/// Used to compute the reuse-trail level during restarts: decision levels whose decision
/// variable ranks higher than this can be kept.
pub enum DecisionPriority {
    Score(f64),
    Stamp(u64),
    None,
}

pub fn next_decision_priority(
    mut ctx: partial!(Context, mut EvsidsP, mut VmtfP, AssignmentP, ScheduleP),
) -> DecisionPriority {
    if ctx.part(ScheduleP).stable {
        let (evsids, ctx) = ctx.split_part_mut(EvsidsP);
        let assignment = ctx.part(AssignmentP);
        // Clean assigned entries off the top of the heap without losing them; they are
        // reinserted on backtracking.
        loop {
            match evsids.peek() {
                Some(var) if assignment.var_value(var).is_some() => {
                    evsids.pop();
                }
                Some(var) => return DecisionPriority::Score(evsids.score(var)),
                None => return DecisionPriority::None,
            }
        }
    } else {
        let (vmtf, ctx) = ctx.split_part_mut(VmtfP);
        match vmtf.next_decision_stamp(ctx.part(AssignmentP)) {
            Some(stamp) => DecisionPriority::Stamp(stamp),
            None => DecisionPriority::None,
        }
    }
}
