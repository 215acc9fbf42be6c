//! Incremental solving: assumptions, the one-shot constraint and failed cores.
use partial_ref::{partial, split_borrow, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::context::{
    AssignmentP, ClauseAllocP, ConfigP, Context, EvsidsP, ImplGraphP, IncrementalP, PhasesP,
    ProofP, ScheduleP, TmpDataP, TrailP, VmtfP,
};
use crate::prop::{enqueue_assignment, Reason};

/// Incremental solving state.
///
/// Assumptions and the constraint hold internal literals and are consumed by the next solve
/// call. Each assumption occupies one decision level; a satisfied assumption still opens a
/// pseudo level (with no decision literal) so that levels and assumption indices stay aligned.
/// The constraint lives at pseudo-level `assumptions + 1`.
#[derive(Default)]
pub struct Incremental {
    assumptions: Vec<Lit>,
    failed_core: Vec<Lit>,
    core_chain: Vec<ClauseId>,
    assumption_levels: usize,
    constraint: Vec<Lit>,
    constraint_active: bool,
    pub constraint_failed: bool,
}

impl Incremental {
    /// Current number of decision levels used for assumptions.
    pub fn assumption_levels(&self) -> usize {
        self.assumption_levels
    }

    /// Resets assumption_levels to zero on a full restart.
    pub fn full_restart(&mut self) {
        self.assumption_levels = 0;
    }

    /// The assumptions of the pending solve call.
    pub fn assumptions(&self) -> &[Lit] {
        &self.assumptions
    }

    /// Add an assumption for the next solve call.
    pub fn assume(&mut self, lit: Lit) {
        self.assumptions.push(lit);
    }

    /// Replace the constraint of the next solve call.
    pub fn set_constraint(&mut self, lits: Vec<Lit>) {
        self.constraint = lits;
        self.constraint_active = true;
        self.constraint_failed = false;
    }

    /// The literals of the active constraint.
    pub fn constraint(&self) -> &[Lit] {
        &self.constraint
    }

    pub fn has_constraint(&self) -> bool {
        self.constraint_active && !self.constraint.is_empty()
    }

    /// Subset of assumptions that made the formula unsatisfiable.
    pub fn failed_core(&self) -> &[Lit] {
        &self.failed_core
    }

    /// Antecedents justifying the failed core.
    pub fn core_chain(&self) -> &[ClauseId] {
        &self.core_chain
    }

    /// Whether the given assumption is part of the failed core.
    pub fn is_failed(&self, lit: Lit) -> bool {
        self.failed_core.contains(&lit)
    }

    /// Rename the internal literals of the pending assumptions and constraint.
    ///
    /// Literals of removed variables are dropped; assumption variables are frozen, so this only
    /// affects stale state.
    pub fn remap_lits(&mut self, map: &impl Fn(Lit) -> Option<Lit>) {
        self.assumptions = self.assumptions.iter().filter_map(|&lit| map(lit)).collect();
        self.constraint = self.constraint.iter().filter_map(|&lit| map(lit)).collect();
        self.failed_core = self.failed_core.iter().filter_map(|&lit| map(lit)).collect();
    }

    /// Drop the outcome of the previous call before a new one starts.
    ///
    /// The failed core and the constraint flag describe one solve call; queries between calls
    /// read them, so they are cleared here rather than when the call concludes.
    pub fn start_solve(&mut self) {
        self.failed_core.clear();
        self.core_chain.clear();
        self.constraint_failed = false;
    }

    /// Drop the one-shot state after a solve call.
    pub fn reset_after_solve(&mut self) {
        self.assumptions.clear();
        self.constraint.clear();
        self.constraint_active = false;
        self.assumption_levels = 0;
    }
}

/// Return type of [`enqueue_assumption`].
pub enum EnqueueAssumption {
    Done,
    Enqueued,
    Conflict,
}

/// Enqueue another assumption if possible, then the constraint decision.
///
/// Returns whether an assumption was enqueued, whether no assumptions are left or whether the
/// assumptions result in a conflict.
pub fn enqueue_assumption(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut IncrementalP,
        mut TmpDataP,
        mut TrailP,
        ClauseAllocP,
        ConfigP,
        EvsidsP,
        PhasesP,
        ProofP,
        ScheduleP,
        VmtfP,
    ),
) -> EnqueueAssumption {
    while let Some(&assumption) = ctx
        .part(IncrementalP)
        .assumptions
        .get(ctx.part(TrailP).current_level())
    {
        match ctx.part(AssignmentP).lit_value(assumption) {
            Some(false) => {
                analyze_assumption_conflict(ctx.borrow(), assumption);
                return EnqueueAssumption::Conflict;
            }
            Some(true) => {
                // The assumption is already implied; a pseudo level keeps the level to
                // assumption alignment.
                ctx.part_mut(TrailP).new_decision_level(None);
                let level = ctx.part(TrailP).current_level();
                ctx.part_mut(IncrementalP).assumption_levels = level;
            }
            None => {
                ctx.part_mut(TrailP).new_decision_level(Some(assumption));
                enqueue_assignment(ctx.borrow(), assumption, Reason::Decision);
                let level = ctx.part(TrailP).current_level();
                ctx.part_mut(IncrementalP).assumption_levels = level;
                return EnqueueAssumption::Enqueued;
            }
        }
    }

    enqueue_constraint(ctx.borrow())
}

/// Handle the one-shot constraint clause at pseudo-level assumptions + 1.
///
/// A satisfying literal is moved to the front. Otherwise the best unassigned literal is
/// decided; when none is left the constraint fails.
fn enqueue_constraint(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut IncrementalP,
        mut TrailP,
        ConfigP,
        EvsidsP,
        PhasesP,
        ScheduleP,
        VmtfP,
    ),
) -> EnqueueAssumption {
    if !ctx.part(IncrementalP).has_constraint() {
        return EnqueueAssumption::Done;
    }

    let level = ctx.part(TrailP).current_level();
    let assumption_levels = ctx.part(IncrementalP).assumption_levels();
    if level > assumption_levels {
        // The constraint frame is already open.
        return EnqueueAssumption::Done;
    }

    // Passive satisfaction: a true literal is moved to the front.
    let satisfied_at = {
        let assignment = ctx.part(AssignmentP);
        ctx.part(IncrementalP)
            .constraint
            .iter()
            .position(|&lit| assignment.lit_is_true(lit))
    };
    if let Some(position) = satisfied_at {
        ctx.part_mut(IncrementalP).constraint.swap(0, position);
        ctx.part_mut(TrailP).new_decision_level(None);
        return EnqueueAssumption::Done;
    }

    // Decide the best unassigned literal of the constraint.
    let decision = {
        let (incremental, ctx) = ctx.split_part(IncrementalP);
        let assignment = ctx.part(AssignmentP);
        let evsids = ctx.part(EvsidsP);
        let vmtf = ctx.part(VmtfP);
        let stable = ctx.part(ScheduleP).stable;
        incremental
            .constraint
            .iter()
            .cloned()
            .filter(|&lit| assignment.lit_value(lit).is_none())
            .max_by(|&a, &b| {
                if stable {
                    evsids
                        .score(a.var())
                        .partial_cmp(&evsids.score(b.var()))
                        .unwrap_or(std::cmp::Ordering::Equal)
                } else {
                    vmtf.stamp_of(a.var()).cmp(&vmtf.stamp_of(b.var()))
                }
            })
    };

    match decision {
        Some(lit) => {
            ctx.part_mut(TrailP).new_decision_level(None);
            enqueue_assignment(ctx.borrow(), lit, Reason::Decision);
            EnqueueAssumption::Enqueued
        }
        None => {
            // The failure is the constraint's, not the assumptions'; a failed core from an
            // earlier call must not outlive this decision.
            let incremental = ctx.part_mut(IncrementalP);
            incremental.constraint_failed = true;
            incremental.failed_core.clear();
            incremental.core_chain.clear();
            EnqueueAssumption::Conflict
        }
    }
}

/// Analyze a conflict that only involves assumption levels.
///
/// All literals of the conflicting clause are at or below the assumption boundary, so instead of
/// learning a clause the incompatible subset of the assumptions is computed.
pub fn analyze_assumption_conflict_clause(
    mut ctx: partial!(
        Context,
        mut IncrementalP,
        mut TmpDataP,
        ClauseAllocP,
        ImplGraphP,
        ProofP,
        TrailP,
    ),
    conflict: crate::prop::Conflict,
) {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let (incremental, mut ctx) = ctx.split_part_mut(IncrementalP);
    let (tmp, ctx) = ctx.split_part_mut(TmpDataP);

    let needs_chain = ctx.part(ProofP).needs_antecedents();

    let flags = &mut tmp.flags;

    incremental.failed_core.clear();
    incremental.core_chain.clear();

    let mut chain: Vec<(u32, ClauseId)> = vec![];
    if needs_chain {
        chain.push((u32::max_value(), conflict.id(&lit_ctx)));
    }

    let mut flag_count = 0;
    for &lit in conflict.lits(&lit_ctx) {
        if ctx.part(ImplGraphP).level(lit.var()) == 0 {
            if needs_chain {
                if let Some(id) = ctx.part(ProofP).unit_id(lit.var()) {
                    chain.push((0, id));
                }
            }
        } else if !flags[lit.index()] {
            flags[lit.index()] = true;
            flag_count += 1;
        }
    }

    for &lit in ctx.part(TrailP).trail().iter().rev() {
        if flag_count == 0 {
            break;
        }
        if !flags[lit.index()] {
            continue;
        }
        flags[lit.index()] = false;
        flag_count -= 1;

        let reason = *ctx.part(ImplGraphP).reason(lit.var());
        match reason {
            Reason::Decision => {
                incremental.failed_core.push(lit);
            }
            Reason::Unit { id } => {
                if needs_chain {
                    chain.push((0, id));
                }
            }
            reason => {
                if needs_chain {
                    if let Some(id) = reason.id(&lit_ctx) {
                        let depth = ctx.part(ImplGraphP).depth(lit.var()) as u32;
                        chain.push((depth + 1, id));
                    }
                }
                for &reason_lit in reason.lits(&lit_ctx) {
                    if ctx.part(ImplGraphP).level(reason_lit.var()) == 0 {
                        if needs_chain {
                            if let Some(id) = ctx.part(ProofP).unit_id(reason_lit.var()) {
                                chain.push((0, id));
                            }
                        }
                    } else if !flags[reason_lit.index()] {
                        flags[reason_lit.index()] = true;
                        flag_count += 1;
                    }
                }
            }
        }
    }

    if needs_chain {
        chain.sort_unstable();
        chain.dedup();
        incremental.core_chain.extend(chain.iter().map(|&(_, id)| id));
    }
}

/// Analyze a conflicting set of assumptions.
///
/// Compute a set of incompatible assumptions given an assumption that is incompatible with the
/// assumptions enqueued so far, along with the antecedent ids justifying the incompatibility.
fn analyze_assumption_conflict(
    mut ctx: partial!(
        Context,
        mut IncrementalP,
        mut TmpDataP,
        ClauseAllocP,
        ImplGraphP,
        ProofP,
        TrailP,
    ),
    assumption: Lit,
) {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let (incremental, mut ctx) = ctx.split_part_mut(IncrementalP);
    let (tmp, ctx) = ctx.split_part_mut(TmpDataP);

    let needs_chain = ctx.part(ProofP).needs_antecedents();

    let flags = &mut tmp.flags;

    incremental.failed_core.clear();
    incremental.failed_core.push(assumption);
    incremental.core_chain.clear();

    let mut chain: Vec<(u32, ClauseId)> = vec![];

    // The reason chain of the falsified assumption itself.
    if needs_chain {
        let reason = ctx.part(ImplGraphP).reason(assumption.var());
        if let Some(id) = reason.id(&lit_ctx) {
            let depth = ctx.part(ImplGraphP).depth(assumption.var()) as u32;
            chain.push((depth + 1, id));
        }
    }

    flags[assumption.index()] = true;
    let mut flag_count = 1;

    for &lit in ctx.part(TrailP).trail().iter().rev() {
        if flags[lit.index()] {
            flags[lit.index()] = false;
            flag_count -= 1;

            let reason = *ctx.part(ImplGraphP).reason(lit.var());
            match reason {
                Reason::Decision => {
                    if ctx.part(ImplGraphP).level(lit.var()) > 0 {
                        incremental.failed_core.push(lit);
                    }
                }
                Reason::Unit { id } => {
                    if needs_chain {
                        chain.push((0, id));
                    }
                }
                reason => {
                    if needs_chain {
                        if let Some(id) = reason.id(&lit_ctx) {
                            let depth = ctx.part(ImplGraphP).depth(lit.var()) as u32;
                            chain.push((depth + 1, id));
                        }
                    }
                    for &reason_lit in reason.lits(&lit_ctx) {
                        if ctx.part(ImplGraphP).level(reason_lit.var()) == 0 {
                            if needs_chain {
                                if let Some(id) = ctx.part(ProofP).unit_id(reason_lit.var()) {
                                    chain.push((0, id));
                                }
                            }
                        } else if !flags[reason_lit.index()] {
                            flags[reason_lit.index()] = true;
                            flag_count += 1;
                        }
                    }
                }
            }

            if flag_count == 0 {
                break;
            }
        }
    }

    if needs_chain {
        chain.sort_unstable();
        chain.dedup();
        incremental.core_chain.extend(chain.iter().map(|&(_, id)| id));
    }
}
