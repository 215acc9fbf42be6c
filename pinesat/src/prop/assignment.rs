//! Partial assignment, trail and control stack.
use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::context::{
    AssignmentP, Context, EvsidsP, ImplGraphP, IncrementalP, PhasesP, TrailP, VmtfP,
};
use crate::decision::make_available;

use super::Reason;

/// Current partial assignment.
#[derive(Default)]
pub struct Assignment {
    assignment: Vec<Option<bool>>,
}

/// This compares two `Option<bool>` values as bytes. Workaround for bad code generation.
pub fn fast_option_eq(a: Option<bool>, b: Option<bool>) -> bool {
    unsafe { std::mem::transmute::<_, u8>(a) == std::mem::transmute::<_, u8>(b) }
}

impl Assignment {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.assignment.resize(count, None);
    }

    /// Current partial assignment as slice.
    pub fn assignment(&self) -> &[Option<bool>] {
        &self.assignment
    }

    /// Value assigned to a variable.
    pub fn var_value(&self, var: Var) -> Option<bool> {
        self.assignment[var.index()]
    }

    /// Value assigned to a literal.
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.index()].map(|b| b ^ lit.is_negative())
    }

    pub fn lit_is_true(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], Some(lit.is_positive()))
    }

    pub fn lit_is_false(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], Some(lit.is_negative()))
    }

    pub fn lit_is_unk(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], None)
    }

    pub fn assign_lit(&mut self, lit: Lit) {
        self.assignment[lit.index()] = lit.is_positive().into()
    }

    pub fn unassign_var(&mut self, var: Var) {
        self.assignment[var.index()] = None;
    }

    /// Set the value of a variable directly.
    pub fn set_var(&mut self, var: Var, value: Option<bool>) {
        self.assignment[var.index()] = value;
    }
}

/// One frame of the control stack.
///
/// The decision is `None` for pseudo-decision levels opened for satisfied assumption or
/// constraint frames.
#[derive(Copy, Clone, Debug)]
pub struct ControlFrame {
    pub decision: Option<Lit>,
    pub trail_offset: usize,
}

/// Decision and propagation history.
pub struct Trail {
    /// Stack of all propagated and all enqueued assignments
    trail: Vec<Lit>,
    /// Next assignment in trail to propagate
    queue_head_pos: usize,
    /// One frame per decision level, including the root level at index 0.
    control: Vec<ControlFrame>,
    /// Number of unit clauses removed from the trail.
    units_removed: usize,
    /// Whether some assignment on the trail is below its decision level frame.
    pub out_of_order: bool,
}

impl Default for Trail {
    fn default() -> Trail {
        Trail {
            trail: vec![],
            queue_head_pos: 0,
            control: vec![ControlFrame {
                decision: None,
                trail_offset: 0,
            }],
            units_removed: 0,
            out_of_order: false,
        }
    }
}

impl Trail {
    /// Return the next assigned literal to propagate.
    pub fn queue_head(&self) -> Option<Lit> {
        self.trail.get(self.queue_head_pos).cloned()
    }

    /// Return the next assigned literal to propagate and remove it from the queue.
    pub fn pop_queue(&mut self) -> Option<Lit> {
        let head = self.queue_head();
        if head.is_some() {
            self.queue_head_pos += 1;
        }
        head
    }

    /// Re-enqueue all assigned literals.
    pub fn reset_queue(&mut self) {
        self.queue_head_pos = 0;
    }

    /// Assigned literals in assignment order.
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    /// The control stack frames, one per level.
    pub fn control(&self) -> &[ControlFrame] {
        &self.control
    }

    /// Clear the trail.
    ///
    /// This simply removes all entries without performing any backtracking. Can only be called
    /// with no active decisions.
    pub fn clear(&mut self) {
        assert!(self.control.len() == 1);
        self.units_removed += self.trail.len();
        self.trail.clear();
        self.queue_head_pos = 0;
    }

    /// Start a new decision level.
    ///
    /// Does not enqueue the decision itself; a pseudo-decision level has no decision literal.
    pub fn new_decision_level(&mut self, decision: Option<Lit>) {
        self.control.push(ControlFrame {
            decision,
            trail_offset: self.trail.len(),
        })
    }

    /// Current decision level.
    pub fn current_level(&self) -> usize {
        self.control.len() - 1
    }

    /// The number of assignments at level 0.
    pub fn top_level_assignment_count(&self) -> usize {
        self.control
            .get(1)
            .map(|frame| frame.trail_offset)
            .unwrap_or(self.trail.len())
            + self.units_removed
    }

    /// Whether all assignments are processed.
    pub fn fully_propagated(&self) -> bool {
        self.queue_head_pos == self.trail.len()
    }

    pub(crate) fn push_lit(&mut self, lit: Lit) -> usize {
        self.trail.push(lit);
        self.trail.len() - 1
    }
}

/// Enqueues the assignment of true to a literal at the current decision level.
///
/// This updates the assignment and trail, but does not perform any propagation. The literal has
/// to be unassigned when calling this.
pub fn enqueue_assignment(
    mut ctx: partial!(Context, mut AssignmentP, mut ImplGraphP, mut TrailP),
    lit: Lit,
    reason: Reason,
) {
    let level = ctx.part(TrailP).current_level();
    enqueue_assignment_at(ctx.borrow(), lit, reason, level);
}

/// Enqueues the assignment of true to a literal at an explicit decision level.
///
/// With chronological backtracking the given level may be below the current decision level,
/// producing an out-of-order trail entry.
pub fn enqueue_assignment_at(
    mut ctx: partial!(Context, mut AssignmentP, mut ImplGraphP, mut TrailP),
    lit: Lit,
    reason: Reason,
    level: usize,
) {
    let assignment = ctx.part_mut(AssignmentP);
    debug_assert!(assignment.lit_value(lit) == None);

    assignment.assign_lit(lit);

    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    if level < trail.current_level() {
        trail.out_of_order = true;
    }

    let depth = trail.push_lit(lit);

    let node = &mut ctx.part_mut(ImplGraphP).nodes[lit.index()];
    node.reason = reason;
    node.level = level as u32;
    node.depth = depth as u32;
}

/// Undo all assignments in decision levels deeper than the given level.
///
/// Out-of-order assignments at or below the target level are kept and compacted to the front, so
/// that chronological backtracking does not lose them.
pub fn backtrack(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut TrailP,
        mut VmtfP,
    ),
    level: usize,
) {
    let (assignment, mut ctx) = ctx.split_part_mut(AssignmentP);
    let (phases, mut ctx) = ctx.split_part_mut(PhasesP);
    let (impl_graph, mut ctx) = ctx.split_part_mut(ImplGraphP);
    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    if level == trail.current_level() {
        return;
    }
    debug_assert!(level < trail.current_level());

    let cut = trail.control[level + 1].trail_offset;
    trail.control.truncate(level + 1);

    let mut write = cut;
    for read in cut..trail.trail.len() {
        let lit = trail.trail[read];
        if impl_graph.level(lit.var()) <= level {
            // Keep an out-of-order assignment, moving it down the trail.
            impl_graph.nodes[lit.index()].depth = write as u32;
            trail.trail[write] = lit;
            write += 1;
        } else {
            make_available(ctx.borrow(), lit.var());
            phases.save(lit);
            assignment.unassign_var(lit.var());
        }
    }
    trail.trail.truncate(write);
    trail.queue_head_pos = cut;
    if write == cut {
        trail.out_of_order = false;
    }
}

/// Undo all decisions and assumptions.
pub fn full_restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut EvsidsP,
        mut ImplGraphP,
        mut IncrementalP,
        mut PhasesP,
        mut TrailP,
        mut VmtfP,
    ),
) {
    ctx.part_mut(IncrementalP).full_restart();
    backtrack(ctx.borrow(), 0);
}

/// Undo all decisions.
pub fn restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut TrailP,
        mut VmtfP,
        IncrementalP
    ),
    keep_levels: usize,
) {
    let level = ctx.part(IncrementalP).assumption_levels() + keep_levels;
    if level < ctx.part(TrailP).current_level() {
        backtrack(ctx.borrow(), level);
    }
}
