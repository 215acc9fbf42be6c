//! Phase records used to pick the polarity of decisions.
//!
//! Several phase records are kept per variable: the saved phase (last assigned value), the
//! target phases (largest conflict-free trail seen in the current stable phase), the best phases
//! (largest conflict-free trail ever), a forced phase set through the API, and the min phases
//! (assignment with the fewest unsatisfied clauses found by local search).

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::context::{Context, PhasesP, TrailP};

/// Per-variable phase records.
#[derive(Default)]
pub struct Phases {
    saved: Vec<bool>,
    target: Vec<bool>,
    best: Vec<bool>,
    min: Vec<bool>,
    forced: Vec<Option<bool>>,
    /// Trail size that produced the current target phases.
    pub target_size: usize,
    /// Trail size that produced the current best phases.
    pub best_size: usize,
    /// Number of unsatisfied clauses of the min phases, if local search ran.
    pub min_unsat: Option<usize>,
}

impl Phases {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize, initial: bool) {
        self.saved.resize(count, initial);
        self.target.resize(count, initial);
        self.best.resize(count, initial);
        self.min.resize(count, initial);
        self.forced.resize(count, None);
    }

    /// Record the phase of an assigned literal when it is unassigned.
    pub fn save(&mut self, lit: Lit) {
        self.saved[lit.index()] = lit.is_positive();
    }

    pub fn saved(&self, var: Var) -> bool {
        self.saved[var.index()]
    }

    pub fn set_saved(&mut self, var: Var, phase: bool) {
        self.saved[var.index()] = phase;
    }

    pub fn target(&self, var: Var) -> bool {
        self.target[var.index()]
    }

    pub fn set_target_raw(&mut self, var: Var, phase: bool) {
        self.target[var.index()] = phase;
    }

    pub fn set_best_raw(&mut self, var: Var, phase: bool) {
        self.best[var.index()] = phase;
    }

    pub fn best(&self, var: Var) -> bool {
        self.best[var.index()]
    }

    pub fn min(&self, var: Var) -> bool {
        self.min[var.index()]
    }

    pub fn set_min(&mut self, var: Var, phase: bool) {
        self.min[var.index()] = phase;
    }

    pub fn forced(&self, var: Var) -> Option<bool> {
        self.forced[var.index()]
    }

    /// Force the phase of a variable, as requested through the API.
    pub fn set_forced(&mut self, var: Var, phase: Option<bool>) {
        self.forced[var.index()] = phase;
    }

    /// Reset the target phases for a new stable phase.
    pub fn clear_target(&mut self) {
        self.target_size = 0;
    }
}

/// Update the target and best phases after conflict-free propagation.
///
/// Called with a fully propagated trail. When the trail is larger than the previous record the
/// assigned values become the new target (and possibly best) phases.
pub fn update_target_and_best(
    mut ctx: partial!(Context, mut PhasesP, TrailP),
    stable: bool,
) {
    if !stable {
        return;
    }

    let (phases, ctx) = ctx.split_part_mut(PhasesP);
    let trail = ctx.part(TrailP);

    let assigned = trail.trail().len();

    if assigned > phases.target_size {
        phases.target_size = assigned;
        for &lit in trail.trail() {
            phases.target[lit.index()] = lit.is_positive();
        }
    }

    if assigned > phases.best_size {
        phases.best_size = assigned;
        for &lit in trail.trail() {
            phases.best[lit.index()] = lit.is_positive();
        }
    }
}
