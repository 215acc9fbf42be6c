//! Solver statistics.

/// Counters updated all over the solver.
///
/// Ticks are the unit of work accounting: one tick per watch list entry visited during
/// propagation and one per clause or edge visited in the inprocessing passes. All inprocessing
/// budgets are expressed in ticks.
#[derive(Default)]
pub struct Stats {
    pub conflicts: u64,
    pub decisions: u64,
    pub propagations: u64,
    pub ticks: u64,
    pub restarts: u64,
    pub reused_trails: u64,
    pub reductions: u64,
    pub flushed: u64,
    pub mode_switches: u64,

    pub learned_units: u64,
    pub learned_binary: u64,
    pub learned_long: u64,
    pub minimized_lits: u64,
    pub shrunken_lits: u64,
    pub otf_subsumed: u64,
    pub otf_strengthened: u64,

    pub rephased_best: u64,
    pub rephased_target: u64,
    pub rephased_inverted: u64,
    pub rephased_original: u64,
    pub rephased_flipped: u64,
    pub rephased_random: u64,
    pub rephased_walk: u64,
    pub walk_improved: u64,

    pub inprocessings: u64,
    pub deduplicated: u64,
    pub hyper_unary: u64,
    pub substituted: u64,
    pub probed: u64,
    pub failed_literals: u64,
    pub hyper_binary: u64,
    pub transitive_reduced: u64,
    pub ternary_resolvents: u64,
    pub eliminated: u64,
    pub elim_gates: u64,
    pub vivified_strengthened: u64,
    pub vivified_subsumed: u64,
    pub vivify_reused_prefix: u64,
    pub factored: u64,
    pub congruent_merged: u64,
    pub swept_backbones: u64,
    pub swept_equivalences: u64,
    pub blocked: u64,
    pub restored: u64,
    pub compactions: u64,
}

impl Stats {
    /// Log a one line progress report.
    pub fn report(&self, irredundant: usize, redundant: usize, vars: usize) {
        log::info!(
            "confl: {}k rest: {} vars: {} irr: {} red: {} ticks: {}M",
            self.conflicts / 1000,
            self.restarts,
            vars,
            irredundant,
            redundant,
            self.ticks / 1_000_000,
        );
    }

    /// Log the end-of-solve statistics summary.
    pub fn summarize(&self) {
        log::info!(
            "conflicts: {} decisions: {} propagations: {}",
            self.conflicts,
            self.decisions,
            self.propagations
        );
        log::info!(
            "restarts: {} (reused: {}) reductions: {} mode switches: {}",
            self.restarts,
            self.reused_trails,
            self.reductions,
            self.mode_switches
        );
        log::info!(
            "eliminated: {} substituted: {} failed: {} vivified: {} blocked: {}",
            self.eliminated,
            self.substituted,
            self.failed_literals,
            self.vivified_strengthened + self.vivified_subsumed,
            self.blocked
        );
    }
}
