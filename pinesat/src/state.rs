//! Miscellaneous solver state.

/// Satisfiability state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SatState {
    Unknown,
    Sat,
    Unsat,
    UnsatUnderAssumptions,
}

impl Default for SatState {
    fn default() -> SatState {
        SatState::Unknown
    }
}

/// Miscellaneous solver state.
///
/// Anything larger or any larger group of related state variables should be moved into a separate
/// part of [`Context`](crate::context::Context).
#[derive(Default)]
pub struct SolverState {
    pub sat_state: SatState,
    /// Set when the empty clause was derived; never reset.
    pub formula_unsat: bool,
    /// Set when the search was aborted by the terminator callback.
    pub terminated: bool,
}

impl SolverState {
    /// Reset the per-solve state for a new incremental call.
    ///
    /// A derived empty clause is permanent, everything else starts over.
    pub fn start_solve(&mut self) {
        self.terminated = false;
        if self.formula_unsat {
            self.sat_state = SatState::Unsat;
        } else {
            self.sat_state = SatState::Unknown;
        }
    }
}
