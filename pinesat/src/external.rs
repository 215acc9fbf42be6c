//! External callbacks: termination and the external propagator.
//!
//! Both are synchronous. The terminator is polled at the top of long loops; the external
//! propagator is called back from the propagation loop and at model-found points. All literals
//! crossing this boundary use the external encoding.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use crate::context::{CallbacksP, Context};

/// External propagator plug-in.
///
/// All methods default to "no contribution" so implementations only override the callbacks they
/// use. Mutations requested by a callback take effect before the engine continues.
pub trait ExternalPropagate {
    /// Whether reasons are only provided on demand during conflict analysis.
    fn is_lazy(&self) -> bool {
        false
    }

    /// Whether reason clauses may be dropped again once used.
    fn are_reasons_forgettable(&self) -> bool {
        false
    }

    /// The next literal propagated by the external component, if any.
    fn cb_propagate(&mut self) -> Option<Lit> {
        None
    }

    /// Stream the reason clause of an external propagation, one literal per call.
    ///
    /// `None` terminates the clause. The propagated literal must be part of the clause.
    fn cb_add_reason_clause_lit(&mut self, _propagated: Lit) -> Option<Lit> {
        None
    }

    /// Whether the propagator has a clause to add.
    fn cb_has_external_clause(&mut self) -> bool {
        false
    }

    /// Stream the next external clause, one literal per call; `None` terminates it.
    fn cb_add_external_clause_lit(&mut self) -> Option<Lit> {
        None
    }

    /// Suggest a decision literal.
    fn cb_decide(&mut self) -> Option<Lit> {
        None
    }

    /// Check a full assignment. Returning false asks the engine to continue searching, usually
    /// after providing an external clause.
    fn cb_check_found_model(&mut self, _model: &[Lit]) -> bool {
        true
    }
}

/// Externally injected callbacks.
#[derive(Default)]
pub struct Callbacks {
    pub terminator: Option<Box<dyn FnMut() -> bool>>,
    pub propagator: Option<Box<dyn ExternalPropagate>>,
    /// Backtrack request issued by the external propagator.
    pub requested_backtrack: Option<usize>,
}

impl Callbacks {
    /// Request a forced backtrack to the given decision level.
    pub fn force_backtrack(&mut self, level: usize) {
        self.requested_backtrack = Some(match self.requested_backtrack {
            Some(previous) => previous.min(level),
            None => level,
        });
    }
}

/// Poll the terminator callback.
pub fn should_terminate(mut ctx: partial!(Context, mut CallbacksP)) -> bool {
    match &mut ctx.part_mut(CallbacksP).terminator {
        Some(terminator) => terminator(),
        None => false,
    }
}
