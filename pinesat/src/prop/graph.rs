//! The implication graph.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use pinesat_proof::ClauseId;

use crate::clause::ClauseRef;
use crate::context::{ClauseAllocP, Context};

/// Assignments that caused a propagation.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Reason {
    /// A decision or an enqueued assumption.
    Decision,
    /// A unit clause, fixed at the root level.
    Unit { id: ClauseId },
    /// A binary clause whose other literal is false.
    Binary { other: [Lit; 1], id: ClauseId },
    /// A long clause with all literals but the propagated one false.
    Long(ClauseRef),
    /// The external propagator supplies the reason clause on demand.
    ///
    /// Materialized into a real clause before it takes part in conflict analysis.
    External,
}

impl Reason {
    /// The falsified literals that caused the propagation.
    pub fn lits<'out, 'a, 'b>(&'a self, ctx: &'b partial!('b Context, ClauseAllocP)) -> &'out [Lit]
    where
        'a: 'out,
        'b: 'out,
    {
        match self {
            Reason::Decision | Reason::Unit { .. } => &[],
            Reason::Binary { other, .. } => other,
            // The propagated literal is always kept at position 0
            Reason::Long(cref) => &ctx.part(ClauseAllocP).clause(*cref).lits()[1..],
        }
    }

    /// The id of the reason clause, if it has one.
    pub fn id(&self, ctx: &partial!(Context, ClauseAllocP)) -> Option<ClauseId> {
        match self {
            Reason::Decision | Reason::External => None,
            Reason::Unit { id } => Some(*id),
            Reason::Binary { id, .. } => Some(*id),
            Reason::Long(cref) => Some(ctx.part(ClauseAllocP).header(*cref).id()),
        }
    }

    /// Whether this assignment was made without a reason clause.
    pub fn is_decision(&self) -> bool {
        matches!(self, Reason::Decision)
    }

    /// Whether this assignment is justified by a unit clause.
    pub fn is_unit(&self) -> bool {
        matches!(self, Reason::Unit { .. })
    }
}

/// Propagation that resulted in a conflict.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Conflict {
    Binary([Lit; 2], ClauseId),
    Long(ClauseRef),
}

impl Conflict {
    /// The literals that caused the conflict.
    pub fn lits<'out, 'a, 'b>(&'a self, ctx: &'b partial!('b Context, ClauseAllocP)) -> &'out [Lit]
    where
        'a: 'out,
        'b: 'out,
    {
        match self {
            Conflict::Binary(lits, _) => lits,
            Conflict::Long(cref) => ctx.part(ClauseAllocP).clause(*cref).lits(),
        }
    }

    /// The id of the conflicting clause.
    pub fn id(&self, ctx: &partial!(Context, ClauseAllocP)) -> ClauseId {
        match self {
            Conflict::Binary(_, id) => *id,
            Conflict::Long(cref) => ctx.part(ClauseAllocP).header(*cref).id(),
        }
    }
}

/// Node and incoming edges of the implication graph.
#[derive(Copy, Clone)]
pub struct ImplNode {
    pub reason: Reason,
    pub level: u32,
    /// Position in the trail.
    pub depth: u32,
}

/// The implication graph.
///
/// This is a DAG having all assigned variables as nodes. It has unit clauses, assumptions and
/// decisions as sources. For each propagated assignment it has incoming edges from the literals
/// whose assignment caused the propagation to happen.
#[derive(Default)]
pub struct ImplGraph {
    /// Contains only valid data for indices of assigned variables.
    pub nodes: Vec<ImplNode>,
}

impl ImplGraph {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.nodes.resize(
            count,
            ImplNode {
                reason: Reason::Decision,
                level: 0,
                depth: 0,
            },
        );
    }

    /// Get the reason for an assigned variable.
    ///
    /// Returns stale data if the variable isn't assigned.
    pub fn reason(&self, var: Var) -> &Reason {
        &self.nodes[var.index()].reason
    }

    /// Get the decision level of an assigned variable.
    ///
    /// Returns stale data if the variable isn't assigned.
    pub fn level(&self, var: Var) -> usize {
        self.nodes[var.index()].level as usize
    }

    /// Get the trail depth of an assigned variable.
    ///
    /// Returns stale data if the variable isn't assigned.
    pub fn depth(&self, var: Var) -> usize {
        self.nodes[var.index()].depth as usize
    }

    /// Updates the reason for an assigned variable.
    ///
    /// Make sure the reason vars are in front of the assigned variable in the trail.
    pub fn update_reason(&mut self, var: Var, reason: Reason) {
        self.nodes[var.index()].reason = reason
    }

    /// Turns the reason of a variable into a root level unit.
    pub fn update_removed_unit(&mut self, var: Var, id: ClauseId) {
        let node = &mut self.nodes[var.index()];
        node.reason = Reason::Unit { id };
        node.level = 0;
    }
}
