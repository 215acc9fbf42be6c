//! Unit propagation.
use partial_ref::{partial, PartialRef};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, Context, ImplGraphP, StatsP, TrailP, WatchlistsP,
};

pub mod assignment;
pub mod binary;
pub mod graph;
pub mod long;
pub mod watch;

pub use assignment::{
    backtrack, enqueue_assignment, enqueue_assignment_at, full_restart, restart, Assignment,
    ControlFrame, Trail,
};
pub use binary::{propagate_binary, BinaryClauses, BinaryWatch};
pub use graph::{Conflict, ImplGraph, ImplNode, Reason};
pub use long::propagate_long;
pub use watch::{enable_watchlists, Watch, Watchlists};

/// Propagate all enqueued assignments.
///
/// Returns the first conflict found, if any. Binary clauses propagate before the long clauses of
/// the same literal, as they can never be repaired by moving a watch.
pub fn propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
        BinaryClausesP,
    ),
) -> Result<(), Conflict> {
    debug_assert!(ctx.part(WatchlistsP).enabled());

    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        ctx.part_mut(StatsP).propagations += 1;

        propagate_binary(ctx.borrow(), lit)?;
        propagate_long(ctx.borrow(), lit)?;
    }

    Ok(())
}
