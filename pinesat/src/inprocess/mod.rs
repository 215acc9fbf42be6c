//! Inprocessing: interleaved formula simplification.
//!
//! Triggered between restarts after enough conflicts accumulated. One round runs the passes in
//! a fixed order, each bounded by a tick budget derived from the work done since its last
//! invocation. The terminator is polled between passes; a termination request aborts the
//! remainder of the round. Occurrence lists are switched on around the occurrence based passes
//! and the watchlists are rebuilt afterwards.

use partial_ref::{partial, PartialRef};

use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, CallbacksP, ClauseAllocP, ClauseDbP, ConfigP,
    Context, EvsidsP, ExtendP, ImplGraphP, IncrementalP, OccurP, PhasesP, ProofP, ScheduleP,
    SolverStateP, StatsP, TmpDataP, TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::external::should_terminate;
use crate::prop::{enable_watchlists, full_restart, propagate};
use crate::simplify::{prove_units, simplify};
use crate::state::SatState;

pub mod occur;
pub(crate) mod util;

mod block;
mod compact;
mod congruence;
mod decompose;
mod dedup;
mod elim;
mod factor;
mod probe;
mod sweep;
mod ternary;
mod transred;
mod vivify;

pub use occur::{enter_occurrence_mode, leave_occurrence_mode, OccurLists};

/// Run an inprocessing round when the conflict schedule asks for one.
pub fn maybe_inprocess(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut ImplGraphP,
        mut IncrementalP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut ScheduleP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    let conflicts = ctx.part(StatsP).conflicts;
    if conflicts < ctx.part(ScheduleP).next_inprocess {
        return;
    }

    let interval = ctx.part(ConfigP).inprocessint as u64;
    let schedule = ctx.part_mut(ScheduleP);
    schedule.inprocess_count += 1;
    let count = schedule.inprocess_count;
    schedule.next_inprocess = conflicts + interval * count;

    inprocess_round(ctx.borrow());
}

/// One full inprocessing round.
pub fn inprocess_round(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CallbacksP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ExtendP,
        mut ImplGraphP,
        mut IncrementalP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut ScheduleP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    ctx.part_mut(StatsP).inprocessings += 1;

    // Inprocessing happens at the root; assumptions are re-enqueued afterwards by the search.
    full_restart(ctx.borrow());

    if !settle(ctx.borrow()) {
        return;
    }

    let config = ctx.part(ConfigP);
    let decompose_rounds = config.decomposerounds;

    macro_rules! pass {
        ($body:expr) => {
            if ctx.part(SolverStateP).sat_state != SatState::Unknown {
                return;
            }
            if should_terminate(ctx.borrow()) {
                ctx.part_mut(SolverStateP).terminated = true;
                return;
            }
            $body;
            if !settle(ctx.borrow()) {
                return;
            }
        };
    }

    if ctx.part(ConfigP).dedup != 0 {
        pass!(dedup::dedup_binaries(ctx.borrow()));
    }

    if ctx.part(ConfigP).decompose != 0 {
        for _ in 0..decompose_rounds {
            pass!({
                if !decompose::decompose(ctx.borrow()) {
                    break;
                }
            });
        }
    }

    pass!(ternary::ternary(ctx.borrow()));

    {
        enable_watchlists(ctx.borrow());
        pass!(probe::probe(ctx.borrow()));
    }

    pass!(transred::transitive_reduction(ctx.borrow()));

    // Settling after a pass can switch back to the watchlists, so each occurrence based pass
    // re-enters occurrence mode itself.
    pass!({
        enter_occurrence_mode(ctx.borrow());
        elim::eliminate(ctx.borrow());
    });
    leave_occurrence_mode(ctx.borrow());

    {
        enable_watchlists(ctx.borrow());
        pass!(vivify::vivify(ctx.borrow()));
    }

    pass!({
        enter_occurrence_mode(ctx.borrow());
        factor::factor(ctx.borrow());
    });
    pass!({
        enter_occurrence_mode(ctx.borrow());
        congruence::congruence(ctx.borrow());
    });
    pass!({
        enter_occurrence_mode(ctx.borrow());
        sweep::sweep(ctx.borrow());
    });
    pass!({
        enter_occurrence_mode(ctx.borrow());
        block::block(ctx.borrow());
    });
    leave_occurrence_mode(ctx.borrow());

    compact::maybe_compact(ctx.borrow());

    enable_watchlists(ctx.borrow());
}

/// Propagate and simplify after a pass, leaving a clean root state.
///
/// Returns false when the formula became unsatisfiable.
fn settle(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        mut EvsidsP,
        mut PhasesP,
        mut VmtfP,
        mut OccurP,
        ConfigP,
    ),
) -> bool {
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return false;
    }

    if ctx.part(TrailP).fully_propagated() {
        return true;
    }

    if ctx.part(OccurP).active() {
        // No watch based propagation in occurrence mode; switch back first.
        leave_occurrence_mode(ctx.borrow());
    }
    enable_watchlists(ctx.borrow());

    if let Err(conflict) = propagate(ctx.borrow()) {
        // A root level conflict: derive the empty clause through the conflict's reason chain.
        let (seeds, conflict_id) = {
            use partial_ref::split_borrow;
            split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
            let seeds: Vec<pinesat_formula::Lit> = conflict.lits(&lit_ctx).to_vec();
            (seeds, conflict.id(&lit_ctx))
        };
        let chain = util::collect_chain(ctx.borrow(), &seeds, Some(conflict_id));
        let id = crate::proof::add_derived_clause(ctx.borrow(), false, &[], &chain);
        crate::proof::begin_unsat_proof(ctx.borrow(), id);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        ctx.part_mut(SolverStateP).formula_unsat = true;
        return false;
    }

    if prove_units(ctx.borrow()) {
        simplify(ctx.borrow());
    }

    true
}
