//! Scheduling of solving and inprocessing steps.
use partial_ref::{partial, PartialRef};

use crate::cdcl::conflict_step;
use crate::clause::reduce::maybe_reduce;
use crate::clause::Tier;
use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, CallbacksP, ClauseAllocP, ClauseDbP, ConfigP,
    Context, EvsidsP, ExtendP, ImplGraphP, IncrementalP, OccurP, PhasesP, ProofP, ScheduleP,
    SolverStateP, StatsP, TmpDataP, TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::external::should_terminate;
use crate::inprocess::maybe_inprocess;
use crate::prop::enable_watchlists;
use crate::rephase::maybe_rephase;
use crate::restart::{maybe_restart, maybe_switch_mode, Ema};
use crate::state::SatState;

mod luby;

pub use luby::LubySequence;

/// Tick marks remembering when each inprocessing pass ran last.
///
/// The budget of a pass is the number of ticks spent since its last invocation scaled by the
/// pass's relative effort option.
#[derive(Default)]
pub struct PassTicks {
    pub ternary: u64,
    pub probe: u64,
    pub transred: u64,
    pub elim: u64,
    pub vivify: u64,
    pub factor: u64,
    pub sweep: u64,
    pub block: u64,
    pub walk: u64,
}

/// The budget for a pass given its effort in per mille of the ticks spent since it last ran.
pub fn effort_limit(ticks: u64, last: u64, effort_permille: i64) -> u64 {
    let delta = ticks.saturating_sub(last).max(1 << 10);
    delta * effort_permille as u64 / 1000
}

/// Scheduling state for search and inprocessing.
pub struct Schedule {
    /// Whether the search is in stable mode.
    pub stable: bool,
    pub mode_budget: u64,
    pub mode_start_ticks: u64,

    pub next_restart: u64,
    pub last_restart_conflicts: u64,
    pub luby_restart: LubySequence,
    pub fast_glue: Ema,
    pub slow_glue: Ema,

    pub next_reduce: u64,
    pub reduce_count: u64,
    pub luby_reduce: LubySequence,

    pub next_rephase: u64,
    pub rephase_count: u64,

    pub next_inprocess: u64,
    pub inprocess_count: u64,
    /// Completed sweeping runs; the sweeping limits grow with this.
    pub sweep_completions: u64,

    pub pass_ticks: PassTicks,
}

impl Default for Schedule {
    fn default() -> Schedule {
        Schedule {
            stable: false,
            mode_budget: 0,
            mode_start_ticks: 0,

            next_restart: 0,
            last_restart_conflicts: 0,
            luby_restart: LubySequence::default(),
            // Common Glucose-style smoothing windows for the fast and slow averages.
            fast_glue: Ema::new(1.0 / 32.0),
            slow_glue: Ema::new(1.0 / 16384.0),

            next_reduce: 0,
            reduce_count: 0,
            luby_reduce: LubySequence::default(),

            next_rephase: 0,
            next_inprocess: 0,
            rephase_count: 0,
            inprocess_count: 0,
            sweep_completions: 0,

            pass_ticks: PassTicks::default(),
        }
    }
}

/// Perform one step of the schedule.
///
/// Returns false when the solver reached a final state or was asked to terminate.
pub fn schedule_step(
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
) -> bool {
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return false;
    }

    if should_terminate(ctx.borrow()) {
        ctx.part_mut(SolverStateP).terminated = true;
        return false;
    }

    {
        let stats = ctx.part(StatsP);
        if stats.conflicts > 0 && stats.conflicts % 5000 == 0 && ctx.part(TrailP).fully_propagated()
        {
            let db = ctx.part(ClauseDbP);
            let irredundant = db.count_by_tier(Tier::Irred) + ctx.part(BinaryClausesP).count()
                - ctx.part(BinaryClausesP).redundant_count();
            let redundant =
                db.redundant_count() + ctx.part(BinaryClausesP).redundant_count();
            let vars = ctx.part(AssignmentP).assignment().len()
                - ctx.part(TrailP).top_level_assignment_count();
            stats.report(irredundant, redundant, vars);
        }
    }

    maybe_switch_mode(ctx.borrow());
    maybe_restart(ctx.borrow());
    maybe_reduce(ctx.borrow());
    maybe_rephase(ctx.borrow());
    maybe_inprocess(ctx.borrow());

    enable_watchlists(ctx.borrow());

    conflict_step(ctx.borrow());

    ctx.part(SolverStateP).sat_state == SatState::Unknown
}
