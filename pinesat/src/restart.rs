//! Restarts and the stable/unstable mode switch.
//!
//! During unstable mode restarts follow the Glucose scheme: restart when the fast moving average
//! of learned clause glues exceeds the slow one by a configured margin. During stable mode only
//! reluctant doubling (Luby) restarts fire, at much longer intervals. Mode switching is driven
//! by a ticks budget that grows with every switch.
//!
//! A restart does not necessarily unassign everything: the largest prefix of decision levels
//! whose decisions the current heuristic ordering would immediately redo is kept (trail reuse).

use partial_ref::{partial, PartialRef};

use crate::context::{
    AssignmentP, ConfigP, Context, EvsidsP, ImplGraphP, IncrementalP, PhasesP, ScheduleP, StatsP,
    TrailP, VmtfP,
};
use crate::decision::{next_decision_priority, DecisionPriority};
use crate::prop::backtrack;

/// Exponential moving average.
pub struct Ema {
    value: f64,
    alpha: f64,
}

impl Ema {
    pub fn new(alpha: f64) -> Ema {
        Ema { value: 0.0, alpha }
    }

    pub fn update(&mut self, sample: f64) {
        self.value += self.alpha * (sample - self.value);
    }

    pub fn get(&self) -> f64 {
        self.value
    }
}

/// Update the glue averages after a conflict.
pub fn after_conflict(mut ctx: partial!(Context, mut ScheduleP), glue: usize) {
    let schedule = ctx.part_mut(ScheduleP);
    schedule.fast_glue.update(glue as f64);
    schedule.slow_glue.update(glue as f64);
}

/// Switch between stable and unstable mode when the ticks budget of the current mode is used up.
pub fn maybe_switch_mode(
    mut ctx: partial!(Context, mut PhasesP, mut ScheduleP, mut StatsP, ConfigP),
) {
    let config = ctx.part(ConfigP);
    if config.stabilize == 0 {
        return;
    }
    let base_budget = 1u64 << config.stabilizeticks;
    let factor = config.stabilizefactor as u64;
    let ticks = ctx.part(StatsP).ticks;

    let schedule = ctx.part_mut(ScheduleP);
    if schedule.mode_budget == 0 {
        schedule.mode_budget = base_budget;
        schedule.mode_start_ticks = ticks;
        return;
    }

    if ticks.saturating_sub(schedule.mode_start_ticks) < schedule.mode_budget {
        return;
    }

    schedule.stable = !schedule.stable;
    schedule.mode_start_ticks = ticks;
    schedule.mode_budget = schedule.mode_budget * factor / 100;
    ctx.part_mut(StatsP).mode_switches += 1;

    if schedule.stable {
        // A fresh stable phase starts with empty target phases.
        ctx.part_mut(PhasesP).clear_target();
    }
}

/// Perform a restart if the active policy asks for one.
pub fn maybe_restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ScheduleP,
        mut StatsP,
        mut TrailP,
        mut VmtfP,
        ConfigP,
        IncrementalP,
    ),
) {
    let assumption_levels = ctx.part(IncrementalP).assumption_levels();
    if ctx.part(TrailP).current_level() <= assumption_levels {
        return;
    }

    let (reluctant_interval, restart_interval, margin_factor, reuse_enabled) = {
        let config = ctx.part(ConfigP);
        (
            config.reluctantint as u64,
            config.restartint as u64,
            config.restart_margin_factor(),
            config.restartreusetrail != 0,
        )
    };
    let conflicts = ctx.part(StatsP).conflicts;
    let stable = ctx.part(ScheduleP).stable;

    let restart = if stable {
        if conflicts >= ctx.part(ScheduleP).next_restart {
            let schedule = ctx.part_mut(ScheduleP);
            let step = reluctant_interval * schedule.luby_restart.advance();
            schedule.next_restart = conflicts + step;
            true
        } else {
            false
        }
    } else {
        let schedule = ctx.part(ScheduleP);
        conflicts.saturating_sub(schedule.last_restart_conflicts) >= restart_interval
            && schedule.fast_glue.get() > schedule.slow_glue.get() * margin_factor
    };

    if !restart {
        return;
    }

    ctx.part_mut(ScheduleP).last_restart_conflicts = conflicts;
    ctx.part_mut(StatsP).restarts += 1;

    let keep = if reuse_enabled {
        reuse_trail_levels(ctx.borrow())
    } else {
        0
    };
    if keep > 0 {
        ctx.part_mut(StatsP).reused_trails += 1;
    }

    backtrack(ctx.borrow(), assumption_levels + keep);
}

/// The number of decision levels above the assumptions that the restart can keep.
///
/// A level can be kept when its decision variable ranks higher in the active heuristic than the
/// best unassigned candidate, since the same decision would be redone immediately.
fn reuse_trail_levels(
    mut ctx: partial!(
        Context,
        mut EvsidsP,
        mut VmtfP,
        AssignmentP,
        IncrementalP,
        ScheduleP,
        TrailP,
    ),
) -> usize {
    let candidate = next_decision_priority(ctx.borrow());

    let assumption_levels = ctx.part(IncrementalP).assumption_levels();
    let stable = ctx.part(ScheduleP).stable;

    let mut keep = 0;

    let frames: Vec<_> = ctx.part(TrailP).control()[assumption_levels + 1..].to_vec();
    for frame in frames {
        let decision = match frame.decision {
            Some(decision) => decision,
            None => break,
        };

        let redone = match candidate {
            DecisionPriority::None => true,
            DecisionPriority::Score(score) => {
                stable && ctx.part(EvsidsP).score(decision.var()) > score
            }
            DecisionPriority::Stamp(stamp) => {
                !stable && ctx.part(VmtfP).stamp_of(decision.var()) > stamp
            }
        };

        if redone {
            keep += 1;
        } else {
            break;
        }
    }

    keep
}
