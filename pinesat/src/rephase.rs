//! Rephasing: periodically overwrite the saved phases.
//!
//! At widening conflict intervals the saved phases are replaced by one of several sources,
//! cycled through in a fixed order. Statistics are kept per scheme.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Var;

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, PhasesP, ScheduleP,
    StatsP, VariablesP,
};
use crate::walk::{walk, Rng};

#[derive(Copy, Clone)]
enum Scheme {
    Best,
    Target,
    Inverted,
    Original,
    Flipped,
    Walk,
    Random,
}

const CYCLE: [Scheme; 8] = [
    Scheme::Best,
    Scheme::Inverted,
    Scheme::Walk,
    Scheme::Target,
    Scheme::Original,
    Scheme::Flipped,
    Scheme::Walk,
    Scheme::Random,
];

/// Overwrite the saved phases when the rephase schedule fires.
pub fn maybe_rephase(
    mut ctx: partial!(
        Context,
        mut PhasesP,
        mut ScheduleP,
        mut StatsP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        ConfigP,
        VariablesP,
    ),
) {
    let conflicts = ctx.part(StatsP).conflicts;
    if conflicts < ctx.part(ScheduleP).next_rephase {
        return;
    }

    let interval = ctx.part(ConfigP).rephaseint as u64;
    let schedule = ctx.part_mut(ScheduleP);
    schedule.rephase_count += 1;
    let count = schedule.rephase_count;
    schedule.next_rephase = conflicts + interval * count;

    let mut scheme = CYCLE[(count as usize - 1) % CYCLE.len()];

    if matches!(scheme, Scheme::Walk) {
        if walk(ctx.borrow()).is_none() {
            // Local search is disabled; fall back to the best phases.
            scheme = Scheme::Best;
        }
    }

    let var_count = ctx.part(AssignmentP).assignment().len();
    let initial = ctx.part(ConfigP).initialphase != 0;
    let seed = ctx.part(ConfigP).seed as u64;

    let mut rng = Rng::new(seed ^ count);

    let phases = ctx.part_mut(PhasesP);

    for index in 0..var_count {
        let var = Var::from_index(index);
        let phase = match scheme {
            Scheme::Best => phases.best(var),
            Scheme::Target => phases.target(var),
            Scheme::Inverted => !initial,
            Scheme::Original => initial,
            Scheme::Flipped => !phases.saved(var),
            Scheme::Walk => phases.min(var),
            Scheme::Random => rng.bool(),
        };
        phases.set_saved(var, phase);
    }

    let stats = ctx.part_mut(StatsP);
    match scheme {
        Scheme::Best => stats.rephased_best += 1,
        Scheme::Target => stats.rephased_target += 1,
        Scheme::Inverted => stats.rephased_inverted += 1,
        Scheme::Original => stats.rephased_original += 1,
        Scheme::Flipped => stats.rephased_flipped += 1,
        Scheme::Walk => stats.rephased_walk += 1,
        Scheme::Random => stats.rephased_random += 1,
    }
}
