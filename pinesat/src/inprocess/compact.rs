//! Compaction of internal variable names.
//!
//! After enough variables were eliminated or substituted, the remaining active and fixed
//! variables are renamed onto a dense prefix and all clause storage is rewritten. The external
//! names, the extension stack and the equivalence classes are unaffected, since they live on
//! the external side of the variable mapping. Branching heuristic state starts fresh after a
//! compaction; only the saved phases are carried over.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context,
    EvsidsP, ImplGraphP, IncrementalP, OccurP, PhasesP, ProofP, StatsP, TmpDataP, TrailP,
    VariablesP, VmtfP, WatchlistsP,
};
use crate::decision;
use crate::varmap::VarStatus;

/// Compact the internal variable names when enough of them became inactive.
pub fn maybe_compact(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut IncrementalP,
        mut OccurP,
        mut PhasesP,
        mut ProofP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    let config = ctx.part(ConfigP);
    if config.compact == 0 {
        return;
    }
    let limit_percent = config.compactlim as usize;

    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);
    debug_assert!(ctx.part(TrailP).trail().is_empty());

    let old_count = ctx.part(VariablesP).internal_count();
    if old_count == 0 {
        return;
    }

    let inactive = {
        let variables = ctx.part(VariablesP);
        (0..old_count)
            .map(Var::from_index)
            .filter(|&var| {
                !matches!(
                    variables.status(var),
                    VarStatus::Active | VarStatus::Fixed
                )
            })
            .count()
    };

    if inactive * 100 < old_count * limit_percent {
        return;
    }

    // Dense renaming of the surviving variables.
    let mut mapping: Vec<Option<Var>> = vec![None; old_count];
    let mut new_count = 0;
    for index in 0..old_count {
        let var = Var::from_index(index);
        if matches!(
            ctx.part(VariablesP).status(var),
            VarStatus::Active | VarStatus::Fixed
        ) {
            mapping[index] = Some(Var::from_index(new_count));
            new_count += 1;
        }
    }

    if new_count == old_count {
        return;
    }

    let map_var = |var: Var| mapping[var.index()];
    let map_lit = |lit: Lit| map_var(lit.var()).map(|var| var.lit(lit.is_positive()));

    // Remember the per-variable state that survives the renaming.
    let mut kept: Vec<(Var, Var)> = vec![];
    for index in 0..old_count {
        if let Some(new_var) = mapping[index] {
            kept.push((Var::from_index(index), new_var));
        }
    }

    let fixed_values: Vec<(Var, Option<bool>, Option<pinesat_proof::ClauseId>)> = kept
        .iter()
        .map(|&(old, new)| {
            (
                new,
                ctx.part(AssignmentP).var_value(old),
                ctx.part(ProofP).unit_id(old),
            )
        })
        .collect();
    let saved_phases: Vec<(Var, bool, bool, bool, bool, Option<bool>)> = kept
        .iter()
        .map(|&(old, new)| {
            let phases = ctx.part(PhasesP);
            (
                new,
                phases.saved(old),
                phases.target(old),
                phases.best(old),
                phases.min(old),
                phases.forced(old),
            )
        })
        .collect();
    let statuses: Vec<(Var, VarStatus)> = kept
        .iter()
        .map(|&(old, new)| (new, ctx.part(VariablesP).status(old)))
        .collect();

    // Rewrite the long clauses in place.
    {
        let crefs: Vec<_> = ctx.part(ClauseDbP).clauses.clone();
        let alloc = ctx.part_mut(ClauseAllocP);
        for cref in crefs {
            let clause = alloc.clause_mut(cref);
            if clause.header().deleted() {
                continue;
            }
            for lit in clause.lits_mut() {
                *lit = map_lit(*lit).expect("live clause over removed variable");
            }
        }
    }

    // Rebuild the binary store under the new names.
    {
        let old_binaries = std::mem::replace(
            ctx.part_mut(BinaryClausesP),
            crate::prop::BinaryClauses::default(),
        );
        let binaries = ctx.part_mut(BinaryClausesP);
        binaries.set_var_count(new_count);
        for code in 0..old_count * 2 {
            let lit = Lit::from_code(code);
            let this = !lit;
            for watch in old_binaries.implied(lit) {
                if watch.garbage || this.code() > watch.other.code() {
                    continue;
                }
                let new_this = map_lit(this).expect("live binary over removed variable");
                let new_other = map_lit(watch.other).expect("live binary over removed variable");
                binaries.add_binary_clause(
                    [new_this, new_other],
                    watch.id,
                    watch.redundant,
                    watch.hyper,
                );
            }
        }
    }

    // Remap the variable mapping itself.
    {
        let variables = ctx.part_mut(VariablesP);
        let externals: Vec<(Var, Option<Var>)> = (0..old_count)
            .map(Var::from_index)
            .map(|old| (old, variables.external_from_internal(old)))
            .collect();
        variables.reset_internal(new_count);
        for (old, external) in externals {
            if let (Some(new), Some(external)) = (map_var(old), external) {
                variables.remap_internal(external, new);
            }
        }
        for &(var, status) in statuses.iter() {
            variables.set_status(var, status);
        }
    }

    // Fresh per-variable parts at the new size.
    *ctx.part_mut(AssignmentP) = Default::default();
    *ctx.part_mut(ImplGraphP) = Default::default();
    *ctx.part_mut(WatchlistsP) = Default::default();
    *ctx.part_mut(VmtfP) = Default::default();
    *ctx.part_mut(EvsidsP) = Default::default();
    *ctx.part_mut(AnalyzeConflictP) = Default::default();
    *ctx.part_mut(PhasesP) = Default::default();
    *ctx.part_mut(OccurP) = Default::default();

    let initial_phase = ctx.part(ConfigP).initialphase != 0;
    let score_decay = ctx.part(ConfigP).score_decay_factor();
    ctx.part_mut(EvsidsP).set_decay(score_decay);
    ctx.part_mut(AssignmentP).set_var_count(new_count);
    ctx.part_mut(ImplGraphP).set_var_count(new_count);
    ctx.part_mut(WatchlistsP).set_var_count(new_count);
    ctx.part_mut(VmtfP).set_var_count(new_count);
    ctx.part_mut(EvsidsP).set_var_count(new_count);
    ctx.part_mut(AnalyzeConflictP).set_var_count(new_count);
    ctx.part_mut(PhasesP).set_var_count(new_count, initial_phase);
    ctx.part_mut(OccurP).set_var_count(new_count);
    ctx.part_mut(TmpDataP).set_var_count(new_count);

    // Restore fixed assignments and phases.
    ctx.part_mut(ProofP).reset_unit_ids(new_count);
    for (var, value, unit_id) in fixed_values {
        if let (Some(value), Some(unit_id)) = (value, unit_id) {
            ctx.part_mut(AssignmentP).set_var(var, Some(value));
            ctx.part_mut(ImplGraphP).update_removed_unit(var, unit_id);
            ctx.part_mut(ProofP).set_unit_id(var, unit_id);
        }
    }
    for (var, saved, target, best, min, forced) in saved_phases {
        let phases = ctx.part_mut(PhasesP);
        phases.set_saved(var, saved);
        phases.set_target_raw(var, target);
        phases.set_best_raw(var, best);
        phases.set_min(var, min);
        phases.set_forced(var, forced);
    }

    // Pending assumptions and the constraint are internal literals and move along.
    ctx.part_mut(IncrementalP).remap_lits(&map_lit);

    for index in 0..new_count {
        let var = Var::from_index(index);
        if ctx.part(VariablesP).is_active(var) {
            decision::initialize_var(ctx.borrow(), var);
        }
    }

    // The trail is empty, but its queue head must match the fresh assignment.
    ctx.part_mut(TrailP).reset_queue();

    ctx.part_mut(StatsP).compactions += 1;
}
