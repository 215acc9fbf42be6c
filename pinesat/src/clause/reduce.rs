//! Clause database reduction and flushing.
//!
//! Reduction keeps the three learned retention bands in check: core clauses (tier one) are
//! always kept, unused mid tier clauses and all unused local tier clauses are collected, hyper
//! clauses survive a single round unless they were used, and of the surviving candidates the
//! worst fraction (by glue, then size) is collected as well. Flushing is the stronger cycle
//! that drops every unused redundant clause, including hyper binary clauses.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, EvsidsP, ImplGraphP,
    IncrementalP, PhasesP, ProofP, ScheduleP, StatsP, TrailP, VariablesP, VmtfP, WatchlistsP,
};
use crate::proof;
use crate::prop::{restart, Reason};

use super::db::{delete_clause, Tier};
use super::gc::collect_garbage;
use super::{ClauseRef, MAX_USED};

/// How many reductions happen between two flush cycles.
const FLUSH_INTERVAL: u64 = 8;

/// Perform a reduction when the conflict schedule asks for one.
pub fn maybe_reduce(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ProofP,
        mut ScheduleP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
        IncrementalP,
    ),
) {
    let conflicts = ctx.part(StatsP).conflicts;
    if conflicts < ctx.part(ScheduleP).next_reduce {
        return;
    }

    let config = ctx.part(ConfigP);
    let interval = config.reduceint as u64;
    let shape = config.reduceshape;

    let schedule = ctx.part_mut(ScheduleP);
    schedule.reduce_count += 1;
    let count = schedule.reduce_count;
    let step = match shape {
        0 => interval * count,
        1 => interval * count * count,
        _ => interval * schedule.luby_reduce.advance(),
    };
    schedule.next_reduce = conflicts + step;

    let flush = count % FLUSH_INTERVAL == 0;

    reduce(ctx.borrow(), flush);
}

/// Collect useless learned clauses.
pub fn reduce(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EvsidsP,
        mut ImplGraphP,
        mut PhasesP,
        mut ProofP,
        mut StatsP,
        mut TrailP,
        mut VariablesP,
        mut VmtfP,
        mut WatchlistsP,
        ConfigP,
        IncrementalP,
    ),
    flush: bool,
) {
    // Out-of-order assignments from chronological backtracking are normalized by restarting
    // before clauses are judged.
    if ctx.part(TrailP).out_of_order {
        restart(ctx.borrow(), 0);
    }

    protect_reasons(ctx.borrow(), true);

    let tier1glue = ctx.part(ConfigP).tier1glue as usize;
    let target_percent = ctx.part(ConfigP).reducetarget as usize;

    let mut kill: Vec<ClauseRef> = vec![];
    let mut candidates: Vec<(usize, usize, ClauseRef)> = vec![];

    {
        let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);
        let db = ctx.part(ClauseDbP);

        for &cref in db.clauses.iter() {
            let header = alloc.header(cref);
            if header.deleted() || !header.redundant() || header.protected() {
                continue;
            }
            let used = header.used();
            let glue = header.glue();

            // Hyper resolvents survive a single round unless they were used, and a flush drops
            // every unused redundant clause; neither cares about the glue. The tier based
            // policy only touches clauses above the tier one glue threshold.
            let useless = if header.hyper() || flush {
                used == 0
            } else {
                glue > tier1glue
                    && match header.tier() {
                        Tier::Irred | Tier::Core => false,
                        Tier::Mid => used + 1 < MAX_USED,
                        Tier::Local => used == 0,
                    }
            };

            if useless {
                kill.push(cref);
            } else if header.tier() != Tier::Irred && header.tier() != Tier::Core {
                candidates.push((glue, header.len(), cref));
            }
        }

        // The best candidates (small glue, then short) survive; the configured fraction at the
        // tail is collected as well.
        candidates.sort_unstable_by_key(|&(glue, len, _)| (glue, len));
        let keep = candidates.len() * (100 - target_percent.min(100)) / 100;
        for &(_, _, cref) in candidates[keep.min(candidates.len())..].iter() {
            kill.push(cref);
        }

        // Usage counters only count usage between reductions.
        for &cref in db.clauses.iter() {
            let header = alloc.header_mut(cref);
            if !header.deleted() {
                header.set_used(0);
            }
        }
    }

    kill.sort_unstable();
    kill.dedup();

    for cref in kill {
        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }
        let (id, lits) = {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            (clause.header().id(), clause.lits().to_vec())
        };
        proof::delete_clause(ctx.borrow(), id, true, &lits);
        if ctx.part(WatchlistsP).enabled() {
            ctx.part_mut(WatchlistsP)
                .unwatch_clause(cref, [lits[0], lits[1]]);
        }
        delete_clause(ctx.borrow(), cref);
    }

    if flush {
        flush_hyper_binaries(ctx.borrow());
        ctx.part_mut(StatsP).flushed += 1;
    }

    protect_reasons(ctx.borrow(), false);

    collect_garbage(ctx.borrow());

    ctx.part_mut(StatsP).reductions += 1;
}

/// Mark or unmark all long reason clauses of the trail as protected.
pub fn protect_reasons(
    mut ctx: partial!(Context, mut ClauseAllocP, ImplGraphP, TrailP),
    protect: bool,
) {
    let (trail, mut ctx) = ctx.split_part(TrailP);
    let (alloc, ctx) = ctx.split_part_mut(ClauseAllocP);
    let impl_graph = ctx.part(ImplGraphP);

    for &lit in trail.trail().iter() {
        if let &Reason::Long(cref) = impl_graph.reason(lit.var()) {
            alloc.header_mut(cref).set_protected(protect);
        }
    }
}

/// Remove redundant binary clauses derived by hyper resolution.
///
/// They are marked garbage first (redundant binary clauses stay in memory when garbage-marked
/// until an explicit flush) and then reclaimed.
fn flush_hyper_binaries(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ProofP,
        AssignmentP,
        VariablesP,
    ),
) {
    let mut deletes: Vec<(ClauseId, [Lit; 2])> = vec![];

    {
        let (binary_clauses, ctx) = ctx.split_part_mut(BinaryClausesP);
        let assignment = ctx.part(AssignmentP);

        for code in 0..assignment.assignment().len() * 2 {
            let lit = Lit::from_code(code);
            let this = !lit;
            let keep_this = assignment.lit_value(this).is_some();
            let list = binary_clauses.implied_mut(lit);
            for watch in list.iter_mut() {
                if watch.hyper && watch.redundant && !watch.garbage {
                    // A clause touching an assigned literal may be a reason on the trail.
                    if keep_this || assignment.lit_value(watch.other).is_some() {
                        continue;
                    }
                    watch.garbage = true;
                    if this.code() < watch.other.code() {
                        deletes.push((watch.id, [this, watch.other]));
                    }
                }
            }
        }

        for _ in deletes.iter() {
            binary_clauses.note_removed(true);
        }

        binary_clauses.flush_garbage();
    }

    for (id, lits) in deletes {
        proof::delete_clause(ctx.borrow(), id, true, &lits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use pinesat_formula::lits;

    use crate::clause::{db, ClauseHeader};
    use crate::context::{set_var_count, ClauseDbP};

    #[test]
    fn unused_hyper_clauses_die_regardless_of_glue() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        // A low glue hyper resolvent that was never used.
        let mut header = ClauseHeader::new();
        header.set_id(1);
        header.set_glue(1);
        header.set_tier(Tier::Core);
        header.set_hyper(true);
        db::add_clause(ctx.borrow(), header, &lits![1, 2, 3]);

        // A hyper resolvent of the same shape that was used since the last round.
        let mut header = ClauseHeader::new();
        header.set_id(2);
        header.set_glue(1);
        header.set_tier(Tier::Core);
        header.set_hyper(true);
        header.set_used(1);
        db::add_clause(ctx.borrow(), header, &lits![4, 5, 6]);

        reduce(ctx.borrow(), false);
        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Core), 1);

        // The usage counters were reset, so the survivor dies one round later.
        reduce(ctx.borrow(), false);
        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Core), 0);
    }
}
