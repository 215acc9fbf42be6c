//! Garbage collection of long clauses.
//!
//! The arena cannot free individual clauses, so space held by deleted clauses is reclaimed by
//! copying every live clause into a fresh arena. No reference into the old arena survives the
//! copy: the watchlists and occurrence lists are invalidated (they are rebuilt lazily), while
//! the reason references on the trail are rewritten through a remap table collected up front.
//! Clause ids, glue, usage counters and all other header state move with the clause.
//!
//! Live clauses are copied tier by tier, so that the clauses judged together by the next
//! reduction also sit together in memory.

use partial_ref::{partial, PartialRef};

use rustc_hash::FxHashMap;

use crate::context::{ClauseAllocP, ClauseDbP, Context, ImplGraphP, TrailP, WatchlistsP};
use crate::prop::Reason;

use super::{ClauseAlloc, ClauseRef, Tier};

/// Perform a garbage collection of long clauses if necessary.
///
/// Collecting once a fixed fraction of the arena is garbage amortizes the copying costs.
pub fn collect_garbage(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut WatchlistsP,
        TrailP,
    ),
) {
    let garbage_size = ctx.part(ClauseDbP).garbage_size;
    if garbage_size * 2 > ctx.part(ClauseAllocP).buffer_size() {
        collect_garbage_now(ctx.borrow());
    }
}

/// Unconditionally copy all live clauses into a fresh arena.
pub fn collect_garbage_now(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut WatchlistsP,
        TrailP,
    ),
) {
    ctx.part_mut(WatchlistsP).disable();

    // The only references into the arena that are kept alive across the collection are the
    // reasons of trail literals. Reasons are never garbage (reduction protects them), so every
    // entry of this table gets a new location during the copy.
    let mut reason_map: FxHashMap<ClauseRef, ClauseRef> = FxHashMap::default();
    {
        let impl_graph = ctx.part(ImplGraphP);
        for &lit in ctx.part(TrailP).trail() {
            if let &Reason::Long(cref) = impl_graph.reason(lit.var()) {
                reason_map.insert(cref, cref);
            }
        }
    }

    {
        let (db, mut ctx) = ctx.split_part_mut(ClauseDbP);
        let alloc = ctx.part_mut(ClauseAllocP);

        assert!(
            db.garbage_size <= alloc.buffer_size(),
            "Inconsistent garbage tracking in ClauseDb"
        );
        let live_size = alloc.buffer_size() - db.garbage_size;

        // Sizing the new arena at exactly the live size would make the next learned clause
        // reallocate right away; overallocating avoids that.
        let mut new_alloc = ClauseAlloc::with_capacity(live_size * 2);

        let mut new_clauses = vec![];
        let mut new_by_tier: [Vec<ClauseRef>; Tier::count()] = Default::default();

        for &tier in [Tier::Irred, Tier::Core, Tier::Mid, Tier::Local].iter() {
            for &cref in db.clauses.iter() {
                let clause = alloc.clause(cref);
                let header = *clause.header();
                if header.deleted() || header.tier() != tier {
                    continue;
                }

                let new_cref = new_alloc.add_clause(header, clause.lits());
                new_clauses.push(new_cref);
                new_by_tier[tier as usize].push(new_cref);

                if let Some(entry) = reason_map.get_mut(&cref) {
                    *entry = new_cref;
                }
            }
        }

        *ctx.part_mut(ClauseAllocP) = new_alloc;
        db.clauses = new_clauses;
        db.by_tier = new_by_tier;
        db.garbage_size = 0;
    }

    // Point the trail reasons at the copied clauses.
    let (impl_graph, ctx) = ctx.split_part_mut(ImplGraphP);
    for &lit in ctx.part(TrailP).trail() {
        if let &Reason::Long(cref) = impl_graph.reason(lit.var()) {
            match reason_map.get(&cref) {
                Some(&new_cref) => impl_graph.update_reason(lit.var(), Reason::Long(new_cref)),
                None => debug_assert!(false, "trail reason was collected as garbage"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;
    use proptest::prelude::*;

    use pinesat_formula::{cnf::strategy::*, lit, lits, Lit};

    use crate::clause::{db, ClauseHeader};
    use crate::context::set_var_count;
    use crate::prop::enqueue_assignment;

    fn add_with_id(
        mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP),
        id: u64,
        tier: Tier,
        lits: &[Lit],
    ) -> ClauseRef {
        let mut header = ClauseHeader::new();
        header.set_id(id);
        header.set_tier(tier);
        header.set_glue(lits.len());
        db::add_clause(ctx.borrow(), header, lits)
    }

    #[test]
    fn reasons_and_headers_survive_collection() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        let garbage = add_with_id(ctx.borrow(), 1, Tier::Local, &lits![4, 5, 6]);
        let reason = add_with_id(ctx.borrow(), 2, Tier::Core, &lits![1, 2, 3]);

        enqueue_assignment(ctx.borrow(), lit!(1), Reason::Long(reason));

        db::delete_clause(ctx.borrow(), garbage);

        collect_garbage_now(ctx.borrow());

        assert!(!ctx.part(WatchlistsP).enabled());
        assert_eq!(ctx.part(ClauseDbP).garbage_size, 0);

        // The reason reference was rewritten and still leads to the copied clause.
        match *ctx.part(ImplGraphP).reason(lit!(1).var()) {
            Reason::Long(new_cref) => {
                let clause = ctx.part(ClauseAllocP).clause(new_cref);
                assert_eq!(clause.lits(), &lits![1, 2, 3]);
                assert_eq!(clause.header().id(), 2);
                assert_eq!(clause.header().tier(), Tier::Core);
            }
            ref reason => panic!("unexpected reason {:?}", reason),
        }
    }

    #[test]
    fn collecting_an_empty_database_is_a_noop() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        collect_garbage_now(ctx.borrow());
        assert_eq!(ctx.part(ClauseDbP).garbage_size, 0);
    }

    proptest! {
        #[test]
        fn collection_keeps_live_clauses_grouped_by_tier(
            keep in cnf_formula(2..50usize, 5..100, 3..10),
            drop in cnf_formula(2..50usize, 5..100, 3..10),
        ) {
            let mut ctx = Context::default();
            let mut ctx = ctx.into_partial_ref_mut();

            set_var_count(ctx.borrow(), keep.var_count().max(drop.var_count()));

            let tiers = [Tier::Irred, Tier::Core, Tier::Mid, Tier::Local];

            let mut next_id = 1;
            let mut kept: Vec<(u64, Tier, Vec<Lit>)> = vec![];

            for (index, lits) in keep.iter().enumerate() {
                let tier = tiers[index % tiers.len()];
                add_with_id(ctx.borrow(), next_id, tier, lits);
                kept.push((next_id, tier, lits.to_vec()));
                next_id += 1;
            }
            for (index, lits) in drop.iter().enumerate() {
                let tier = tiers[(index + 1) % tiers.len()];
                let cref = add_with_id(ctx.borrow(), next_id, tier, lits);
                next_id += 1;
                db::delete_clause(ctx.borrow(), cref);
            }

            let old_size = ctx.part(ClauseAllocP).buffer_size();

            collect_garbage_now(ctx.borrow());

            prop_assert!(ctx.part(ClauseAllocP).buffer_size() < old_size);
            prop_assert_eq!(ctx.part(ClauseDbP).garbage_size, 0);

            // Every live clause survives with id, tier and literals intact, and the clauses
            // of each tier are contiguous in the copied arena.
            let mut seen = vec![];
            let mut last_tier_index = 0;
            for &cref in ctx.part(ClauseDbP).clauses.iter() {
                let clause = ctx.part(ClauseAllocP).clause(cref);
                let header = clause.header();
                prop_assert!(!header.deleted());
                prop_assert!(header.tier() as usize >= last_tier_index);
                last_tier_index = header.tier() as usize;
                seen.push((header.id(), header.tier(), clause.lits().to_vec()));
            }

            let mut expected = kept;
            expected.sort_by_key(|&(id, tier, _)| (tier as usize, id));
            seen.sort_by_key(|&(id, tier, _)| (tier as usize, id));
            prop_assert_eq!(seen, expected);

            for &tier in tiers.iter() {
                prop_assert_eq!(
                    ctx.part(ClauseDbP).by_tier[tier as usize].len(),
                    ctx.part(ClauseDbP).count_by_tier(tier)
                );
            }
        }
    }
}
