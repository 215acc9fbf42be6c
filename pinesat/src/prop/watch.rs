//! Watchlists to detect clauses that became unit.
//!
//! Each (long) clause has always two watches pointing to it. The watches are kept in the
//! watchlists of two different literals of the clause. Whenever the watches are moved to
//! different literals the literals of the clause are permuted so the watched literals are in
//! position 0 and 1.
//!
//! When a clause is not unit under the current assignment, the watched literals point at two
//! non-false literals. When a clause is unit and thus propagating, the true literal is watched
//! and in position 0, the other watched literal is the one with the largest decision level and
//! kept in position 1. When a clause becomes satisfied before becoming unit the watches can be
//! kept as they were.
//!
//! As a further optimization we use blocking literals. Each watch stores a literal of the clause
//! that is different from the watched literal. When that literal is true, the clause is already
//! satisfied, which can be detected by just looking at the watch, avoiding access of the clause
//! database.
//!
//! The watchlists can be disabled while dense occurrence lists are active during inprocessing.
//! At most one of the two indexings is active at a time; switching reconstructs the other.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use crate::clause::ClauseRef;
use crate::context::{ClauseAllocP, ClauseDbP, Context, WatchlistsP};

/// A watch on a long clause.
#[derive(Copy, Clone)]
pub struct Watch {
    /// Clause which has the referring lit in position 0 or 1.
    pub cref: ClauseRef,
    /// A lit of the clause, different from the referring lit.
    pub blocking: Lit,
}

/// Watchlists to detect clauses that became unit.
#[derive(Default)]
pub struct Watchlists {
    /// Contains only valid data for indices of assigned variables.
    watches: Vec<Vec<Watch>>,
    /// Whether the watchlists are up to date.
    enabled: bool,
}

impl Watchlists {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.watches.resize(count * 2, vec![]);
    }

    /// Start watching a clause.
    ///
    /// `lits` have to be the first two literals of the given clause.
    pub fn watch_clause(&mut self, cref: ClauseRef, lits: [Lit; 2]) {
        for i in 0..2 {
            let watch = Watch {
                cref,
                blocking: lits[i ^ 1],
            };
            self.watches[(!lits[i]).code()].push(watch);
        }
    }

    /// Take ownership of a literal's watch list, leaving an empty one.
    pub fn take_watched_by(&mut self, lit: Lit) -> Vec<Watch> {
        std::mem::replace(&mut self.watches[lit.code()], vec![])
    }

    /// Store a literal's watch list after processing it.
    pub fn set_watched_by(&mut self, lit: Lit, watches: Vec<Watch>) {
        self.watches[lit.code()] = watches;
    }

    /// Make a literal watch a clause.
    pub fn add_watch(&mut self, lit: Lit, watch: Watch) {
        self.watches[lit.code()].push(watch)
    }

    /// Drop the watch of `lit` for a given clause.
    pub fn remove_watch(&mut self, lit: Lit, cref: ClauseRef) {
        let list = &mut self.watches[lit.code()];
        if let Some(position) = list.iter().position(|watch| watch.cref == cref) {
            list.swap_remove(position);
        }
    }

    /// Stop watching a clause through its current first two literals.
    ///
    /// Required whenever a non-satisfied clause is deleted while the watchlists are enabled;
    /// a stale watch could otherwise produce propagations from a clause the proof already
    /// considers deleted.
    pub fn unwatch_clause(&mut self, cref: ClauseRef, lits: [Lit; 2]) {
        self.remove_watch(!lits[0], cref);
        self.remove_watch(!lits[1], cref);
    }

    /// Are the watchlists enabled?
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Invalidate the watchlists, dropping their contents.
    pub fn disable(&mut self) {
        self.enabled = false;
        for watchlist in self.watches.iter_mut() {
            watchlist.clear();
        }
    }

    pub(crate) fn mark_enabled(&mut self) {
        self.enabled = true;
    }
}

/// Rebuild the watchlists from the clause database.
///
/// All clauses must be at least binary-free, i.e. every non-deleted long clause has two non-false
/// first literals when this is called at the root level.
pub fn enable_watchlists(
    mut ctx: partial!(Context, mut WatchlistsP, ClauseAllocP, ClauseDbP),
) {
    if ctx.part(WatchlistsP).enabled() {
        return;
    }
    let (watchlists, ctx) = ctx.split_part_mut(WatchlistsP);
    let alloc = ctx.part(ClauseAllocP);

    for &cref in ctx.part(ClauseDbP).clauses.iter() {
        let clause = alloc.clause(cref);
        if clause.header().deleted() {
            continue;
        }
        let lits = clause.lits();
        watchlists.watch_clause(cref, [lits[0], lits[1]]);
    }
    watchlists.mark_enabled();
}
